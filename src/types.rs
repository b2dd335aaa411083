//! Core data model - types, values, facts, templates and contexts
//!
//! - `HType`: the declared type of one predicate argument
//! - `Value`: a runtime value carried by facts and templates
//! - `Predicate`: a named, fixed-arity signature
//! - `Fact`: a fully bound tuple under a predicate
//! - `FactTemplate`: a pattern of literals, variables and wildcards
//! - `Context`: one solution of a query, variable name -> value

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Type of a single predicate argument.
///
/// Compared structurally; `List(String)` and `List(UInt64)` are different types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HType {
    /// UTF-8 text
    String,
    /// Opaque byte string
    Blob,
    /// Unsigned 64-bit integer
    UInt64,
    /// Boolean
    Bool,
    /// Homogeneous list of the inner type
    List(Box<HType>),
}

impl HType {
    /// Convenience constructor for list types
    pub fn list(inner: HType) -> Self {
        HType::List(Box::new(inner))
    }
}

impl fmt::Display for HType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HType::String => write!(f, "string"),
            HType::Blob => write!(f, "blob"),
            HType::UInt64 => write!(f, "uint64"),
            HType::Bool => write!(f, "bool"),
            HType::List(inner) => write!(f, "list<{}>", inner),
        }
    }
}

impl FromStr for HType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let lower = s.to_lowercase();
        if let Some(inner) = lower
            .strip_prefix("list<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            return Ok(HType::list(inner.parse()?));
        }
        match lower.as_str() {
            "string" | "str" | "text" => Ok(HType::String),
            "blob" | "bytes" => Ok(HType::Blob),
            "uint64" | "u64" | "int" => Ok(HType::UInt64),
            "bool" | "boolean" => Ok(HType::Bool),
            _ => Err(Error::Parse(format!("Unknown type: {}", s))),
        }
    }
}

impl TryFrom<String> for HType {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<HType> for String {
    fn from(ty: HType) -> Self {
        ty.to_string()
    }
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    String(String),
    Blob(Vec<u8>),
    UInt64(u64),
    Bool(bool),
    List(Vec<Value>),
}

impl Value {
    /// Check that this value inhabits `ty`.
    ///
    /// Lists conform when every element conforms to the element type, so an
    /// empty list conforms to every list type.
    pub fn conforms_to(&self, ty: &HType) -> bool {
        match (self, ty) {
            (Value::String(_), HType::String)
            | (Value::Blob(_), HType::Blob)
            | (Value::UInt64(_), HType::UInt64)
            | (Value::Bool(_), HType::Bool) => true,
            (Value::List(items), HType::List(inner)) => {
                items.iter().all(|item| item.conforms_to(inner))
            }
            _ => false,
        }
    }

    /// Short description of the value's runtime kind, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Blob(_) => "blob",
            Value::UInt64(_) => "uint64",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Blob(bytes) => {
                write!(f, "0x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Value::UInt64(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::UInt64(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Blob(bytes)
    }
}

/// A predicate signature: name plus ordered argument types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub name: String,
    pub types: Vec<HType>,
}

impl Predicate {
    pub fn new(name: impl Into<String>, types: Vec<HType>) -> Self {
        Self {
            name: name.into(),
            types,
        }
    }

    pub fn arity(&self) -> usize {
        self.types.len()
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<String> = self.types.iter().map(|t| t.to_string()).collect();
        write!(f, "{}({})", self.name, types.join(", "))
    }
}

/// A fully bound tuple stored under a predicate.
///
/// Facts are identified by content only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    pub predicate: String,
    pub args: Vec<Value>,
}

impl Fact {
    pub fn new(predicate: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            predicate: predicate.into(),
            args,
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.args.iter().map(|v| v.to_string()).collect();
        write!(f, "{}({})", self.predicate, args.join(", "))
    }
}

/// One argument position of a template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    /// Literal that the stored value must equal
    Value(Value),
    /// Named variable, unified across the whole query
    Var(String),
    /// Matches anything and binds nothing
    Any,
}

impl Slot {
    pub fn var(name: impl Into<String>) -> Self {
        Slot::Var(name.into())
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Slot::Value(value.into())
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Value(v) => write!(f, "{}", v),
            Slot::Var(name) => write!(f, "?{}", name),
            Slot::Any => write!(f, "_"),
        }
    }
}

/// A pattern over one predicate's argument positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactTemplate {
    pub predicate: String,
    pub slots: Vec<Slot>,
}

impl FactTemplate {
    pub fn new(predicate: impl Into<String>, slots: Vec<Slot>) -> Self {
        Self {
            predicate: predicate.into(),
            slots,
        }
    }
}

impl fmt::Display for FactTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots: Vec<String> = self.slots.iter().map(|s| s.to_string()).collect();
        write!(f, "{}({})", self.predicate, slots.join(", "))
    }
}

/// A query solution: variable name -> bound value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(BTreeMap<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, var: &str) -> Option<&Value> {
        self.0.get(var)
    }

    pub fn bind(&mut self, var: impl Into<String>, value: Value) {
        self.0.insert(var.into(), value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bindings in variable-name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}
