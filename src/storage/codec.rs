//! Value codec - typed values to and from SQLite column values
//!
//! - `string` -> TEXT
//! - `blob` -> BLOB
//! - `uint64` -> INTEGER, bit-cast through i64 so the full range survives
//! - `bool` -> INTEGER 0/1
//! - `list<T>` -> BLOB holding the JSON encoding of the elements
//!
//! Encodings are canonical: equal values always produce equal column values,
//! which is what the per-table uniqueness constraint and equality selects rely on.

use rusqlite::types::Value as SqlValue;

use crate::types::{HType, Value};
use crate::{Error, Result};

/// Native column type used for an argument type
pub fn column_type(ty: &HType) -> &'static str {
    match ty {
        HType::String => "TEXT",
        HType::Blob => "BLOB",
        HType::UInt64 | HType::Bool => "INTEGER",
        HType::List(_) => "BLOB",
    }
}

/// Encode a value for binding as a statement parameter
pub fn encode(value: &Value) -> Result<SqlValue> {
    Ok(match value {
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Blob(bytes) => SqlValue::Blob(bytes.clone()),
        Value::UInt64(n) => SqlValue::Integer(*n as i64),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::List(items) => SqlValue::Blob(serde_json::to_vec(items)?),
    })
}

/// Decode a column value read back for an argument of type `ty`
pub fn decode(raw: SqlValue, ty: &HType) -> Result<Value> {
    let value = match (raw, ty) {
        (SqlValue::Text(s), HType::String) => Value::String(s),
        (SqlValue::Blob(bytes), HType::Blob) => Value::Blob(bytes),
        (SqlValue::Integer(n), HType::UInt64) => Value::UInt64(n as u64),
        (SqlValue::Integer(n), HType::Bool) => Value::Bool(n != 0),
        (SqlValue::Blob(bytes), HType::List(_)) => {
            let items: Vec<Value> = serde_json::from_slice(&bytes)
                .map_err(|e| Error::Codec(format!("Corrupt list encoding: {}", e)))?;
            Value::List(items)
        }
        (raw, ty) => {
            return Err(Error::Codec(format!(
                "Column value {:?} cannot be read as {}",
                raw, ty
            )));
        }
    };

    if !value.conforms_to(ty) {
        return Err(Error::Codec(format!("Decoded value {} is not a {}", value, ty)));
    }
    Ok(value)
}
