//! Predicate type registry
//!
//! Source of truth for predicate signatures. Every fact and template is
//! checked here before it reaches storage.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::{Fact, FactTemplate, Predicate, Slot};
use crate::{Error, Result};

/// Widest predicate the bound-position bitset can describe
pub const MAX_ARITY: usize = 64;

static NAME_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Predicate names become part of a table name, so they are restricted to
/// lowercase ASCII, digits and underscores.
pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN
        .get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("static pattern"))
        .is_match(name)
}

/// Outcome of checking a registration against the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Name is free; storage must be created before inserting
    New,
    /// Identical signature already registered
    Existing,
}

/// In-memory map of predicate name -> signature
#[derive(Debug, Default)]
pub struct TypeRegistry {
    predicates: HashMap<String, Predicate>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a predicate by name
    pub fn get(&self, name: &str) -> Option<&Predicate> {
        self.predicates.get(name)
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// All registered predicates, sorted by name
    pub fn predicates(&self) -> Vec<&Predicate> {
        let mut preds: Vec<_> = self.predicates.values().collect();
        preds.sort_by(|a, b| a.name.cmp(&b.name));
        preds
    }

    /// Decide what registering `predicate` would do, without changing state.
    ///
    /// Returns `SchemaConflict` if the name is bound to another signature and
    /// `InvalidPredicate` if the name or arity cannot be stored.
    pub fn check_registration(&self, predicate: &Predicate) -> Result<Registration> {
        if let Some(existing) = self.predicates.get(&predicate.name) {
            return if existing.types == predicate.types {
                Ok(Registration::Existing)
            } else {
                Err(Error::SchemaConflict {
                    predicate: predicate.name.clone(),
                })
            };
        }

        if !is_valid_name(&predicate.name) {
            return Err(Error::InvalidPredicate(format!(
                "{}: use lowercase letters, digits and underscores only",
                predicate.name
            )));
        }
        if predicate.types.is_empty() || predicate.arity() > MAX_ARITY {
            return Err(Error::InvalidPredicate(format!(
                "{}: arity must be between 1 and {}, got {}",
                predicate.name,
                MAX_ARITY,
                predicate.arity()
            )));
        }
        Ok(Registration::New)
    }

    /// Insert a predicate whose storage already exists.
    pub fn insert(&mut self, predicate: Predicate) {
        self.predicates.insert(predicate.name.clone(), predicate);
    }

    /// Check-and-insert in one step, for callers with no storage to prepare.
    pub fn register(&mut self, predicate: Predicate) -> Result<Registration> {
        let registration = self.check_registration(&predicate)?;
        if registration == Registration::New {
            self.insert(predicate);
        }
        Ok(registration)
    }

    /// Validate a fact against its predicate's signature
    pub fn check_fact(&self, fact: &Fact) -> Result<&Predicate> {
        let predicate = self.lookup(&fact.predicate)?;
        check_arity(predicate, fact.args.len())?;

        for (position, (value, ty)) in fact.args.iter().zip(&predicate.types).enumerate() {
            if !value.conforms_to(ty) {
                return Err(Error::TypeMismatch {
                    predicate: predicate.name.clone(),
                    position,
                    expected: ty.clone(),
                    found: value.kind_name().to_string(),
                });
            }
        }
        Ok(predicate)
    }

    /// Validate a template's arity and literal slots
    pub fn check_template(&self, template: &FactTemplate) -> Result<&Predicate> {
        let predicate = self.lookup(&template.predicate)?;
        check_arity(predicate, template.slots.len())?;

        for (position, (slot, ty)) in template.slots.iter().zip(&predicate.types).enumerate() {
            if let Slot::Value(value) = slot {
                if !value.conforms_to(ty) {
                    return Err(Error::TypeMismatch {
                        predicate: predicate.name.clone(),
                        position,
                        expected: ty.clone(),
                        found: value.kind_name().to_string(),
                    });
                }
            }
        }
        Ok(predicate)
    }

    fn lookup(&self, name: &str) -> Result<&Predicate> {
        self.predicates
            .get(name)
            .ok_or_else(|| Error::UnknownPredicate(name.to_string()))
    }
}

fn check_arity(predicate: &Predicate, found: usize) -> Result<()> {
    if found != predicate.arity() {
        return Err(Error::ArityMismatch {
            predicate: predicate.name.clone(),
            expected: predicate.arity(),
            found,
        });
    }
    Ok(())
}
