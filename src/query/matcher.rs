//! Template matcher and join engine
//!
//! Solves a conjunction of templates with a nested-loop join:
//! - Start from a single empty context
//! - For each template, and each partial context, push already-bound
//!   variables into the select as literals
//! - Unify every returned row with the partial context; survivors become
//!   the partial contexts for the next template
//!
//! An empty set of partial contexts at any step ends the query early.

use std::collections::HashMap;

use tracing::debug;

use crate::registry::TypeRegistry;
use crate::storage::FactBackend;
use crate::types::{Context, FactTemplate, HType, Predicate, Slot, Value};
use crate::{Error, Result};

/// Join engine over a registry and a backend, both borrowed for one query
pub struct Matcher<'a, B: FactBackend + ?Sized> {
    registry: &'a TypeRegistry,
    backend: &'a mut B,
}

impl<'a, B: FactBackend + ?Sized> Matcher<'a, B> {
    pub fn new(registry: &'a TypeRegistry, backend: &'a mut B) -> Self {
        Self { registry, backend }
    }

    /// Find every context satisfying all templates at once.
    ///
    /// Zero templates yield exactly one empty context.
    pub fn run(&mut self, templates: &[FactTemplate]) -> Result<Vec<Context>> {
        let predicates = self.validate(templates)?;

        let mut contexts = vec![Context::new()];
        for (template, predicate) in templates.iter().zip(predicates) {
            let mut extended = Vec::new();
            for context in &contexts {
                let bound = bound_slots(template, context);
                let rows = self.backend.select(predicate, &bound)?;
                extended.extend(rows.iter().filter_map(|row| unify(template, context, row)));
            }

            debug!(
                template = %template,
                partial = contexts.len(),
                extended = extended.len(),
                "Joined template"
            );
            if extended.is_empty() {
                return Ok(Vec::new());
            }
            contexts = extended;
        }
        Ok(contexts)
    }

    /// Type-check every template before touching storage.
    ///
    /// Beyond the per-template checks, a variable must sit at positions of a
    /// single type across the whole query.
    fn validate(&self, templates: &[FactTemplate]) -> Result<Vec<&'a Predicate>> {
        let registry = self.registry;
        let mut var_types: HashMap<&str, &HType> = HashMap::new();
        let mut predicates = Vec::with_capacity(templates.len());

        for template in templates {
            let predicate = registry.check_template(template)?;
            for (slot, ty) in template.slots.iter().zip(&predicate.types) {
                let Slot::Var(name) = slot else { continue };
                match var_types.get(name.as_str()) {
                    Some(first) if *first != ty => {
                        return Err(Error::VariableTypeConflict {
                            variable: name.clone(),
                            first: (*first).clone(),
                            second: ty.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        var_types.insert(name.as_str(), ty);
                    }
                }
            }
            predicates.push(predicate);
        }
        Ok(predicates)
    }
}

/// Literal slots and variables already fixed by `context` become bound positions
fn bound_slots(template: &FactTemplate, context: &Context) -> Vec<Option<Value>> {
    template
        .slots
        .iter()
        .map(|slot| match slot {
            Slot::Value(value) => Some(value.clone()),
            Slot::Var(name) => context.get(name).cloned(),
            Slot::Any => None,
        })
        .collect()
}

/// Extend `context` with one row, or `None` if the row disagrees with it
fn unify(template: &FactTemplate, context: &Context, row: &[Value]) -> Option<Context> {
    let mut next = context.clone();
    for (slot, value) in template.slots.iter().zip(row) {
        match slot {
            Slot::Value(literal) => {
                if literal != value {
                    return None;
                }
            }
            Slot::Var(name) => match next.get(name) {
                Some(existing) if existing != value => return None,
                Some(_) => {}
                None => next.bind(name.clone(), value.clone()),
            },
            Slot::Any => {}
        }
    }
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteBackend;
    use crate::types::Fact;

    fn setup(predicates: &[Predicate], facts: &[Fact]) -> (TypeRegistry, SqliteBackend) {
        let mut registry = TypeRegistry::new();
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        for pred in predicates {
            backend.ensure_schema(pred).unwrap();
            registry.register(pred.clone()).unwrap();
        }
        for fact in facts {
            let pred = registry.check_fact(fact).unwrap();
            backend.insert(pred, &fact.args).unwrap();
        }
        (registry, backend)
    }

    fn edge(a: &str, b: &str) -> Fact {
        Fact::new("edge", vec![a.into(), b.into()])
    }

    fn edge_pred() -> Predicate {
        Predicate::new("edge", vec![HType::String, HType::String])
    }

    #[test]
    fn test_repeated_variable_in_one_template() {
        let (registry, mut backend) = setup(
            &[edge_pred()],
            &[edge("a", "a"), edge("a", "b"), edge("c", "c")],
        );
        let t = FactTemplate::new("edge", vec![Slot::var("X"), Slot::var("X")]);
        let mut results = Matcher::new(&registry, &mut backend).run(&[t]).unwrap();
        results.sort_by_key(|c| c.to_string());

        let expected: Vec<Context> = ["a", "c"]
            .iter()
            .map(|v| [("X", Value::from(*v))].into_iter().collect())
            .collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn test_wildcard_binds_nothing() {
        let (registry, mut backend) = setup(&[edge_pred()], &[edge("a", "b"), edge("a", "c")]);
        let t = FactTemplate::new("edge", vec![Slot::var("X"), Slot::Any]);
        let results = Matcher::new(&registry, &mut backend).run(&[t]).unwrap();

        // No deduplication: one context per matching fact
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|c| c.len() == 1 && c.get("X") == Some(&"a".into())));
    }

    #[test]
    fn test_all_literal_template_is_existence_check() {
        let (registry, mut backend) = setup(&[edge_pred()], &[edge("a", "b"), edge("b", "c")]);
        let scan = FactTemplate::new("edge", vec![Slot::var("X"), Slot::var("Y")]);
        let present = FactTemplate::new("edge", vec![Slot::value("a"), Slot::value("b")]);
        let absent = FactTemplate::new("edge", vec![Slot::value("c"), Slot::value("a")]);

        let kept = Matcher::new(&registry, &mut backend)
            .run(&[scan.clone(), present])
            .unwrap();
        assert_eq!(kept.len(), 2);

        let dropped = Matcher::new(&registry, &mut backend)
            .run(&[scan, absent])
            .unwrap();
        assert!(dropped.is_empty());
    }

    #[test]
    fn test_join_across_predicates() {
        let owns = Predicate::new("owns", vec![HType::String, HType::UInt64]);
        let (registry, mut backend) = setup(
            &[edge_pred(), owns],
            &[
                edge("alice", "bob"),
                edge("alice", "carol"),
                Fact::new("owns", vec!["bob".into(), 3u64.into()]),
                Fact::new("owns", vec!["dave".into(), 4u64.into()]),
            ],
        );
        let templates = vec![
            FactTemplate::new("edge", vec![Slot::value("alice"), Slot::var("F")]),
            FactTemplate::new("owns", vec![Slot::var("F"), Slot::var("N")]),
        ];
        let results = Matcher::new(&registry, &mut backend).run(&templates).unwrap();
        let expected: Context = [("F", Value::from("bob")), ("N", Value::from(3u64))]
            .into_iter()
            .collect();
        assert_eq!(results, vec![expected]);
    }

    #[test]
    fn test_variable_type_conflict_is_rejected() {
        let owns = Predicate::new("owns", vec![HType::String, HType::UInt64]);
        let (registry, mut backend) = setup(&[edge_pred(), owns], &[]);
        let templates = vec![
            FactTemplate::new("edge", vec![Slot::var("X"), Slot::Any]),
            FactTemplate::new("owns", vec![Slot::Any, Slot::var("X")]),
        ];
        let err = Matcher::new(&registry, &mut backend)
            .run(&templates)
            .unwrap_err();
        assert!(matches!(err, Error::VariableTypeConflict { .. }));
    }

    #[test]
    fn test_unify_rejects_disagreeing_literal() {
        let template = FactTemplate::new("edge", vec![Slot::value("a"), Slot::var("Y")]);
        let row = vec![Value::from("b"), Value::from("c")];
        assert!(unify(&template, &Context::new(), &row).is_none());

        let row = vec![Value::from("a"), Value::from("c")];
        let ctx = unify(&template, &Context::new(), &row).unwrap();
        assert_eq!(ctx.get("Y"), Some(&Value::from("c")));
    }
}
