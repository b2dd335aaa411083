//! Fact store - the synchronous API used by the deduction engine
//!
//! `FactStore` pairs the type registry with a storage backend behind one
//! exclusive lock. Every public call holds that lock for its whole duration,
//! so a query sees the registry as it was when the call started and the
//! backend never sees interleaved statements.

use std::fmt;
use std::path::Path;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::FactStoreConfig;
use crate::query::Matcher;
use crate::registry::{Registration, TypeRegistry};
use crate::storage::{FactBackend, SqliteBackend};
use crate::types::{Context, Fact, FactTemplate, HType, Predicate};
use crate::{Error, Result};

/// Outcome of one `set_facts` batch
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Facts that were not stored before this call
    pub inserted: usize,
    /// Facts refused by type checking, with their index in the batch
    pub rejected: Vec<(usize, Error)>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Per-predicate fact counts plus cache size
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub predicates: Vec<(String, usize)>,
    pub cached_shapes: usize,
}

impl StoreStats {
    pub fn total_facts(&self) -> usize {
        self.predicates.iter().map(|(_, n)| n).sum()
    }
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fact Store Statistics:")?;
        writeln!(f, "  Predicates: {}", self.predicates.len())?;
        writeln!(f, "  Facts: {}", self.total_facts())?;
        write!(f, "  Cached query shapes: {}", self.cached_shapes)
    }
}

struct StoreState<B> {
    registry: TypeRegistry,
    backend: B,
}

/// Typed fact database.
///
/// Not `Clone`; share it with `Arc<FactStore>` when several callers need it.
pub struct FactStore<B: FactBackend = SqliteBackend> {
    state: Mutex<StoreState<B>>,
}

impl FactStore<SqliteBackend> {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        Self::with_backend(SqliteBackend::open(path)?)
    }

    pub fn open_with_config(path: &Path, config: &FactStoreConfig) -> Result<Self> {
        Self::with_backend(SqliteBackend::open_with_config(path, config)?)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::with_backend(SqliteBackend::open_in_memory()?)
    }
}

impl<B: FactBackend> FactStore<B> {
    /// Wrap a backend, loading any signatures it already holds
    pub fn with_backend(mut backend: B) -> Result<Self> {
        let mut registry = TypeRegistry::new();
        for predicate in backend.load_predicates()? {
            registry.insert(predicate);
        }
        if !registry.is_empty() {
            info!(predicates = registry.len(), "Loaded predicate catalog");
        }

        Ok(Self {
            state: Mutex::new(StoreState { registry, backend }),
        })
    }

    /// Register a predicate signature.
    ///
    /// Returns `true` for a new or identical registration and `false` if the
    /// name is already bound to a different signature. Storage for a new
    /// predicate is created before the registry entry, so a failed schema
    /// creation leaves the name free for a retry.
    pub fn add_type(&self, name: &str, arg_types: Vec<HType>) -> Result<bool> {
        let predicate = Predicate::new(name, arg_types);
        let mut state = self.state.lock();
        let StoreState { registry, backend } = &mut *state;

        match registry.check_registration(&predicate) {
            Ok(Registration::Existing) => return Ok(true),
            Ok(Registration::New) => {}
            Err(Error::SchemaConflict { predicate: conflicting }) => {
                warn!(predicate = %conflicting, "Refusing conflicting re-registration");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        backend.begin()?;
        let created = backend
            .ensure_schema(&predicate)
            .and_then(|_| backend.record_predicate(&predicate));
        match created {
            Ok(()) => commit_or_rollback(backend)?,
            Err(e) => {
                rollback_quietly(backend);
                return Err(e);
            }
        }

        info!(predicate = %predicate, "Registered predicate");
        registry.insert(predicate);
        Ok(true)
    }

    /// Store a batch of facts.
    ///
    /// Malformed facts are skipped and reported in `rejected`; the rest are
    /// inserted in order. `inserted` counts only facts that were not already
    /// present. A storage fault rolls the whole batch back and is returned
    /// as an error.
    pub fn set_facts(&self, facts: &[Fact]) -> Result<IngestReport> {
        let mut state = self.state.lock();
        let StoreState { registry, backend } = &mut *state;

        backend.begin()?;
        let mut report = IngestReport::default();
        for (index, fact) in facts.iter().enumerate() {
            let predicate = match registry.check_fact(fact) {
                Ok(predicate) => predicate,
                Err(e) => {
                    warn!(index, fact = %fact, error = %e, "Rejected fact");
                    report.rejected.push((index, e));
                    continue;
                }
            };
            match backend.insert(predicate, &fact.args) {
                Ok(true) => report.inserted += 1,
                Ok(false) => {}
                Err(e) => {
                    rollback_quietly(backend);
                    return Err(e);
                }
            }
        }
        commit_or_rollback(backend)?;

        Ok(report)
    }

    /// Solve a conjunction of templates.
    ///
    /// Any malformed template aborts the query. The result order carries no
    /// meaning and is not deduplicated.
    pub fn get_facts(&self, templates: &[FactTemplate]) -> Result<Vec<Context>> {
        let mut state = self.state.lock();
        let StoreState { registry, backend } = &mut *state;
        Matcher::new(registry, backend).run(templates)
    }

    /// Look up a registered signature
    pub fn predicate(&self, name: &str) -> Option<Predicate> {
        self.state.lock().registry.get(name).cloned()
    }

    /// All registered signatures, sorted by name
    pub fn predicates(&self) -> Vec<Predicate> {
        self.state
            .lock()
            .registry
            .predicates()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let mut state = self.state.lock();
        let StoreState { registry, backend } = &mut *state;

        let mut predicates = Vec::with_capacity(registry.len());
        for predicate in registry.predicates() {
            predicates.push((predicate.name.clone(), backend.count(predicate)?));
        }
        Ok(StoreStats {
            predicates,
            cached_shapes: backend.cached_shapes(),
        })
    }
}

fn rollback_quietly<B: FactBackend>(backend: &mut B) {
    if let Err(e) = backend.rollback() {
        warn!(error = %e, "Rollback failed");
    }
}

/// A failed COMMIT leaves the transaction open in SQLite; close it so the
/// batch's writes are discarded and the next `begin` succeeds.
fn commit_or_rollback<B: FactBackend>(backend: &mut B) -> Result<()> {
    if let Err(e) = backend.commit() {
        warn!(error = %e, "Commit failed, rolling back");
        rollback_quietly(backend);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Slot, Value};
    use std::sync::Arc;

    fn likes(a: &str, b: &str) -> Fact {
        Fact::new("likes", vec![a.into(), b.into()])
    }

    fn likes_store() -> FactStore {
        let store = FactStore::open_in_memory().unwrap();
        assert!(store.add_type("likes", vec![HType::String, HType::String]).unwrap());
        store
            .set_facts(&[likes("alice", "bob"), likes("bob", "carol")])
            .unwrap();
        store
    }

    fn chain_templates() -> Vec<FactTemplate> {
        vec![
            FactTemplate::new("likes", vec![Slot::var("X"), Slot::var("Y")]),
            FactTemplate::new("likes", vec![Slot::var("Y"), Slot::var("Z")]),
        ]
    }

    #[test]
    fn test_idempotent_registration() {
        let store = FactStore::open_in_memory().unwrap();
        let sig = vec![HType::String, HType::UInt64];
        assert!(store.add_type("p", sig.clone()).unwrap());
        assert!(store.add_type("p", sig.clone()).unwrap());
        assert_eq!(store.predicates(), vec![Predicate::new("p", sig)]);
    }

    #[test]
    fn test_registration_conflict() {
        let store = FactStore::open_in_memory().unwrap();
        assert!(store.add_type("p", vec![HType::String]).unwrap());
        assert!(!store.add_type("p", vec![HType::Blob]).unwrap());
        assert_eq!(store.predicate("p").unwrap().types, vec![HType::String]);
    }

    #[test]
    fn test_invalid_name_is_an_error() {
        let store = FactStore::open_in_memory().unwrap();
        let err = store.add_type("Bad Name", vec![HType::String]).unwrap_err();
        assert!(matches!(err, Error::InvalidPredicate(_)));
        assert!(store.predicates().is_empty());
    }

    #[test]
    fn test_ingestion_dedup() {
        let store = FactStore::open_in_memory().unwrap();
        store.add_type("likes", vec![HType::String, HType::String]).unwrap();

        let fact = likes("alice", "bob");
        assert_eq!(store.set_facts(&[fact.clone()]).unwrap().inserted, 1);
        assert_eq!(store.set_facts(&[fact.clone()]).unwrap().inserted, 0);
        assert_eq!(store.stats().unwrap().total_facts(), 1);

        // Duplicates inside one batch count once
        let report = store
            .set_facts(&[likes("x", "y"), likes("x", "y")])
            .unwrap();
        assert_eq!(report.inserted, 1);
    }

    #[test]
    fn test_type_rejection_does_not_abort_batch() {
        let store = FactStore::open_in_memory().unwrap();
        store.add_type("likes", vec![HType::String, HType::String]).unwrap();

        let bad = Fact::new("likes", vec!["alice".into(), Value::UInt64(7)]);
        let unknown = Fact::new("hates", vec!["a".into(), "b".into()]);
        let report = store
            .set_facts(&[bad, likes("alice", "bob"), unknown])
            .unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(report.rejected[0].0, 0);
        assert!(matches!(report.rejected[0].1, Error::TypeMismatch { .. }));
        assert!(matches!(report.rejected[1].1, Error::UnknownPredicate(_)));
        assert!(report.rejected.iter().all(|(_, e)| e.is_validation()));

        let all = store
            .get_facts(&[FactTemplate::new("likes", vec![Slot::var("A"), Slot::var("B")])])
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_empty_template_identity() {
        let store = FactStore::open_in_memory().unwrap();
        let results = store.get_facts(&[]).unwrap();
        assert_eq!(results, vec![Context::new()]);
    }

    #[test]
    fn test_join_correctness() {
        let store = likes_store();
        let results = store.get_facts(&chain_templates()).unwrap();

        let expected: Context = [
            ("X", Value::from("alice")),
            ("Y", Value::from("bob")),
            ("Z", Value::from("carol")),
        ]
        .into_iter()
        .collect();
        assert_eq!(results, vec![expected]);
    }

    #[test]
    fn test_unsatisfiable_conjunction() {
        let store = likes_store();
        let t = FactTemplate::new("likes", vec![Slot::var("X"), Slot::value("zed")]);
        assert!(store.get_facts(&[t]).unwrap().is_empty());
    }

    #[test]
    fn test_order_invariance() {
        let store = likes_store();
        store
            .set_facts(&[likes("carol", "alice"), likes("bob", "dave")])
            .unwrap();

        let mut forward = store.get_facts(&chain_templates()).unwrap();
        let mut reversed_templates = chain_templates();
        reversed_templates.reverse();
        let mut reversed = store.get_facts(&reversed_templates).unwrap();

        // Multiplicity counts too, so compare as sorted lists
        forward.sort_by_key(|c| c.to_string());
        reversed.sort_by_key(|c| c.to_string());

        assert_eq!(forward.len(), 4);
        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_malformed_template_aborts_query() {
        let store = likes_store();
        let templates = vec![
            FactTemplate::new("likes", vec![Slot::var("X"), Slot::var("Y")]),
            FactTemplate::new("likes", vec![Slot::var("Y")]),
        ];
        assert!(matches!(
            store.get_facts(&templates),
            Err(Error::ArityMismatch { .. })
        ));

        let unknown = vec![FactTemplate::new("nope", vec![Slot::Any])];
        assert!(matches!(
            store.get_facts(&unknown),
            Err(Error::UnknownPredicate(_))
        ));
    }

    #[test]
    fn test_list_values_store_and_match() {
        let store = FactStore::open_in_memory().unwrap();
        let tags = HType::list(HType::String);
        store.add_type("tags", vec![HType::String, tags]).unwrap();

        let list = Value::List(vec!["red".into(), "blue".into()]);
        let report = store
            .set_facts(&[
                Fact::new("tags", vec!["a".into(), list.clone()]),
                Fact::new("tags", vec!["b".into(), Value::List(vec![])]),
                Fact::new("tags", vec!["c".into(), Value::List(vec![Value::Bool(true)])]),
            ])
            .unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.rejected.len(), 1);

        let t = FactTemplate::new("tags", vec![Slot::var("K"), Slot::Value(list)]);
        let results = store.get_facts(&[t]).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get("K"), Some(&Value::from("a")));
    }

    #[test]
    fn test_catalog_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.db");
        {
            let store = FactStore::open(&path).unwrap();
            store.add_type("likes", vec![HType::String, HType::String]).unwrap();
            store.set_facts(&[likes("alice", "bob")]).unwrap();
        }

        let store = FactStore::open(&path).unwrap();
        assert!(!store.add_type("likes", vec![HType::Blob, HType::Blob]).unwrap());
        assert!(store.add_type("likes", vec![HType::String, HType::String]).unwrap());
        assert_eq!(store.set_facts(&[likes("alice", "bob")]).unwrap().inserted, 0);
        assert_eq!(store.stats().unwrap().total_facts(), 1);
    }

    #[test]
    fn test_failed_commit_leaves_store_usable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.db");
        let config = FactStoreConfig {
            busy_timeout_ms: 50,
            ..FactStoreConfig::default()
        };
        let store = FactStore::open_with_config(&path, &config).unwrap();
        store.add_type("n", vec![HType::UInt64]).unwrap();
        let n = |i: u64| Fact::new("n", vec![Value::UInt64(i)]);
        let all_n = [FactTemplate::new("n", vec![Slot::var("X")])];

        // An open read transaction on another connection holds a shared
        // lock, so the writer cannot take the exclusive lock COMMIT needs.
        let reader = rusqlite::Connection::open(&path).unwrap();
        reader.execute_batch("BEGIN").unwrap();
        let seen: i64 = reader
            .query_row("SELECT COUNT(*) FROM fact_n", [], |row| row.get(0))
            .unwrap();
        assert_eq!(seen, 0);

        let err = store.set_facts(&[n(1)]).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(!err.is_validation());

        reader.execute_batch("COMMIT").unwrap();
        drop(reader);

        assert!(store.get_facts(&all_n).unwrap().is_empty());
        assert_eq!(store.set_facts(&[n(2)]).unwrap().inserted, 1);
        assert!(store.add_type("m", vec![HType::Bool]).unwrap());
        assert_eq!(store.get_facts(&all_n).unwrap().len(), 1);
        assert_eq!(store.stats().unwrap().total_facts(), 1);
    }

    #[test]
    fn test_shared_across_threads() {
        let store = Arc::new(FactStore::open_in_memory().unwrap());
        store.add_type("n", vec![HType::UInt64]).unwrap();

        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let facts: Vec<Fact> = (0..25u64)
                        .map(|i| Fact::new("n", vec![Value::UInt64(t * 100 + i % 10)]))
                        .collect();
                    store.set_facts(&facts).unwrap().inserted
                })
            })
            .collect();

        let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(inserted, 40);
        assert_eq!(store.stats().unwrap().total_facts(), 40);
    }
}
