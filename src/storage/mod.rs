//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - predicates(pred_name, ordinal, type) - the signature catalog
//! - fact_<name>(arg0, .., argN) - one table per predicate, unique over all columns

pub mod codec;
pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteBackend;

use crate::Result;
use crate::registry::MAX_ARITY;
use crate::types::{Predicate, Value};

/// Bitset of which argument positions a select constrains.
///
/// Together with the predicate name it identifies one cached query shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BoundMask(u64);

impl BoundMask {
    /// Mask with a bit set for every `Some` position.
    ///
    /// `bound` must be no longer than `MAX_ARITY`; backends check it against
    /// the predicate's arity before building a mask.
    pub fn from_bound(bound: &[Option<Value>]) -> Self {
        debug_assert!(bound.len() <= MAX_ARITY, "bound slice wider than MAX_ARITY");
        let bits = bound
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_some())
            .fold(0u64, |acc, (i, _)| acc | (1 << i));
        Self(bits)
    }

    pub fn is_bound(&self, position: usize) -> bool {
        position < 64 && self.0 & (1 << position) != 0
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }
}

/// Persistence interface consumed by the fact store and the join engine.
///
/// Implementations own their connection state; callers serialize access.
pub trait FactBackend: Send {
    /// Create storage for a predicate if it does not exist yet
    fn ensure_schema(&mut self, predicate: &Predicate) -> Result<()>;

    /// Deduplicating insert. Returns true if a new row was stored.
    fn insert(&mut self, predicate: &Predicate, values: &[Value]) -> Result<bool>;

    /// Every stored row whose `Some` positions equal the given values.
    /// `bound` has one entry per argument position.
    fn select(&mut self, predicate: &Predicate, bound: &[Option<Value>]) -> Result<Vec<Vec<Value>>>;

    /// Persist a signature in the catalog
    fn record_predicate(&mut self, predicate: &Predicate) -> Result<()>;

    /// Read every signature back from the catalog
    fn load_predicates(&mut self) -> Result<Vec<Predicate>>;

    /// Number of facts stored for a predicate
    fn count(&mut self, predicate: &Predicate) -> Result<usize>;

    /// Number of distinct select shapes prepared so far
    fn cached_shapes(&self) -> usize;

    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_mask() {
        let bound = vec![Some(Value::from("a")), None, Some(Value::from(1u64))];
        let mask = BoundMask::from_bound(&bound);
        assert!(mask.is_bound(0));
        assert!(!mask.is_bound(1));
        assert!(mask.is_bound(2));
        assert!(!mask.is_bound(70));
        assert_eq!(mask.count(), 2);
        assert_eq!(BoundMask::from_bound(&[None, None]), BoundMask::default());
    }
}
