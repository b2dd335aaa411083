//! Database schema definitions

use super::BoundMask;
use super::codec;
use crate::types::Predicate;

/// SQL to create the signature catalog
pub const CREATE_PREDICATES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS predicates (
    pred_name TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    type TEXT NOT NULL,
    PRIMARY KEY (pred_name, ordinal)
)
"#;

pub const INSERT_PREDICATE_ARG: &str =
    "INSERT INTO predicates (pred_name, ordinal, type) VALUES (?1, ?2, ?3)";

pub const SELECT_PREDICATES: &str =
    "SELECT pred_name, type FROM predicates ORDER BY pred_name, ordinal";

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![CREATE_PREDICATES_TABLE]
}

/// Table holding the facts of one predicate
pub fn fact_table(predicate: &Predicate) -> String {
    format!("fact_{}", predicate.name)
}

fn column_list(predicate: &Predicate) -> String {
    (0..predicate.arity())
        .map(|i| format!("arg{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `CREATE TABLE` for a predicate, unique over the full value tuple
pub fn create_fact_table(predicate: &Predicate) -> String {
    let columns = predicate
        .types
        .iter()
        .enumerate()
        .map(|(i, ty)| format!("arg{} {} NOT NULL", i, codec::column_type(ty)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}, UNIQUE ({}))",
        fact_table(predicate),
        columns,
        column_list(predicate)
    )
}

/// Insert that silently skips rows already present.
///
/// Only the uniqueness conflict is tolerated; other constraint failures
/// still raise.
pub fn insert_fact(predicate: &Predicate) -> String {
    let placeholders = (1..=predicate.arity())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
        fact_table(predicate),
        column_list(predicate),
        placeholders
    )
}

/// Select of all columns with equality on the bound positions, in
/// ascending position order.
pub fn select_facts(predicate: &Predicate, mask: BoundMask) -> String {
    let conditions: Vec<String> = (0..predicate.arity())
        .filter(|&i| mask.is_bound(i))
        .enumerate()
        .map(|(param, i)| format!("arg{} = ?{}", i, param + 1))
        .collect();

    let mut sql = format!(
        "SELECT {} FROM {}",
        column_list(predicate),
        fact_table(predicate)
    );
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql
}

pub fn count_facts(predicate: &Predicate) -> String {
    format!("SELECT COUNT(*) FROM {}", fact_table(predicate))
}
