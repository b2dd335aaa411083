//! SQLite storage implementation

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params, params_from_iter};
use tracing::{debug, info};

use super::{BoundMask, FactBackend, codec, schema};
use crate::{Error, Result};
use crate::config::FactStoreConfig;
use crate::types::{HType, Predicate, Value};

/// SQLite-backed fact storage.
///
/// Owns one connection. Query text is generated once per predicate (inserts)
/// and once per (predicate, bound positions) shape (selects); the prepared
/// statements themselves live in the connection's statement cache.
pub struct SqliteBackend {
    conn: Connection,
    insert_sql: HashMap<String, String>,
    select_sql: HashMap<String, HashMap<BoundMask, String>>,
}

impl SqliteBackend {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_config(path, &FactStoreConfig::default())
    }

    /// Open a database file with explicit tuning
    pub fn open_with_config(path: &Path, config: &FactStoreConfig) -> Result<Self> {
        info!(path = %path.display(), "Opening fact database");
        let conn = Connection::open(path)?;
        Self::from_connection(conn, config)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, &FactStoreConfig::default())
    }

    fn from_connection(conn: Connection, config: &FactStoreConfig) -> Result<Self> {
        conn.set_prepared_statement_cache_capacity(config.statement_cache_capacity);
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        let backend = Self {
            conn,
            insert_sql: HashMap::new(),
            select_sql: HashMap::new(),
        };
        backend.initialize_schema()?;
        Ok(backend)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    fn encode_all<'a>(values: impl Iterator<Item = &'a Value>) -> Result<Vec<SqlValue>> {
        values.map(codec::encode).collect()
    }

    fn decode_row(row: &rusqlite::Row, types: &[HType]) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(types.len());
        for (i, ty) in types.iter().enumerate() {
            let raw: SqlValue = row.get(i)?;
            values.push(codec::decode(raw, ty)?);
        }
        Ok(values)
    }
}

impl FactBackend for SqliteBackend {
    fn ensure_schema(&mut self, predicate: &Predicate) -> Result<()> {
        self.conn.execute(&schema::create_fact_table(predicate), [])?;
        self.insert_sql
            .entry(predicate.name.clone())
            .or_insert_with(|| schema::insert_fact(predicate));
        Ok(())
    }

    fn insert(&mut self, predicate: &Predicate, values: &[Value]) -> Result<bool> {
        let sql = self
            .insert_sql
            .entry(predicate.name.clone())
            .or_insert_with(|| schema::insert_fact(predicate));

        let params = Self::encode_all(values.iter())?;
        let mut stmt = self.conn.prepare_cached(sql)?;
        let changed = stmt.execute(params_from_iter(params.iter()))?;
        Ok(changed > 0)
    }

    fn select(&mut self, predicate: &Predicate, bound: &[Option<Value>]) -> Result<Vec<Vec<Value>>> {
        if bound.len() != predicate.arity() {
            return Err(Error::ArityMismatch {
                predicate: predicate.name.clone(),
                expected: predicate.arity(),
                found: bound.len(),
            });
        }
        let mask = BoundMask::from_bound(bound);
        let shapes = self.select_sql.entry(predicate.name.clone()).or_default();
        let sql = shapes.entry(mask).or_insert_with(|| {
            debug!(predicate = %predicate.name, bound = mask.count(), "Preparing new select shape");
            schema::select_facts(predicate, mask)
        });

        let params = Self::encode_all(bound.iter().flatten())?;
        let mut stmt = self.conn.prepare_cached(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(Self::decode_row(row, &predicate.types)?);
        }
        Ok(results)
    }

    fn record_predicate(&mut self, predicate: &Predicate) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(schema::INSERT_PREDICATE_ARG)?;
        for (ordinal, ty) in predicate.types.iter().enumerate() {
            stmt.execute(params![predicate.name, ordinal as i64, ty.to_string()])?;
        }
        Ok(())
    }

    fn load_predicates(&mut self) -> Result<Vec<Predicate>> {
        let mut stmt = self.conn.prepare(schema::SELECT_PREDICATES)?;
        let entries = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut predicates: Vec<Predicate> = Vec::new();
        for (name, type_str) in entries {
            let ty: HType = type_str.parse()?;
            match predicates.last_mut() {
                Some(last) if last.name == name => last.types.push(ty),
                _ => predicates.push(Predicate::new(name, vec![ty])),
            }
        }

        for predicate in &predicates {
            self.insert_sql
                .entry(predicate.name.clone())
                .or_insert_with(|| schema::insert_fact(predicate));
        }
        Ok(predicates)
    }

    fn count(&mut self, predicate: &Predicate) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(&schema::count_facts(predicate), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn cached_shapes(&self) -> usize {
        self.select_sql.values().map(HashMap::len).sum()
    }

    fn begin(&mut self) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", [])?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute("COMMIT", [])?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn.execute("ROLLBACK", [])?;
        Ok(())
    }
}
