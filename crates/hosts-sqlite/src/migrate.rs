//! Migration ledger.
//!
//! Units are applied in ascending label order, each inside its own
//! transaction together with the ledger insert that marks it applied. A unit
//! that fails is rolled back whole and stops the run; it is retried in full on
//! the next call.

use crate::error::{Result, StoreError};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub const LEDGER_TABLE: &str = "schema_migrations";

const CREATE_LEDGER: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (version TEXT PRIMARY KEY NOT NULL)";

/// A labeled batch of schema statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub label: String,
    pub statements: Vec<String>,
}

impl Migration {
    pub fn new<S: AsRef<str>>(label: impl Into<String>, statements: &[S]) -> Self {
        Migration {
            label: label.into(),
            statements: statements.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Migrator {
    units: BTreeMap<String, Vec<String>>,
}

impl Migrator {
    pub fn new(units: impl IntoIterator<Item = Migration>) -> Self {
        let mut map = BTreeMap::new();
        for unit in units {
            if map.contains_key(&unit.label) {
                warn!(label = %unit.label, "duplicate migration label, keeping the last registration");
            }
            map.insert(unit.label, unit.statements);
        }
        Migrator { units: map }
    }

    /// Labels in execution order.
    pub fn labels(&self) -> Vec<&str> {
        self.units.keys().map(String::as_str).collect()
    }

    /// Bring `conn` up to every registered unit. Returns how many units ran.
    pub fn ensure_schema(&self, conn: &Connection) -> Result<usize> {
        conn.execute_batch(CREATE_LEDGER).map_err(|source| StoreError::Migration {
            label: LEDGER_TABLE.to_string(),
            source,
        })?;

        let mut ran = 0;
        for (label, statements) in &self.units {
            let done = is_applied(conn, label).map_err(|source| StoreError::Migration { label: label.clone(), source })?;
            if done {
                debug!(label = %label, "migration already applied");
                continue;
            }
            info!(label = %label, statements = statements.len(), "executing migration");
            apply(conn, label, statements).map_err(|source| {
                warn!(label = %label, error = %source, "migration failed, rolled back");
                StoreError::Migration { label: label.clone(), source }
            })?;
            ran += 1;
        }
        Ok(ran)
    }
}

/// Labels recorded in the ledger, sorted. Empty when the ledger does not exist yet.
pub fn applied_labels(conn: &Connection) -> Result<Vec<String>> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?1",
        [LEDGER_TABLE],
        |r| r.get(0),
    )?;
    if exists == 0 {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let labels = stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(labels)
}

fn is_applied(conn: &Connection, label: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM schema_migrations WHERE version = ?1", [label], |r| r.get(0))?;
    Ok(count > 0)
}

fn apply(conn: &Connection, label: &str, statements: &[String]) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    for sql in statements {
        debug!(label, sql = %sql, "executing migration statement");
        tx.execute_batch(sql)?;
    }
    tx.execute("INSERT INTO schema_migrations (version) VALUES (?1)", params![label])?;
    tx.commit()
}
