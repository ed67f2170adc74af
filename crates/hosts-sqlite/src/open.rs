use crate::error::Result;
use crate::migrate::{Migration, Migrator};
use crate::schema::default_migrations;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::time::Duration;
use tracing::info;

pub struct Db {
    pub conn: Connection,
}

impl Db {
    /// Open a database file without touching its schema.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        apply_pragmas(&conn, true)?;
        Ok(Db { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn, false)?;
        Ok(Db { conn })
    }

    /// Open (creating if needed) and bring the schema up to date.
    pub fn open_or_create(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = Db::open(path)?;
        db.ensure_schema()?;
        Ok(db)
    }

    /// Apply the default migration units.
    pub fn ensure_schema(&self) -> Result<usize> {
        self.ensure_schema_with(default_migrations())
    }

    pub fn ensure_schema_with(&self, units: impl IntoIterator<Item = Migration>) -> Result<usize> {
        let ran = Migrator::new(units).ensure_schema(&self.conn)?;
        if ran > 0 {
            info!(units = ran, "schema migrated");
        }
        Ok(ran)
    }
}

fn apply_pragmas(conn: &Connection, on_disk: bool) -> Result<()> {
    if on_disk {
        let _mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
    }
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    register_functions(conn)?;
    Ok(())
}

/// SQL function lowercasing text the way `str::to_lowercase` does. SQLite's
/// builtin `lower()` folds ASCII only. Non-text arguments yield NULL.
pub(crate) const UNICODE_LOWER: &str = "unicode_lower";

fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        UNICODE_LOWER,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            Ok(match ctx.get_raw(0) {
                ValueRef::Text(t) => Some(String::from_utf8_lossy(t).to_lowercase()),
                _ => None,
            })
        },
    )
}
