//! SQLite-backed host record store with a migration ledger.

mod error;
mod filter;
mod insert;
mod migrate;
mod models;
mod open;
mod query;
mod schema;

pub use error::{ErrorKind, Result, StoreError};
pub use filter::{build_where_clause, WhereClause};
pub use migrate::{applied_labels, Migration, Migrator, LEDGER_TABLE};
pub use models::{KvColumn, UpsertOutcome};
pub use open::Db;
pub use schema::{default_migrations, MIG_0001_HOSTS, MIG_0002_MODIFIED_IDX};
