use crate::error::StoreError;
use hostreg_core::{Host, KvMap};
use rusqlite::types::Type;
use rusqlite::Row;
use time::OffsetDateTime;

pub(crate) const HOST_COLUMNS: &str = "id, name, ip, package, image, type, tags, vars, modified_ms";

/// Result of [`Db::ensure_host`](crate::Db::ensure_host).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(Host),
    Updated(Host),
}

impl UpsertOutcome {
    pub fn host(&self) -> &Host {
        match self {
            UpsertOutcome::Created(h) | UpsertOutcome::Updated(h) => h,
        }
    }

    pub fn into_host(self) -> Host {
        match self {
            UpsertOutcome::Created(h) | UpsertOutcome::Updated(h) => h,
        }
    }

    pub fn created(&self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }
}

/// One of the two key-value columns of a host row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvColumn {
    Tags,
    Vars,
}

impl KvColumn {
    pub(crate) fn column(self) -> &'static str {
        match self {
            KvColumn::Tags => "tags",
            KvColumn::Vars => "vars",
        }
    }

    pub(crate) fn missing(self, host: &str, key: &str) -> StoreError {
        let (host, key) = (host.to_string(), key.to_string());
        match self {
            KvColumn::Tags => StoreError::NoSuchTag { host, key },
            KvColumn::Vars => StoreError::NoSuchVar { host, key },
        }
    }
}

pub(crate) fn row_to_host(r: &Row<'_>) -> rusqlite::Result<Host> {
    Ok(Host {
        id: r.get(0)?,
        name: r.get(1)?,
        ip: r.get(2)?,
        package: r.get(3)?,
        image: r.get(4)?,
        kind: r.get(5)?,
        tags: kv_column(r, 6)?,
        vars: kv_column(r, 7)?,
        modified: from_ms(r.get(8)?).map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Integer, Box::new(e)))?,
    })
}

fn kv_column(r: &Row<'_>, idx: usize) -> rusqlite::Result<KvMap> {
    let raw: Option<String> = r.get(idx)?;
    KvMap::from_column(raw.as_deref()).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn now_ms() -> i64 {
    to_ms(OffsetDateTime::now_utc())
}

pub(crate) fn to_ms(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Milliseconds since the epoch, rounded up when `ts` falls between two.
pub(crate) fn to_ms_ceil(ts: OffsetDateTime) -> i64 {
    let ns = ts.unix_timestamp_nanos();
    (ns.div_euclid(1_000_000) + i128::from(ns.rem_euclid(1_000_000) != 0)) as i64
}

pub(crate) fn from_ms(ms: i64) -> Result<OffsetDateTime, time::error::ComponentRange> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
}
