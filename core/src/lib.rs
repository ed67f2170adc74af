//! Core types shared by the host registry crates.

pub mod error;
pub mod filter;
pub mod host;
pub mod kv;

pub use error::HostError;
pub use filter::{FilterParams, HostFilter};
pub use host::{address_part, GroupBy, Host, HostId, HostPayload, HostRecord, HostWrite, ValueDoc, RESERVED_NAME};
pub use kv::{KvMap, KvValue, RawKvMap};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
