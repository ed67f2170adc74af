//! Key-value codec for host `tags` and `vars`.
//!
//! Writers may send any JSON scalar as a value. Values are stringified as soon
//! as they cross the boundary, so nothing past [`KvMap`] ever sees a non-string.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A value as received on the wire, before it is canonicalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KvValue {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    Null,
}

impl KvValue {
    /// Canonical text form: numbers and booleans render as their literal, null as "".
    pub fn into_text(self) -> String {
        match self {
            KvValue::Text(s) => s,
            KvValue::Number(n) => n.to_string(),
            KvValue::Bool(b) => b.to_string(),
            KvValue::Null => String::new(),
        }
    }
}

impl From<&str> for KvValue {
    fn from(s: &str) -> Self {
        KvValue::Text(s.to_string())
    }
}

impl From<String> for KvValue {
    fn from(s: String) -> Self {
        KvValue::Text(s)
    }
}

/// Incoming map, as decoded from a wire record.
pub type RawKvMap = BTreeMap<String, KvValue>;

/// Canonical string-to-string map as persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KvMap(BTreeMap<String, String>);

impl KvMap {
    pub fn new() -> Self {
        KvMap(BTreeMap::new())
    }

    /// Encode an incoming map into its canonical form.
    pub fn encode(raw: RawKvMap) -> Self {
        KvMap(raw.into_iter().map(|(k, v)| (k, v.into_text())).collect())
    }

    /// Decode back to the wire shape. Every value comes back as text.
    pub fn decode(&self) -> RawKvMap {
        self.0.iter().map(|(k, v)| (k.clone(), KvValue::Text(v.clone()))).collect()
    }

    /// Additive merge: incoming keys win, existing keys not mentioned are kept.
    pub fn merge(&mut self, incoming: &KvMap) {
        for (k, v) in &incoming.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn merged(mut self, incoming: &KvMap) -> Self {
        self.merge(incoming);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }

    /// Storage form: a JSON object of strings.
    pub fn to_column(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    /// Inverse of [`KvMap::to_column`]. NULL and blank columns read back as empty.
    pub fn from_column(column: Option<&str>) -> Result<Self, serde_json::Error> {
        match column.map(str::trim) {
            None | Some("") => Ok(KvMap::new()),
            Some(s) => serde_json::from_str(s).map(KvMap),
        }
    }
}

impl From<BTreeMap<String, String>> for KvMap {
    fn from(m: BTreeMap<String, String>) -> Self {
        KvMap(m)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KvMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        KvMap(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for KvMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        f.write_str(&parts.join(","))
    }
}
