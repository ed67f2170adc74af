//! Dynamic-inventory document built from host records.
//!
//! Hosts are folded into groups (group name -> member identifiers) plus a
//! `_meta.hostvars` block. Both live behind one lock so several workers can
//! populate the same inventory.

use hostreg_core::{GroupBy, Host, KvMap};
use regex::Regex;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, warn};

/// Reserved top-level key holding the metadata block.
pub const META_KEY: &str = hostreg_core::RESERVED_NAME;

fn group_name_unsafe() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9-]+").expect("static regex"))
}

/// Replace every run of characters outside `[A-Za-z0-9-]` with a single `_`.
pub fn sanitize_group_name(name: &str) -> String {
    group_name_unsafe().replace_all(name, "_").into_owned()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventoryOptions {
    /// Attribute used as the member identifier and hostvars key.
    pub group_by: GroupBy,
    /// Leave `_meta.hostvars` empty.
    pub exclude_vars: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub hostvars: BTreeMap<String, KvMap>,
}

impl Meta {
    pub fn add_hostvar(&mut self, host: &str, key: &str, value: &str) {
        self.hostvars.entry(host.to_string()).or_default().insert(key, value);
    }
}

#[derive(Debug, Default)]
struct State {
    groups: BTreeMap<String, Vec<String>>,
    meta: Meta,
}

#[derive(Debug, Default)]
pub struct Inventory {
    state: Mutex<State>,
}

impl Inventory {
    pub fn new() -> Self {
        Inventory::default()
    }

    /// Fold `hosts` in order.
    pub fn from_hosts(hosts: &[Host], opts: &InventoryOptions) -> Self {
        let inv = Inventory::new();
        for host in hosts {
            inv.add_host(host, opts);
        }
        debug!(hosts = hosts.len(), groups = inv.group_count(), "built inventory");
        inv
    }

    /// Fold `hosts` with up to `workers` threads sharing this inventory.
    /// Group membership matches [`Inventory::from_hosts`]; member order within a
    /// group follows whichever worker appended first.
    pub fn from_hosts_concurrent(hosts: &[Host], opts: &InventoryOptions, workers: usize) -> Self {
        let inv = Inventory::new();
        if hosts.is_empty() {
            return inv;
        }
        let chunk = hosts.len().div_ceil(workers.max(1));
        std::thread::scope(|s| {
            for part in hosts.chunks(chunk) {
                let inv = &inv;
                s.spawn(move || {
                    for host in part {
                        inv.add_host(host, opts);
                    }
                });
            }
        });
        debug!(hosts = hosts.len(), groups = inv.group_count(), workers, "built inventory concurrently");
        inv
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add one host: its self-group, `type_<type>`, one `tag_<key>_<value>` per
    /// non-empty tag, and its collapsed vars unless excluded.
    pub fn add_host(&self, host: &Host, opts: &InventoryOptions) {
        let id = host.identifier(opts.group_by);
        self.add_host_to_group_unsanitized(id, id);

        if let Some(kind) = host.kind.as_deref().filter(|k| !k.is_empty()) {
            self.add_host_to_group(&format!("type_{}", kind.to_lowercase()), id);
        }
        for (key, value) in host.tags.iter() {
            if key.is_empty() || value.is_empty() {
                continue;
            }
            self.add_host_to_group(&format!("tag_{}_{}", key.to_lowercase(), value.to_lowercase()), id);
        }

        if !opts.exclude_vars {
            let vars = host.collapsed_vars();
            let mut state = self.lock();
            state.meta.hostvars.entry(id.to_string()).or_default().merge(&vars);
        }
    }

    /// Append `member` to the sanitized form of `group`.
    pub fn add_host_to_group(&self, group: &str, member: &str) {
        self.add_host_to_group_unsanitized(&sanitize_group_name(group), member);
    }

    /// Append `member` to `group` as given. Duplicates are kept.
    pub fn add_host_to_group_unsanitized(&self, group: &str, member: &str) {
        if group == META_KEY {
            warn!(member, group, "dropping member of the reserved group name");
            return;
        }
        self.lock().groups.entry(group.to_string()).or_default().push(member.to_string());
    }

    pub fn add_hostvar(&self, host: &str, key: &str, value: &str) {
        self.lock().meta.add_hostvar(host, key, value);
    }

    pub fn group(&self, name: &str) -> Option<Vec<String>> {
        self.lock().groups.get(name).cloned()
    }

    pub fn group_count(&self) -> usize {
        self.lock().groups.len()
    }

    pub fn hostvars(&self, host: &str) -> Option<KvMap> {
        self.lock().meta.hostvars.get(host).cloned()
    }

    pub fn groups(&self) -> BTreeMap<String, Vec<String>> {
        self.lock().groups.clone()
    }

    pub fn meta(&self) -> Meta {
        self.lock().meta.clone()
    }

    pub fn into_parts(self) -> (BTreeMap<String, Vec<String>>, Meta) {
        let state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        (state.groups, state.meta)
    }
}

impl Clone for Inventory {
    fn clone(&self) -> Self {
        let state = self.lock();
        Inventory { state: Mutex::new(State { groups: state.groups.clone(), meta: state.meta.clone() }) }
    }
}

impl PartialEq for Inventory {
    fn eq(&self, other: &Self) -> bool {
        self.groups() == other.groups() && self.meta() == other.meta()
    }
}

impl Serialize for Inventory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let state = self.lock();
        let mut map = serializer.serialize_map(Some(state.groups.len() + 1))?;
        for (group, members) in &state.groups {
            map.serialize_entry(group, members)?;
        }
        map.serialize_entry(META_KEY, &state.meta)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Inventory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut state = State::default();
        for (key, value) in raw {
            if key == META_KEY {
                state.meta = serde_json::from_value(value).map_err(D::Error::custom)?;
                continue;
            }
            match serde_json::from_value::<Vec<String>>(value) {
                Ok(members) => state.groups.entry(key).or_default().extend(members),
                Err(err) => debug!(group = %key, error = %err, "skipping group that is not a string array"),
            }
        }
        Ok(Inventory { state: Mutex::new(state) })
    }
}
