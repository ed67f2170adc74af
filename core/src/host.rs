use crate::error::HostError;
use crate::kv::{KvMap, RawKvMap};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use time::OffsetDateTime;

pub type HostId = i64;

/// Name taken by the metadata block of an inventory document.
pub const RESERVED_NAME: &str = "_meta";

/// A stored host. `tags` and `vars` are always present, possibly empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub id: HostId,
    pub name: String,
    pub ip: String,
    pub package: Option<String>,
    pub image: Option<String>,
    pub kind: Option<String>,
    pub tags: KvMap,
    pub vars: KvMap,
    pub modified: OffsetDateTime,
}

impl Host {
    /// Tags and vars folded into one map; vars win on key collision.
    pub fn collapsed_vars(&self) -> KvMap {
        self.tags.clone().merged(&self.vars)
    }

    /// Address part of `ip`, without any `/prefix`.
    pub fn address(&self) -> &str {
        address_part(&self.ip)
    }

    /// Identifier used for this host in an inventory document.
    pub fn identifier(&self, by: GroupBy) -> &str {
        match by {
            GroupBy::Name => &self.name,
            GroupBy::Ip => self.address(),
        }
    }

    pub fn to_record(&self) -> HostRecord {
        HostRecord {
            id: Some(self.id),
            name: self.name.clone(),
            ip: self.ip.clone(),
            package: self.package.clone(),
            image: self.image.clone(),
            kind: self.kind.clone(),
            tags: self.tags.decode(),
            vars: self.vars.decode(),
            modified: Some(self.modified),
        }
    }
}

/// Strip an optional `/prefix` from an inet-style address.
pub fn address_part(ip: &str) -> &str {
    ip.split_once('/').map(|(addr, _)| addr).unwrap_or(ip)
}

/// Host as it travels on the wire. `id` and `modified` are server-assigned and
/// ignored on input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<HostId>,
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub tags: RawKvMap,
    #[serde(default)]
    pub vars: RawKvMap,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub modified: Option<OffsetDateTime>,
}

/// Validated write: what the store actually persists from a [`HostRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostWrite {
    pub name: String,
    pub ip: String,
    pub package: Option<String>,
    pub image: Option<String>,
    pub kind: Option<String>,
    pub tags: KvMap,
    pub vars: KvMap,
}

impl HostRecord {
    pub fn new(name: impl Into<String>, ip: impl Into<String>) -> Self {
        HostRecord { name: name.into(), ip: ip.into(), ..Default::default() }
    }

    /// Check the record and canonicalize its maps. Blank classification fields
    /// become `None`, which the store reads as "leave unchanged".
    pub fn validate(&self) -> Result<HostWrite, HostError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(HostError::EmptyName);
        }
        if name.contains('/') {
            return Err(HostError::InvalidName(name.to_string()));
        }
        if name == RESERVED_NAME {
            return Err(HostError::ReservedName(name.to_string()));
        }
        let ip = self.ip.trim();
        if ip.is_empty() {
            return Err(HostError::MissingIp { name: name.to_string() });
        }
        let ip = normalize_ip(ip).ok_or_else(|| HostError::InvalidIp { name: name.to_string(), ip: ip.to_string() })?;
        Ok(HostWrite {
            name: name.to_string(),
            ip,
            package: non_blank(&self.package),
            image: non_blank(&self.image),
            kind: non_blank(&self.kind),
            tags: KvMap::encode(self.tags.clone()),
            vars: KvMap::encode(self.vars.clone()),
        })
    }
}

fn non_blank(v: &Option<String>) -> Option<String> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn normalize_ip(ip: &str) -> Option<String> {
    if let Ok(addr) = ip.parse::<IpAddr>() {
        return Some(addr.to_string());
    }
    ip.parse::<IpNet>().ok().map(|net| net.to_string())
}

/// `{"host": {...}}` envelope used for single-host documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostPayload {
    pub host: HostRecord,
}

/// `{"value": "..."}` document for one tag or one var.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueDoc {
    pub value: String,
}

/// Which host attribute names members of an inventory document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Name,
    Ip,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn host() -> Host {
        Host {
            id: 7,
            name: "web1.example.com".into(),
            ip: "10.0.0.5/24".into(),
            package: None,
            image: None,
            kind: Some("virtualmachine".into()),
            tags: [("team", "infra"), ("memory", "256")].into_iter().collect(),
            vars: [("memory", "512")].into_iter().collect(),
            modified: datetime!(2014-08-01 19:18:12 UTC),
        }
    }

    #[test]
    fn collapsed_vars_prefer_vars() {
        let vars = host().collapsed_vars();
        assert_eq!(vars.get("memory"), Some("512"));
        assert_eq!(vars.get("team"), Some("infra"));
    }

    #[test]
    fn identifier_follows_group_by() {
        let h = host();
        assert_eq!(h.identifier(GroupBy::Name), "web1.example.com");
        assert_eq!(h.identifier(GroupBy::Ip), "10.0.0.5");
    }

    #[test]
    fn record_parses_wire_shape() {
        let rec: HostRecord = serde_json::from_str(
            r#"{"id": 99, "name": "web1.example.com", "ip": "10.0.0.5", "type": "virtualmachine",
                "tags": {"team": "infra"}, "vars": {"memory": 512}}"#,
        )
        .unwrap();
        let w = rec.validate().unwrap();
        assert_eq!(w.kind.as_deref(), Some("virtualmachine"));
        assert_eq!(w.vars.get("memory"), Some("512"));
        assert_eq!(w.package, None);
    }

    #[test]
    fn validate_rejects_bad_input() {
        assert_eq!(HostRecord::new("", "10.0.0.1").validate(), Err(HostError::EmptyName));
        assert!(matches!(HostRecord::new("a/b", "10.0.0.1").validate(), Err(HostError::InvalidName(_))));
        assert_eq!(
            HostRecord::new(" _meta ", "10.0.0.1").validate(),
            Err(HostError::ReservedName("_meta".into()))
        );
        assert!(matches!(HostRecord::new("a", "").validate(), Err(HostError::MissingIp { .. })));
        assert!(matches!(HostRecord::new("a", "not-an-ip").validate(), Err(HostError::InvalidIp { .. })));
    }

    #[test]
    fn validate_accepts_networks_and_blanks_classification() {
        let mut rec = HostRecord::new("db1", "10.1.0.9/16");
        rec.package = Some("  ".into());
        let w = rec.validate().unwrap();
        assert_eq!(w.ip, "10.1.0.9/16");
        assert_eq!(w.package, None);
    }

    #[test]
    fn record_round_trips_through_host() {
        let rec = host().to_record();
        let json = serde_json::to_string(&HostPayload { host: rec.clone() }).unwrap();
        assert!(json.contains(r#""type":"virtualmachine""#));
        assert!(json.contains(r#""modified":"2014-08-01T19:18:12Z""#));
        let back: HostPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, rec);
    }
}
