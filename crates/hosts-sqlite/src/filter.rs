//! Translate a [`HostFilter`] into a SQL predicate with positional binds.
//!
//! Filters are evaluated in a fixed order (name, env, team, since, before) and
//! each active one adds exactly one `?N` parameter.

use crate::models::to_ms_ceil;
use crate::open::UNICODE_LOWER;
use hostreg_core::HostFilter;
use rusqlite::types::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    /// Either empty or a string starting with `" WHERE "`.
    pub sql: String,
    pub binds: Vec<Value>,
}

impl WhereClause {
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Case-insensitive containment of `tags[key] = ?N`. `key` is always a literal
/// chosen here, never caller input. Both sides fold with the same Unicode
/// lowercasing; binds must already be `str::to_lowercase`d.
fn tag_equals(key: &str, n: usize) -> String {
    format!(
        "EXISTS (SELECT 1 FROM json_each(hosts.tags) t \
         WHERE {UNICODE_LOWER}(t.key) = '{key}' AND {UNICODE_LOWER}(t.value) = ?{n})"
    )
}

pub fn build_where_clause(hf: &HostFilter) -> WhereClause {
    let mut parts: Vec<String> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();

    if let Some(name) = &hf.name {
        binds.push(Value::Text(name.clone()));
        parts.push(format!("instr(name, ?{}) = 1", binds.len()));
    }
    if let Some(env) = &hf.env {
        binds.push(Value::Text(env.to_lowercase()));
        parts.push(tag_equals("env", binds.len()));
    }
    if let Some(team) = &hf.team {
        binds.push(Value::Text(team.to_lowercase()));
        parts.push(tag_equals("team", binds.len()));
    }
    // Rows hold whole milliseconds, so rounding both bounds up keeps
    // `>= since` and `< before` exact for sub-millisecond bounds.
    if let Some(since) = hf.since {
        binds.push(Value::Integer(to_ms_ceil(since)));
        parts.push(format!("modified_ms >= ?{}", binds.len()));
    }
    if let Some(before) = hf.before {
        binds.push(Value::Integer(to_ms_ceil(before)));
        parts.push(format!("modified_ms < ?{}", binds.len()));
    }

    if parts.is_empty() {
        return WhereClause::default();
    }
    WhereClause { sql: format!(" WHERE {}", parts.join(" AND ")), binds }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::OffsetDateTime;

    #[test]
    fn empty_filter_matches_everything() {
        let wc = build_where_clause(&HostFilter::default());
        assert!(wc.is_empty());
        assert!(wc.binds.is_empty());
    }

    #[test]
    fn binds_follow_evaluation_order() {
        let hf = HostFilter::default()
            .with_before(datetime!(2014-09-01 0:00 UTC))
            .with_team("Infra")
            .with_name("web")
            .with_since(datetime!(2014-08-01 0:00 UTC))
            .with_env("PROD");
        let wc = build_where_clause(&hf);
        assert_eq!(
            wc.binds,
            vec![
                Value::Text("web".into()),
                Value::Text("prod".into()),
                Value::Text("infra".into()),
                Value::Integer(1_406_851_200_000),
                Value::Integer(1_409_529_600_000),
            ]
        );
        assert!(wc.sql.starts_with(" WHERE instr(name, ?1) = 1 AND "));
        assert!(wc.sql.contains("unicode_lower(t.key) = 'env' AND unicode_lower(t.value) = ?2"));
        assert!(wc.sql.contains("unicode_lower(t.key) = 'team' AND unicode_lower(t.value) = ?3"));
        assert!(wc.sql.ends_with("modified_ms >= ?4 AND modified_ms < ?5"));
    }

    #[test]
    fn tag_binds_fold_unicode() {
        let wc = build_where_clause(&HostFilter::default().with_team("ÉQUIPE"));
        assert_eq!(wc.binds, vec![Value::Text("équipe".into())]);
    }

    #[test]
    fn sub_millisecond_bounds_round_up() {
        let at = OffsetDateTime::from_unix_timestamp_nanos(1_000_500_000).unwrap();
        let wc = build_where_clause(&HostFilter::default().with_since(at).with_before(at));
        assert_eq!(wc.binds, vec![Value::Integer(1001), Value::Integer(1001)]);
    }

    #[test]
    fn single_filter_numbers_from_one() {
        let wc = build_where_clause(&HostFilter::default().with_team("infra"));
        assert_eq!(wc.binds.len(), 1);
        assert!(wc.sql.contains("?1"));
        assert!(!wc.sql.contains(" AND modified"));
    }
}
