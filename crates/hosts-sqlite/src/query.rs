use crate::error::{audit, Result, StoreError};
use crate::filter::build_where_clause;
use crate::models::{row_to_host, KvColumn, HOST_COLUMNS};
use crate::Db;
use hostreg_core::{Host, HostFilter, KvMap};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use tracing::debug;

/// Address part of the `ip` column, dropping any `/prefix`.
pub(crate) const IP_ADDR_SQL: &str = "substr(ip, 1, instr(ip || '/', '/') - 1)";

/// Resolve an identifier: exact name first, then address, newest first.
pub(crate) fn find_host(conn: &Connection, identifier: &str) -> rusqlite::Result<Option<Host>> {
    let sql = format!(
        "SELECT {HOST_COLUMNS} FROM hosts WHERE name = ?1 OR {IP_ADDR_SQL} = ?1 \
         ORDER BY (name = ?1) DESC, modified_ms DESC, id DESC LIMIT 1"
    );
    conn.query_row(&sql, [identifier], row_to_host).optional()
}

pub(crate) fn find_host_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<Host>> {
    let sql = format!("SELECT {HOST_COLUMNS} FROM hosts WHERE name = ?1");
    conn.query_row(&sql, [name], row_to_host).optional()
}

pub(crate) fn host_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Host> {
    let sql = format!("SELECT {HOST_COLUMNS} FROM hosts WHERE id = ?1");
    conn.query_row(&sql, [id], row_to_host)
}

impl Db {
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let cnt: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }

    pub fn count_hosts(&self) -> Result<i64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM hosts", [], |r| r.get(0))?)
    }

    /// Look up one host by name, falling back to its address.
    pub fn read_host(&self, identifier: &str) -> Result<Host> {
        let res = find_host(&self.conn, identifier)
            .map_err(StoreError::from)
            .and_then(|h| h.ok_or_else(|| StoreError::NotFound(identifier.to_string())));
        audit("read", identifier, &res);
        res
    }

    /// All hosts matching `hf`, ordered by name.
    pub fn read_all_hosts(&self, hf: &HostFilter) -> Result<Vec<Host>> {
        let wc = build_where_clause(hf);
        let sql = format!("SELECT {HOST_COLUMNS} FROM hosts{} ORDER BY name", wc.sql);
        debug!(filter = ?hf, query = %sql, binds = ?wc.binds, "reading hosts");

        let mut stmt = self.conn.prepare(&sql)?;
        let hosts = stmt
            .query_map(params_from_iter(wc.binds.iter()), row_to_host)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(count = hosts.len(), "returning hosts");
        Ok(hosts)
    }

    /// Tags and vars of one host folded together, vars winning.
    pub fn read_host_vars(&self, identifier: &str) -> Result<KvMap> {
        Ok(self.read_host(identifier)?.collapsed_vars())
    }

    pub fn read_var(&self, identifier: &str, key: &str) -> Result<String> {
        self.read_kv(KvColumn::Vars, identifier, key)
    }

    pub fn read_tag(&self, identifier: &str, key: &str) -> Result<String> {
        self.read_kv(KvColumn::Tags, identifier, key)
    }

    fn read_kv(&self, column: KvColumn, identifier: &str, key: &str) -> Result<String> {
        let host = self.read_host(identifier)?;
        let map = match column {
            KvColumn::Tags => &host.tags,
            KvColumn::Vars => &host.vars,
        };
        map.get(key).map(str::to_string).ok_or_else(|| column.missing(&host.name, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use hostreg_core::{HostRecord, KvValue};
    use time::OffsetDateTime;

    fn db() -> Db {
        let db = Db::open_in_memory().unwrap();
        db.ensure_schema().unwrap();
        db
    }

    fn record(name: &str, ip: &str, tags: &[(&str, &str)]) -> HostRecord {
        let mut rec = HostRecord::new(name, ip);
        rec.tags = tags.iter().map(|(k, v)| (k.to_string(), (*v).into())).collect();
        rec
    }

    fn names(hosts: &[Host]) -> Vec<&str> {
        hosts.iter().map(|h| h.name.as_str()).collect()
    }

    #[test]
    fn table_exists_reports_schema() {
        let db = db();
        assert!(db.table_exists("hosts").unwrap());
        assert!(!db.table_exists("runs").unwrap());
    }

    #[test]
    fn read_host_by_name_then_address() {
        let db = db();
        db.create_host(&record("web1", "10.0.0.5", &[])).unwrap();
        db.create_host(&record("web2", "10.0.0.6/24", &[])).unwrap();
        assert_eq!(db.read_host("web1").unwrap().name, "web1");
        assert_eq!(db.read_host("10.0.0.5").unwrap().name, "web1");
        assert_eq!(db.read_host("10.0.0.6").unwrap().name, "web2");
        assert_eq!(db.read_host("nope").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn name_match_beats_address_match() {
        let db = db();
        db.create_host(&record("10.0.0.9", "10.0.0.1", &[])).unwrap();
        db.create_host(&record("other", "10.0.0.9", &[])).unwrap();
        assert_eq!(db.read_host("10.0.0.9").unwrap().name, "10.0.0.9");
    }

    #[test]
    fn shared_address_resolves_to_most_recent() {
        let db = db();
        db.create_host(&record("old", "10.0.0.7", &[])).unwrap();
        db.create_host(&record("new", "10.0.0.7", &[])).unwrap();
        db.conn.execute("UPDATE hosts SET modified_ms = 1 WHERE name = 'old'", []).unwrap();
        assert_eq!(db.read_host("10.0.0.7").unwrap().name, "new");
    }

    #[test]
    fn name_filter_is_case_sensitive_prefix() {
        let db = db();
        for n in ["web1", "web2", "Web3", "db1"] {
            db.create_host(&record(n, "10.0.0.1", &[])).unwrap();
        }
        let all = db.read_all_hosts(&HostFilter::default()).unwrap();
        let web = db.read_all_hosts(&HostFilter::default().with_name("web")).unwrap();
        assert_eq!(names(&web), vec!["web1", "web2"]);
        assert!(web.iter().all(|h| all.contains(h)));
    }

    #[test]
    fn tag_filters_ignore_case_and_intersect() {
        let db = db();
        db.create_host(&record("a", "10.0.0.1", &[("team", "Infra"), ("env", "prod")])).unwrap();
        db.create_host(&record("b", "10.0.0.2", &[("TEAM", "infra"), ("env", "stage")])).unwrap();
        db.create_host(&record("c", "10.0.0.3", &[("team", "web"), ("Env", "PROD")])).unwrap();

        let infra = db.read_all_hosts(&HostFilter::default().with_team("INFRA")).unwrap();
        assert_eq!(names(&infra), vec!["a", "b"]);
        let prod = db.read_all_hosts(&HostFilter::default().with_env("prod")).unwrap();
        assert_eq!(names(&prod), vec!["a", "c"]);
        let both = db.read_all_hosts(&HostFilter::default().with_team("infra").with_env("prod")).unwrap();
        assert_eq!(names(&both), vec!["a"]);
    }

    #[test]
    fn time_bounds_are_inclusive_then_exclusive() {
        let db = db();
        db.create_host(&record("a", "10.0.0.1", &[])).unwrap();
        db.create_host(&record("b", "10.0.0.2", &[])).unwrap();
        db.conn.execute("UPDATE hosts SET modified_ms = 1000 WHERE name = 'a'", []).unwrap();
        db.conn.execute("UPDATE hosts SET modified_ms = 2000 WHERE name = 'b'", []).unwrap();
        let at = |ms: i64| OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).unwrap();

        let since = db.read_all_hosts(&HostFilter::default().with_since(at(2000))).unwrap();
        assert_eq!(names(&since), vec!["b"]);
        let before = db.read_all_hosts(&HostFilter::default().with_before(at(2000))).unwrap();
        assert_eq!(names(&before), vec!["a"]);
    }

    #[test]
    fn sub_millisecond_bounds_are_exact() {
        let db = db();
        db.create_host(&record("a", "10.0.0.1", &[])).unwrap();
        db.conn.execute("UPDATE hosts SET modified_ms = 1000 WHERE name = 'a'", []).unwrap();
        let half_past = OffsetDateTime::from_unix_timestamp_nanos(1_000_500_000).unwrap();

        assert!(db.read_all_hosts(&HostFilter::default().with_since(half_past)).unwrap().is_empty());
        let before = db.read_all_hosts(&HostFilter::default().with_before(half_past)).unwrap();
        assert_eq!(names(&before), vec!["a"]);
    }

    #[test]
    fn tag_filters_fold_non_ascii() {
        let db = db();
        db.create_host(&record("a", "10.0.0.1", &[("Team", "ÉQUIPE"), ("env", "Straße")])).unwrap();
        db.create_host(&record("b", "10.0.0.2", &[("team", "infra")])).unwrap();

        for team in ["ÉQUIPE", "équipe", "Équipe"] {
            let hosts = db.read_all_hosts(&HostFilter::default().with_team(team)).unwrap();
            assert_eq!(names(&hosts), vec!["a"], "team {team}");
        }
        let env = db.read_all_hosts(&HostFilter::default().with_env("STRASSE")).unwrap();
        assert!(env.is_empty());
        let env = db.read_all_hosts(&HostFilter::default().with_env("straße")).unwrap();
        assert_eq!(names(&env), vec!["a"]);
    }

    #[test]
    fn missing_key_is_distinct_from_missing_host() {
        let db = db();
        let mut rec = record("web1", "10.0.0.5", &[("team", "infra")]);
        rec.vars.insert("memory".into(), KvValue::Number(512.into()));
        db.create_host(&rec).unwrap();

        assert_eq!(db.read_tag("web1", "team").unwrap(), "infra");
        assert_eq!(db.read_var("10.0.0.5", "memory").unwrap(), "512");
        assert_eq!(db.read_tag("web1", "memory").unwrap_err().kind(), ErrorKind::NoSuchTag);
        assert_eq!(db.read_var("web1", "team").unwrap_err().kind(), ErrorKind::NoSuchVar);
        assert_eq!(db.read_var("ghost", "memory").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn host_vars_collapse_tags_and_vars() {
        let db = db();
        let mut rec = record("web1", "10.0.0.5", &[("role", "tag-role"), ("team", "infra")]);
        rec.vars.insert("role".into(), "var-role".into());
        db.create_host(&rec).unwrap();
        let vars = db.read_host_vars("web1").unwrap();
        assert_eq!(vars.get("role"), Some("var-role"));
        assert_eq!(vars.get("team"), Some("infra"));
    }
}
