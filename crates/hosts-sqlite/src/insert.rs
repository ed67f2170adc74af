use crate::error::{audit, is_unique_violation, Result, StoreError};
use crate::models::{now_ms, KvColumn, UpsertOutcome};
use crate::query::{find_host, find_host_by_name, host_by_id, IP_ADDR_SQL};
use crate::Db;
use hostreg_core::{Host, HostRecord, KvMap};
use rusqlite::params;
use tracing::info;

impl Db {
    /// Insert a new host. Fails with `Conflict` when the name is taken.
    pub fn create_host(&self, rec: &HostRecord) -> Result<Host> {
        let res = self.create_host_inner(rec);
        audit("create", &rec.name, &res);
        res
    }

    fn create_host_inner(&self, rec: &HostRecord) -> Result<Host> {
        let w = rec.validate()?;
        let tx = self.conn.unchecked_transaction()?;
        let id: i64 = tx
            .query_row(
                "INSERT INTO hosts (name, package, image, type, ip, tags, vars, modified_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) RETURNING id",
                params![w.name, w.package, w.image, w.kind, w.ip, w.tags.to_column()?, w.vars.to_column()?, now_ms()],
                |r| r.get(0),
            )
            .map_err(|e| if is_unique_violation(&e) { StoreError::Conflict(w.name.clone()) } else { e.into() })?;
        let host = host_by_id(&tx, id)?;
        tx.commit()?;
        Ok(host)
    }

    /// Merge `rec` into the existing host of the same name.
    ///
    /// Tags and vars are merged key by key; blank `package`/`image`/`type`
    /// keep their stored value. Fails with `NotFound` when no host has this
    /// name, which [`Db::ensure_host`] uses to fall back to creation.
    pub fn update_host(&self, rec: &HostRecord) -> Result<Host> {
        let res = self.update_host_inner(rec);
        audit("update", &rec.name, &res);
        res
    }

    fn update_host_inner(&self, rec: &HostRecord) -> Result<Host> {
        let w = rec.validate()?;
        let tx = self.conn.unchecked_transaction()?;
        let existing = find_host_by_name(&tx, &w.name)?.ok_or_else(|| StoreError::NotFound(w.name.clone()))?;
        let tags = existing.tags.merged(&w.tags);
        let vars = existing.vars.merged(&w.vars);
        tx.execute(
            "UPDATE hosts
             SET package = COALESCE(?2, package), image = COALESCE(?3, image), type = COALESCE(?4, type),
                 ip = ?5, tags = ?6, vars = ?7, modified_ms = MAX(modified_ms, ?8)
             WHERE id = ?1",
            params![existing.id, w.package, w.image, w.kind, w.ip, tags.to_column()?, vars.to_column()?, now_ms()],
        )?;
        let host = host_by_id(&tx, existing.id)?;
        tx.commit()?;
        Ok(host)
    }

    /// Update the host if it exists, otherwise create it.
    pub fn ensure_host(&self, rec: &HostRecord) -> Result<UpsertOutcome> {
        match self.update_host(rec) {
            Ok(h) => Ok(UpsertOutcome::Updated(h)),
            Err(StoreError::NotFound(_)) => {
                info!(host = %rec.name, "no such host to update, creating instead");
                self.create_host(rec).map(UpsertOutcome::Created)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove the host that [`Db::read_host`] would resolve `identifier` to.
    pub fn delete_host(&self, identifier: &str) -> Result<()> {
        let sql = format!(
            "DELETE FROM hosts WHERE id = (SELECT id FROM hosts WHERE name = ?1 OR {IP_ADDR_SQL} = ?1 \
             ORDER BY (name = ?1) DESC, modified_ms DESC, id DESC LIMIT 1)"
        );
        let res = match self.conn.execute(&sql, [identifier]) {
            Ok(0) => Err(StoreError::NotFound(identifier.to_string())),
            Ok(_) => Ok(()),
            Err(e) => Err(e.into()),
        };
        audit("delete", identifier, &res);
        res
    }

    pub fn update_var(&self, identifier: &str, key: &str, value: &str) -> Result<()> {
        self.write_kv(KvColumn::Vars, identifier, "update_var", |m| {
            m.insert(key, value);
        })
    }

    pub fn update_tag(&self, identifier: &str, key: &str, value: &str) -> Result<()> {
        self.write_kv(KvColumn::Tags, identifier, "update_tag", |m| {
            m.insert(key, value);
        })
    }

    /// Remove one var. A key that is already absent is not an error.
    pub fn delete_var(&self, identifier: &str, key: &str) -> Result<()> {
        self.write_kv(KvColumn::Vars, identifier, "delete_var", |m| {
            m.remove(key);
        })
    }

    /// Remove one tag. A key that is already absent is not an error.
    pub fn delete_tag(&self, identifier: &str, key: &str) -> Result<()> {
        self.write_kv(KvColumn::Tags, identifier, "delete_tag", |m| {
            m.remove(key);
        })
    }

    fn write_kv(&self, column: KvColumn, identifier: &str, op: &'static str, edit: impl FnOnce(&mut KvMap)) -> Result<()> {
        let res = (|| -> Result<()> {
            let tx = self.conn.unchecked_transaction()?;
            let host = find_host(&tx, identifier)?.ok_or_else(|| StoreError::NotFound(identifier.to_string()))?;
            let mut map = match column {
                KvColumn::Tags => host.tags,
                KvColumn::Vars => host.vars,
            };
            edit(&mut map);
            let sql = format!(
                "UPDATE hosts SET {col} = ?2, modified_ms = MAX(modified_ms, ?3) WHERE id = ?1",
                col = column.column()
            );
            tx.execute(&sql, params![host.id, map.to_column()?, now_ms()])?;
            tx.commit()?;
            Ok(())
        })();
        audit(op, identifier, &res);
        res
    }
}
