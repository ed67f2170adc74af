use crate::migrate::Migration;

pub const MIG_0001_HOSTS: &str = "2014-08-01T19:18:12";
pub const MIG_0002_MODIFIED_IDX: &str = "2014-08-13T02:11:40";

const HOSTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS hosts (
  id              INTEGER PRIMARY KEY AUTOINCREMENT,
  name            TEXT NOT NULL UNIQUE,
  package         TEXT,
  image           TEXT,
  type            TEXT,
  ip              TEXT NOT NULL,
  tags            TEXT NOT NULL DEFAULT '{}',
  vars            TEXT NOT NULL DEFAULT '{}',
  modified_ms     INTEGER NOT NULL
)"#;

/// The schema units every registry database carries.
pub fn default_migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            MIG_0001_HOSTS,
            &[
                HOSTS_TABLE,
                "CREATE INDEX hosts_package_idx ON hosts (package)",
                "CREATE INDEX hosts_image_idx ON hosts (image)",
                "CREATE INDEX hosts_type_idx ON hosts (type)",
                "CREATE INDEX hosts_ip_idx ON hosts (ip)",
                "CREATE INDEX hosts_tags_idx ON hosts (tags)",
                "CREATE INDEX hosts_vars_idx ON hosts (vars)",
            ],
        ),
        Migration::new(MIG_0002_MODIFIED_IDX, &["CREATE INDEX hosts_modified_idx ON hosts (modified_ms)"]),
    ]
}
