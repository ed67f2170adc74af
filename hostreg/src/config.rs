use anyhow::{Context, Result};
use host_inventory::InventoryOptions;
use hostreg_core::GroupBy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG: &str = "hostreg.yaml";
pub const DEFAULT_DATABASE: &str = "hostreg.db";

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct InventoryConfig {
    pub group_by: Option<GroupBy>,
    pub exclude_vars: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct LogConfig {
    pub level: Option<String>,
    pub format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub database: Option<PathBuf>,
    pub inventory: Option<InventoryConfig>,
    pub log: Option<LogConfig>,
}

/// Load `path`, or `./hostreg.yaml` when no path is given and that file exists.
pub fn load_config(path: Option<&Path>) -> Result<Option<Config>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG);
            if p.exists() { p.to_path_buf() } else { return Ok(None); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("reading config {}", path.display()))?;
    let cfg = serde_yaml::from_str(&s).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(Some(cfg))
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub verbose: bool,
    pub quiet: bool,
}

/// Resolved settings, built once in `main` and handed to every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database: PathBuf,
    pub inventory: InventoryOptions,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Settings {
    pub fn resolve(cfg: Option<Config>, ov: &Overrides) -> Self {
        let cfg = cfg.unwrap_or_default();
        let inv = cfg.inventory.unwrap_or_default();
        let log = cfg.log.unwrap_or_default();
        let log_level = if ov.verbose {
            "debug".to_string()
        } else if ov.quiet {
            "error".to_string()
        } else {
            log.level.unwrap_or_else(|| "info".to_string())
        };
        Settings {
            database: ov.database.clone().or(cfg.database).unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            inventory: InventoryOptions {
                group_by: inv.group_by.unwrap_or_default(),
                exclude_vars: inv.exclude_vars.unwrap_or(false),
            },
            log_level,
            log_format: log.format.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_config() {
        let s = Settings::resolve(None, &Overrides::default());
        assert_eq!(s.database, PathBuf::from(DEFAULT_DATABASE));
        assert_eq!(s.inventory.group_by, GroupBy::Name);
        assert!(!s.inventory.exclude_vars);
        assert_eq!(s.log_level, "info");
        assert_eq!(s.log_format, LogFormat::Text);
    }

    #[test]
    fn file_values_apply_and_flags_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostreg.yaml");
        fs::write(
            &path,
            "database: /var/lib/hostreg/hosts.db\ninventory:\n  group_by: ip\n  exclude_vars: true\nlog:\n  level: warn\n  format: json\n",
        )
        .unwrap();
        let cfg = load_config(Some(&path)).unwrap();

        let s = Settings::resolve(cfg.clone(), &Overrides::default());
        assert_eq!(s.database, PathBuf::from("/var/lib/hostreg/hosts.db"));
        assert_eq!(s.inventory.group_by, GroupBy::Ip);
        assert!(s.inventory.exclude_vars);
        assert_eq!(s.log_level, "warn");
        assert_eq!(s.log_format, LogFormat::Json);

        let ov = Overrides { database: Some(PathBuf::from("other.db")), verbose: true, quiet: false };
        let s = Settings::resolve(cfg, &ov);
        assert_eq!(s.database, PathBuf::from("other.db"));
        assert_eq!(s.log_level, "debug");
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "inventory:\n  group_by: [nope\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
