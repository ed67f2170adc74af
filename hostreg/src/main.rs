use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use host_inventory::Inventory;
use hostreg_core::{FilterParams, GroupBy, Host, HostFilter, HostPayload, HostRecord, KvValue, ValueDoc};
use hosts_sqlite::{applied_labels, Db, KvColumn};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

use config::{LogFormat, Overrides, Settings};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json, Jsonl, Csv }

#[derive(Debug, Parser)]
#[command(name = "hostreg", version, about = "Host registry and dynamic inventory")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./hostreg.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database file
    #[arg(long, global = true, env = "HOSTREG_DATABASE")]
    database: Option<PathBuf>,
    /// Debug logging
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Errors only
    #[arg(long, short, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args, Default, Clone)]
struct FilterArgs {
    /// Name prefix (case-sensitive)
    #[arg(long)]
    name: Option<String>,
    /// `env` tag value (case-insensitive)
    #[arg(long)]
    env: Option<String>,
    /// `team` tag value (case-insensitive)
    #[arg(long)]
    team: Option<String>,
    /// Modified at or after this RFC 3339 timestamp
    #[arg(long)]
    since: Option<String>,
    /// Modified strictly before this RFC 3339 timestamp
    #[arg(long)]
    before: Option<String>,
}

impl FilterArgs {
    fn to_filter(&self) -> HostFilter {
        HostFilter::from_params(&FilterParams {
            name: self.name.clone(),
            env: self.env.clone(),
            team: self.team.clone(),
            since: self.since.clone(),
            before: self.before.clone(),
        })
    }
}

#[derive(Debug, Subcommand)]
enum HostCmd {
    /// Print one host by name or address
    Get {
        identifier: String,
        /// Print the host's collapsed tags and vars instead
        #[arg(long)]
        vars_only: bool,
    },
    /// Create or update a host
    Put {
        /// JSON host document, bare or wrapped in {"host": ...}; `-` reads stdin
        #[arg(long, conflicts_with_all = ["name", "ip"])]
        file: Option<PathBuf>,
        #[arg(long, required_unless_present = "file")]
        name: Option<String>,
        #[arg(long, required_unless_present = "file")]
        ip: Option<String>,
        #[arg(long)]
        package: Option<String>,
        #[arg(long)]
        image: Option<String>,
        #[arg(long = "type")]
        kind: Option<String>,
        /// key=value, repeatable
        #[arg(long = "tag", value_parser = parse_pair)]
        tags: Vec<(String, String)>,
        /// key=value, repeatable
        #[arg(long = "var", value_parser = parse_pair)]
        vars: Vec<(String, String)>,
    },
    /// Delete one host by name or address
    Delete { identifier: String },
    /// List hosts matching the filters
    List {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Subcommand)]
enum KeyCmd {
    Get { host: String, key: String },
    Set { host: String, key: String, value: String },
    Delete { host: String, key: String },
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version
    Version,
    /// Apply pending schema migrations
    Migrate,
    /// Dynamic inventory document
    Inventory {
        /// Full document including `_meta.hostvars`
        #[arg(long)]
        list: bool,
        /// Collapsed vars of one host
        #[arg(long, conflicts_with = "list")]
        host: Option<String>,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        exclude_vars: bool,
        #[arg(long, value_parser = parse_group_by)]
        group_by: Option<GroupBy>,
        #[arg(long)]
        pretty: bool,
    },
    /// Host records
    Host {
        #[command(subcommand)]
        cmd: HostCmd,
    },
    /// Single tags on a host
    Tag {
        #[command(subcommand)]
        cmd: KeyCmd,
    },
    /// Single vars on a host
    Var {
        #[command(subcommand)]
        cmd: KeyCmd,
    },
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got {s:?}")),
    }
}

fn parse_group_by(s: &str) -> Result<GroupBy, String> {
    match s.to_ascii_lowercase().as_str() {
        "name" => Ok(GroupBy::Name),
        "ip" => Ok(GroupBy::Ip),
        _ => Err(format!("expected name or ip, got {s:?}")),
    }
}

/// `RUST_LOG` wins over the configured level. Logs go to stderr; stdout carries
/// the documents.
fn init_logging(settings: &Settings) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    match settings.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().flatten_event(true).with_current_span(false).with_writer(io::stderr))
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(io::stderr))
            .init(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;
    let settings = Settings::resolve(
        cfg,
        &Overrides { database: cli.database.clone(), verbose: cli.verbose, quiet: cli.quiet },
    );
    init_logging(&settings);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run(cli.command, &settings, &mut out)
}

fn run(command: Commands, settings: &Settings, out: &mut impl Write) -> Result<()> {
    if let Commands::Version = command {
        writeln!(out, "hostreg {} (core {})", env!("CARGO_PKG_VERSION"), hostreg_core::version())?;
        return Ok(());
    }

    let db = Db::open(&settings.database)
        .with_context(|| format!("opening {}", settings.database.display()))?;
    let applied = db.ensure_schema().context("ensuring schema")?;
    debug!(database = %settings.database.display(), applied, "schema ready");

    match command {
        Commands::Version => {}
        Commands::Migrate => {
            writeln!(out, "applied {applied} migration(s)")?;
            for label in applied_labels(&db.conn)? {
                writeln!(out, "{label}")?;
            }
        }
        Commands::Inventory { list, host, filter, exclude_vars, group_by, pretty } => {
            if let Some(id) = host {
                emit_json(out, &db.read_host_vars(&id)?, pretty)?;
            } else {
                let mut opts = settings.inventory;
                if let Some(g) = group_by {
                    opts.group_by = g;
                }
                opts.exclude_vars |= exclude_vars || !list;
                let hosts = db.read_all_hosts(&filter.to_filter())?;
                let inv = Inventory::from_hosts(&hosts, &opts);
                emit_json(out, &inv, pretty)?;
            }
        }
        Commands::Host { cmd } => run_host(&db, cmd, out)?,
        Commands::Tag { cmd } => run_key(&db, KvColumn::Tags, cmd, out)?,
        Commands::Var { cmd } => run_key(&db, KvColumn::Vars, cmd, out)?,
    }
    Ok(())
}

fn run_host(db: &Db, cmd: HostCmd, out: &mut impl Write) -> Result<()> {
    match cmd {
        HostCmd::Get { identifier, vars_only } => {
            if vars_only {
                emit_json(out, &db.read_host_vars(&identifier)?, true)?;
            } else {
                let host = db.read_host(&identifier)?;
                emit_json(out, &HostPayload { host: host.to_record() }, true)?;
            }
        }
        HostCmd::Put { file, name, ip, package, image, kind, tags, vars } => {
            let rec = match file {
                Some(path) => read_record(&path)?,
                None => {
                    let mut rec = HostRecord::new(name.unwrap_or_default(), ip.unwrap_or_default());
                    rec.package = package;
                    rec.image = image;
                    rec.kind = kind;
                    rec.tags = tags.into_iter().map(|(k, v)| (k, KvValue::from(v))).collect();
                    rec.vars = vars.into_iter().map(|(k, v)| (k, KvValue::from(v))).collect();
                    rec
                }
            };
            let outcome = db.ensure_host(&rec)?;
            info!(host = %outcome.host().name, created = outcome.created(), "host stored");
            emit_json(out, &HostPayload { host: outcome.into_host().to_record() }, true)?;
        }
        HostCmd::Delete { identifier } => db.delete_host(&identifier)?,
        HostCmd::List { filter, format } => {
            let hosts = db.read_all_hosts(&filter.to_filter())?;
            write_hosts(out, &hosts, format)?;
        }
    }
    Ok(())
}

fn run_key(db: &Db, column: KvColumn, cmd: KeyCmd, out: &mut impl Write) -> Result<()> {
    match (column, cmd) {
        (KvColumn::Tags, KeyCmd::Get { host, key }) => emit_json(out, &ValueDoc { value: db.read_tag(&host, &key)? }, false),
        (KvColumn::Vars, KeyCmd::Get { host, key }) => emit_json(out, &ValueDoc { value: db.read_var(&host, &key)? }, false),
        (KvColumn::Tags, KeyCmd::Set { host, key, value }) => Ok(db.update_tag(&host, &key, &value)?),
        (KvColumn::Vars, KeyCmd::Set { host, key, value }) => Ok(db.update_var(&host, &key, &value)?),
        (KvColumn::Tags, KeyCmd::Delete { host, key }) => Ok(db.delete_tag(&host, &key)?),
        (KvColumn::Vars, KeyCmd::Delete { host, key }) => Ok(db.delete_var(&host, &key)?),
    }
}

fn read_record(path: &Path) -> Result<HostRecord> {
    let s = if path == Path::new("-") {
        let mut s = String::new();
        io::stdin().read_to_string(&mut s)?;
        s
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    parse_record(&s)
}

fn parse_record(s: &str) -> Result<HostRecord> {
    if let Ok(payload) = serde_json::from_str::<HostPayload>(s) {
        return Ok(payload.host);
    }
    serde_json::from_str::<HostRecord>(s).context("parsing host document")
}

fn emit_json<T: Serialize>(out: &mut impl Write, value: &T, pretty: bool) -> Result<()> {
    let s = if pretty { serde_json::to_string_pretty(value)? } else { serde_json::to_string(value)? };
    writeln!(out, "{s}")?;
    Ok(())
}

fn format_modified(host: &Host) -> Result<String> {
    host.modified.format(&Rfc3339).with_context(|| format!("formatting modified of {}", host.name))
}

fn write_hosts(out: &mut impl Write, hosts: &[Host], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for h in hosts {
                writeln!(out, "{}\t{}\t{}\t{}", h.name, h.ip, h.kind.as_deref().unwrap_or("-"), h.tags)?;
            }
        }
        OutputFormat::Json => {
            let records: Vec<HostRecord> = hosts.iter().map(Host::to_record).collect();
            emit_json(out, &records, true)?;
        }
        OutputFormat::Jsonl => {
            for h in hosts {
                emit_json(out, &h.to_record(), false)?;
            }
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(out);
            wtr.write_record(["id", "name", "ip", "package", "image", "type", "tags", "vars", "modified"])?;
            for h in hosts {
                wtr.write_record([
                    h.id.to_string(),
                    h.name.clone(),
                    h.ip.clone(),
                    h.package.clone().unwrap_or_default(),
                    h.image.clone().unwrap_or_default(),
                    h.kind.clone().unwrap_or_default(),
                    h.tags.to_column()?,
                    h.vars.to_column()?,
                    format_modified(h)?,
                ])?;
            }
            wtr.flush()?;
        }
    }
    Ok(())
}
