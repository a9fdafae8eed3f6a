//! rods - command-line client for iRODS-style catalog servers
//!
//! Connection settings come from `~/.irods/irods_environment.json` (or
//! `IRODS_ENVIRONMENT_FILE`), `IRODS_*` environment variables and finally
//! the flags below.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use rods_client::{MetaTarget, Session, SessionConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rods")]
#[command(about = "Command-line client for iRODS-style catalog servers")]
#[command(version)]
struct Cli {
    /// Server host
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// User name
    #[arg(short, long)]
    user: Option<String>,

    /// Zone name
    #[arg(short, long)]
    zone: Option<String>,

    /// Password (prefer IRODS_PASSWORD)
    #[arg(long)]
    password: Option<String>,

    /// Per-response timeout in seconds (0 waits indefinitely)
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the server version
    Version,

    /// List the contents of a collection
    LsColl {
        /// Collection path
        path: String,
    },

    /// Show a data object or collection
    Stat {
        /// Logical path
        path: String,
    },

    /// Download a data object
    Get {
        /// Data object path
        path: String,

        /// Local file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a local file as a new data object
    Put {
        /// Local file
        local: PathBuf,

        /// Data object path
        path: String,
    },

    /// Remove a data object
    Rm {
        /// Data object path
        path: String,
    },

    /// Manage attribute-value-unit metadata
    Meta {
        #[command(subcommand)]
        command: MetaCommands,
    },

    /// Run a general query
    Query {
        /// Column names, e.g. COLL_NAME DATA_NAME
        #[arg(required = true)]
        columns: Vec<String>,

        /// Equality condition COLUMN=VALUE (repeatable)
        #[arg(short = 'w', long = "where")]
        conditions: Vec<String>,

        /// Maximum rows
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
pub enum MetaCommands {
    /// List metadata
    Ls {
        /// Target kind: -d, -c, -r or -u
        #[arg(value_parser = parse_target, allow_hyphen_values = true)]
        kind: MetaTarget,

        /// Path or name of the target
        target: String,
    },

    /// Add an AVU
    Add {
        #[arg(value_parser = parse_target, allow_hyphen_values = true)]
        kind: MetaTarget,
        target: String,
        name: String,
        value: String,
        units: Option<String>,
    },

    /// Remove an AVU
    Rm {
        #[arg(value_parser = parse_target, allow_hyphen_values = true)]
        kind: MetaTarget,
        target: String,
        name: String,
        value: String,
        units: Option<String>,
    },

    /// Copy all AVUs from one target to another
    Cp {
        #[arg(value_parser = parse_target, allow_hyphen_values = true)]
        src_kind: MetaTarget,
        #[arg(value_parser = parse_target, allow_hyphen_values = true)]
        dest_kind: MetaTarget,
        src: String,
        dest: String,
    },
}

fn parse_target(s: &str) -> Result<MetaTarget, String> {
    MetaTarget::from_flag(s).ok_or_else(|| format!("unknown target kind {:?} (use -d, -c, -r or -u)", s))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = SessionConfig::from_environment().map_err(|e| {
        eprintln!("{}: {}", "Configuration error".red(), e);
        e
    })?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(user) = cli.user {
        config.user = user;
    }
    if let Some(zone) = cli.zone {
        config.zone = zone;
    }
    if let Some(password) = cli.password {
        config.password = password;
    }
    if let Some(secs) = cli.timeout {
        config.read_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }

    let session = Session::connect(config).await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;

    let result = commands::execute(&session, cli.command).await;
    if let Err(e) = session.disconnect().await {
        tracing::warn!("Disconnect failed: {}", e);
    }

    match result {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
