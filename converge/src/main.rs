//! Operator CLI for identifiers and configuration.
//!
//! Encodes and decodes resource identifiers the way the orchestrator persists
//! them, and manages `converge.toml`.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use converge::core::id::{ExternalId, MalformedIdentifier};
use converge::exit_codes;
use converge::io::config::{self, ConvergeConfig};
use converge::logging;
use converge::resources::ResourceKind;

#[derive(Parser)]
#[command(
    name = "converge",
    version,
    about = "State-convergence engine for asynchronous remote resources"
)]
struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = config::DEFAULT_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode and decode resource identifiers.
    Id {
        #[command(subcommand)]
        command: IdCommand,
    },
    /// Create or check the config file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum IdCommand {
    /// Join key parts into an identifier.
    Encode {
        #[arg(long)]
        kind: ResourceKind,
        /// Key parts in layout order.
        #[arg(required = true)]
        parts: Vec<String>,
    },
    /// Split an identifier into key parts (printed as JSON).
    Decode {
        #[arg(long)]
        kind: ResourceKind,
        id: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Load and validate the config file.
    Check,
}

#[derive(Serialize)]
struct Decoded<'a> {
    kind: ResourceKind,
    layout: String,
    parts: &'a [String],
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        let code = if err.downcast_ref::<MalformedIdentifier>().is_some() {
            exit_codes::MALFORMED
        } else {
            exit_codes::INVALID
        };
        std::process::exit(code);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Id { command } => match command {
            IdCommand::Encode { kind, parts } => cmd_id_encode(kind, &parts),
            IdCommand::Decode { kind, id } => cmd_id_decode(kind, &ExternalId::new(id)),
        },
        Command::Config { command } => match command {
            ConfigCommand::Init { force } => cmd_config_init(&cli.config, force),
            ConfigCommand::Check => cmd_config_check(&cli.config),
        },
    }
}

fn cmd_id_encode(kind: ResourceKind, parts: &[String]) -> Result<()> {
    let layout = kind.id_layout();
    let id = layout.encode(parts);
    // A part containing the separator encodes fine but cannot be decoded back.
    let decoded = layout.decode(&id)?;
    if decoded != parts {
        return Err(MalformedIdentifier {
            id: id.to_string(),
            expected: layout.template(),
        }
        .into());
    }
    println!("{id}");
    Ok(())
}

fn cmd_id_decode(kind: ResourceKind, id: &ExternalId) -> Result<()> {
    let layout = kind.id_layout();
    let parts = layout.decode(id)?;
    let decoded = Decoded {
        kind,
        layout: layout.template(),
        parts: &parts,
    };
    println!("{}", serde_json::to_string(&decoded)?);
    Ok(())
}

fn cmd_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    config::write_config(path, &ConvergeConfig::default())?;
    println!("wrote {}", path.display());
    Ok(())
}

fn cmd_config_check(path: &Path) -> Result<()> {
    config::load_config(path)?;
    println!("ok");
    Ok(())
}
