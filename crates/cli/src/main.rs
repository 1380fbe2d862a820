use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use fleetstock_core::UserId;
use fleetstock_infra::{EngineConfig, InventoryEngine};
use fleetstock_cli::{Script, ScriptRunner};

#[derive(Debug, Parser)]
#[command(name = "fleetstock", about = "Multi-store inventory engine")]
struct Cli {
    /// JSON config file; environment variables are used when omitted.
    #[arg(long, env = "FLEETSTOCK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a JSON operation script and print one result line per operation.
    Run { script: PathBuf },
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            EngineConfig::from_json_str(&raw).context("parsing config")
        }
        None => EngineConfig::from_env().context("reading config from environment"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    fleetstock_observability::init(&config.log_config());

    match cli.command {
        Command::Run { script } => {
            let raw = std::fs::read_to_string(&script)
                .with_context(|| format!("reading script {}", script.display()))?;
            let script: Script = serde_json::from_str(&raw).context("parsing script")?;
            let actor = script.actor.map(UserId::from_uuid).unwrap_or_default();

            let engine = InventoryEngine::new(config);
            let outcomes = ScriptRunner::new(&engine, actor).run(&script.operations);

            let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
            for outcome in &outcomes {
                println!("{}", serde_json::to_string(outcome)?);
            }
            tracing::info!(operations = outcomes.len(), failed, "script finished");
        }
    }

    Ok(())
}
