use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use lister::channel;
use lister::config::Config;
use lister::logging;
use lister::state::{FileStateStore, StateStore};

#[derive(Parser)]
#[command(name = "lister")]
#[command(about = "Automated listing submission for multi-step posting wizards")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the effective configuration to .lister/config.toml
    Init,

    /// Show the persisted run status
    Status,

    /// Clear the persisted run state
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;

    // No subcommand = channel mode; stdout belongs to the protocol there
    let is_channel_mode = cli.command.is_none();

    let logging_handle = logging::init_logging(&config, is_channel_mode, cli.debug)?;

    match cli.command {
        Some(Commands::Init) => {
            config.save()?;
            println!("Wrote {}", Config::local_config_path().display());
        }
        Some(Commands::Status) => {
            cmd_status(&config)?;
        }
        Some(Commands::Reset) => {
            cmd_reset(&config)?;
        }
        None => {
            channel::run_channel(config).await?;
            if let Some(log_path) = logging_handle.log_file_path {
                if log_path.exists() {
                    eprintln!("Session log: {}", log_path.display());
                }
            }
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<dyn StateStore>> {
    Ok(Arc::new(FileStateStore::new(config.state_path())?))
}

fn cmd_status(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    match store.load()? {
        Some(record) => {
            println!("run:      {}", record.run_id);
            println!("phase:    {}", record.workflow_phase);
            println!("attempts: {}", record.attempt_count);
            if let Some(host) = &record.posting_host {
                println!("host:     {host}");
            }
            if record.completion_flags.is_empty() {
                println!("flags:    (none)");
            } else {
                println!("flags:");
                for (name, value) in &record.completion_flags {
                    println!("  {name}: {value}");
                }
            }
        }
        None => {
            println!("No run in progress.");
        }
    }
    Ok(())
}

fn cmd_reset(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    store.clear()?;
    println!("Run state cleared.");
    Ok(())
}
