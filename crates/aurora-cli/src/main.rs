use anyhow::{Context, Result};
use aurora_core::AuroraConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "aurora", version, about = "Intent-based network configuration")]
struct Cli {
    /// Configuration file (aurora.yaml). Defaults apply when omitted.
    #[arg(long, global = true, env = "AURORA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process an intent end to end against a lab network and print the response as JSON.
    Process {
        /// Intent text.
        #[arg(long, conflicts_with = "text_file")]
        text: Option<String>,

        /// Read the intent text from a file.
        #[arg(long)]
        text_file: Option<PathBuf>,

        /// Device inventory (YAML). Falls back to `inventory_file` from the config.
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// Lab network description (YAML) providing device schemas and channels.
        #[arg(long)]
        lab: PathBuf,

        /// Deploy without waiting for approval when risk allows it.
        #[arg(long, default_value_t = false)]
        approve: bool,

        /// Approve a held deployment immediately as this operator.
        #[arg(long = "approve-as")]
        approve_as: Option<String>,
    },

    /// Validate one payload file for a vendor without running the pipeline.
    Validate {
        /// Vendor whose dialect the payload is written in (cisco, juniper, nokia, arista).
        #[arg(long)]
        vendor: String,

        /// Payload format (markup, structured-data, command-lines).
        #[arg(long)]
        format: String,

        /// Payload file.
        #[arg(long)]
        file: PathBuf,

        /// Device name reported in findings.
        #[arg(long, default_value = "device")]
        device: String,
    },

    /// Show recorded deployment attempts.
    History {
        /// Only attempts for this service.
        #[arg(long)]
        service: Option<String>,

        /// Only attempts that ended in this state (e.g. DEPLOYED, ROLLED_BACK).
        #[arg(long)]
        state: Option<String>,

        /// Maximum number of records.
        #[arg(long)]
        limit: Option<usize>,

        /// Print full records as JSON instead of one line each.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AuroraConfig::load_with_context(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => AuroraConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Process {
            text,
            text_file,
            inventory,
            lab,
            approve,
            approve_as,
        } => {
            let args = commands::process::ProcessArgs {
                text,
                text_file,
                inventory,
                lab,
                approve,
                approve_as,
            };
            commands::process::run(&config, args).await?
        }
        Command::Validate {
            vendor,
            format,
            file,
            device,
        } => commands::validate::run(&vendor, &format, &file, &device)?,
        Command::History {
            service,
            state,
            limit,
            json,
        } => commands::history::run(&config, service, state.as_deref(), limit, json).await?,
    }

    Ok(())
}
