//! supctl - command-line client for the cluster supervisor
//!
//! Reads cluster health, edge target scores, published pages and the
//! supervisor's own health from its status API.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{edges, health, pages, status};
use output::OutputFormat;

/// Cluster Supervisor CLI
#[derive(Parser)]
#[command(name = "supctl")]
#[command(author, version, about = "CLI for the Cluster Supervisor", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via SUPCTL_API_URL env var)
    #[arg(long, env = "SUPCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format (defaults to the configured format, then table)
    #[arg(long, short)]
    pub format: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the latest cluster health snapshot
    Status {
        /// Also list every workload
        #[arg(long, short)]
        workloads: bool,

        /// List only workloads that are not running
        #[arg(long)]
        failing: bool,
    },

    /// List edge targets with reliability, latency and weight
    Edges {
        /// Show only deactivated targets
        #[arg(long)]
        inactive: bool,
    },

    /// List the static pages currently published to the edge
    Pages,

    /// Show the supervisor's own liveness and readiness
    Health,

    /// Manage local CLI configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the stored configuration
    Show,

    /// Update the stored configuration
    Set {
        /// Default API endpoint URL
        #[arg(long)]
        api_url: Option<String>,

        /// Default output format
        #[arg(long)]
        default_format: Option<OutputFormat>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let stored = config::Config::load()?;

    let format = cli
        .format
        .or_else(|| {
            stored
                .default_format
                .as_deref()
                .and_then(OutputFormat::from_config)
        })
        .unwrap_or_default();

    match cli.command {
        Commands::Status { workloads, failing } => {
            let client = api_client(&stored, cli.api_url.as_deref())?;
            status::show_status(&client, workloads, failing, format).await?;
        }
        Commands::Edges { inactive } => {
            let client = api_client(&stored, cli.api_url.as_deref())?;
            edges::list_targets(&client, inactive, format).await?;
        }
        Commands::Pages => {
            let client = api_client(&stored, cli.api_url.as_deref())?;
            pages::list_pages(&client, format).await?;
        }
        Commands::Health => {
            let client = api_client(&stored, cli.api_url.as_deref())?;
            health::show_health(&client, format).await?;
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Show => commands::config::show_config(&stored, format)?,
            ConfigCommands::Set {
                api_url,
                default_format,
            } => commands::config::set_config(stored, api_url, default_format)?,
        },
    }

    Ok(())
}

fn api_client(stored: &config::Config, flag: Option<&str>) -> Result<client::ApiClient> {
    client::ApiClient::new(&stored.resolve_api_url(flag))
}
