//! DRL Scheduler CLI
//!
//! A command-line tool for inspecting the learning agent, reward history
//! and health of a running DRL scheduler.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{health, prioritize, rewards, status};

/// DRL Scheduler CLI
#[derive(Parser)]
#[command(name = "drlctl")]
#[command(author, version, about = "CLI for the DRL Scheduler", long_about = None)]
pub struct Cli {
    /// Scheduler API URL (can also be set via DRL_API_URL env var)
    #[arg(long, env = "DRL_API_URL", default_value = "http://localhost:8888")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the agent's learning state
    Status,

    /// Show recorded rewards per service and role
    Rewards {
        /// Filter by service name
        #[arg(long, short)]
        service: Option<String>,

        /// Filter by role name
        #[arg(long, short)]
        role: Option<String>,
    },

    /// Show scheduler health and readiness
    Health,

    /// Score candidate nodes for a pod (recorded as a real decision)
    Prioritize {
        /// Pod name
        pod: String,

        /// Candidate node names
        #[arg(required = true)]
        nodes: Vec<String>,

        /// Pod namespace
        #[arg(long, short, default_value = "default")]
        namespace: String,

        /// Value of the pod's servicename label
        #[arg(long)]
        service: String,

        /// Value of the pod's rolename label
        #[arg(long)]
        role: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Status => status::show_status(&client, cli.format).await?,
        Commands::Rewards { service, role } => {
            rewards::show_rewards(&client, service, role, cli.format).await?;
        }
        Commands::Health => health::show_health(&client, cli.format).await?,
        Commands::Prioritize {
            pod,
            nodes,
            namespace,
            service,
            role,
        } => {
            let args = prioritize::PrioritizeArgs {
                pod,
                namespace,
                service,
                role,
                nodes,
            };
            prioritize::prioritize(&client, args, cli.format).await?;
        }
    }

    Ok(())
}
