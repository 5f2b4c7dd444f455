//! Agent learning state

use anyhow::Result;
use colored::Colorize;

use crate::client::{AgentStatus, ApiClient};
use crate::output::{format_epsilon, format_occupancy, print_heading, print_json, OutputFormat};

/// Show the agent's exploration, replay memory and weight versions
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: AgentStatus = client.get("debug/agent").await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            print_heading("Agent Status");
            println!("Learning Target:        {}", status.learning_target.cyan());
            println!("Epsilon:                {}", format_epsilon(status.epsilon));
            println!("Learning Steps:         {}", status.steps);
            println!();
            println!("{}", "Replay Memory".bold());
            println!("{}", "-".repeat(50));
            println!(
                "Occupancy:              {}",
                format_occupancy(status.memory_len, status.memory_capacity)
            );
            println!("Batch Size:             {}", status.batch_size);
            println!(
                "Pending Decision:       {}",
                if status.pending_decision { "yes" } else { "no" }
            );
            println!();
            println!("{}", "Value Functions".bold());
            println!("{}", "-".repeat(50));
            println!("Online Version:         {}", status.online_version);
            println!("Target Version:         {}", status.target_version);
            println!(
                "Target Sync Interval:   every {} steps",
                status.target_sync_interval
            );
            println!("Reward Keys:            {}", status.reward_keys);
        }
    }

    Ok(())
}
