//! Reward history per service and role

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, RewardSummary};
use crate::output::{color_reward, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct RewardRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Decisions")]
    count: usize,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Last")]
    last: String,
}

/// Keep summaries matching the optional service and role filters
pub fn filter_summaries(
    summaries: Vec<RewardSummary>,
    service: Option<&str>,
    role: Option<&str>,
) -> Vec<RewardSummary> {
    summaries
        .into_iter()
        .filter(|s| service.map_or(true, |wanted| s.service == wanted))
        .filter(|s| role.map_or(true, |wanted| s.role == wanted))
        .collect()
}

/// Show recorded rewards
pub async fn show_rewards(
    client: &ApiClient,
    service: Option<String>,
    role: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let summaries: Vec<RewardSummary> = client.get("debug/rewards").await?;
    let summaries = filter_summaries(summaries, service.as_deref(), role.as_deref());

    match format {
        OutputFormat::Json => print_json(&summaries)?,
        OutputFormat::Table => {
            let total: usize = summaries.iter().map(|s| s.count).sum();
            let rows = summaries
                .into_iter()
                .map(|s| RewardRow {
                    service: s.service,
                    role: s.role,
                    count: s.count,
                    mean: format!("{:.4}", s.mean),
                    last: color_reward(s.last),
                })
                .collect::<Vec<_>>();
            let keys = rows.len();
            print_table(rows);
            if keys > 0 {
                println!("\nTotal: {} decisions across {} service roles", total, keys);
            }
        }
    }

    Ok(())
}
