//! Output formatting utilities

use chrono::{TimeZone, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    println!("{}", Table::new(rows).with(Style::rounded()));
}

/// Print a section heading
pub fn print_heading(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(50));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format an exploration probability as percentage
pub fn format_epsilon(epsilon: f64) -> String {
    format!("{:.1}%", epsilon * 100.0)
}

/// Format a reward, `-` when absent
pub fn format_reward(reward: Option<f64>) -> String {
    reward.map_or_else(|| "-".to_string(), |r| format!("{:.4}", r))
}

/// Format a unix timestamp (seconds)
pub fn format_timestamp(secs: i64) -> String {
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// Format replay memory occupancy
pub fn format_occupancy(len: usize, capacity: usize) -> String {
    if capacity == 0 {
        return len.to_string();
    }
    format!(
        "{}/{} ({:.0}%)",
        len,
        capacity,
        len as f64 / capacity as f64 * 100.0
    )
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ready" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" | "not ready" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color a reward by sign
pub fn color_reward(reward: Option<f64>) -> String {
    let formatted = format_reward(reward);
    match reward {
        Some(r) if r > 0.0 => formatted.green().to_string(),
        Some(r) if r < 0.0 => formatted.red().to_string(),
        _ => formatted,
    }
}
