//! CLI subcommands

pub mod health;
pub mod prioritize;
pub mod rewards;
pub mod status;
