use clap::Parser;
use std::path::PathBuf;

use super::commands::Commands;
use super::output::OutputFormat;
use crate::config::LogFormat;

/// PagePilot - goal-driven web automation
#[derive(Parser, Debug)]
#[command(name = "pagepilot", author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (overrides the configured one; RUST_LOG wins over both)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Log line format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}
