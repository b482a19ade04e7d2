use std::path::PathBuf;

use clap::{Args, Subcommand};

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Drive a page toward a goal with a planner
    Run(RunArgs),

    /// Print the actionable-element snapshot of a page as JSON
    Capture(CaptureArgs),

    /// Perform a single action on a page
    Perform(PerformArgs),

    /// Check that the browser and the planner service respond
    Ping(PingArgs),
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// What the session should accomplish
    #[arg(long)]
    pub goal: String,

    /// Page to start from
    #[arg(long)]
    pub url: String,

    /// Planner service base URL
    #[arg(long, conflicts_with = "script")]
    pub planner_url: Option<String>,

    /// Replay plans from a YAML file instead of calling the planner service
    #[arg(long, value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Step cap for this session
    #[arg(long)]
    pub max_steps: Option<u32>,
}

#[derive(Args, Clone, Debug)]
pub struct CaptureArgs {
    #[arg(long)]
    pub url: String,

    /// Shadow-root and frame boundaries traversal may cross
    #[arg(long)]
    pub max_depth: Option<usize>,
}

#[derive(Args, Clone, Debug)]
pub struct PerformArgs {
    #[arg(long)]
    pub url: String,

    /// Action descriptor as JSON, e.g. '{"type":"click","target_uid":"login"}'
    #[arg(long)]
    pub action: String,
}

#[derive(Args, Clone, Debug)]
pub struct PingArgs {
    /// Planner service base URL
    #[arg(long)]
    pub planner_url: Option<String>,

    /// Skip the browser check
    #[arg(long)]
    pub planner_only: bool,
}
