use anyhow::Result;

use super::capture::cmd_capture;
use super::perform::cmd_perform;
use super::ping::cmd_ping;
use super::run::cmd_run;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use crate::cli::env::CliArgs;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx).await,
        Commands::Capture(args) => cmd_capture(args, ctx).await,
        Commands::Perform(args) => cmd_perform(args, ctx).await,
        Commands::Ping(args) => cmd_ping(args, ctx).await,
    }
}
