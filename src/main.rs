use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    pagepilot_cli::cli::run().await
}
