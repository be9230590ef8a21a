use anyhow::Result;
use clap::Parser;
use docs_publish::cli::{run, Cli};
use tracing::Level;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let level = if cli.verbose() { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let result = run(cli).await;
    match &result {
        Ok(_) => tracing::info!("CLI completed successfully"),
        Err(e) => tracing::error!(error = %e, "CLI exited with error"),
    }
    result
}
