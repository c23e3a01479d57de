use anyhow::Result;
use clap::Parser;
use kb_agents::cli;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    cli::run(args).await
}
