mod cli;

use clap::Parser;

use crate::cli::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    cli::run(args).await
}
