//! harvest CLI: crawls a recipe site's monthly archive into a local database.
//!
//! Walks every archive month, extracts each article's embedded recipe data,
//! and stores normalized recipes with their ordered ingredients.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
