//! orgscan CLI: resumable web-search classification of organizations.
//!
//! Reads organizations from a CSV file or Google Sheet, searches the web for
//! each one, and writes a TRUE/FALSE verdict plus an evidence link back into
//! the same table.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // Load .env before parsing so clap's env fallbacks can see it.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
    commands::run(cli).await
}
