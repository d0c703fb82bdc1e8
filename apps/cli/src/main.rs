//! Copyforge CLI: turn product inputs into catalog-ready description copy.
//!
//! Reads one input (document, photo, spreadsheet, identifier, page URL or
//! free text), builds product records with brand-voice copy and writes the
//! catalog CSV.

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
