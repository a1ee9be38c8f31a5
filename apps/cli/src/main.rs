//! Clipvault CLI — feed-to-sink media ingestion pipeline.
//!
//! Watches a content feed, downloads new items, splits them into
//! fixed-duration chunks, uploads the chunks to a destination sink,
//! and records results in a durable git-backed catalog.

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
