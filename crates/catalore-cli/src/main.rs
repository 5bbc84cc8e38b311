//! Catalore CLI
//!
//! Two commands over one data tree:
//! - `catalore ingest`: OCR every PDF under `<data_dir>/pdf_catalogs/`, write
//!   extracted text, images, and the price-list CSV, and upsert embedded
//!   chunks into the vector store.
//! - `catalore chat`: interactive question answering grounded in the store.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod chat;
mod config;
mod ingest;

#[derive(Parser)]
#[command(name = "catalore")]
#[command(author, version, about = "Catalore: catalog ingestion and retrieval chat")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest catalog PDFs into the vector store and structured exports.
    Ingest,
    /// Chat over the ingested catalogs.
    Chat,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::Config::from_env()?;

    match cli.command {
        Commands::Ingest => ingest::run(&cfg),
        Commands::Chat => chat::run(&cfg),
    }
}
