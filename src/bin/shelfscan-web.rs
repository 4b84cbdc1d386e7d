// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Shelfscan Web UI
//!
//! Mobile-friendly web front-end: take or upload a shelf photo, pick a
//! template, read the analysis.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use shelfscan::client::{AnalysisClient, GeminiClient};
use shelfscan::config::{AppConfig, DEFAULT_SETTINGS_PATH};
use shelfscan::session::Session;
use shelfscan::Result;

#[derive(Parser, Debug)]
#[command(name = "shelfscan-web")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Shelfscan Web UI Server")]
struct Args {
    /// Path to settings file
    #[arg(short, long, default_value = DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    /// Host to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Save counters after every analysis
    #[arg(long)]
    autosave: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Shelfscan Web UI v{}", env!("CARGO_PKG_VERSION"));

    // Load settings
    let mut config = AppConfig::load(&args.settings)?;

    // Apply CLI overrides
    if let Some(host) = args.host {
        config.web.host = host;
    }
    if let Some(port) = args.port {
        config.web.port = port;
    }
    if args.autosave {
        config.stats.autosave = true;
    }

    let session = Session::from_config(&config)?;
    info!(
        "Document: {} ({} templates, {} analyses)",
        config.document_path,
        session.document().prompts().len(),
        session.document().total_analyses()
    );

    let client: Arc<dyn AnalysisClient> = Arc::new(GeminiClient::new(&config.engine)?);
    info!("Model: {} via {}", config.engine.model, client.name());

    shelfscan::web::start_server(config, session, client).await
}
