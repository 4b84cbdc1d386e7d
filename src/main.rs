// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Shelfscan: Retail Shelf Photo Analysis
//!
//! Command-line front-end: analyze a photo, manage prompt templates, and
//! inspect or reset the usage counters.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use shelfscan::client::{AnalysisClient, GeminiClient};
use shelfscan::config::{AppConfig, DEFAULT_SETTINGS_PATH};
use shelfscan::request::ShelfImage;
use shelfscan::session::Session;
use shelfscan::store::QUICK_TEMPLATE;
use shelfscan::{Result, ShelfError};

/// Shelfscan CLI - Retail Shelf Photo Analysis
#[derive(Parser, Debug)]
#[command(name = "shelfscan")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Analyze retail shelf photos with a hosted vision model", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to settings file (JSON format)
    #[arg(short, long, default_value = DEFAULT_SETTINGS_PATH, global = true)]
    settings: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a shelf photo
    Analyze {
        /// JPEG, PNG or WebP image
        image: PathBuf,

        /// Prompt template to use
        #[arg(short, long, default_value = QUICK_TEMPLATE)]
        template: String,

        /// Save the updated counters afterwards
        #[arg(long)]
        save: bool,
    },

    /// Prompt template management
    Prompts {
        #[command(subcommand)]
        action: PromptCommands,
    },

    /// Show usage statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the document to disk (creates it on first run)
    Save,

    /// Reset usage statistics to zero
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Analysis history
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Settings management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Check that the model API is reachable
    Status,
}

#[derive(Subcommand, Debug)]
enum PromptCommands {
    /// List template names
    List,

    /// Print one template
    Show {
        name: String,
    },

    /// Create or replace a template
    Set {
        name: String,

        /// Instruction text sent with the photo
        body: String,
    },

    /// Remove a template
    Remove {
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List recent analyses
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },

    /// Delete the history log
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current settings
    Show,

    /// Generate default settings file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = DEFAULT_SETTINGS_PATH)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load(&cli.settings)?;

    match cli.command {
        Some(Commands::Analyze { image, template, save }) => {
            run_analyze(config, &image, &template, save, &cli.format).await
        }
        Some(Commands::Prompts { action }) => run_prompt_command(config, action),
        Some(Commands::Stats { json }) => {
            run_stats(config, if json { "json" } else { cli.format.as_str() })
        }
        None => run_stats(config, &cli.format),
        Some(Commands::Save) => run_save(config),
        Some(Commands::Reset { yes }) => run_reset(config, yes),
        Some(Commands::History { action }) => run_history_command(config, action, &cli.format),
        Some(Commands::Config { action }) => run_config_command(config, action),
        Some(Commands::Status) => run_status(config).await,
    }
}

/// Analyze one image file
async fn run_analyze(
    config: AppConfig,
    image_path: &Path,
    template: &str,
    save: bool,
    format: &str,
) -> Result<()> {
    let mut session = Session::from_config(&config)?;
    let client = GeminiClient::new(&config.engine)?;

    let image = ShelfImage::open(image_path)?;
    info!("Analyzing {:?} with template '{}'", image_path, template);

    let outcome = session.analyze(&client, template, image).await?;

    if save && !outcome.saved {
        session.save()?;
    } else if let Some(err) = &outcome.save_error {
        warn!("Statistics were not saved: {}", err);
    }
    if let Some(err) = &outcome.history_error {
        warn!("History entry was not written: {}", err);
    }

    let doc = session.document();
    match format {
        "json" => {
            let output = serde_json::json!({
                "image": image_path.to_string_lossy(),
                "template": outcome.template,
                "text": outcome.text,
                "cost": outcome.cost,
                "elapsed_ms": outcome.elapsed.as_millis() as u64,
                "total_analyses": doc.total_analyses(),
                "total_cost": doc.total_cost(),
                "saved": doc.is_saved(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            println!("{}", outcome.text.trim_end());
            println!();
            println!("Cost: ${:.4}  Time: {:.1}s", outcome.cost, outcome.elapsed.as_secs_f64());
            if !doc.is_saved() {
                println!("Counters not saved (use --save)");
            }
        }
    }

    Ok(())
}

/// Run prompt template commands
fn run_prompt_command(config: AppConfig, action: PromptCommands) -> Result<()> {
    let mut session = Session::from_config(&config)?;

    match action {
        PromptCommands::List => {
            for name in session.document().template_names() {
                println!("{}", name);
            }
        }
        PromptCommands::Show { name } => {
            let body = session
                .document()
                .prompt(&name)
                .ok_or_else(|| ShelfError::InvalidTemplate(name.clone()))?;
            println!("{}", body.trim());
        }
        PromptCommands::Set { name, body } => {
            session.update_prompt(&name, &body)?;
            println!("Saved template '{}'", name.trim());
        }
        PromptCommands::Remove { name } => {
            session.remove_prompt(&name)?;
            println!("Removed template '{}'", name);
        }
    }

    Ok(())
}

/// Print usage statistics
fn run_stats(config: AppConfig, format: &str) -> Result<()> {
    let session = Session::from_config(&config)?;
    let doc = session.document();

    match format {
        "json" => {
            let output = serde_json::json!({
                "total_analyses": doc.total_analyses(),
                "total_cost": doc.total_cost(),
                "cost_per_analysis": doc.cost_per_analysis(),
                "templates": doc.template_names(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            println!("Usage Statistics:");
            println!("  Total analyses: {}", doc.total_analyses());
            println!("  Total cost: ${:.3}", doc.total_cost());
            println!("  Cost per analysis: ${:.4}", doc.cost_per_analysis());
            println!("  Templates: {}", doc.template_names().join(", "));
        }
    }

    Ok(())
}

/// Save the current document
fn run_save(config: AppConfig) -> Result<()> {
    let mut session = Session::from_config(&config)?;
    session.save()?;
    println!("Saved {:?}", session.store().path());
    Ok(())
}

/// Reset statistics after explicit confirmation
fn run_reset(config: AppConfig, yes: bool) -> Result<()> {
    let mut session = Session::from_config(&config)?;

    if !yes {
        let doc = session.document();
        eprintln!(
            "This resets {} analyses (${:.3}) to zero. Re-run with --yes to confirm.",
            doc.total_analyses(),
            doc.total_cost()
        );
        return Ok(());
    }

    let ticket = session.request_reset();
    session.confirm_reset(ticket)?;
    println!("Statistics reset");
    Ok(())
}

/// Run history commands
fn run_history_command(config: AppConfig, action: HistoryCommands, format: &str) -> Result<()> {
    let session = Session::from_config(&config)?;
    let log = match session.log() {
        Some(log) => log,
        None => {
            println!("History is disabled in settings");
            return Ok(());
        }
    };

    match action {
        HistoryCommands::List { count } => {
            let entries = log.get_recent(count)?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            println!("Recent analyses ({} entries):", entries.len());
            for entry in entries {
                let first_line = entry.response.lines().next().unwrap_or("");
                println!("  {} [{}] ${:.4} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.template,
                    entry.cost,
                    first_line
                );
            }
        }
        HistoryCommands::Clear { force } => {
            if !force {
                eprintln!("Use --force to confirm clearing history");
                return Ok(());
            }
            log.clear()?;
            println!("History cleared");
        }
    }

    Ok(())
}

/// Run settings commands
fn run_config_command(config: AppConfig, action: ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated settings at {:?}", output);
        }
    }

    Ok(())
}

/// Check model reachability
async fn run_status(config: AppConfig) -> Result<()> {
    let client = GeminiClient::new(&config.engine)?;

    println!("Shelfscan v{} Status", env!("CARGO_PKG_VERSION"));
    println!("======================");
    println!("Model: {} ({})", client.model(), client.name());

    match client.health_check().await {
        Ok(()) => println!("API: Reachable"),
        Err(e) => println!("API: Error - {}", e),
    }

    match Session::from_config(&config) {
        Ok(session) => {
            let doc = session.document();
            println!("\nDocument ({}):", config.document_path);
            println!("  Templates: {}", doc.template_names().join(", "));
            println!("  Analyses: {}", doc.total_analyses());
        }
        Err(e) => println!("\nDocument: Error - {}", e),
    }

    Ok(())
}
