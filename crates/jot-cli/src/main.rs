//! # Jot CLI
//!
//! Command-line interface for Jot note search.
//!
//! ## Commands
//!
//! - `jot index` - Rebuild the search index from the notes folder
//! - `jot search <query>` - Full-text search over indexed notes
//! - `jot status` - Show index status and statistics
//! - `jot clear` - Delete the index
//! - `jot configure` - Set the notes folder, index location or file pattern
//!
//! ## Example Usage
//!
//! ```bash
//! # Point jot at a notes folder and build the index
//! jot configure --notes-path ~/notes
//! jot index
//!
//! # Search with phrases and boolean operators
//! jot search '"quarterly report" AND friday'
//! ```

mod app;
mod commands;

use app::App;
use clap::{Parser, Subcommand};
use jot_core::JotError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Jot - Personal notes with full-text search
#[derive(Parser)]
#[command(name = "jot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the search index from the notes folder
    Index {
        /// Add to the existing index instead of rebuilding it
        #[arg(short, long)]
        preserve: bool,
    },

    /// Search indexed notes
    #[command(alias = "s")]
    Search {
        /// Query: words, "phrases", AND/OR/NOT, parentheses, filename:name
        query: String,

        /// Maximum number of results to show
        #[arg(short, long)]
        count: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Show index status and statistics
    Status,

    /// Clear the index
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Update and save the configuration
    Configure {
        /// Folder holding the notes
        #[arg(long)]
        notes_path: Option<PathBuf>,

        /// Directory for the search index
        #[arg(long)]
        index_path: Option<PathBuf>,

        /// Glob pattern selecting note files (e.g. "*.md")
        #[arg(long)]
        pattern: Option<String>,
    },
}

#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            match e.downcast_ref::<JotError>() {
                Some(JotError::InvalidArgument(_)) => ExitCode::from(2),
                Some(err) if err.requires_reindex() => {
                    eprintln!("Run 'jot index' to rebuild the index.");
                    ExitCode::FAILURE
                }
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // Configuration first: it supplies the default log level
    let app = App::load(cli.config.clone())?;

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => app.config.general.log_level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    match cli.command {
        Commands::Index { preserve } => commands::index::run(&app, preserve),
        Commands::Search {
            query,
            count,
            output,
        } => commands::search::run(&app, &query, count, output),
        Commands::Status => commands::status::run(&app),
        Commands::Clear { yes } => commands::clear::run(&app, yes),
        Commands::Configure {
            notes_path,
            index_path,
            pattern,
        } => commands::configure::run(app, notes_path, index_path, pattern),
    }
}
