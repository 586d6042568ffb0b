//! Bookshelf CLI
//!
//! Command-line interface for Bookshelf - search a book catalog and keep a
//! rated personal library.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bookshelf_core::{Config, FileStore, Library};

mod catalog;
mod commands;
mod editor;
mod notices;
mod output;

use catalog::CatalogClient;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "bookshelf")]
#[command(about = "Bookshelf - search books and keep a rated personal library")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use a specific config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the book catalog
    Search {
        /// Search query (title, author, ISBN, ...)
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Show a few featured books from a random category
    #[command(alias = "discover")]
    Featured {
        /// Category to feature instead of a random one
        #[arg(long)]
        category: Option<String>,
    },
    /// Show book details
    Show {
        /// Catalog book ID
        id: String,
    },
    /// Add a book to your library
    Add {
        /// Catalog book ID
        id: String,
    },
    /// Remove a book from your library
    #[command(alias = "rm")]
    Remove {
        /// Catalog book ID
        id: String,
    },
    /// List the books in your library
    #[command(alias = "ls")]
    List,
    /// Rate a book from 1 to 5 stars
    Rate {
        /// Catalog book ID
        id: String,
        /// Number of stars
        #[arg(allow_negative_numbers = true)]
        rating: i64,
    },
    /// Drop ratings for books no longer in your library
    Prune,
    /// Show status (storage, counts)
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, catalog_url, api_key, max_results, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from_flags(cli.json, cli.quiet);
    let output = Output::new(format);
    let config_path = cli.config.as_ref();

    // Config commands don't need the library
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        };
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config);

    let mut library = Library::open(FileStore::new(config.store_dir()));
    notices::attach(&mut library, format);

    match cli.command {
        Commands::Search { query } => {
            let catalog = CatalogClient::new(&config)?;
            commands::book::search(&library, &catalog, query.join(" "), &output).await
        }
        Commands::Featured { category } => {
            let catalog = CatalogClient::new(&config)?;
            commands::book::featured(&library, &catalog, category, &output).await
        }
        Commands::Show { id } => {
            let catalog = CatalogClient::new(&config)?;
            commands::book::show(&library, &catalog, id, &output).await
        }
        Commands::Add { id } => {
            let catalog = CatalogClient::new(&config)?;
            commands::book::add(&mut library, &catalog, id, &output).await
        }
        Commands::Remove { id } => commands::book::remove(&mut library, id, &output),
        Commands::List => commands::book::list(&library, &output),
        Commands::Rate { id, rating } => commands::book::rate(&mut library, id, rating, &output),
        Commands::Prune => commands::book::prune(&mut library, &output),
        Commands::Status => commands::status::show(&library, &config, &output),
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

/// Initialize logging
///
/// Only initializes if BOOKSHELF_LOG environment variable is set.
/// Logs to file (config.log_file or default {data_dir}/debug.log).
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("BOOKSHELF_LOG") else {
        return;
    };

    let log_path = config.log_path();

    let log_file = match open_log_file(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            return;
        }
    };

    let env_filter = EnvFilter::new(format!(
        "bookshelf_core={},bookshelf_cli={}",
        log_level, log_level
    ));

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();

    info!("Logging initialized to {:?}", log_path);
}

/// Create the log file, and its directory on a fresh install
fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(path)
}
