//! Factstore CLI - Command-line interface for the typed fact database

use clap::{Parser, Subcommand};
use factstore::config::{self, FactStoreConfig};
use factstore::ui::{self, Icons};
use factstore::{Fact, FactStore, FactTemplate, HType};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "factstore")]
#[command(version)]
#[command(about = "Typed fact database - register predicates, assert facts, query with templates")]
#[command(long_about = r#"
Factstore keeps typed facts in SQLite and answers conjunctive template queries.

Example usage:
  factstore register likes string string
  factstore assert --file facts.json
  factstore query --file templates.json
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the database file (overrides factstore.toml)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default factstore.toml
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Register a predicate signature
    Register {
        /// Predicate name (lowercase, digits, underscores)
        name: String,

        /// Argument types: string, blob, uint64, bool, list<T>
        #[arg(required = true)]
        types: Vec<String>,
    },

    /// Store facts from a JSON array
    Assert {
        /// JSON file with facts, e.g. [{"predicate":"likes","args":[{"string":"alice"},{"string":"bob"}]}]
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Solve a conjunction of templates from a JSON array
    Query {
        /// JSON file with templates, e.g. [{"predicate":"likes","slots":[{"var":"X"},"any"]}]
        #[arg(short, long)]
        file: PathBuf,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// List registered predicates
    Predicates,

    /// Show fact counts per predicate
    Stats,
}

fn open_store(cli_database: Option<PathBuf>, config: &FactStoreConfig) -> anyhow::Result<(FactStore, PathBuf)> {
    let path = cli_database.unwrap_or_else(|| config.database_path());
    config::ensure_db_dir(&path)?;
    let store = FactStore::open_with_config(&path, config)?;
    Ok((store, path))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = config::load_config(cli.config.as_deref())?.unwrap_or_default();

    match cli.command {
        Commands::Init { force } => {
            let path = cli.config.unwrap_or_else(config::default_config_path);
            let fresh = FactStoreConfig {
                database: Some(PathBuf::from("factstore.db")),
                ..FactStoreConfig::default()
            };
            config::write_config(&path, &fresh, force)?;
            ui::success(&format!("Wrote {}", path.display()));
        }

        Commands::Register { name, types } => {
            let arg_types = types
                .iter()
                .map(|t| t.parse::<HType>())
                .collect::<factstore::Result<Vec<_>>>()?;
            let (store, _) = open_store(cli.database, &config)?;

            if store.add_type(&name, arg_types)? {
                let predicate = store.predicate(&name).map(|p| p.to_string()).unwrap_or(name);
                ui::success(&format!("Registered {}", predicate));
            } else {
                let existing = store.predicate(&name).map(|p| p.to_string()).unwrap_or_default();
                ui::error(&format!("Conflicts with existing signature {}", existing));
                std::process::exit(1);
            }
        }

        Commands::Assert { file } => {
            let facts: Vec<Fact> = read_json(&file)?;
            let (store, path) = open_store(cli.database, &config)?;

            ui::header(&format!("Storing {} facts", facts.len()));
            ui::info("Database", &path.display().to_string());
            let report = store.set_facts(&facts)?;

            for (index, error) in &report.rejected {
                ui::warn(&format!("#{} {}: {}", index, facts[*index], error));
            }
            ui::summary_row("New facts:", &report.inserted.to_string());
            ui::summary_row("Already present:", &(facts.len() - report.inserted - report.rejected.len()).to_string());
            ui::summary_row("Rejected:", &report.rejected.len().to_string());
            if !report.is_clean() {
                std::process::exit(2);
            }
        }

        Commands::Query { file, format } => {
            let templates: Vec<FactTemplate> = read_json(&file)?;
            let (store, _) = open_store(cli.database, &config)?;
            let contexts = store.get_facts(&templates)?;

            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&contexts)?);
            } else {
                let query: Vec<String> = templates.iter().map(|t| t.to_string()).collect();
                println!("{} {}", Icons::SEARCH, query.join(", "));
                if contexts.is_empty() {
                    println!("{} No solutions.", Icons::EMPTY);
                } else if contexts.iter().all(|c| c.is_empty()) {
                    ui::success(&format!("{} solution(s) with no variables", contexts.len()));
                } else {
                    println!("{}", ui::contexts_table(&contexts));
                    println!("{} solution(s)", contexts.len());
                }
            }
        }

        Commands::Predicates => {
            let (store, _) = open_store(cli.database, &config)?;
            let predicates = store.predicates();
            if predicates.is_empty() {
                println!("{} No predicates registered.", Icons::EMPTY);
            } else {
                println!("{}", ui::predicates_table(&predicates));
            }
        }

        Commands::Stats => {
            let (store, path) = open_store(cli.database, &config)?;
            let stats = store.stats()?;

            ui::section(&format!("{} Factstore Statistics ({})", Icons::STATS, path.display()));
            println!("{}", ui::stats_table(&stats.predicates));
            println!("{}", stats);
        }
    }

    Ok(())
}
