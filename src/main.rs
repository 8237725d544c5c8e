//! # docsearch CLI
//!
//! Keyword search over JSON document collections stored in SQLite.
//!
//! ## Usage
//!
//! ```bash
//! docsearch --config ./config/docsearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsearch init` | Create the SQLite database and tables |
//! | `docsearch import <model> <file>` | Save documents from a JSON file through a model |
//! | `docsearch search <model> "<query>"` | Search a model and print the ranked page |
//! | `docsearch rebuild <model>` | Recompute keywords for every document |
//! | `docsearch stats` | Show collection and cache counts |
//!
//! ## Examples
//!
//! ```bash
//! docsearch init
//! docsearch import articles ./data/articles.json
//! docsearch search articles "procurando objetos" --limit 10
//! docsearch search articles "objeto" --sort=-index --where '{"index": {"$gt": 1}}'
//! docsearch search articles "objeto" --populate author=name
//! docsearch rebuild articles
//! ```

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docsearch::search::SearchArgs;
use docsearch::{config, import, migrate, rebuild, search, stats};

/// docsearch: keyword search with relevance ranking and cached results.
///
/// All commands read a TOML configuration file that names the database and
/// declares the searchable models. See `config/docsearch.example.toml`.
#[derive(Parser)]
#[command(name = "docsearch", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docsearch.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite file and the documents, index, and cache tables.
    /// Running it again is safe.
    Init,

    /// Import documents into a model.
    ///
    /// Reads a JSON array of objects, or one object per line. Documents
    /// are saved one by one, so keywords are computed on the way in. An
    /// existing `_id` replaces the stored document with that id.
    Import {
        /// Model name as configured under `[models.<name>]`.
        model: String,

        /// JSON or JSON-lines file.
        file: PathBuf,
    },

    /// Search a model.
    ///
    /// Prints `{ "total_count": N, "results": [...] }`. Results are ranked
    /// by relevance unless `--sort` is given. Identical searches within the
    /// cache TTL reuse the ranked id list.
    Search {
        model: String,

        query: String,

        /// Output projection, e.g. '{"title": 1}' or '{"body": 0}'.
        #[arg(long)]
        fields: Option<String>,

        /// Page size (0 for no limit).
        #[arg(long)]
        limit: Option<usize>,

        /// Number of ranked results to skip.
        #[arg(long)]
        skip: Option<usize>,

        /// Sort key: `field`, `-field`, or `field:desc`. Repeatable.
        #[arg(long, allow_hyphen_values = true)]
        sort: Vec<String>,

        /// Extra filter as a JSON object, e.g. '{"index": {"$gt": 2}}'.
        #[arg(long = "where")]
        conditions: Option<String>,

        /// Aggregation stages appended after the result match, as a JSON array.
        #[arg(long)]
        aggregate: Option<String>,

        /// Reference path to populate, optionally `path=field1,field2` to keep
        /// fields or `path=-field1,-field2` to omit them. Repeatable.
        #[arg(long)]
        populate: Vec<String>,
    },

    /// Recompute and save keywords for every document in a model.
    Rebuild { model: String },

    /// Show per-collection document counts and cached searches.
    Stats,
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCSEARCH_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { model, file } => {
            import::run_import(&cfg, &model, &file).await?;
        }
        Commands::Search {
            model,
            query,
            fields,
            limit,
            skip,
            sort,
            conditions,
            aggregate,
            populate,
        } => {
            let args = SearchArgs {
                fields,
                limit,
                skip,
                sort,
                conditions,
                aggregate,
                populate,
            };
            search::run_search(&cfg, &model, &query, &args).await?;
        }
        Commands::Rebuild { model } => {
            rebuild::run_rebuild(&cfg, &model).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
