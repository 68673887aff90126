use anyhow::Result;
use clap::{Parser, Subcommand};
use keyseek_core::ingest::ingest_dir;
use keyseek_core::{ArticleId, Deletion, Engine, EngineConfig, KeywordExtractor, SledStore};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "keyseek-indexer")]
#[command(about = "Load, delete and inspect articles in a keyseek store", long_about = None)]
struct Cli {
    /// Article store path
    #[arg(long, global = true, default_value = "./keyseek.db")]
    db: String,
    /// Deletes between automatic index rebuilds
    #[arg(long, global = true, default_value_t = keyseek_core::engine::REBUILD_THRESHOLD)]
    rebuild_threshold: usize,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add every file in a directory as one article
    Ingest {
        /// Input directory
        #[arg(long)]
        input: String,
    },
    /// Tombstone articles by id
    Delete {
        #[arg(required = true)]
        ids: Vec<ArticleId>,
    },
    /// Reload the index from the store
    Rebuild,
    /// Run a query and print the ranked results as JSON
    Search {
        sentence: String,
    },
    /// Print article and index counts as JSON
    Stats,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let config = EngineConfig { rebuild_threshold: cli.rebuild_threshold, ..EngineConfig::default() };
    let engine = Engine::open(SledStore::open(&cli.db)?, KeywordExtractor::new(), config)?;

    match cli.command {
        Commands::Ingest { input } => {
            let report = ingest_dir(&engine, &input)?;
            println!("added {} articles from {}", report.added.len(), input);
        }
        Commands::Delete { ids } => {
            for id in ids {
                match engine.delete(id)? {
                    Deletion::Tombstoned => println!("deleted {id}"),
                    Deletion::AlreadyDeleted => println!("{id} was already deleted"),
                    Deletion::Compacted => println!("deleted {id}, index rebuilt"),
                }
            }
        }
        Commands::Rebuild => {
            engine.rebuild()?;
            println!("{}", serde_json::to_string_pretty(&engine.stats())?);
        }
        Commands::Search { sentence } => {
            let outcome = engine.search(&sentence)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&engine.stats())?);
        }
    }
    Ok(())
}
