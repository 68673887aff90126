use anyhow::Result;
use axum::Router;
use clap::Parser;
use keyseek_core::ingest::ingest_dir;
use keyseek_core::{Engine, EngineConfig, KeywordExtractor, SledStore};
use keyseek_server::build_app;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Article store path
    #[arg(long, default_value = "./keyseek.db")]
    db: String,
    /// Directory whose files are added as articles before serving
    #[arg(long)]
    ingest: Option<String>,
    /// Deletes between automatic index rebuilds
    #[arg(long, default_value_t = keyseek_core::engine::REBUILD_THRESHOLD)]
    rebuild_threshold: usize,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8848)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let config = EngineConfig { rebuild_threshold: args.rebuild_threshold, ..EngineConfig::default() };
    let engine = Arc::new(Engine::open(SledStore::open(&args.db)?, KeywordExtractor::new(), config)?);
    if let Some(dir) = &args.ingest {
        ingest_dir(&engine, dir)?;
    }
    let stats = engine.stats();
    tracing::info!(articles = stats.articles, live = stats.live, tokens = stats.tokens, "engine ready");

    let app: Router = build_app(engine);
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
