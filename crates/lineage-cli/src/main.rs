//! Lineage CLI - Command line interface for the genealogical engine

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use lineage_core::CancelToken;
use lineage_engine::FamilyEngine;
use lineage_storage::{MemoryCache, MemoryStorage, StorageBackend};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use commands::{person, union};
use config::Config;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "lineage")]
#[command(author, version, about = "Genealogical relationship engine")]
pub struct Cli {
    /// Config file
    #[arg(long, env = "LINEAGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Storage backend: redb, sqlite, memory
    #[arg(short, long, global = true)]
    pub backend: Option<String>,

    /// Output format: table, json
    #[arg(short, long, global = true)]
    pub format: Option<String>,

    /// Bypass the read cache
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(config::default_config_path)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage individuals and query their relations
    Person(person::PersonArgs),
    /// Manage unions and their children
    Union(union::UnionArgs),
    /// Manage CLI configuration
    Config(commands::config::ConfigArgs),
}

/// Application context with the wired engine
pub struct AppContext {
    pub engine: FamilyEngine,
    pub format: OutputFormat,
    pub cancel: CancelToken,
}

impl AppContext {
    pub async fn new(cli: &Cli) -> anyhow::Result<Self> {
        let config = Config::load(&cli.config_path())?;
        let data_dir = cli.data_dir.clone().unwrap_or_else(|| config.data_dir());
        let backend = cli.backend.clone().unwrap_or_else(|| config.backend.clone());
        let format = cli.format.as_deref().unwrap_or(&config.format);

        let storage = open_storage(&backend, &data_dir)?;
        storage.initialize().await?;

        let mut builder = FamilyEngine::builder(storage).with_config(config.engine_config());
        if config.cache_enabled && !cli.no_cache {
            builder = builder.with_cache(Arc::new(MemoryCache::new(config.cache_capacity)));
        }

        Ok(Self {
            engine: builder.build()?,
            format: OutputFormat::from(format),
            cancel: CancelToken::new(),
        })
    }
}

fn open_storage(backend: &str, data_dir: &std::path::Path) -> anyhow::Result<Arc<dyn StorageBackend>> {
    if backend == "memory" {
        tracing::debug!("Using in-memory storage");
        return Ok(Arc::new(MemoryStorage::new()));
    }
    std::fs::create_dir_all(data_dir)?;

    match backend {
        #[cfg(feature = "redb")]
        "redb" => {
            let path = data_dir.join("lineage.redb");
            tracing::debug!("Using database at: {:?}", path);
            Ok(Arc::new(lineage_storage::RedbStorage::open(&path)?))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = data_dir.join("lineage.db");
            tracing::debug!("Using database at: {:?}", path);
            Ok(Arc::new(lineage_storage::SqliteStorage::open(&path)?))
        }
        other => anyhow::bail!("Unsupported storage backend: {}", other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    tracing::debug!("Starting lineage CLI");

    if let Commands::Config(args) = &cli.command {
        return commands::config::run(args, &cli);
    }

    let ctx = AppContext::new(&cli).await?;
    let result = match &cli.command {
        Commands::Person(args) => person::run(args, &ctx).await,
        Commands::Union(args) => union::run(args, &ctx).await,
        Commands::Config(_) => Ok(()),
    };

    ctx.engine.flush_cache().await;
    if let Err(e) = ctx.engine.storage().close().await {
        tracing::warn!("Failed to close storage: {}", e);
    }
    result
}
