pub mod config;
pub mod model;
pub mod search;
pub mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use uuid::Uuid;

use crate::config::SearchConfig;
use crate::model::types::NewTransaction;
use crate::search::coordinator::QueryCoordinator;
use crate::search::sync::IndexSynchronizer;
use crate::search::tantivy::TantivyTransactionIndex;
use crate::storage::sqlite::SqliteStore;
use crate::storage::{RecordStore, SortOrder};

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "ledger-search",
    version,
    about = "Debounced transaction search with index synchronization"
)]
pub struct Cli {
    /// Override data dir (database + index). Defaults to platform data dir.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record a transaction (negative amount = expense)
    Add {
        merchant: String,
        amount: f64,
        /// RFC 3339 timestamp; defaults to now
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// List all transactions, newest first
    List,
    /// Search transactions (semantic index with content-filter fallback)
    Search { query: String },
    /// Delete a transaction by id
    Remove { id: Uuid },
    /// Rebuild the search index from the store
    Reindex,
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = SearchConfig::from_env();
    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);

    match cli.command {
        Commands::Add {
            merchant,
            amount,
            timestamp,
            currency,
            location,
            category,
            description,
        } => {
            let (store, sync) = open_core(&data_dir, &config)?;
            let record = store.create(NewTransaction {
                merchant_name: merchant,
                amount,
                timestamp,
                currency,
                location,
                category,
                description,
            })?;
            sync.on_create(&record);
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Commands::List => {
            let (store, _sync) = open_core(&data_dir, &config)?;
            let records = store.fetch_all(SortOrder::TimestampDesc)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
        Commands::Search { query } => {
            let (store, index) = open_parts(&data_dir, &config)?;
            let (coordinator, mut rx) = QueryCoordinator::new(store, index, config);
            coordinator.submit_query(&query);
            let delivery = rx
                .recv()
                .await
                .context("search coordinator dropped without delivering")?;
            if let Some(err) = delivery.error {
                anyhow::bail!(err);
            }
            println!("{}", serde_json::to_string_pretty(&delivery.records)?);
            Ok(())
        }
        Commands::Remove { id } => {
            let (store, sync) = open_core(&data_dir, &config)?;
            store.delete(id)?;
            sync.on_delete(id);
            println!("deleted {id}");
            Ok(())
        }
        Commands::Reindex => {
            let (store, sync) = open_core(&data_dir, &config)?;
            sync.rebuild(store.as_ref());
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "ledger", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn open_parts(
    data_dir: &PathBuf,
    config: &SearchConfig,
) -> Result<(Arc<dyn RecordStore>, Arc<TantivyTransactionIndex>)> {
    let store = SqliteStore::open(&data_dir.join("ledger.db"), &config.default_currency)?;
    let index_path = crate::search::tantivy::index_dir(data_dir)?;
    let index = TantivyTransactionIndex::open_or_create(&index_path)
        .with_context(|| format!("open search index at {}", index_path.display()))?;
    Ok((Arc::new(store), Arc::new(index)))
}

fn open_core(
    data_dir: &PathBuf,
    config: &SearchConfig,
) -> Result<(Arc<dyn RecordStore>, IndexSynchronizer)> {
    let (store, index) = open_parts(data_dir, config)?;
    Ok((store, IndexSynchronizer::new(index)))
}

pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "ledger-search", "ledger-search")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".ledger-search"))
}
