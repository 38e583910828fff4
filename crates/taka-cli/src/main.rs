//! Taka CLI - Offline-first personal finance tracking from the terminal
//!
//! Every mutation commits locally first; sync to the remote ledger happens
//! explicitly via `taka sync` or opportunistically when configured.

use std::env;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use taka_core::config::RemoteConfig;
use taka_core::models::QueueEntry;
use taka_core::remote::{DocumentStore, HttpDocumentStore, MemoryDocumentStore};
use taka_core::services::{LedgerService, SyncQueue, TransactionStore};
use taka_core::sync::{SyncEngine, SyncOutcome};
use taka_core::{Transaction, TransactionKind};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "taka")]
#[command(about = "Track income and expenses, offline first")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to the local transactions database
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Optional path to the pending-operations queue database
    #[arg(long, value_name = "PATH")]
    queue_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a new transaction
    #[command(alias = "new")]
    Add {
        /// Short description
        title: String,
        /// Amount in your currency
        amount: f64,
        /// Category label
        #[arg(short, long, default_value = "general")]
        category: String,
        /// Income or expense
        #[arg(short, long, value_enum, default_value_t = KindArg::Expense)]
        kind: KindArg,
        /// Transaction date (YYYY-MM-DD, today when omitted)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// List all transactions
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing transaction
    Edit {
        /// Transaction ID
        id: String,
        /// New description
        #[arg(long)]
        title: Option<String>,
        /// New amount
        #[arg(long)]
        amount: Option<f64>,
        /// New category
        #[arg(long)]
        category: Option<String>,
    },
    /// Delete a transaction
    Delete {
        /// Transaction ID
        id: String,
    },
    /// Pull the remote ledger into the local store
    Import,
    /// Push the full local store to the remote ledger
    Export,
    /// Drain the pending-operations queue against the remote
    Sync,
    /// Show queue statistics
    Status,
    /// Inspect pending operations
    Queue {
        /// Drop all pending operations
        #[arg(long)]
        clear: bool,
    },
    /// Delete all local transactions
    Clear {
        /// Skip the confirmation requirement
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum KindArg {
    Income,
    Expense,
}

impl From<KindArg> for TransactionKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Income => Self::Income,
            KindArg::Expense => Self::Expense,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] taka_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Amount must be a finite number")]
    InvalidAmount,
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Remote is not configured. Set TAKA_API_URL to enable `taka {0}`.")]
    RemoteNotConfigured(&'static str),
    #[error("Refusing to delete all local transactions without --yes")]
    ClearNotConfirmed,
}

struct App {
    ledger: LedgerService,
    engine: SyncEngine,
    queue: SyncQueue,
    remote_configured: bool,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("taka=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let app = open_app(cli.db_path, cli.queue_path)?;

    match cli.command {
        Commands::Add {
            title,
            amount,
            category,
            kind,
            date,
        } => run_add(&app, &title, amount, &category, kind, date.as_deref()).await?,
        Commands::List { json } => run_list(&app, json).await?,
        Commands::Edit {
            id,
            title,
            amount,
            category,
        } => run_edit(&app, &id, title, amount, category).await?,
        Commands::Delete { id } => run_delete(&app, &id).await?,
        Commands::Import => run_import(&app).await?,
        Commands::Export => run_export(&app).await?,
        Commands::Sync => run_sync(&app).await?,
        Commands::Status => run_status(&app).await?,
        Commands::Queue { clear } => run_queue(&app, clear).await?,
        Commands::Clear { yes } => run_clear(&app, yes).await?,
    }

    Ok(())
}

fn open_app(db_path: Option<PathBuf>, queue_path: Option<PathBuf>) -> Result<App, CliError> {
    let store = TransactionStore::open_path(resolve_path(db_path, "TAKA_DB_PATH", "taka.db"))?;
    let queue = SyncQueue::open_path(resolve_path(queue_path, "TAKA_QUEUE_DB_PATH", "queue.db"))?;

    let (remote, collection, remote_configured): (Arc<dyn DocumentStore>, String, bool) =
        match RemoteConfig::from_env() {
            Ok(config) => {
                let http = HttpDocumentStore::new(&config)?;
                (Arc::new(http), config.collection().to_string(), true)
            }
            Err(_) => (
                Arc::new(MemoryDocumentStore::new()),
                taka_core::config::DEFAULT_COLLECTION.to_string(),
                false,
            ),
        };

    let user = env::var("TAKA_USER_ID").ok().filter(|id| !id.is_empty());
    let (_user_tx, user_rx) = watch::channel(user);
    let (_online_tx, online_rx) = watch::channel(true);

    let ledger = LedgerService::new(
        store,
        queue.clone(),
        Arc::clone(&remote),
        collection.clone(),
        user_rx,
    );
    let engine = SyncEngine::new(queue.clone(), remote, collection, online_rx);

    Ok(App {
        ledger,
        engine,
        queue,
        remote_configured,
    })
}

fn resolve_path(cli_path: Option<PathBuf>, env_var: &str, file_name: &str) -> PathBuf {
    cli_path
        .or_else(|| env::var_os(env_var).map(PathBuf::from))
        .unwrap_or_else(|| default_data_path(file_name))
}

fn default_data_path(file_name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taka")
        .join(file_name)
}

async fn run_add(
    app: &App,
    title: &str,
    amount: f64,
    category: &str,
    kind: KindArg,
    date: Option<&str>,
) -> Result<(), CliError> {
    if !amount.is_finite() {
        return Err(CliError::InvalidAmount);
    }
    let date_ms = match date {
        Some(raw) => parse_date_millis(raw)?,
        None => Utc::now().timestamp_millis(),
    };

    let transaction = Transaction::new(title, amount, category, kind.into(), date_ms);
    app.ledger.create(&transaction).await?;

    println!("{}", transaction.id);
    Ok(())
}

async fn run_list(app: &App, as_json: bool) -> Result<(), CliError> {
    let transactions = app.ledger.list().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&transactions)?);
        return Ok(());
    }

    for transaction in &transactions {
        println!("{}", format_transaction_line(transaction));
    }
    Ok(())
}

async fn run_edit(
    app: &App,
    id: &str,
    title: Option<String>,
    amount: Option<f64>,
    category: Option<String>,
) -> Result<(), CliError> {
    let Some(mut transaction) = app.ledger.get(id).await? else {
        return Err(CliError::TransactionNotFound(id.to_string()));
    };

    if let Some(title) = title {
        transaction.title = title;
    }
    if let Some(amount) = amount {
        if !amount.is_finite() {
            return Err(CliError::InvalidAmount);
        }
        transaction.amount = amount;
    }
    if let Some(category) = category {
        transaction.category = category;
    }

    let updated = app.ledger.update(&transaction).await?;
    println!("{}", updated.id);
    Ok(())
}

async fn run_delete(app: &App, id: &str) -> Result<(), CliError> {
    if app.ledger.get(id).await?.is_none() {
        return Err(CliError::TransactionNotFound(id.to_string()));
    }

    app.ledger.delete(id).await?;
    println!("{id}");
    Ok(())
}

async fn run_import(app: &App) -> Result<(), CliError> {
    if !app.remote_configured {
        return Err(CliError::RemoteNotConfigured("import"));
    }

    let imported = app.ledger.import().await?;
    println!("Imported {imported} transactions");
    Ok(())
}

async fn run_export(app: &App) -> Result<(), CliError> {
    if !app.remote_configured {
        return Err(CliError::RemoteNotConfigured("export"));
    }

    let exported = app.ledger.export().await?;
    println!("Exported {exported} transactions");
    Ok(())
}

async fn run_sync(app: &App) -> Result<(), CliError> {
    if !app.remote_configured {
        return Err(CliError::RemoteNotConfigured("sync"));
    }

    match app.engine.sync().await {
        SyncOutcome::Completed(report) => {
            println!(
                "Synced {} operations, {} failed",
                report.succeeded.len(),
                report.failed.len()
            );
            for failure in &report.failed {
                eprintln!("  entry {}: {}", failure.queue_id, failure.error);
            }
        }
        SyncOutcome::NoOperations => println!("Nothing to sync"),
        SyncOutcome::Offline => println!("Offline, sync skipped"),
        SyncOutcome::AlreadySyncing => println!("A sync cycle is already running"),
        SyncOutcome::Error(error) => eprintln!("Sync failed: {error}"),
    }
    Ok(())
}

async fn run_status(app: &App) -> Result<(), CliError> {
    let stats = app.engine.stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn run_queue(app: &App, clear: bool) -> Result<(), CliError> {
    if clear {
        app.engine.clear_queue().await?;
        println!("Queue cleared");
        return Ok(());
    }

    let entries = app.queue.list_all().await?;
    if entries.is_empty() {
        println!("Queue is empty");
        return Ok(());
    }

    for entry in &entries {
        println!("{}", format_queue_line(entry));
    }
    Ok(())
}

async fn run_clear(app: &App, confirmed: bool) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::ClearNotConfirmed);
    }

    app.ledger.clear().await?;
    println!("Local store cleared");
    Ok(())
}

fn parse_date_millis(raw: &str) -> Result<i64, CliError> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| CliError::InvalidDate(raw.to_string()))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CliError::InvalidDate(raw.to_string()))?;
    Ok(Utc.from_utc_datetime(&midnight).timestamp_millis())
}

fn format_transaction_line(transaction: &Transaction) -> String {
    let short_id = transaction.id.as_str().chars().take(13).collect::<String>();
    let date = Utc
        .timestamp_millis_opt(transaction.date)
        .single()
        .map_or_else(|| "????-??-??".to_string(), |d| d.format("%Y-%m-%d").to_string());
    let sign = match transaction.kind {
        TransactionKind::Income => '+',
        TransactionKind::Expense => '-',
    };

    format!(
        "{short_id:<13}  {date}  {sign}{:>10.2}  {:<12}  {}",
        transaction.amount.abs(),
        transaction.category,
        transaction.title
    )
}

fn format_queue_line(entry: &QueueEntry) -> String {
    let id = entry
        .payload
        .get("id")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("?");
    let operation = entry.operation_type.as_str();
    let retries = if entry.retry_count > 0 {
        format!("  retries={}", entry.retry_count)
    } else {
        String::new()
    };

    format!("#{:<6} {operation:<6} {id}{retries}", entry.queue_id)
}
