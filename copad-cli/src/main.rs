use anyhow::Result;
use clap::Parser;
use copad_core::config::Config;
use copad_core::core_sync::{
    BackupStore, ClientId, DocumentId, MemoryBackend, MemoryBackupStore, SyncEngine,
};
use copad_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "copad")]
#[command(author, version, about = "Collaborative document sync engine driver", long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run a multi-client editing simulation over the in-memory backend
    Simulate {
        /// Number of concurrent clients
        #[arg(short, long, default_value = "3")]
        clients: usize,

        /// Edits each client types
        #[arg(short, long, default_value = "10")]
        edits: usize,

        /// Document id to edit
        #[arg(short, long, default_value = "doc1")]
        document: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.log_level.parse::<LogLevel>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', using 'info'", args.log_level);
        LogLevel::Info
    });

    let config = LogConfig::new(log_level).json_format(args.json_logs);
    init_logging_with_config(config)?;

    match args.command {
        Some(Command::Simulate {
            clients,
            edits,
            document,
        }) => simulate(clients, edits, &document).await?,
        None => {
            info!("No command specified. Use --help for usage information.");
        }
    }

    Ok(())
}

/// Spin up `clients` engines against one shared in-memory backend, have each
/// type a burst of edits, and report whether all replicas converged on the
/// backend's final row.
async fn simulate(clients: usize, edits: usize, document: &str) -> Result<()> {
    anyhow::ensure!(clients > 0, "need at least one client");

    let backend = MemoryBackend::new();
    let document_id = DocumentId::new(document);

    // Short quiet period so the simulation finishes quickly
    let mut config = Config::default();
    config.sync.debounce_quiet = Duration::from_millis(50);

    let mut engines = Vec::with_capacity(clients);
    for i in 0..clients {
        let backup = Arc::new(MemoryBackupStore::new());
        let (engine, applied) = SyncEngine::new(
            Arc::new(backend.clone()),
            backup as Arc<dyn BackupStore>,
            document_id.clone(),
            ClientId::generate(),
            config.clone(),
        );
        engine.initialize().await?;
        engine.attach_debouncer();
        info!(client = i, id = %engine.client_id(), "client joined");

        // Drain applied updates so the channel never backs up
        tokio::spawn(async move {
            let mut applied = applied;
            while applied.recv().await.is_some() {}
        });

        engines.push(engine);
    }

    let mut writers = Vec::new();
    for (i, engine) in engines.iter().enumerate() {
        let engine = Arc::clone(engine);
        writers.push(tokio::spawn(async move {
            let mut text = String::new();
            for n in 0..edits {
                text.push_str(&format!("[client {} edit {}] ", i, n));
                engine.edit(text.clone()).await;
                let jitter = rand::rng().random_range(5..40u64);
                tokio::time::sleep(Duration::from_millis(jitter)).await;
            }
        }));
    }
    for writer in writers {
        writer.await?;
    }

    // let debounced saves and notifications settle
    tokio::time::sleep(config.sync.debounce_quiet * 4).await;

    let row = backend
        .row(&document_id)
        .ok_or_else(|| anyhow::anyhow!("document row vanished"))?;
    info!(
        version = row.version,
        winner = %row.client_id,
        length = row.content.len(),
        "backend final row"
    );

    let mut converged = true;
    for (i, engine) in engines.iter().enumerate() {
        let content = engine.content().await;
        if content != row.content {
            warn!(client = i, "replica diverged from backend row");
            converged = false;
        }
        engine.shutdown().await;
    }

    // shutdown flushes can advance the row; re-read for the report
    let row = backend
        .row(&document_id)
        .ok_or_else(|| anyhow::anyhow!("document row vanished"))?;
    println!(
        "simulation finished: {} clients, {} edits each, final version {}, converged: {}",
        clients, edits, row.version, converged
    );

    Ok(())
}
