//! payledger - ledger service entry point
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────────┐    ┌──────────────┐
//! │  Config  │───▶│ Postgres │───▶│ BankRegistry │───▶│Reconciliation│
//! │  (YAML)  │    │ (schema) │    │   (config)   │    │    worker    │
//! └──────────┘    └──────────┘    └──────────────┘    └──────────────┘
//! ```
//!
//! Usage: `payledger [--env <name>]` (reads `config/<name>.yaml`, default `dev`)

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use payledger::bank::BankRegistry;
use payledger::config::AppConfig;
use payledger::db::Database;
use payledger::external::{ReconciliationWorker, WorkerConfig};
use payledger::ledger::{Ledger, LedgerStore, MemoryLedgerStore, PgLedgerStore};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    let Some(url) = config.postgres_url.as_deref() else {
        warn!("postgres_url not set, using the in-memory ledger store (data is not persisted)");
        return Ok(Arc::new(MemoryLedgerStore::new()));
    };

    let db = Database::connect(url, config.max_connections)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.health_check().await.context("PostgreSQL health check failed")?;
    db.init_schema().await.context("Failed to initialize schema")?;
    info!(
        max_connections = config.max_connections,
        "PostgreSQL connected and schema initialized"
    );

    Ok(Arc::new(PgLedgerStore::new(db.pool().clone())))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)
        .with_context(|| format!("Failed to load config for env '{}'", env))?;
    let _log_guard = payledger::logging::init_logging(&app_config);

    info!(env = %env, git_hash = env!("GIT_HASH"), "Starting payledger");

    let store = open_store(&app_config).await?;
    let ledger = Ledger::new(store);
    info!(backend = ledger.store().name(), "Ledger store ready");

    // Built only to validate the bank configuration at startup
    let banks = BankRegistry::from_config(&app_config.banks)
        .context("Failed to build bank registry")?;
    info!(banks = ?banks.codes(), "Bank registry ready");

    let worker_config = WorkerConfig::from(&app_config.external_transfer);
    let worker = ReconciliationWorker::new(ledger, worker_config);

    tokio::select! {
        _ = worker.run() => {}
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received, stopping");
        }
    }

    Ok(())
}
