//! payledger - Ledger money-movement core
//!
//! Double-entry style ledger with atomic internal transfers, top-ups and
//! external bank transfers driven through a persisted state machine.
//!
//! # Modules
//!
//! - [`ledger`] - Ledger Store: models, `run_atomic`, PostgreSQL and in-memory backends
//! - [`account`] - Open/get/list accounts
//! - [`transfer`] - Internal transfers and top-ups, caller-facing errors
//! - [`bank`] - Bank gateway trait, registry and HTTP backend
//! - [`external`] - External transfer state machine and reconciliation worker
//! - [`history`] - Unified per-account transaction history
//! - [`currency`] - Supported currencies
//! - [`config`] / [`logging`] / [`db`] - Ambient setup

pub mod account;
pub mod bank;
pub mod config;
pub mod currency;
pub mod db;
pub mod external;
pub mod history;
pub mod ledger;
pub mod logging;
pub mod transfer;

// Convenient re-exports at crate root
pub use account::AccountService;
pub use bank::{BankError, BankGateway, BankRegistry};
pub use currency::Currency;
pub use external::{ExternalTransferCoordinator, ExternalTransferRequest, ReconciliationWorker};
pub use history::{HistoryItem, HistoryService};
pub use ledger::{Ledger, LedgerError, LedgerStore, MemoryLedgerStore, PgLedgerStore};
pub use transfer::{InternalTransferEngine, TopUpEngine, TransferError};
