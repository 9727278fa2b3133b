//! Ledger Store
//!
//! Durable storage for accounts, entries, internal transfers and external
//! transfer attempts, with atomic multi-statement transactions.
//!
//! Two backends share one contract:
//! - [`PgLedgerStore`]: PostgreSQL with row-level locks
//! - [`MemoryLedgerStore`]: in-process, transactions fully serialized

pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod status;
pub mod store;

pub use error::LedgerError;
pub use memory::{FaultPoint, MemoryLedgerStore};
pub use models::{
    Account, AccountId, EXTERNAL_FUNDING_ACCOUNT, Entry, ExternalTransfer, ExternalTransferKey,
    ExternalTransferUpdate, NewExternalTransfer, Page, Transfer,
};
pub use postgres::PgLedgerStore;
pub use status::ExternalTransferStatus;
pub use store::{Ledger, LedgerStore, LedgerTx};
