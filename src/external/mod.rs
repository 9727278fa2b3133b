//! External (cross-bank) transfers
//!
//! # State Machine
//!
//! ```text
//! PENDING → PROCESSING → COMPLETED
//!    ↓           ↓
//!  FAILED  ←─────┘
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Persist-Before-Call**: the row is durably `processing` before the bank is called
//! 2. **No lock across the bank call**: phase 1 and phase 2 are separate transactions
//! 3. **Debit only after acceptance**: a failed or timed-out bank call never debits
//! 4. **No silent loss**: every post-reserve failure ends in `failed` with a message,
//!    or in a `reconciliation_required` log line if even that write fails
//!
//! The bank leg cannot be undone. A debit failure after the bank accepted is
//! an at-least-once-remote / at-most-once-local window surfaced for manual
//! reconciliation, not retried.

pub mod coordinator;
pub mod worker;


pub use coordinator::{
    BankAccountLookup, CoordinatorConfig, ExternalTransferCoordinator, ExternalTransferRequest,
    TransactionStatus,
};
pub use worker::{ReconciliationWorker, WorkerConfig};
