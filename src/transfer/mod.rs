//! Same-ledger money movement
//!
//! - [`InternalTransferEngine`]: account to account, one atomic transaction
//! - [`TopUpEngine`]: external funding credit, one atomic transaction
//!
//! Neither engine keeps state of its own; every call re-reads the accounts
//! from the store and either commits all of its writes or none of them.
//!
//! # Lock order
//!
//! Two-account operations lock the lower account id first. Combined with
//! `SELECT ... FOR UPDATE` this rules out lock cycles between A→B and B→A.

pub mod error;
pub mod internal;
pub mod topup;
pub mod validation;

mod integration_tests;

pub use error::{ErrorKind, TransferError};
pub use internal::{InternalTransferEngine, TransferRequest, TransferResult};
pub use topup::{TopUpEngine, TopUpRequest, TopUpResult};
