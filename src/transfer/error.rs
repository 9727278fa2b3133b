//! Caller-facing error taxonomy
//!
//! Every error carries a stable machine code (`code()`), a coarse
//! [`ErrorKind`] and an HTTP status suggestion for the transport layer.

use thiserror::Error;

use crate::currency::{Currency, CurrencyError};
use crate::ledger::{AccountId, LedgerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Unauthorized,
    Conflict,
    GatewayUnavailable,
    GatewayRejected,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Conflict => "conflict",
            ErrorKind::GatewayUnavailable => "gateway_unavailable",
            ErrorKind::GatewayRejected => "gateway_rejected",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    // === Not found ===
    #[error("Account {0} not found")]
    AccountNotFound(AccountId),

    #[error("External transfer not found: {0}")]
    ExternalTransferNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // === Ownership ===
    #[error("Account {0} doesn't belong to the authenticated user")]
    NotOwner(AccountId),

    // === Validation ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Sending to yourself is not permitted")]
    SameAccount,

    #[error("Account [{account_id}] currency mismatch: {actual} vs {requested}")]
    CurrencyMismatch {
        account_id: AccountId,
        actual: Currency,
        requested: Currency,
    },

    #[error("Invalid currency: {0}")]
    InvalidCurrency(#[from] CurrencyError),

    #[error("Invalid owner: {0}")]
    InvalidOwner(String),

    #[error("Insufficient balance on account {account_id}: balance {balance}, requested {amount}")]
    InsufficientBalance {
        account_id: AccountId,
        balance: i64,
        amount: i64,
    },

    #[error("Bank with code {0} is not supported")]
    UnsupportedBank(String),

    #[error("Recipient account not found at the bank")]
    RecipientNotFound,

    // === Conflict ===
    #[error("Conflict: {0}")]
    Conflict(String),

    // === Gateway (external transfer row exists and is marked failed) ===
    #[error("{message} (reference {reference})")]
    GatewayUnavailable { reference: String, message: String },

    #[error("{message} (reference {reference})")]
    GatewayRejected { reference: String, message: String },

    /// Bank accepted the transfer but the local debit could not be recorded.
    #[error("Failed to deduct balance (reference {reference})")]
    DebitFailed { reference: String },

    // === System ===
    #[error("Bank service unavailable: {0}")]
    BankServiceUnavailable(String),

    #[error("Storage temporarily unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            TransferError::ExternalTransferNotFound(_) => "EXTERNAL_TRANSFER_NOT_FOUND",
            TransferError::NotFound(_) => "NOT_FOUND",
            TransferError::NotOwner(_) => "NOT_OWNER",
            TransferError::InvalidAmount => "INVALID_AMOUNT",
            TransferError::SameAccount => "SAME_ACCOUNT",
            TransferError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            TransferError::InvalidCurrency(_) => "INVALID_CURRENCY",
            TransferError::InvalidOwner(_) => "INVALID_OWNER",
            TransferError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            TransferError::UnsupportedBank(_) => "UNSUPPORTED_BANK",
            TransferError::RecipientNotFound => "RECIPIENT_NOT_FOUND",
            TransferError::Conflict(_) => "CONFLICT",
            TransferError::GatewayUnavailable { .. } => "GATEWAY_UNAVAILABLE",
            TransferError::GatewayRejected { .. } => "GATEWAY_REJECTED",
            TransferError::DebitFailed { .. } => "DEBIT_FAILED",
            TransferError::BankServiceUnavailable(_) => "BANK_SERVICE_UNAVAILABLE",
            TransferError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            TransferError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::AccountNotFound(_)
            | TransferError::ExternalTransferNotFound(_)
            | TransferError::NotFound(_) => ErrorKind::NotFound,
            TransferError::NotOwner(_) => ErrorKind::Unauthorized,
            TransferError::InvalidAmount
            | TransferError::SameAccount
            | TransferError::CurrencyMismatch { .. }
            | TransferError::InvalidCurrency(_)
            | TransferError::InvalidOwner(_)
            | TransferError::InsufficientBalance { .. }
            | TransferError::UnsupportedBank(_)
            | TransferError::RecipientNotFound => ErrorKind::Validation,
            TransferError::Conflict(_) => ErrorKind::Conflict,
            TransferError::GatewayUnavailable { .. } | TransferError::BankServiceUnavailable(_) => {
                ErrorKind::GatewayUnavailable
            }
            TransferError::GatewayRejected { .. } => ErrorKind::GatewayRejected,
            TransferError::DebitFailed { .. }
            | TransferError::StoreUnavailable(_)
            | TransferError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::StoreUnavailable(_) => 503,
            _ => match self.kind() {
                ErrorKind::NotFound => 404,
                ErrorKind::Validation => 400,
                ErrorKind::Unauthorized => 401,
                ErrorKind::Conflict => 409,
                ErrorKind::GatewayUnavailable => 503,
                ErrorKind::GatewayRejected => 422,
                ErrorKind::Internal => 500,
            },
        }
    }

    /// Reference of the external transfer row this failure was recorded on
    pub fn reference(&self) -> Option<&str> {
        match self {
            TransferError::GatewayUnavailable { reference, .. }
            | TransferError::GatewayRejected { reference, .. }
            | TransferError::DebitFailed { reference } => Some(reference),
            _ => None,
        }
    }
}

impl From<LedgerError> for TransferError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(msg) => TransferError::NotFound(msg),
            LedgerError::Conflict(msg) => TransferError::Conflict(msg),
            LedgerError::Transient(msg) => TransferError::StoreUnavailable(msg),
            LedgerError::Internal(msg) => TransferError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TransferError::SameAccount.code(), "SAME_ACCOUNT");
        assert_eq!(
            TransferError::DebitFailed {
                reference: "EXT-1".into()
            }
            .code(),
            "DEBIT_FAILED"
        );
        assert_eq!(TransferError::NotOwner(1).code(), "NOT_OWNER");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(TransferError::AccountNotFound(1).http_status(), 404);
        assert_eq!(TransferError::NotOwner(1).http_status(), 401);
        assert_eq!(TransferError::InvalidAmount.http_status(), 400);
        assert_eq!(TransferError::Conflict("dup".into()).http_status(), 409);
        assert_eq!(
            TransferError::GatewayRejected {
                reference: "r".into(),
                message: "m".into()
            }
            .http_status(),
            422
        );
        assert_eq!(TransferError::StoreUnavailable("x".into()).http_status(), 503);
        assert_eq!(TransferError::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn test_insufficient_balance_is_validation() {
        let err = TransferError::InsufficientBalance {
            account_id: 1,
            balance: 100,
            amount: 150,
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.kind().as_str(), "validation");
    }

    #[test]
    fn test_debit_failure_distinct_from_gateway_failure() {
        let debit = TransferError::DebitFailed {
            reference: "EXT-1".into(),
        };
        let gateway = TransferError::GatewayRejected {
            reference: "EXT-1".into(),
            message: "Bank transfer failed".into(),
        };
        assert_ne!(debit.kind(), gateway.kind());
        assert_eq!(debit.reference(), Some("EXT-1"));
        assert_eq!(debit.to_string(), "Failed to deduct balance (reference EXT-1)");
    }

    #[test]
    fn test_from_ledger_error() {
        let err: TransferError = LedgerError::Transient("pool".into()).into();
        assert_eq!(err.http_status(), 503);
        let err: TransferError = LedgerError::Conflict("dup".into()).into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
