//! Store error taxonomy

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness or foreign-key violation, or a refused status transition
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Connection loss, timeout, serialization failure or deadlock victim.
    /// Safe to retry at the caller's discretion.
    #[error("Transient store error: {0}")]
    Transient(String),

    #[error("Internal store error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound(_))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => LedgerError::NotFound(e.to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // unique_violation, foreign_key_violation
                Some("23505") | Some("23503") => LedgerError::Conflict(db.message().to_string()),
                // serialization_failure, deadlock_detected, lock_not_available
                Some("40001") | Some("40P01") | Some("55P03") => {
                    LedgerError::Transient(db.message().to_string())
                }
                _ => LedgerError::Internal(e.to_string()),
            },
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => LedgerError::Transient(e.to_string()),
            _ => LedgerError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: LedgerError = sqlx::Error::RowNotFound.into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_pool_errors_are_retryable() {
        let err: LedgerError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_retryable());

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: LedgerError = sqlx::Error::Io(io).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_errors_are_internal() {
        let err: LedgerError = sqlx::Error::Protocol("bad frame".into()).into();
        assert!(matches!(err, LedgerError::Internal(_)));
        assert!(!err.is_retryable());
    }
}
