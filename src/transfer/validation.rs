//! Precondition checks shared by the transfer engines

use super::error::TransferError;
use crate::currency::Currency;
use crate::ledger::{Account, AccountId, LedgerError};

pub fn ensure_positive(amount: i64) -> Result<(), TransferError> {
    if amount <= 0 {
        return Err(TransferError::InvalidAmount);
    }
    Ok(())
}

pub fn ensure_owner(account: &Account, owner: &str) -> Result<(), TransferError> {
    if !account.is_owned_by(owner) {
        return Err(TransferError::NotOwner(account.id));
    }
    Ok(())
}

pub fn ensure_currency(account: &Account, requested: Currency) -> Result<(), TransferError> {
    if account.currency != requested {
        return Err(TransferError::CurrencyMismatch {
            account_id: account.id,
            actual: account.currency,
            requested,
        });
    }
    Ok(())
}

/// Balance must cover the debit exactly or better.
pub fn ensure_funds(account: &Account, amount: i64) -> Result<(), TransferError> {
    if account.balance < amount {
        return Err(TransferError::InsufficientBalance {
            account_id: account.id,
            balance: account.balance,
            amount,
        });
    }
    Ok(())
}

/// Map a store lookup failure on `id`, turning NotFound into AccountNotFound.
pub fn lookup_err(id: AccountId) -> impl Fn(LedgerError) -> TransferError {
    move |e| match e {
        LedgerError::NotFound(_) => TransferError::AccountNotFound(id),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn account(balance: i64) -> Account {
        Account {
            id: 5,
            owner: "alice".into(),
            balance,
            currency: Currency::Etb,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_exact_balance_is_enough() {
        assert!(ensure_funds(&account(1000), 1000).is_ok());
        assert!(matches!(
            ensure_funds(&account(100), 150),
            Err(TransferError::InsufficientBalance { balance: 100, amount: 150, .. })
        ));
    }

    #[test]
    fn test_currency_and_owner() {
        let a = account(0);
        assert!(ensure_currency(&a, Currency::Etb).is_ok());
        assert!(matches!(
            ensure_currency(&a, Currency::Usd),
            Err(TransferError::CurrencyMismatch { .. })
        ));
        assert!(ensure_owner(&a, "alice").is_ok());
        assert_eq!(ensure_owner(&a, "bob"), Err(TransferError::NotOwner(5)));
    }

    #[test]
    fn test_amount_must_be_positive() {
        assert_eq!(ensure_positive(0), Err(TransferError::InvalidAmount));
        assert_eq!(ensure_positive(-3), Err(TransferError::InvalidAmount));
        assert!(ensure_positive(1).is_ok());
    }

    #[test]
    fn test_lookup_err_maps_not_found() {
        let map = lookup_err(9);
        assert_eq!(
            map(LedgerError::NotFound("x".into())),
            TransferError::AccountNotFound(9)
        );
        assert!(matches!(
            map(LedgerError::Transient("x".into())),
            TransferError::StoreUnavailable(_)
        ));
    }
}
