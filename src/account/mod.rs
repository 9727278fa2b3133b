//! Account Service
//!
//! Opens and reads ledger accounts on behalf of an authenticated owner.
//! An owner holds at most one account per currency.

pub mod validation;

use tracing::info;

use crate::currency::Currency;
use crate::ledger::{Account, AccountId, Ledger, LedgerError, Page};
use crate::transfer::TransferError;
use crate::transfer::validation::{ensure_owner, lookup_err};

pub use validation::{OwnerName, ValidationError};

#[derive(Clone)]
pub struct AccountService {
    ledger: Ledger,
}

impl AccountService {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Open a zero-balance account. Conflict if the owner already has one in
    /// this currency.
    pub async fn open_account(
        &self,
        owner: &str,
        currency: &str,
    ) -> Result<Account, TransferError> {
        let owner =
            OwnerName::new(owner).map_err(|e| TransferError::InvalidOwner(e.to_string()))?;
        let currency = Currency::parse(currency)?;

        let account = self
            .ledger
            .create_account(owner.as_str(), currency)
            .await
            .map_err(|e| match e {
                LedgerError::Conflict(_) => TransferError::Conflict(format!(
                    "{} already has a {} account",
                    owner, currency
                )),
                other => other.into(),
            })?;

        info!(
            account_id = account.id,
            owner = %account.owner,
            currency = %account.currency,
            "Account opened"
        );
        Ok(account)
    }

    pub async fn get_account(&self, owner: &str, id: AccountId) -> Result<Account, TransferError> {
        let account = self.ledger.get_account(id).await.map_err(lookup_err(id))?;
        ensure_owner(&account, owner)?;
        Ok(account)
    }

    pub async fn list_accounts(
        &self,
        owner: &str,
        page: Page,
    ) -> Result<Vec<Account>, TransferError> {
        Ok(self.ledger.store().list_accounts(owner, page).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedgerStore;
    use std::sync::Arc;

    fn service() -> AccountService {
        AccountService::new(Ledger::new(Arc::new(MemoryLedgerStore::new())))
    }

    #[tokio::test]
    async fn test_open_account_starts_at_zero() {
        let svc = service();
        let account = svc.open_account("alice", "ETB").await.unwrap();
        assert_eq!(account.balance, 0);
        assert_eq!(account.currency, Currency::Etb);
        assert_eq!(account.owner, "alice");
    }

    #[tokio::test]
    async fn test_one_account_per_currency() {
        let svc = service();
        svc.open_account("alice", "ETB").await.unwrap();
        svc.open_account("alice", "USD").await.unwrap();

        let err = svc.open_account("alice", "ETB").await.unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
        assert_eq!(err.http_status(), 409);

        // Another owner may hold the same currency
        assert!(svc.open_account("bob", "ETB").await.is_ok());
    }

    #[tokio::test]
    async fn test_open_account_rejects_bad_input() {
        let svc = service();
        let err = svc.open_account("alice", "EUR").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_CURRENCY");

        // Codes are case-sensitive
        let err = svc.open_account("alice", "etb").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_CURRENCY");

        let err = svc.open_account("", "ETB").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_OWNER");
    }

    #[tokio::test]
    async fn test_get_account_checks_owner() {
        let svc = service();
        let account = svc.open_account("alice", "ETB").await.unwrap();

        assert_eq!(svc.get_account("alice", account.id).await.unwrap(), account);
        assert_eq!(
            svc.get_account("mallory", account.id).await.unwrap_err(),
            TransferError::NotOwner(account.id)
        );
        assert_eq!(
            svc.get_account("alice", 9_999).await.unwrap_err(),
            TransferError::AccountNotFound(9_999)
        );
    }

    #[tokio::test]
    async fn test_list_accounts_only_returns_own() {
        let svc = service();
        svc.open_account("alice", "ETB").await.unwrap();
        svc.open_account("alice", "USD").await.unwrap();
        svc.open_account("bob", "ETB").await.unwrap();

        let accounts = svc.list_accounts("alice", Page::default()).await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts.iter().all(|a| a.owner == "alice"));

        let first = svc.list_accounts("alice", Page::new(1, 0)).await.unwrap();
        assert_eq!(first.len(), 1);
    }
}
