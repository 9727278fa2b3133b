//! Ledger Store contract
//!
//! `LedgerTx` is one open database transaction; `LedgerStore` opens them
//! and serves committed reads. The engines compose `LedgerTx` calls inside
//! [`Ledger::run_atomic`], which is the only concurrency-safety primitive
//! they rely on: an error from the closure rolls back every write made in
//! it, success commits them together.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::error::LedgerError;
use super::models::{
    Account, AccountId, Entry, ExternalTransfer, ExternalTransferKey, ExternalTransferUpdate,
    NewExternalTransfer, Page, Transfer,
};
use crate::currency::Currency;

#[async_trait]
pub trait LedgerTx: Send {
    /// Read the account and hold a row lock on it until commit/rollback.
    async fn lock_account(&mut self, id: AccountId) -> Result<Account, LedgerError>;

    /// Conflict if the owner already has an account in this currency.
    async fn create_account(
        &mut self,
        owner: &str,
        currency: Currency,
    ) -> Result<Account, LedgerError>;

    /// `balance += delta`. Does not enforce non-negativity; callers check the
    /// projected balance under lock before calling.
    async fn adjust_balance(&mut self, id: AccountId, delta: i64) -> Result<Account, LedgerError>;

    async fn create_entry(&mut self, account_id: AccountId, amount: i64)
    -> Result<Entry, LedgerError>;

    async fn create_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: i64,
    ) -> Result<Transfer, LedgerError>;

    async fn create_external_transfer(
        &mut self,
        new: &NewExternalTransfer,
    ) -> Result<ExternalTransfer, LedgerError>;

    /// Compare-and-set status update. Conflict if the stored status cannot
    /// move to `update.status` (in particular, from any terminal status).
    async fn update_external_transfer_status(
        &mut self,
        update: &ExternalTransferUpdate,
    ) -> Result<ExternalTransfer, LedgerError>;

    async fn commit(&mut self) -> Result<(), LedgerError>;

    async fn rollback(&mut self) -> Result<(), LedgerError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError>;

    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError>;

    async fn list_accounts(&self, owner: &str, page: Page) -> Result<Vec<Account>, LedgerError>;

    async fn get_external_transfer(
        &self,
        key: &ExternalTransferKey,
    ) -> Result<ExternalTransfer, LedgerError>;

    /// Newest first
    async fn list_external_transfers(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<ExternalTransfer>, LedgerError>;

    /// Newest first
    async fn list_entries(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Entry>, LedgerError>;

    /// Transfers where the account is sender or receiver, newest first
    async fn list_transfers(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Transfer>, LedgerError>;

    /// Non-terminal external transfers not updated for at least `older_than`,
    /// oldest first.
    async fn find_stale_external_transfers(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<ExternalTransfer>, LedgerError>;
}

/// Shared handle over a [`LedgerStore`] backend.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn LedgerStore {
        self.store.as_ref()
    }

    /// Run `f` inside one store transaction.
    ///
    /// ```ignore
    /// let entry = ledger
    ///     .run_atomic::<_, LedgerError, _>(move |tx| {
    ///         Box::pin(async move {
    ///             tx.adjust_balance(id, 100).await?;
    ///             tx.create_entry(id, 100).await
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn run_atomic<T, E, F>(&self, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<LedgerError> + std::fmt::Display + Send,
        F: for<'t> FnOnce(&'t mut dyn LedgerTx) -> BoxFuture<'t, Result<T, E>> + Send,
    {
        let mut tx = self.store.begin().await?;

        let result = f(&mut *tx).await;
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rb_err) = tx.rollback().await {
                    warn!(error = %e, rollback_error = %rb_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.store.get_account(id).await
    }

    pub async fn create_account(
        &self,
        owner: &str,
        currency: Currency,
    ) -> Result<Account, LedgerError> {
        let owner = owner.to_string();
        self.run_atomic::<_, LedgerError, _>(move |tx| {
            Box::pin(async move { tx.create_account(&owner, currency).await })
        })
        .await
    }

    pub async fn create_external_transfer(
        &self,
        new: NewExternalTransfer,
    ) -> Result<ExternalTransfer, LedgerError> {
        self.run_atomic::<_, LedgerError, _>(move |tx| {
            Box::pin(async move { tx.create_external_transfer(&new).await })
        })
        .await
    }

    pub async fn update_external_transfer_status(
        &self,
        update: ExternalTransferUpdate,
    ) -> Result<ExternalTransfer, LedgerError> {
        self.run_atomic::<_, LedgerError, _>(move |tx| {
            Box::pin(async move { tx.update_external_transfer_status(&update).await })
        })
        .await
    }

    pub async fn get_external_transfer(
        &self,
        key: &ExternalTransferKey,
    ) -> Result<ExternalTransfer, LedgerError> {
        self.store.get_external_transfer(key).await
    }

    pub async fn list_external_transfers(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<ExternalTransfer>, LedgerError> {
        self.store.list_external_transfers(account_id, page).await
    }
}
