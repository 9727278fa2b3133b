//! PostgreSQL Ledger Store
//!
//! Balance mutations are serialized with `SELECT ... FOR UPDATE` row locks
//! taken through [`LedgerTx::lock_account`]. External transfer status
//! updates are compare-and-set against the allowed predecessor states.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::time::Duration;

use super::error::LedgerError;
use super::models::{
    Account, AccountId, Entry, ExternalTransfer, ExternalTransferKey, ExternalTransferUpdate,
    NewExternalTransfer, Page, Transfer,
};
use super::status::ExternalTransferStatus;
use super::store::{LedgerStore, LedgerTx};
use crate::currency::Currency;

const ACCOUNT_COLUMNS: &str = "id, owner, balance, currency, created_at";

const EXTERNAL_TRANSFER_COLUMNS: &str = "id, from_account_id, to_bank_code, to_account_number, \
     recipient_name, amount, currency, status, reference, description, transaction_id, \
     transaction_fees, error_message, created_at, updated_at";

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx: Some(tx) }))
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        let sql = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", id)))
    }

    async fn list_accounts(&self, owner: &str, page: Page) -> Result<Vec<Account>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE owner = $1 ORDER BY id LIMIT $2 OFFSET $3",
            ACCOUNT_COLUMNS
        );
        let rows = sqlx::query_as::<_, Account>(&sql)
            .bind(owner)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_external_transfer(
        &self,
        key: &ExternalTransferKey,
    ) -> Result<ExternalTransfer, LedgerError> {
        let query = match key {
            ExternalTransferKey::Id(id) => {
                let sql = format!(
                    "SELECT {} FROM external_transfers WHERE id = $1",
                    EXTERNAL_TRANSFER_COLUMNS
                );
                sqlx::query_as::<_, ExternalTransfer>(&sql)
                    .bind(*id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            ExternalTransferKey::Reference(reference) => {
                let sql = format!(
                    "SELECT {} FROM external_transfers WHERE reference = $1",
                    EXTERNAL_TRANSFER_COLUMNS
                );
                sqlx::query_as::<_, ExternalTransfer>(&sql)
                    .bind(reference)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        query.ok_or_else(|| LedgerError::NotFound(format!("external transfer {}", key)))
    }

    async fn list_external_transfers(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<ExternalTransfer>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM external_transfers WHERE from_account_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
            EXTERNAL_TRANSFER_COLUMNS
        );
        let rows = sqlx::query_as::<_, ExternalTransfer>(&sql)
            .bind(account_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_entries(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Entry>, LedgerError> {
        let rows = sqlx::query_as::<_, Entry>(
            r#"
            SELECT id, account_id, amount, created_at
            FROM entries
            WHERE account_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_transfers(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Transfer>, LedgerError> {
        let rows = sqlx::query_as::<_, Transfer>(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE from_account_id = $1 OR to_account_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_stale_external_transfers(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<ExternalTransfer>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM external_transfers \
             WHERE status = ANY($1) AND updated_at < NOW() - make_interval(secs => $2) \
             ORDER BY updated_at ASC, id ASC LIMIT $3",
            EXTERNAL_TRANSFER_COLUMNS
        );
        let open: Vec<String> = [
            ExternalTransferStatus::Pending,
            ExternalTransferStatus::Processing,
        ]
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();

        let rows = sqlx::query_as::<_, ExternalTransfer>(&sql)
            .bind(open)
            .bind(older_than.as_secs_f64())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

/// One open PostgreSQL transaction. Dropping it without commit rolls back.
pub struct PgLedgerTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgLedgerTx {
    fn conn(&mut self) -> Result<&mut PgConnection, LedgerError> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| LedgerError::Internal("transaction already finished".to_string()))
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_account(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE id = $1 FOR UPDATE",
            ACCOUNT_COLUMNS
        );
        sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", id)))
    }

    async fn create_account(
        &mut self,
        owner: &str,
        currency: Currency,
    ) -> Result<Account, LedgerError> {
        let sql = format!(
            "INSERT INTO accounts (owner, balance, currency) VALUES ($1, 0, $2) RETURNING {}",
            ACCOUNT_COLUMNS
        );
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(owner)
            .bind(currency.as_str())
            .fetch_one(self.conn()?)
            .await?;
        Ok(account)
    }

    async fn adjust_balance(&mut self, id: AccountId, delta: i64) -> Result<Account, LedgerError> {
        let sql = format!(
            "UPDATE accounts SET balance = balance + $2 WHERE id = $1 RETURNING {}",
            ACCOUNT_COLUMNS
        );
        sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(delta)
            .fetch_optional(self.conn()?)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", id)))
    }

    async fn create_entry(
        &mut self,
        account_id: AccountId,
        amount: i64,
    ) -> Result<Entry, LedgerError> {
        let entry = sqlx::query_as::<_, Entry>(
            r#"
            INSERT INTO entries (account_id, amount)
            VALUES ($1, $2)
            RETURNING id, account_id, amount, created_at
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .fetch_one(self.conn()?)
        .await?;
        Ok(entry)
    }

    async fn create_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: i64,
    ) -> Result<Transfer, LedgerError> {
        let transfer = sqlx::query_as::<_, Transfer>(
            r#"
            INSERT INTO transfers (from_account_id, to_account_id, amount)
            VALUES ($1, $2, $3)
            RETURNING id, from_account_id, to_account_id, amount, created_at
            "#,
        )
        .bind(from_account_id)
        .bind(to_account_id)
        .bind(amount)
        .fetch_one(self.conn()?)
        .await?;
        Ok(transfer)
    }

    async fn create_external_transfer(
        &mut self,
        new: &NewExternalTransfer,
    ) -> Result<ExternalTransfer, LedgerError> {
        let sql = format!(
            "INSERT INTO external_transfers \
                (from_account_id, to_bank_code, to_account_number, recipient_name, \
                 amount, currency, status, reference, description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {}",
            EXTERNAL_TRANSFER_COLUMNS
        );
        let record = sqlx::query_as::<_, ExternalTransfer>(&sql)
            .bind(new.from_account_id)
            .bind(&new.to_bank_code)
            .bind(&new.to_account_number)
            .bind(&new.recipient_name)
            .bind(new.amount)
            .bind(new.currency.as_str())
            .bind(ExternalTransferStatus::Pending.as_str())
            .bind(&new.reference)
            .bind(&new.description)
            .fetch_one(self.conn()?)
            .await?;
        Ok(record)
    }

    async fn update_external_transfer_status(
        &mut self,
        update: &ExternalTransferUpdate,
    ) -> Result<ExternalTransfer, LedgerError> {
        let sql = format!(
            "UPDATE external_transfers SET \
                status = $2, \
                transaction_id = COALESCE($3, transaction_id), \
                transaction_fees = COALESCE($4, transaction_fees), \
                error_message = COALESCE($5, error_message), \
                updated_at = NOW() \
             WHERE id = $1 AND status = ANY($6) \
             RETURNING {}",
            EXTERNAL_TRANSFER_COLUMNS
        );
        let expected: Vec<String> = update
            .status
            .predecessors()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let updated = sqlx::query_as::<_, ExternalTransfer>(&sql)
            .bind(update.id)
            .bind(update.status.as_str())
            .bind(&update.transaction_id)
            .bind(update.transaction_fees)
            .bind(&update.error_message)
            .bind(expected)
            .fetch_optional(self.conn()?)
            .await?;

        if let Some(record) = updated {
            return Ok(record);
        }

        // CAS miss: distinguish a missing row from a refused transition
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM external_transfers WHERE id = $1")
                .bind(update.id)
                .fetch_optional(self.conn()?)
                .await?;
        match current {
            None => Err(LedgerError::NotFound(format!(
                "external transfer id={}",
                update.id
            ))),
            Some(status) => Err(LedgerError::Conflict(format!(
                "external transfer {} is {}, cannot move to {}",
                update.id, status, update.status
            ))),
        }
    }

    async fn commit(&mut self) -> Result<(), LedgerError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| LedgerError::Internal("transaction already finished".to_string()))?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), LedgerError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
