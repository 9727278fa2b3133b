//! Internal Transfer Engine
//!
//! Moves funds between two accounts of the same ledger in one store
//! transaction: one Transfer row, a debit and a credit Entry, and the two
//! balance adjustments. Account rows are always locked and mutated in
//! ascending id order, whichever side is debited, so that opposite-direction
//! transfers between the same pair cannot deadlock.

use serde::Serialize;
use tracing::{debug, info};

use super::error::TransferError;
use super::validation::{ensure_currency, ensure_funds, ensure_owner, ensure_positive, lookup_err};
use crate::currency::Currency;
use crate::ledger::{Account, AccountId, Entry, Ledger, Transfer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub transfer: Transfer,
    /// Post-transfer balance
    pub from_account: Account,
    /// Post-transfer balance
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

#[derive(Clone)]
pub struct InternalTransferEngine {
    ledger: Ledger,
}

impl InternalTransferEngine {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Caller-side preconditions against committed state: both accounts
    /// exist and use the requested currency, the sender belongs to `owner`,
    /// differs from the receiver and can cover the amount.
    pub async fn validate(&self, owner: &str, req: &TransferRequest) -> Result<(), TransferError> {
        ensure_positive(req.amount)?;

        let from = self
            .ledger
            .get_account(req.from_account_id)
            .await
            .map_err(lookup_err(req.from_account_id))?;
        ensure_currency(&from, req.currency)?;
        ensure_owner(&from, owner)?;

        let to = self
            .ledger
            .get_account(req.to_account_id)
            .await
            .map_err(lookup_err(req.to_account_id))?;
        ensure_currency(&to, req.currency)?;

        if req.from_account_id == req.to_account_id {
            return Err(TransferError::SameAccount);
        }
        ensure_funds(&from, req.amount)
    }

    /// Validate, then move the funds atomically.
    pub async fn transfer(
        &self,
        owner: &str,
        req: TransferRequest,
    ) -> Result<TransferResult, TransferError> {
        self.validate(owner, &req).await?;
        self.execute(req).await
    }

    /// Move the funds atomically. Currency and balance are re-checked under
    /// the row locks, so a concurrent debit that landed after `validate`
    /// still fails with `InsufficientBalance`.
    pub async fn execute(&self, req: TransferRequest) -> Result<TransferResult, TransferError> {
        ensure_positive(req.amount)?;
        if req.from_account_id == req.to_account_id {
            return Err(TransferError::SameAccount);
        }

        let TransferRequest {
            from_account_id: from,
            to_account_id: to,
            amount,
            currency,
        } = req;
        let (first, second) = if from < to { (from, to) } else { (to, from) };
        let from_is_first = first == from;

        let result = self
            .ledger
            .run_atomic::<_, TransferError, _>(move |tx| {
                Box::pin(async move {
                    let first_acc = tx.lock_account(first).await.map_err(lookup_err(first))?;
                    let second_acc = tx.lock_account(second).await.map_err(lookup_err(second))?;
                    debug!(first, second, "Transfer accounts locked");

                    let (sender, receiver) = if from_is_first {
                        (&first_acc, &second_acc)
                    } else {
                        (&second_acc, &first_acc)
                    };
                    ensure_currency(sender, currency)?;
                    ensure_currency(receiver, currency)?;
                    ensure_funds(sender, amount)?;

                    let transfer = tx.create_transfer(from, to, amount).await?;
                    let from_entry = tx.create_entry(from, -amount).await?;
                    let to_entry = tx.create_entry(to, amount).await?;

                    let (first_delta, second_delta) = if from_is_first {
                        (-amount, amount)
                    } else {
                        (amount, -amount)
                    };
                    let first_after = tx.adjust_balance(first, first_delta).await?;
                    let second_after = tx.adjust_balance(second, second_delta).await?;

                    let (from_account, to_account) = if from_is_first {
                        (first_after, second_after)
                    } else {
                        (second_after, first_after)
                    };

                    Ok(TransferResult {
                        transfer,
                        from_account,
                        to_account,
                        from_entry,
                        to_entry,
                    })
                })
            })
            .await?;

        info!(
            transfer_id = result.transfer.id,
            from_account_id = from,
            to_account_id = to,
            amount,
            currency = %currency,
            "Internal transfer committed"
        );
        Ok(result)
    }
}
