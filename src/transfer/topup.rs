//! Top-Up Engine
//!
//! Credits one account from outside the ledger. The Transfer row records the
//! external-funding sentinel as its sender.

use serde::Serialize;
use tracing::info;

use super::error::TransferError;
use super::validation::{ensure_currency, ensure_owner, ensure_positive, lookup_err};
use crate::currency::Currency;
use crate::ledger::{Account, AccountId, EXTERNAL_FUNDING_ACCOUNT, Entry, Ledger, Transfer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopUpRequest {
    pub account_id: AccountId,
    pub amount: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopUpResult {
    pub transfer: Transfer,
    /// Post-top-up balance
    pub account: Account,
    pub entry: Entry,
}

#[derive(Clone)]
pub struct TopUpEngine {
    ledger: Ledger,
}

impl TopUpEngine {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Check ownership and currency against committed state, then credit.
    pub async fn top_up(
        &self,
        owner: &str,
        req: TopUpRequest,
    ) -> Result<TopUpResult, TransferError> {
        ensure_positive(req.amount)?;
        let account = self
            .ledger
            .get_account(req.account_id)
            .await
            .map_err(lookup_err(req.account_id))?;
        ensure_owner(&account, owner)?;
        ensure_currency(&account, req.currency)?;

        self.credit(req.account_id, req.amount).await
    }

    /// Lock the account row, then record the sentinel transfer, the credit
    /// entry and the balance change in one transaction.
    pub async fn credit(
        &self,
        account_id: AccountId,
        amount: i64,
    ) -> Result<TopUpResult, TransferError> {
        ensure_positive(amount)?;

        let result = self
            .ledger
            .run_atomic::<_, TransferError, _>(move |tx| {
                Box::pin(async move {
                    tx.lock_account(account_id)
                        .await
                        .map_err(lookup_err(account_id))?;

                    let transfer = tx
                        .create_transfer(EXTERNAL_FUNDING_ACCOUNT, account_id, amount)
                        .await?;
                    let entry = tx.create_entry(account_id, amount).await?;
                    let account = tx.adjust_balance(account_id, amount).await?;

                    Ok(TopUpResult {
                        transfer,
                        account,
                        entry,
                    })
                })
            })
            .await?;

        info!(
            transfer_id = result.transfer.id,
            account_id,
            amount,
            balance = result.account.balance,
            "Top-up committed"
        );
        Ok(result)
    }
}
