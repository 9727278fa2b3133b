//! Unified transaction history
//!
//! One newest-first view per account over three sources:
//! internal transfers (both directions), top-ups (sender is the funding
//! sentinel) and external transfers (always outgoing).

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::currency::Currency;
use crate::ledger::{AccountId, ExternalTransfer, Ledger, Page, Transfer};
use crate::transfer::TransferError;
use crate::transfer::validation::{ensure_owner, lookup_err};

const TOP_UP_DESCRIPTION: &str = "Account top-up";
const INTERNAL_STATUS: &str = "completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    InternalTransfer,
    ExternalTransfer,
    TopUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryItem {
    /// Transfer id or external transfer id, depending on `kind`
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub direction: Direction,
    pub amount: i64,
    pub currency: Currency,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty_id: Option<AccountId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_fees: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl HistoryItem {
    fn from_transfer(account_id: AccountId, currency: Currency, t: &Transfer) -> Self {
        let (kind, direction, counterparty_id, description) = if t.is_top_up() {
            (
                TransactionType::TopUp,
                Direction::Incoming,
                None,
                Some(TOP_UP_DESCRIPTION.to_string()),
            )
        } else if t.from_account_id == account_id {
            (
                TransactionType::InternalTransfer,
                Direction::Outgoing,
                Some(t.to_account_id),
                None,
            )
        } else {
            (
                TransactionType::InternalTransfer,
                Direction::Incoming,
                Some(t.from_account_id),
                None,
            )
        };

        Self {
            id: t.id,
            kind,
            direction,
            amount: t.amount,
            currency,
            status: INTERNAL_STATUS.to_string(),
            reference: None,
            description,
            counterparty_id,
            counterparty_name: None,
            bank_code: None,
            account_number: None,
            transaction_fees: None,
            created_at: t.created_at,
        }
    }

    fn from_external(t: &ExternalTransfer) -> Self {
        Self {
            id: t.id,
            kind: TransactionType::ExternalTransfer,
            direction: Direction::Outgoing,
            amount: t.amount,
            currency: t.currency,
            status: t.status.as_str().to_string(),
            reference: Some(t.reference.clone()),
            description: t.description.clone(),
            counterparty_id: None,
            counterparty_name: Some(t.recipient_name.clone()),
            bank_code: Some(t.to_bank_code.clone()),
            account_number: Some(t.to_account_number.clone()),
            transaction_fees: t.transaction_fees,
            created_at: t.created_at,
        }
    }
}

#[derive(Clone)]
pub struct HistoryService {
    ledger: Ledger,
}

impl HistoryService {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Newest-first history of `account_id`, paged over the merged view.
    pub async fn history(
        &self,
        owner: &str,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<HistoryItem>, TransferError> {
        let account = self
            .ledger
            .get_account(account_id)
            .await
            .map_err(lookup_err(account_id))?;
        ensure_owner(&account, owner)?;

        // Any item on the requested page is within the first offset+limit of
        // its own source, so that prefix of each source is enough.
        let window = Page {
            limit: page.offset.saturating_add(page.limit),
            offset: 0,
        };

        let store = self.ledger.store();
        let transfers = store.list_transfers(account_id, window).await?;
        let externals = store.list_external_transfers(account_id, window).await?;

        let mut items: Vec<HistoryItem> = transfers
            .iter()
            .map(|t| HistoryItem::from_transfer(account_id, account.currency, t))
            .chain(externals.iter().map(HistoryItem::from_external))
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let range = page.range(items.len());
        Ok(items.drain(range).collect())
    }
}
