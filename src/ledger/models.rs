//! Ledger records
//!
//! Amounts and balances are signed `i64` minor units of the account currency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::ExternalTransferStatus;
use crate::currency::Currency;

pub type AccountId = i64;

/// `from_account_id` of a top-up: money entered from outside the ledger.
pub const EXTERNAL_FUNDING_ACCOUNT: AccountId = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    pub balance: i64,
    #[sqlx(try_from = "String")]
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }
}

/// Immutable posting of one signed balance delta
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Entry {
    pub id: i64,
    pub account_id: AccountId,
    /// Positive = credit, negative = debit
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Transfer {
    pub id: i64,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl Transfer {
    pub fn is_top_up(&self) -> bool {
        self.from_account_id == EXTERNAL_FUNDING_ACCOUNT
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ExternalTransfer {
    pub id: i64,
    pub from_account_id: AccountId,
    pub to_bank_code: String,
    pub to_account_number: String,
    pub recipient_name: String,
    pub amount: i64,
    #[sqlx(try_from = "String")]
    pub currency: Currency,
    #[sqlx(try_from = "String")]
    pub status: ExternalTransferStatus,
    pub reference: String,
    pub description: Option<String>,
    /// Bank-assigned; set only on success
    pub transaction_id: Option<String>,
    pub transaction_fees: Option<i64>,
    /// Set only on failure
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert parameters; the row always starts in `pending`.
#[derive(Debug, Clone)]
pub struct NewExternalTransfer {
    pub from_account_id: AccountId,
    pub to_bank_code: String,
    pub to_account_number: String,
    pub recipient_name: String,
    pub amount: i64,
    pub currency: Currency,
    pub reference: String,
    pub description: Option<String>,
}

/// Partial update: `None` fields keep their stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTransferUpdate {
    pub id: i64,
    pub status: ExternalTransferStatus,
    pub transaction_id: Option<String>,
    pub transaction_fees: Option<i64>,
    pub error_message: Option<String>,
}

impl ExternalTransferUpdate {
    pub fn processing(id: i64) -> Self {
        Self {
            id,
            status: ExternalTransferStatus::Processing,
            transaction_id: None,
            transaction_fees: None,
            error_message: None,
        }
    }

    pub fn completed(id: i64, transaction_id: Option<String>, fees: Option<i64>) -> Self {
        Self {
            id,
            status: ExternalTransferStatus::Completed,
            transaction_id: transaction_id.filter(|t| !t.is_empty()),
            transaction_fees: fees.filter(|f| *f > 0),
            error_message: None,
        }
    }

    pub fn failed(id: i64, error_message: impl Into<String>) -> Self {
        Self {
            id,
            status: ExternalTransferStatus::Failed,
            transaction_id: None,
            transaction_fees: None,
            error_message: Some(error_message.into()),
        }
    }

    /// Apply onto an in-memory record with the same semantics as the SQL update.
    pub fn apply_to(&self, record: &mut ExternalTransfer, now: DateTime<Utc>) {
        record.status = self.status;
        if let Some(tx_id) = &self.transaction_id {
            record.transaction_id = Some(tx_id.clone());
        }
        if let Some(fees) = self.transaction_fees {
            record.transaction_fees = Some(fees);
        }
        if let Some(msg) = &self.error_message {
            record.error_message = Some(msg.clone());
        }
        record.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalTransferKey {
    Id(i64),
    Reference(String),
}

impl std::fmt::Display for ExternalTransferKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExternalTransferKey::Id(id) => write!(f, "id={}", id),
            ExternalTransferKey::Reference(r) => write!(f, "reference={}", r),
        }
    }
}

/// Limit/offset paging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset: offset.max(0),
        }
    }

    /// 1-based page number
    pub fn numbered(page_id: u32, page_size: u32) -> Self {
        let size = i64::from(page_size.max(1));
        let offset = i64::from(page_id.max(1) - 1) * size;
        Self::new(size, offset)
    }

    pub fn range(&self, len: usize) -> std::ops::Range<usize> {
        let start = (self.offset as usize).min(len);
        let end = start.saturating_add(self.limit as usize).min(len);
        start..end
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(10, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: ExternalTransferStatus) -> ExternalTransfer {
        let now = Utc::now();
        ExternalTransfer {
            id: 7,
            from_account_id: 1,
            to_bank_code: "CBE".into(),
            to_account_number: "1000123456".into(),
            recipient_name: "Abebe Kebede".into(),
            amount: 500,
            currency: Currency::Etb,
            status,
            reference: "EXT-1".into(),
            description: None,
            transaction_id: None,
            transaction_fees: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_partial_update_keeps_unset_fields() {
        let mut record = sample(ExternalTransferStatus::Processing);
        record.transaction_id = Some("TX-1".into());

        ExternalTransferUpdate::failed(7, "boom").apply_to(&mut record, Utc::now());

        assert_eq!(record.status, ExternalTransferStatus::Failed);
        assert_eq!(record.transaction_id.as_deref(), Some("TX-1"));
        assert_eq!(record.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_completed_drops_empty_values() {
        let update = ExternalTransferUpdate::completed(1, Some(String::new()), Some(0));
        assert_eq!(update.transaction_id, None);
        assert_eq!(update.transaction_fees, None);
    }

    #[test]
    fn test_page_numbered() {
        let page = Page::numbered(3, 5);
        assert_eq!(page, Page { limit: 5, offset: 10 });
        assert_eq!(Page::numbered(0, 0), Page { limit: 1, offset: 0 });
        assert_eq!(page.range(12), 10..12);
        assert_eq!(page.range(4), 4..4);
    }

    #[test]
    fn test_top_up_sentinel() {
        let t = Transfer {
            id: 1,
            from_account_id: EXTERNAL_FUNDING_ACCOUNT,
            to_account_id: 3,
            amount: 10,
            created_at: Utc::now(),
        };
        assert!(t.is_top_up());
    }
}
