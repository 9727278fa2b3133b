//! External Transfer Coordinator
//!
//! Drives one cross-bank transfer through its status lifecycle:
//!
//! 1. validate the sender (exists, owner, currency, balance)
//! 2. resolve the gateway for the bank code
//! 3. resolve the recipient name at the bank
//! 4. phase 1: persist the row as `pending`, then move it to `processing`
//! 5. call the bank, bounded by the gateway timeout, holding no lock
//! 6. phase 2: in one transaction, debit the sender, write the debit entry
//!    and mark the row `completed` with the bank's transaction id and fee
//!
//! Steps 1-3 write nothing. From step 4 on every failure is recorded on the
//! row as `failed` with a message. A `failed` row therefore never carries a
//! local debit. The bank leg cannot be rolled back, so a failure in step 6,
//! or a bank call with unknown outcome, is logged with
//! `reconciliation_required = true`.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use crate::bank::{BankError, BankGateway, BankRegistry, BankTransferRequest, BankTransferResponse};
use crate::config::ExternalTransferConfig;
use crate::currency::Currency;
use crate::ledger::{
    AccountId, ExternalTransfer, ExternalTransferKey, ExternalTransferStatus,
    ExternalTransferUpdate, Ledger, NewExternalTransfer, Page,
};
use crate::transfer::TransferError;
use crate::transfer::validation::{
    ensure_currency, ensure_funds, ensure_owner, ensure_positive, lookup_err,
};

pub const MSG_BANK_INSUFFICIENT_FUNDS: &str = "Insufficient funds at the bank";
pub const MSG_BANK_UNAVAILABLE: &str = "Bank API is temporarily unavailable";
pub const MSG_BANK_TRANSFER_FAILED: &str = "Bank transfer failed";
pub const MSG_BANK_GENERIC: &str = "Failed to send money to the bank";
pub const MSG_BANK_TIMEOUT: &str = "Bank response timed out; outcome unknown";
pub const MSG_DEBIT_FAILED: &str = "Failed to deduct balance";
pub const MSG_PROCESSING_FAILED: &str = "Failed to start processing";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTransferRequest {
    pub from_account_id: AccountId,
    pub bank_code: String,
    pub to_account_number: String,
    pub amount: i64,
    pub currency: Currency,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankAccountLookup {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: Option<String>,
    pub found: bool,
}

/// Local record plus the bank's current view of it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionStatus {
    pub reference: String,
    pub local_status: ExternalTransferStatus,
    pub transaction_id: Option<String>,
    /// `None` if the bank never assigned a transaction id
    pub bank_status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub gateway_timeout: Duration,
    pub reference_prefix: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(30),
            reference_prefix: "EXT".to_string(),
        }
    }
}

impl From<&ExternalTransferConfig> for CoordinatorConfig {
    fn from(cfg: &ExternalTransferConfig) -> Self {
        Self {
            gateway_timeout: cfg.gateway_timeout(),
            reference_prefix: cfg.reference_prefix.clone(),
        }
    }
}

/// Message stored on the row and the caller-facing error for a bank failure.
fn classify_bank_error(err: &BankError, reference: &str) -> (&'static str, TransferError) {
    let reference = reference.to_string();
    match err {
        BankError::InsufficientFunds => (
            MSG_BANK_INSUFFICIENT_FUNDS,
            TransferError::GatewayRejected {
                reference,
                message: MSG_BANK_INSUFFICIENT_FUNDS.to_string(),
            },
        ),
        BankError::OutcomeUnknown(_) => (
            MSG_BANK_TIMEOUT,
            TransferError::GatewayUnavailable {
                reference,
                message: MSG_BANK_TIMEOUT.to_string(),
            },
        ),
        BankError::BankUnavailable(_) => (
            MSG_BANK_UNAVAILABLE,
            TransferError::GatewayUnavailable {
                reference,
                message: MSG_BANK_UNAVAILABLE.to_string(),
            },
        ),
        BankError::TransferFailed(_) => (
            MSG_BANK_TRANSFER_FAILED,
            TransferError::GatewayRejected {
                reference,
                message: MSG_BANK_TRANSFER_FAILED.to_string(),
            },
        ),
        BankError::AccountNotFound | BankError::InvalidRequest(_) => (
            MSG_BANK_GENERIC,
            TransferError::GatewayRejected {
                reference,
                message: MSG_BANK_GENERIC.to_string(),
            },
        ),
    }
}

pub struct ExternalTransferCoordinator {
    ledger: Ledger,
    banks: BankRegistry,
    config: CoordinatorConfig,
}

impl ExternalTransferCoordinator {
    pub fn new(ledger: Ledger, banks: BankRegistry, config: CoordinatorConfig) -> Self {
        Self {
            ledger,
            banks,
            config,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn next_reference(&self) -> String {
        format!("{}-{}", self.config.reference_prefix, Ulid::new())
    }

    fn gateway(&self, bank_code: &str) -> Result<Arc<dyn BankGateway>, TransferError> {
        self.banks
            .get(bank_code)
            .map_err(|_| TransferError::UnsupportedBank(bank_code.to_string()))
    }

    async fn resolve_recipient(
        &self,
        gateway: &dyn BankGateway,
        bank_code: &str,
        account_number: &str,
    ) -> Result<String, TransferError> {
        let lookup = gateway.validate_account(bank_code, account_number);
        match tokio::time::timeout(self.config.gateway_timeout, lookup).await {
            Ok(Ok(name)) => Ok(name),
            Ok(Err(BankError::AccountNotFound)) => Err(TransferError::RecipientNotFound),
            Ok(Err(BankError::BankUnavailable(msg) | BankError::OutcomeUnknown(msg))) => {
                Err(TransferError::BankServiceUnavailable(msg))
            }
            Ok(Err(e)) => Err(TransferError::Internal(format!(
                "failed to validate recipient account: {}",
                e
            ))),
            Err(_) => Err(TransferError::BankServiceUnavailable(
                "account validation timed out".to_string(),
            )),
        }
    }

    /// Run the full workflow. On success the returned row is `completed`.
    pub async fn create(
        &self,
        owner: &str,
        req: ExternalTransferRequest,
    ) -> Result<ExternalTransfer, TransferError> {
        // 1. Validate
        ensure_positive(req.amount)?;
        let account = self
            .ledger
            .get_account(req.from_account_id)
            .await
            .map_err(lookup_err(req.from_account_id))?;
        ensure_owner(&account, owner)?;
        ensure_currency(&account, req.currency)?;
        ensure_funds(&account, req.amount)?;

        // 2-3. Resolve gateway and recipient
        let gateway = self.gateway(&req.bank_code)?;
        let recipient_name = self
            .resolve_recipient(gateway.as_ref(), &req.bank_code, &req.to_account_number)
            .await?;

        // 4. Phase 1: persist intent
        let reference = self.next_reference();
        let record = self
            .ledger
            .create_external_transfer(NewExternalTransfer {
                from_account_id: account.id,
                to_bank_code: req.bank_code.clone(),
                to_account_number: req.to_account_number.clone(),
                recipient_name,
                amount: req.amount,
                currency: req.currency,
                reference: reference.clone(),
                description: req.description.clone().filter(|d| !d.is_empty()),
            })
            .await?;
        info!(
            id = record.id,
            reference = %reference,
            from_account_id = account.id,
            bank = %req.bank_code,
            amount = req.amount,
            "External transfer recorded"
        );

        let record = match self
            .ledger
            .update_external_transfer_status(ExternalTransferUpdate::processing(record.id))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!(
                    reference = %reference,
                    error = %e,
                    "Failed to mark external transfer processing"
                );
                self.record_failure(&record, MSG_PROCESSING_FAILED).await;
                return Err(e.into());
            }
        };

        // 5. External leg, no local lock held
        let bank_req = BankTransferRequest {
            amount: record.amount,
            currency: record.currency,
            from_account_number: account.id.to_string(),
            to_account_number: record.to_account_number.clone(),
            to_bank_code: record.to_bank_code.clone(),
            recipient_name: record.recipient_name.clone(),
            reference: record.reference.clone(),
            description: record.description.clone(),
        };
        let response = self.call_bank(gateway.as_ref(), &record, &bank_req).await?;

        // 6. Phase 2: debit and completion commit together
        self.settle(&record, response).await
    }

    async fn call_bank(
        &self,
        gateway: &dyn BankGateway,
        record: &ExternalTransfer,
        bank_req: &BankTransferRequest,
    ) -> Result<BankTransferResponse, TransferError> {
        debug!(reference = %record.reference, bank = gateway.name(), "Calling bank");
        let call = gateway.transfer_money(bank_req);
        match tokio::time::timeout(self.config.gateway_timeout, call).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(BankError::OutcomeUnknown(detail))) => {
                error!(
                    reconciliation_required = true,
                    reference = %record.reference,
                    detail = %detail,
                    "Bank gave no usable answer, remote outcome unknown"
                );
                self.record_failure(record, MSG_BANK_TIMEOUT).await;
                Err(TransferError::GatewayUnavailable {
                    reference: record.reference.clone(),
                    message: MSG_BANK_TIMEOUT.to_string(),
                })
            }
            Ok(Err(e)) => {
                let (message, err) = classify_bank_error(&e, &record.reference);
                warn!(reference = %record.reference, error = %e, "Bank transfer failed");
                self.record_failure(record, message).await;
                Err(err)
            }
            Err(_) => {
                error!(
                    reconciliation_required = true,
                    reference = %record.reference,
                    timeout_ms = self.config.gateway_timeout.as_millis() as u64,
                    "Bank call timed out, remote outcome unknown"
                );
                self.record_failure(record, MSG_BANK_TIMEOUT).await;
                Err(TransferError::GatewayUnavailable {
                    reference: record.reference.clone(),
                    message: MSG_BANK_TIMEOUT.to_string(),
                })
            }
        }
    }

    async fn settle(
        &self,
        record: &ExternalTransfer,
        response: BankTransferResponse,
    ) -> Result<ExternalTransfer, TransferError> {
        let account_id = record.from_account_id;
        let amount = record.amount;
        let bank_transaction_id = response.transaction_id.clone();
        let update = ExternalTransferUpdate::completed(
            record.id,
            Some(response.transaction_id),
            Some(response.fees),
        );

        let settled = self
            .ledger
            .run_atomic::<_, TransferError, _>(move |tx| {
                Box::pin(async move {
                    let account = tx
                        .lock_account(account_id)
                        .await
                        .map_err(lookup_err(account_id))?;
                    ensure_funds(&account, amount)?;
                    tx.adjust_balance(account_id, -amount).await?;
                    tx.create_entry(account_id, -amount).await?;
                    Ok(tx.update_external_transfer_status(&update).await?)
                })
            })
            .await;

        match settled {
            Ok(done) => {
                info!(
                    reference = %done.reference,
                    transaction_id = ?done.transaction_id,
                    fees = ?done.transaction_fees,
                    "External transfer completed"
                );
                Ok(done)
            }
            Err(e) => {
                error!(
                    reconciliation_required = true,
                    reference = %record.reference,
                    account_id,
                    amount,
                    bank_transaction_id = %bank_transaction_id,
                    error = %e,
                    "Bank accepted transfer but local debit failed"
                );
                self.record_failure(record, MSG_DEBIT_FAILED).await;
                Err(TransferError::DebitFailed {
                    reference: record.reference.clone(),
                })
            }
        }
    }

    /// Mark the row failed. A failing update is logged, never propagated.
    async fn record_failure(&self, record: &ExternalTransfer, message: &str) {
        let update = ExternalTransferUpdate::failed(record.id, message);
        if let Err(e) = self.ledger.update_external_transfer_status(update).await {
            error!(
                reconciliation_required = true,
                reference = %record.reference,
                intended_message = message,
                error = %e,
                "Failed to record external transfer failure"
            );
        }
    }

    /// Resolve the holder name of an account at a bank. A missing account is
    /// reported as `found: false`, not as an error.
    pub async fn lookup_bank_account(
        &self,
        bank_code: &str,
        account_number: &str,
    ) -> Result<BankAccountLookup, TransferError> {
        let gateway = self.gateway(bank_code)?;
        let account_name = match self
            .resolve_recipient(gateway.as_ref(), bank_code, account_number)
            .await
        {
            Ok(name) => Some(name),
            Err(e) => {
                info!(bank = bank_code, account_number, error = %e, "Bank account not found");
                None
            }
        };

        Ok(BankAccountLookup {
            bank_code: bank_code.to_string(),
            account_number: account_number.to_string(),
            found: account_name.is_some(),
            account_name,
        })
    }

    /// Fetch one external transfer owned by `owner`.
    pub async fn get(
        &self,
        owner: &str,
        key: &ExternalTransferKey,
    ) -> Result<ExternalTransfer, TransferError> {
        let record = self.ledger.get_external_transfer(key).await.map_err(|e| {
            if e.is_not_found() {
                TransferError::ExternalTransferNotFound(key.to_string())
            } else {
                e.into()
            }
        })?;
        let account = self
            .ledger
            .get_account(record.from_account_id)
            .await
            .map_err(lookup_err(record.from_account_id))?;
        ensure_owner(&account, owner)?;
        Ok(record)
    }

    /// External transfers sent from `account_id`, newest first.
    pub async fn list(
        &self,
        owner: &str,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<ExternalTransfer>, TransferError> {
        let account = self
            .ledger
            .get_account(account_id)
            .await
            .map_err(lookup_err(account_id))?;
        ensure_owner(&account, owner)?;
        Ok(self.ledger.list_external_transfers(account_id, page).await?)
    }

    /// Ask the owning bank for the remote status of a transfer.
    pub async fn transaction_status(
        &self,
        owner: &str,
        reference: &str,
    ) -> Result<TransactionStatus, TransferError> {
        let record = self
            .get(owner, &ExternalTransferKey::Reference(reference.to_string()))
            .await?;

        let bank_status = match &record.transaction_id {
            None => None,
            Some(tx_id) => {
                let gateway = self.gateway(&record.to_bank_code)?;
                let query = gateway.get_transaction_status(tx_id);
                match tokio::time::timeout(self.config.gateway_timeout, query).await {
                    Ok(Ok(status)) => Some(status),
                    Ok(Err(BankError::BankUnavailable(msg) | BankError::OutcomeUnknown(msg))) => {
                        return Err(TransferError::BankServiceUnavailable(msg));
                    }
                    Ok(Err(e)) => {
                        return Err(TransferError::GatewayRejected {
                            reference: record.reference.clone(),
                            message: e.to_string(),
                        });
                    }
                    Err(_) => {
                        return Err(TransferError::BankServiceUnavailable(
                            "status lookup timed out".to_string(),
                        ));
                    }
                }
            }
        };

        Ok(TransactionStatus {
            reference: record.reference,
            local_status: record.status,
            transaction_id: record.transaction_id,
            bank_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_bank_errors() {
        let cases = [
            (BankError::InsufficientFunds, MSG_BANK_INSUFFICIENT_FUNDS),
            (BankError::BankUnavailable("down".into()), MSG_BANK_UNAVAILABLE),
            (BankError::TransferFailed("no".into()), MSG_BANK_TRANSFER_FAILED),
            (BankError::AccountNotFound, MSG_BANK_GENERIC),
            (BankError::InvalidRequest("bad".into()), MSG_BANK_GENERIC),
            (BankError::OutcomeUnknown("timed out".into()), MSG_BANK_TIMEOUT),
        ];
        for (err, expected) in cases {
            let (message, caller) = classify_bank_error(&err, "EXT-1");
            assert_eq!(message, expected);
            assert_eq!(caller.reference(), Some("EXT-1"));
        }

        let (_, caller) = classify_bank_error(&BankError::BankUnavailable("x".into()), "r");
        assert_eq!(caller.http_status(), 503);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = ExternalTransferConfig::default();
        let cfg = CoordinatorConfig::from(&settings);
        assert_eq!(cfg.gateway_timeout, Duration::from_millis(30_000));
        assert_eq!(cfg.reference_prefix, "EXT");
    }
}
