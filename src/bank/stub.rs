//! In-process bank gateway
//!
//! Scriptable stand-in for a real bank: known accounts, forced transfer
//! failures, artificial latency and call counters. Used by the test-suite
//! and for local runs without a bank sandbox.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{BankError, BankGateway, BankTransferRequest, BankTransferResponse};

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[derive(Debug)]
pub struct StubBank {
    code: String,
    accounts: Mutex<HashMap<String, String>>,
    transactions: Mutex<HashMap<String, String>>,
    fail_transfer: Mutex<Option<BankError>>,
    fail_validate: Mutex<Option<BankError>>,
    transfer_delay: Mutex<Option<Duration>>,
    fees: Mutex<i64>,
    transfer_count: AtomicUsize,
    validate_count: AtomicUsize,
    status_count: AtomicUsize,
}

impl StubBank {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            accounts: Mutex::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
            fail_transfer: Mutex::new(None),
            fail_validate: Mutex::new(None),
            transfer_delay: Mutex::new(None),
            fees: Mutex::new(0),
            transfer_count: AtomicUsize::new(0),
            validate_count: AtomicUsize::new(0),
            status_count: AtomicUsize::new(0),
        }
    }

    /// Register an account the bank will resolve.
    pub fn with_account(self, account_number: &str, holder: &str) -> Self {
        locked(&self.accounts).insert(account_number.to_string(), holder.to_string());
        self
    }

    /// Fail every subsequent `transfer_money` with `err`; `None` restores success.
    pub fn set_fail_transfer(&self, err: Option<BankError>) {
        *locked(&self.fail_transfer) = err;
    }

    pub fn set_fail_validate(&self, err: Option<BankError>) {
        *locked(&self.fail_validate) = err;
    }

    /// Sleep this long inside `transfer_money` before answering.
    pub fn set_transfer_delay(&self, delay: Option<Duration>) {
        *locked(&self.transfer_delay) = delay;
    }

    pub fn set_fees(&self, fees: i64) {
        *locked(&self.fees) = fees;
    }

    pub fn transfer_count(&self) -> usize {
        self.transfer_count.load(Ordering::SeqCst)
    }

    pub fn validate_count(&self) -> usize {
        self.validate_count.load(Ordering::SeqCst)
    }

    pub fn status_count(&self) -> usize {
        self.status_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BankGateway for StubBank {
    fn name(&self) -> &str {
        &self.code
    }

    async fn transfer_money(
        &self,
        req: &BankTransferRequest,
    ) -> Result<BankTransferResponse, BankError> {
        let n = self.transfer_count.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = *locked(&self.transfer_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = locked(&self.fail_transfer).clone() {
            return Err(err);
        }
        if !locked(&self.accounts).contains_key(&req.to_account_number) {
            return Err(BankError::AccountNotFound);
        }

        let transaction_id = format!("{}-TX-{:06}", self.code, n);
        locked(&self.transactions).insert(transaction_id.clone(), "completed".to_string());

        Ok(BankTransferResponse {
            transaction_id,
            status: "completed".to_string(),
            message: format!("transfer {} accepted", req.reference),
            fees: *locked(&self.fees),
        })
    }

    async fn validate_account(
        &self,
        _bank_code: &str,
        account_number: &str,
    ) -> Result<String, BankError> {
        self.validate_count.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = locked(&self.fail_validate).clone() {
            return Err(err);
        }
        locked(&self.accounts)
            .get(account_number)
            .cloned()
            .ok_or(BankError::AccountNotFound)
    }

    async fn get_transaction_status(&self, transaction_id: &str) -> Result<String, BankError> {
        self.status_count.fetch_add(1, Ordering::SeqCst);
        locked(&self.transactions)
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| {
                BankError::TransferFailed(format!("unknown transaction {}", transaction_id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;

    fn request(to: &str) -> BankTransferRequest {
        BankTransferRequest {
            amount: 100,
            currency: Currency::Etb,
            from_account_number: "1".into(),
            to_account_number: to.into(),
            to_bank_code: "CBE".into(),
            recipient_name: "Abebe".into(),
            reference: "EXT-1".into(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_stub_success_and_status() {
        let bank = StubBank::new("CBE").with_account("1000", "Abebe Kebede");
        bank.set_fees(5);

        assert_eq!(bank.validate_account("CBE", "1000").await.unwrap(), "Abebe Kebede");
        let resp = bank.transfer_money(&request("1000")).await.unwrap();
        assert_eq!(resp.fees, 5);
        assert_eq!(
            bank.get_transaction_status(&resp.transaction_id).await.unwrap(),
            "completed"
        );
        assert_eq!(bank.transfer_count(), 1);
        assert_eq!(bank.validate_count(), 1);
        assert_eq!(bank.status_count(), 1);
    }

    #[tokio::test]
    async fn test_stub_failures() {
        let bank = StubBank::new("CBE").with_account("1000", "Abebe Kebede");
        assert_eq!(
            bank.validate_account("CBE", "2000").await,
            Err(BankError::AccountNotFound)
        );

        bank.set_fail_transfer(Some(BankError::InsufficientFunds));
        assert_eq!(
            bank.transfer_money(&request("1000")).await,
            Err(BankError::InsufficientFunds)
        );
        bank.set_fail_transfer(None);
        assert!(bank.transfer_money(&request("1000")).await.is_ok());
        assert_eq!(bank.transfer_count(), 2);
    }
}
