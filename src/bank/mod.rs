//! Bank Gateway Abstraction
//!
//! Every bank integration implements [`BankGateway`]. The external transfer
//! state machine only ever sees `Arc<dyn BankGateway>` handed out by a
//! [`BankRegistry`], which is assembled once at startup and immutable after.

pub mod http;
pub mod stub;

pub use http::HttpBankGateway;
pub use stub::StubBank;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

use crate::config::BankConfig;
use crate::currency::Currency;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    #[error("Account not found at bank")]
    AccountNotFound,

    #[error("Insufficient funds for transfer")]
    InsufficientFunds,

    #[error("Bank API is not available: {0}")]
    BankUnavailable(String),

    #[error("Bank transfer failed: {0}")]
    TransferFailed(String),

    #[error("Invalid bank request: {0}")]
    InvalidRequest(String),

    /// The request may have reached the bank but no usable answer came back
    /// (timeout, broken read, unparseable success body).
    #[error("Bank outcome unknown: {0}")]
    OutcomeUnknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankTransferRequest {
    pub amount: i64,
    pub currency: Currency,
    pub from_account_number: String,
    pub to_account_number: String,
    pub to_bank_code: String,
    pub recipient_name: String,
    pub reference: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankTransferResponse {
    /// Bank-assigned id; may be empty if the bank does not issue one
    pub transaction_id: String,
    pub status: String,
    pub message: String,
    /// Minor units; 0 when the bank charges nothing
    pub fees: i64,
}

#[async_trait]
pub trait BankGateway: Send + Sync + Debug {
    /// Gateway name for logging
    fn name(&self) -> &str;

    async fn transfer_money(
        &self,
        req: &BankTransferRequest,
    ) -> Result<BankTransferResponse, BankError>;

    /// Resolve the display name of the holder of `account_number`.
    async fn validate_account(
        &self,
        bank_code: &str,
        account_number: &str,
    ) -> Result<String, BankError>;

    async fn get_transaction_status(&self, transaction_id: &str) -> Result<String, BankError>;
}

/// Routing code → gateway. Built once, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct BankRegistry {
    gateways: Arc<HashMap<String, Arc<dyn BankGateway>>>,
}

impl BankRegistry {
    pub fn builder() -> BankRegistryBuilder {
        BankRegistryBuilder::default()
    }

    /// One HTTP gateway per configured bank.
    pub fn from_config(banks: &[BankConfig]) -> Result<Self, BankError> {
        let mut builder = Self::builder();
        for bank in banks {
            builder = builder.register(&bank.code, Arc::new(HttpBankGateway::new(bank)?));
        }
        Ok(builder.build())
    }

    /// Unregistered codes yield `BankUnavailable`.
    pub fn get(&self, bank_code: &str) -> Result<Arc<dyn BankGateway>, BankError> {
        self.gateways
            .get(bank_code)
            .cloned()
            .ok_or_else(|| {
                BankError::BankUnavailable(format!("no gateway for bank {}", bank_code))
            })
    }

    pub fn contains(&self, bank_code: &str) -> bool {
        self.gateways.contains_key(bank_code)
    }

    /// Registered routing codes, sorted
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.gateways.keys().cloned().collect();
        codes.sort();
        codes
    }

    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }
}

#[derive(Default)]
pub struct BankRegistryBuilder {
    gateways: HashMap<String, Arc<dyn BankGateway>>,
}

impl BankRegistryBuilder {
    /// Later registrations for the same code replace earlier ones.
    pub fn register(mut self, bank_code: &str, gateway: Arc<dyn BankGateway>) -> Self {
        self.gateways.insert(bank_code.to_string(), gateway);
        self
    }

    pub fn build(self) -> BankRegistry {
        BankRegistry {
            gateways: Arc::new(self.gateways),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_code_is_unavailable() {
        let registry = BankRegistry::builder()
            .register("CBE", Arc::new(StubBank::new("CBE")))
            .build();

        assert!(registry.get("CBE").is_ok());
        assert!(matches!(
            registry.get("AWASH"),
            Err(BankError::BankUnavailable(_))
        ));
        assert_eq!(registry.codes(), vec!["CBE".to_string()]);
    }

    #[test]
    fn test_from_config_registers_every_bank() {
        let banks: Vec<BankConfig> = ["CBE", "DASHEN"]
            .iter()
            .map(|code| BankConfig {
                code: code.to_string(),
                name: format!("{} Bank", code),
                api_url: "https://bank.example.com/api".to_string(),
                api_key: "key".to_string(),
                api_secret: "secret".to_string(),
                merchant_id: "M-1".to_string(),
                timeout_ms: 5_000,
            })
            .collect();

        let registry = BankRegistry::from_config(&banks).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("DASHEN"));
    }
}
