//! HTTP/JSON bank gateway
//!
//! Endpoints relative to the configured `api_url`:
//! - `POST /transfer`
//! - `GET /account/validate?bank_code=..&account_number=..`
//! - `GET /transaction/{id}/status`
//!
//! Authenticated with `Authorization: Bearer <api_key>` and `X-API-Secret`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{BankError, BankGateway, BankTransferRequest, BankTransferResponse};
use crate::config::BankConfig;

const INSUFFICIENT_FUNDS_CODE: &str = "INSUFFICIENT_FUNDS";

#[derive(Debug, Serialize)]
struct TransferBody<'a> {
    merchant_id: &'a str,
    amount: i64,
    currency: &'a str,
    source_account: &'a str,
    destination_account: &'a str,
    destination_bank_code: &'a str,
    recipient_name: &'a str,
    transaction_reference: &'a str,
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct TransferReply {
    success: bool,
    #[serde(default)]
    response_code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    transaction_id: String,
    #[serde(default)]
    fee: i64,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct ValidateReply {
    success: bool,
    #[serde(default)]
    account_name: String,
    #[serde(default)]
    response_code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StatusReply {
    success: bool,
    #[serde(default)]
    status: String,
    #[serde(default)]
    response_code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug)]
pub struct HttpBankGateway {
    code: String,
    base_url: String,
    api_key: String,
    api_secret: String,
    merchant_id: String,
    client: reqwest::Client,
}

impl HttpBankGateway {
    pub fn new(config: &BankConfig) -> Result<Self, BankError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| {
                BankError::BankUnavailable(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            code: config.code.clone(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            merchant_id: config.merchant_id.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.api_key)
            .header("X-API-Secret", &self.api_secret)
    }

    /// Send and read the body.
    ///
    /// Failing to connect is `BankUnavailable`: the bank never saw the request.
    /// Anything that fails after the request may have been delivered (timeout,
    /// reset, broken body of a 2xx reply) is `OutcomeUnknown`. A non-2xx status
    /// is mapped to `on_status`.
    async fn exchange(
        &self,
        request: reqwest::RequestBuilder,
        on_status: BankError,
    ) -> Result<String, BankError> {
        let response = request.send().await.map_err(|e| self.send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                bank = %self.code,
                status_code = status.as_u16(),
                response = %body,
                "Bank API returned error"
            );
            return Err(on_status);
        }

        response.text().await.map_err(|e| {
            error!(bank = %self.code, error = %e, "Failed to read bank response");
            BankError::OutcomeUnknown(format!("failed to read response: {}", e))
        })
    }

    fn send_error(&self, e: reqwest::Error) -> BankError {
        if e.is_connect() {
            error!(bank = %self.code, error = %e, "Bank unreachable");
            BankError::BankUnavailable(e.to_string())
        } else if e.is_timeout() {
            error!(bank = %self.code, error = %e, "Bank request timed out");
            BankError::OutcomeUnknown(format!("request timed out: {}", e))
        } else if e.is_builder() {
            BankError::InvalidRequest(e.to_string())
        } else {
            error!(bank = %self.code, error = %e, "Bank request failed");
            BankError::OutcomeUnknown(e.to_string())
        }
    }

    /// Only called on 2xx bodies, so a parse failure leaves the outcome unknown.
    fn parse<T: for<'de> Deserialize<'de>>(&self, body: &str) -> Result<T, BankError> {
        serde_json::from_str(body).map_err(|e| {
            error!(bank = %self.code, error = %e, "Failed to parse bank response");
            BankError::OutcomeUnknown(format!("unparseable response: {}", e))
        })
    }
}

#[async_trait]
impl BankGateway for HttpBankGateway {
    fn name(&self) -> &str {
        &self.code
    }

    async fn transfer_money(
        &self,
        req: &BankTransferRequest,
    ) -> Result<BankTransferResponse, BankError> {
        if req.amount <= 0 {
            return Err(BankError::InvalidRequest("amount must be positive".into()));
        }

        let body = TransferBody {
            merchant_id: &self.merchant_id,
            amount: req.amount,
            currency: req.currency.as_str(),
            source_account: &req.from_account_number,
            destination_account: &req.to_account_number,
            destination_bank_code: &req.to_bank_code,
            recipient_name: &req.recipient_name,
            transaction_reference: &req.reference,
            description: req.description.as_deref().unwrap_or(""),
        };

        debug!(bank = %self.code, reference = %req.reference, "Sending bank transfer");
        let request = self.authorized(self.client.post(self.url("/transfer")).json(&body));
        let raw = self
            .exchange(
                request,
                BankError::TransferFailed("bank rejected transfer request".into()),
            )
            .await?;
        let reply: TransferReply = self.parse(&raw)?;

        if !reply.success {
            warn!(
                bank = %self.code,
                response_code = %reply.response_code,
                message = %reply.message,
                "Bank transfer failed"
            );
            if reply.response_code == INSUFFICIENT_FUNDS_CODE {
                return Err(BankError::InsufficientFunds);
            }
            return Err(BankError::TransferFailed(reply.message));
        }

        Ok(BankTransferResponse {
            transaction_id: reply.transaction_id,
            status: reply.status,
            message: reply.message,
            fees: reply.fee,
        })
    }

    async fn validate_account(
        &self,
        bank_code: &str,
        account_number: &str,
    ) -> Result<String, BankError> {
        let request = self.authorized(
            self.client
                .get(self.url("/account/validate"))
                .query(&[("bank_code", bank_code), ("account_number", account_number)]),
        );
        let raw = self.exchange(request, BankError::AccountNotFound).await?;
        let reply: ValidateReply = self.parse(&raw)?;

        if !reply.success {
            warn!(
                bank = %self.code,
                response_code = %reply.response_code,
                message = %reply.message,
                "Account validation failed"
            );
            return Err(BankError::AccountNotFound);
        }
        Ok(reply.account_name)
    }

    async fn get_transaction_status(&self, transaction_id: &str) -> Result<String, BankError> {
        let path = format!("/transaction/{}/status", transaction_id);
        let request = self.authorized(self.client.get(self.url(&path)));
        let raw = self
            .exchange(
                request,
                BankError::TransferFailed("status lookup rejected".into()),
            )
            .await?;
        let reply: StatusReply = self.parse(&raw)?;

        if !reply.success {
            warn!(
                bank = %self.code,
                response_code = %reply.response_code,
                message = %reply.message,
                "Transaction status check failed"
            );
            return Err(BankError::TransferFailed(reply.message));
        }
        Ok(reply.status)
    }
}
