//! Reconciliation Worker
//!
//! Background worker that closes external transfers abandoned in a
//! non-terminal status, e.g. after a crash between the two commit phases.
//! It marks them `failed` and raises a reconciliation-required log line;
//! it never calls a bank and never touches balances.

use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::ExternalTransferConfig;
use crate::ledger::{
    ExternalTransfer, ExternalTransferStatus, ExternalTransferUpdate, Ledger, LedgerError,
};

pub const MSG_ABANDONED_PENDING: &str = "Abandoned before the bank call";
pub const MSG_ABANDONED_PROCESSING: &str =
    "Abandoned during processing; bank outcome unknown, reconciliation required";

/// Configuration for the reconciliation worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to scan for stale transfers
    pub scan_interval: Duration,
    /// How long a transfer must be untouched to be considered abandoned
    pub stale_threshold: Duration,
    /// Maximum transfers to process per scan
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&ExternalTransferConfig::default())
    }
}

impl From<&ExternalTransferConfig> for WorkerConfig {
    fn from(cfg: &ExternalTransferConfig) -> Self {
        Self {
            scan_interval: cfg.scan_interval(),
            stale_threshold: cfg.stale_after(),
            batch_size: cfg.scan_batch_size,
        }
    }
}

pub struct ReconciliationWorker {
    ledger: Ledger,
    config: WorkerConfig,
}

impl ReconciliationWorker {
    pub fn new(ledger: Ledger, config: WorkerConfig) -> Self {
        Self { ledger, config }
    }

    /// Run the worker loop forever.
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            stale_threshold_secs = self.config.stale_threshold.as_secs(),
            batch_size = self.config.batch_size,
            "Starting reconciliation worker"
        );

        loop {
            if let Err(e) = self.scan_and_reconcile().await {
                error!(error = %e, "Reconciliation scan failed");
            }

            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// Run a single scan. Returns how many rows were closed.
    pub async fn scan_and_reconcile(&self) -> Result<usize, LedgerError> {
        let stale = self
            .ledger
            .store()
            .find_stale_external_transfers(self.config.stale_threshold, self.config.batch_size)
            .await?;

        if stale.is_empty() {
            debug!("No stale external transfers found");
            return Ok(0);
        }

        info!(count = stale.len(), "Found stale external transfers");

        let mut closed = 0;
        for record in &stale {
            if self.close(record).await {
                closed += 1;
            }
        }

        if closed > 0 {
            info!(count = closed, "Closed stale external transfers this scan");
        }
        Ok(closed)
    }

    async fn close(&self, record: &ExternalTransfer) -> bool {
        let message = match record.status {
            ExternalTransferStatus::Pending => MSG_ABANDONED_PENDING,
            ExternalTransferStatus::Processing => MSG_ABANDONED_PROCESSING,
            ExternalTransferStatus::Completed | ExternalTransferStatus::Failed => return false,
        };

        let update = ExternalTransferUpdate::failed(record.id, message);
        match self.ledger.update_external_transfer_status(update).await {
            Ok(_) => {
                if record.status == ExternalTransferStatus::Processing {
                    error!(
                        reconciliation_required = true,
                        reference = %record.reference,
                        from_account_id = record.from_account_id,
                        amount = record.amount,
                        bank = %record.to_bank_code,
                        "Stale processing transfer marked failed"
                    );
                } else {
                    warn!(reference = %record.reference, "Stale pending transfer marked failed");
                }
                true
            }
            Err(LedgerError::Conflict(_)) => {
                // Moved on concurrently
                debug!(reference = %record.reference, "Stale transfer already advanced");
                false
            }
            Err(e) => {
                error!(
                    reconciliation_required = true,
                    reference = %record.reference,
                    error = %e,
                    "Failed to close stale external transfer"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.scan_interval, Duration::from_secs(60));
        assert_eq!(config.stale_threshold, Duration::from_secs(300));
        assert_eq!(config.batch_size, 100);
    }
}
