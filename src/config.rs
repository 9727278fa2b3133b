use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL for the ledger store
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub external_transfer: ExternalTransferConfig,
    /// Bank integrations, keyed by routing code
    #[serde(default)]
    pub banks: Vec<BankConfig>,
}

fn default_max_connections() -> u32 {
    20
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ExternalTransferConfig {
    /// Upper bound for a single TransferMoney call
    pub gateway_timeout_ms: u64,
    pub reference_prefix: String,
    /// Age after which a pending/processing row is considered abandoned
    pub stale_after_secs: u64,
    pub scan_interval_secs: u64,
    pub scan_batch_size: usize,
}

impl Default for ExternalTransferConfig {
    fn default() -> Self {
        Self {
            gateway_timeout_ms: 30_000,
            reference_prefix: "EXT".to_string(),
            stale_after_secs: 300,
            scan_interval_secs: 60,
            scan_batch_size: 100,
        }
    }
}

impl ExternalTransferConfig {
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BankConfig {
    pub code: String,
    pub name: String,
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub merchant_id: String,
    #[serde(default = "default_bank_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_bank_timeout_ms() -> u64 {
    30_000
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.postgres_url = Some(url);
        }
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.external_transfer.gateway_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "external_transfer.gateway_timeout_ms must be > 0".to_string(),
            ));
        }
        // A row must outlive its bank call before the worker may close it
        if self.external_transfer.stale_after() <= self.external_transfer.gateway_timeout() {
            return Err(ConfigError::Invalid(format!(
                "external_transfer.stale_after_secs ({}s) must exceed gateway_timeout_ms ({}ms)",
                self.external_transfer.stale_after_secs, self.external_transfer.gateway_timeout_ms
            )));
        }
        if self.external_transfer.reference_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "external_transfer.reference_prefix must not be empty".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for bank in &self.banks {
            if !seen.insert(bank.code.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate bank code: {}",
                    bank.code
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
log_level: info
log_dir: ./logs
log_file: payledger.log
use_json: false
rotation: daily
"#;

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_yaml(BASE).unwrap();
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.external_transfer.gateway_timeout_ms, 30_000);
        assert_eq!(config.external_transfer.reference_prefix, "EXT");
        assert!(config.banks.is_empty());
        assert!(config.postgres_url.is_none());
    }

    #[test]
    fn test_banks_deserialize() {
        let yaml = format!(
            "{}{}",
            BASE,
            r#"
banks:
  - code: CBE
    name: Commercial Bank
    api_url: https://cbe.example/api
    api_key: k
    timeout_ms: 5000
  - code: AWB
    name: Awash Bank
    api_url: https://awash.example/api
"#
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.banks.len(), 2);
        assert_eq!(config.banks[0].timeout_ms, 5000);
        assert_eq!(config.banks[1].timeout_ms, 30_000);
        assert_eq!(config.banks[1].api_secret, "");
    }

    #[test]
    fn test_duplicate_bank_code_rejected() {
        let yaml = format!(
            "{}{}",
            BASE,
            r#"
banks:
  - code: CBE
    name: A
    api_url: http://a
  - code: CBE
    name: B
    api_url: http://b
"#
        );
        assert!(matches!(
            AppConfig::from_yaml(&yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_zero_gateway_timeout_rejected() {
        let yaml = format!(
            "{}{}",
            BASE,
            r#"
external_transfer:
  gateway_timeout_ms: 0
  reference_prefix: EXT
  stale_after_secs: 300
  scan_interval_secs: 60
  scan_batch_size: 100
"#
        );
        assert!(AppConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_stale_window_must_exceed_gateway_timeout() {
        let with = |stale_after_secs: u64, gateway_timeout_ms: u64| {
            format!(
                "{}external_transfer:\n  gateway_timeout_ms: {}\n  stale_after_secs: {}\n",
                BASE, gateway_timeout_ms, stale_after_secs
            )
        };

        for (stale, timeout) in [(10, 30_000), (30, 30_000)] {
            let err = AppConfig::from_yaml(&with(stale, timeout)).unwrap_err();
            assert!(
                matches!(&err, ConfigError::Invalid(msg) if msg.contains("stale_after_secs")),
                "stale {stale}s vs timeout {timeout}ms: {err}"
            );
        }
        assert!(AppConfig::from_yaml(&with(31, 30_000)).is_ok());
    }
}
