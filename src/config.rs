use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use anyhow::Context;

use crate::core_types::{AccountId, Amount, MAX_AMOUNT};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Emit transfer events under the `transfer_events` log target
    #[serde(default = "default_true")]
    pub log_events: bool,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub publisher: PublisherConfig,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadCommitted,
    Serializable,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SeedAccount {
    pub id: AccountId,
    pub balance: Amount,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// PostgreSQL connection URL (required for the postgres backend)
    #[serde(default)]
    pub postgres_url: Option<String>,
    pub max_connections: u32,
    pub isolation: IsolationLevel,
    /// Create tables on startup if missing
    #[serde(default)]
    pub init_schema: bool,
    /// Accounts created on startup (dev/standalone only)
    #[serde(default)]
    pub seed_accounts: Vec<SeedAccount>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            postgres_url: None,
            max_connections: 50,
            isolation: IsolationLevel::ReadCommitted,
            init_schema: false,
            seed_accounts: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// Await the retry loop and report the outcome on the receipt
    Inline,
    /// Run the retry loop on a spawned task
    Background,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineSettings {
    pub max_amount: Amount,
    /// Upper bound on lock wait + writes before commit; `None` waits indefinitely
    #[serde(default)]
    pub unit_of_work_timeout_ms: Option<u64>,
    pub publish_mode: PublishMode,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_amount: MAX_AMOUNT,
            unit_of_work_timeout_ms: Some(5_000),
            publish_mode: PublishMode::Inline,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PublisherKind {
    Log,
    Channel,
    Http,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Exponential,
    Fixed,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PublisherConfig {
    pub kind: PublisherKind,
    #[serde(default)]
    pub http_url: Option<String>,
    pub request_timeout_ms: u64,
    pub max_attempts: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff: BackoffKind,
    pub jitter: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            kind: PublisherKind::Log,
            http_url: None,
            request_timeout_ms: 5_000,
            max_attempts: 3,
            min_delay_ms: 100,
            max_delay_ms: 2_000,
            backoff: BackoffKind::Exponential,
            jitter: true,
        }
    }
}

impl PublisherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.store.backend == StoreBackend::Postgres && self.store.postgres_url.is_none() {
            anyhow::bail!("store.postgres_url is required for the postgres backend");
        }
        if self.publisher.kind == PublisherKind::Http && self.publisher.http_url.is_none() {
            anyhow::bail!("publisher.http_url is required for the http publisher");
        }
        if self.engine.max_amount <= 1 {
            anyhow::bail!("engine.max_amount must be greater than 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: transfer.log
use_json: false
rotation: daily
gateway:
  host: 0.0.0.0
  port: 8080
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.engine.max_amount, MAX_AMOUNT);
        assert_eq!(config.engine.publish_mode, PublishMode::Inline);
        assert_eq!(config.publisher.kind, PublisherKind::Log);
        assert_eq!(config.publisher.max_attempts, 3);
        assert!(config.log_events);
    }

    #[test]
    fn test_full_config() {
        let yaml = format!(
            "{}{}",
            MINIMAL,
            r#"
store:
  backend: postgres
  postgres_url: postgresql://localhost/transfer_db
  max_connections: 20
  isolation: serializable
  seed_accounts:
    - { id: 1, balance: 100 }
engine:
  max_amount: 5000
  unit_of_work_timeout_ms: 250
  publish_mode: background
publisher:
  kind: http
  http_url: http://localhost:9000/events
  request_timeout_ms: 1000
  max_attempts: 5
  min_delay_ms: 10
  max_delay_ms: 100
  backoff: fixed
  jitter: false
"#
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.store.isolation, IsolationLevel::Serializable);
        assert_eq!(
            config.store.seed_accounts,
            vec![SeedAccount { id: 1, balance: 100 }]
        );
        assert_eq!(config.engine.unit_of_work_timeout_ms, Some(250));
        assert_eq!(config.engine.publish_mode, PublishMode::Background);
        assert_eq!(config.publisher.backoff, BackoffKind::Fixed);
        assert_eq!(config.publisher.request_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_postgres_requires_url() {
        let yaml = format!(
            "{}{}",
            MINIMAL,
            "store:\n  backend: postgres\n  max_connections: 5\n  isolation: read_committed\n"
        );
        assert!(AppConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load("does-not-exist").is_err());
    }
}
