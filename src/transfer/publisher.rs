//! Event Publishers
//!
//! Post-commit notification sinks. Delivery is best-effort: a transfer is already
//! durable by the time anything here runs, so every failure ends up as a
//! [`PublishStatus::Failed`] on the receipt, never as a transfer error.
//!
//! - [`LogPublisher`]: writes events to the tracing log
//! - [`ChannelPublisher`]: in-process broadcast to subscribers
//! - [`HttpPublisher`]: webhook POST

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{BackoffBuilder, ConstantBuilder, ExponentialBuilder};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::types::PublishStatus;
use crate::config::BackoffKind;
use crate::logging::EVENT_TARGET;

/// Broadcast capacity for [`ChannelPublisher`].
const CHANNEL_CAPACITY: usize = 1024;

/// Publish error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Transient: sink unreachable or overloaded, worth retrying
    #[error("Publisher unavailable: {0}")]
    Unavailable(String),

    /// Permanent: sink refused the payload, retrying will not help
    #[error("Publish rejected: {0}")]
    Rejected(String),
}

impl PublishError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PublishError::Unavailable(_))
    }
}

/// Notification sink
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Get publisher name for logging
    fn name(&self) -> &'static str;

    /// Deliver one encoded event
    async fn publish(&self, payload: &[u8]) -> Result<(), PublishError>;
}

/// Bounded retry schedule for publishing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub backoff: BackoffKind,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            backoff: BackoffKind::Exponential,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy without sleeping between attempts
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff: BackoffKind::Fixed,
            jitter: false,
        }
    }

    /// Delays to sleep before attempts 2..=max_attempts
    pub fn delays(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        let retries = self.max_attempts.saturating_sub(1);
        match self.backoff {
            BackoffKind::Exponential => {
                let mut builder = ExponentialBuilder::default()
                    .with_min_delay(self.min_delay)
                    .with_max_delay(self.max_delay)
                    .with_max_times(retries);
                if self.jitter {
                    builder = builder.with_jitter();
                }
                Box::new(builder.build())
            }
            BackoffKind::Fixed => {
                let mut builder = ConstantBuilder::default()
                    .with_delay(self.min_delay)
                    .with_max_times(retries);
                if self.jitter {
                    builder = builder.with_jitter();
                }
                Box::new(builder.build())
            }
        }
    }
}

/// Publish with bounded retries, never failing the caller.
pub async fn publish_with_retry(
    publisher: &dyn EventPublisher,
    payload: &[u8],
    policy: &RetryPolicy,
) -> PublishStatus {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;
    let mut last_error: Option<PublishError> = None;

    for (attempt, delay) in std::iter::once(Duration::ZERO)
        .chain(policy.delays())
        .take(max_attempts)
        .enumerate()
    {
        if attempt > 0 {
            tokio::time::sleep(delay).await;
        }
        attempts = attempt + 1;

        match publisher.publish(payload).await {
            Ok(()) => {
                debug!(publisher = publisher.name(), attempts, "Event published");
                return PublishStatus::Published { attempts };
            }
            Err(e) => {
                warn!(
                    publisher = publisher.name(),
                    attempt = attempts,
                    max_attempts,
                    error = %e,
                    "Publish attempt failed"
                );
                let retryable = e.is_retryable();
                last_error = Some(e);
                if !retryable {
                    break;
                }
            }
        }
    }

    PublishStatus::Failed {
        attempts,
        error: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "publish not attempted".to_string()),
    }
}

// ============================================================================
// Log Publisher
// ============================================================================

/// Writes every event to the tracing log; never fails
#[derive(Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn publish(&self, payload: &[u8]) -> Result<(), PublishError> {
        info!(
            target: EVENT_TARGET,
            payload = %String::from_utf8_lossy(payload),
            "Transfer event"
        );
        Ok(())
    }
}

// ============================================================================
// Channel Publisher
// ============================================================================

/// In-process broadcast publisher.
///
/// Publishing with no live subscriber is reported as `Unavailable`.
pub struct ChannelPublisher {
    sender: broadcast::Sender<Arc<Vec<u8>>>,
}

impl ChannelPublisher {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Vec<u8>>> {
        self.sender.subscribe()
    }
}

impl Default for ChannelPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn publish(&self, payload: &[u8]) -> Result<(), PublishError> {
        self.sender
            .send(Arc::new(payload.to_vec()))
            .map(|_| ())
            .map_err(|_| PublishError::Unavailable("no active subscribers".to_string()))
    }
}

/// Drain a [`ChannelPublisher`] subscription into the log until the channel closes.
pub async fn run_event_consumer(mut rx: broadcast::Receiver<Arc<Vec<u8>>>) {
    info!("Transfer event consumer started");
    loop {
        match rx.recv().await {
            Ok(payload) => {
                info!(
                    target: EVENT_TARGET,
                    payload = %String::from_utf8_lossy(&payload),
                    "Consumed transfer event"
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Transfer event consumer lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("Transfer event channel closed, consumer stopping");
                return;
            }
        }
    }
}

// ============================================================================
// HTTP Publisher
// ============================================================================

/// POSTs each event as JSON to a webhook URL
pub struct HttpPublisher {
    client: reqwest::Client,
    url: String,
}

impl HttpPublisher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Rejected(format!("invalid HTTP client config: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl EventPublisher for HttpPublisher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn publish(&self, payload: &[u8]) -> Result<(), PublishError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| PublishError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
            Err(PublishError::Rejected(format!("webhook returned {}", status)))
        } else {
            Err(PublishError::Unavailable(format!(
                "webhook returned {}",
                status
            )))
        }
    }
}


#[cfg(test)]
pub use mock::MockPublisher;
