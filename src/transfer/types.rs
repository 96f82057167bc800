//! Transfer Core Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::TransferState;
use crate::core_types::{AccountId, Amount, TransactionId};

/// Account row as seen under a row lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub balance: Amount,
}

/// Immutable history row, written once as the last step of a successful transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

/// Outcome of the post-commit notification step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishStatus {
    /// Delivered after `attempts` tries
    Published { attempts: usize },
    /// Every attempt failed; the transfer is still committed
    Failed { attempts: usize, error: String },
    /// Handed to a background task, outcome only visible in logs
    Dispatched,
}

impl PublishStatus {
    /// Soft warning to surface next to a successful transfer, if any
    pub fn warning(&self) -> Option<&str> {
        match self {
            PublishStatus::Failed { error, .. } => Some(error.as_str()),
            _ => None,
        }
    }
}

/// Successful transfer result
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub transaction_id: TransactionId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
    pub publish: PublishStatus,
    #[serde(serialize_with = "serialize_state")]
    pub state: TransferState,
}

impl TransferReceipt {
    pub fn warning(&self) -> Option<&str> {
        self.publish.warning()
    }
}

fn serialize_state<S: serde::Serializer>(state: &TransferState, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(state.as_str())
}

/// Notification payload published after commit.
///
/// `event_id` is fresh per transfer so consumers can drop the duplicates that
/// at-least-once delivery produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub event_id: Uuid,
    pub transaction_id: TransactionId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl TransferEvent {
    pub fn from_record(record: &TransactionRecord) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            transaction_id: record.id,
            from: record.from,
            to: record.to,
            amount: record.amount,
            status: "success".to_string(),
            created_at: record.created_at,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
