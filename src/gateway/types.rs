//! API Response types and error codes
//!
//! - `ApiResponse<T>`: Unified response wrapper
//! - `ApiError` / `ApiResult<T>`: handler error plumbing
//! - `error_codes`: Standard error code constants
//! - Request/response DTOs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{AccountId, Amount, TransactionId};
use crate::transfer::{PublishStatus, TransactionRecord, TransferError, TransferReceipt};

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// All API responses follow this structure:
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or null (error)
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Create success response
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    /// Create error response
    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Handler error: HTTP status plus envelope code and message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Wrap `data` in a success envelope
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error_codes::MISSING_AUTH, msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            error_codes::SERVICE_UNAVAILABLE,
            msg,
        )
    }

    pub fn into_err<T>(self) -> ApiResult<T> {
        Err(self)
    }
}

impl From<TransferError> for ApiError {
    fn from(e: TransferError) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, e.api_code(), e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiResponse::<()>::error(self.code, self.msg)),
        )
            .into_response()
    }
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

/// `POST /api/v1/transfer` body; the sender is the authenticated caller
#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub to: AccountId,
    pub amount: Amount,
}

/// Transfer response data
#[derive(Debug, Serialize, Deserialize)]
pub struct TransferResponseData {
    pub transaction_id: TransactionId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
    pub state: String,
    /// Notification outcome: `published`, `failed` or `dispatched`
    pub publish_status: String,
    /// Present when the transfer committed but its notification was not delivered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<TransferReceipt> for TransferResponseData {
    fn from(receipt: TransferReceipt) -> Self {
        let publish_status = match &receipt.publish {
            PublishStatus::Published { .. } => "published",
            PublishStatus::Failed { .. } => "failed",
            PublishStatus::Dispatched => "dispatched",
        };
        Self {
            transaction_id: receipt.transaction_id,
            from: receipt.from,
            to: receipt.to,
            amount: receipt.amount,
            created_at: receipt.created_at,
            state: receipt.state.as_str().to_string(),
            publish_status: publish_status.to_string(),
            warning: receipt.warning().map(str::to_string),
        }
    }
}

/// Transaction history response data
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionListData {
    pub number: usize,
    pub transactions: Vec<TransactionRecord>,
}

/// Balance response data
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceData {
    pub user_id: AccountId,
    pub balance: Amount,
}

/// Health check response data
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthData {
    pub store: String,
    /// Server timestamp in milliseconds
    pub timestamp_ms: i64,
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
///
/// Transfer failures use [`TransferError::api_code`].
pub mod error_codes {
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;

    // Auth errors (2xxx)
    pub const MISSING_AUTH: i32 = 2001;

    // Server errors (5xxx)
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}
