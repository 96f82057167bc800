//! Gateway HTTP handlers
//!
//! The caller is always the [`AuthenticatedUser`] injected by the identity
//! middleware; transfers are sent from that account.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};

use super::AuthenticatedUser;
use super::state::AppState;
use super::types::{
    ApiError, ApiResult, BalanceData, HealthData, TransactionListData, TransferRequest,
    TransferResponseData, ok,
};

/// Create transfer endpoint
///
/// POST /api/v1/transfer
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> ApiResult<TransferResponseData> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    tracing::info!(
        from = user.user_id,
        to = req.to,
        amount = req.amount,
        "Transfer request"
    );

    match state
        .engine
        .transfer(user.user_id, req.to, req.amount)
        .await
    {
        Ok(receipt) => ok(receipt.into()),
        Err(e) => {
            if e.is_input_error() {
                tracing::debug!(from = user.user_id, error = %e, "Transfer rejected");
            } else {
                tracing::warn!(from = user.user_id, error = %e, "Transfer failed");
            }
            ApiError::from(e).into_err()
        }
    }
}

/// Transaction history endpoint
///
/// GET /api/v1/transactions
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<TransactionListData> {
    let transactions = state.engine.list_transactions(user.user_id).await?;
    ok(TransactionListData {
        number: transactions.len(),
        transactions,
    })
}

/// Balance endpoint
///
/// GET /api/v1/balance
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<BalanceData> {
    let balance = state.engine.get_balance(user.user_id).await?;
    ok(BalanceData {
        user_id: user.user_id,
        balance,
    })
}

/// Health check endpoint
///
/// - Healthy: 200 OK + {code: 0, data: {store, timestamp_ms}}
/// - Unhealthy: 503 Service Unavailable, details only in the log
pub async fn health_check(State(state): State<Arc<AppState>>) -> ApiResult<HealthData> {
    if let Err(e) = state.engine.health_check().await {
        tracing::error!(error = %e, "[HEALTH] Store check failed");
        return ApiError::service_unavailable("unavailable").into_err();
    }
    ok(HealthData {
        store: state.engine.store().name().to_string(),
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::StatusCode;

    use crate::core_types::{AccountId, Amount};
    use crate::gateway::types::error_codes;
    use crate::transfer::publisher::MockPublisher;
    use crate::transfer::store::{AccountStore, UnitOfWork};
    use crate::transfer::{
        EngineConfig, InMemoryAccountStore, RetryPolicy, TransactionRecord, TransferEngine,
        TransferError,
    };

    fn app_state(publisher: Arc<MockPublisher>) -> (Arc<AppState>, InMemoryAccountStore) {
        let store = InMemoryAccountStore::with_accounts([(1, 100), (2, 50)]);
        let engine = TransferEngine::new(
            Arc::new(store.clone()),
            publisher,
            EngineConfig {
                retry: RetryPolicy::immediate(2),
                ..EngineConfig::default()
            },
        );
        (Arc::new(AppState::new(Arc::new(engine))), store)
    }

    fn caller(user_id: i64) -> Extension<AuthenticatedUser> {
        Extension(AuthenticatedUser { user_id })
    }

    #[tokio::test]
    async fn test_create_transfer_ok() {
        let (state, _store) = app_state(Arc::new(MockPublisher::new()));

        let Json(resp) = create_transfer(
            State(state.clone()),
            caller(1),
            Ok(Json(TransferRequest { to: 2, amount: 30 })),
        )
        .await
        .unwrap();

        assert_eq!(resp.code, 0);
        let data = resp.data.unwrap();
        assert_eq!((data.from, data.to, data.amount), (1, 2, 30));
        assert_eq!(data.publish_status, "published");
        assert_eq!(data.state, "EVENT_PUBLISHED");
        assert!(data.warning.is_none());

        let Json(balance) = get_balance(State(state.clone()), caller(2)).await.unwrap();
        assert_eq!(balance.data.unwrap().balance, 80);

        let Json(history) = list_transactions(State(state), caller(1)).await.unwrap();
        let history = history.data.unwrap();
        assert_eq!(history.number, 1);
        assert_eq!(history.transactions[0].id, data.transaction_id);
    }

    #[tokio::test]
    async fn test_create_transfer_insufficient_funds() {
        let (state, store) = app_state(Arc::new(MockPublisher::new()));

        let err = create_transfer(
            State(state),
            caller(2),
            Ok(Json(TransferRequest { to: 1, amount: 51 })),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code, 1004);
        assert_eq!(store.transaction_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_transfer_to_self() {
        let (state, _store) = app_state(Arc::new(MockPublisher::new()));

        let err = create_transfer(
            State(state),
            caller(1),
            Ok(Json(TransferRequest { to: 1, amount: 1 })),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, 1003);
    }

    #[tokio::test]
    async fn test_publish_failure_surfaces_warning() {
        let publisher = Arc::new(MockPublisher::new());
        publisher.set_always_fail(true);
        let (state, store) = app_state(publisher);

        let Json(resp) = create_transfer(
            State(state),
            caller(1),
            Ok(Json(TransferRequest { to: 2, amount: 10 })),
        )
        .await
        .unwrap();

        let data = resp.data.unwrap();
        assert_eq!(data.publish_status, "failed");
        assert!(data.warning.is_some());
        assert_eq!(store.transaction_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_account_balance() {
        let (state, _store) = app_state(Arc::new(MockPublisher::new()));

        let err = get_balance(State(state), caller(77)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_history() {
        let (state, _store) = app_state(Arc::new(MockPublisher::new()));

        let Json(resp) = list_transactions(State(state), caller(2)).await.unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.number, 0);
        assert!(data.transactions.is_empty());
    }

    #[tokio::test]
    async fn test_health_check() {
        let (state, _store) = app_state(Arc::new(MockPublisher::new()));

        let Json(resp) = health_check(State(state)).await.unwrap();
        assert_eq!(resp.code, error_codes::SUCCESS);
        assert_eq!(resp.data.unwrap().store, "memory");
    }

    /// Store whose connectivity probe always fails
    struct UnreachableStore;

    #[async_trait]
    impl AccountStore for UnreachableStore {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        async fn begin(&self) -> Result<Box<dyn UnitOfWork>, TransferError> {
            Err(TransferError::Internal("connection refused".to_string()))
        }

        async fn get_balance(&self, _id: AccountId) -> Result<Amount, TransferError> {
            Err(TransferError::Internal("connection refused".to_string()))
        }

        async fn list_transactions_from(
            &self,
            _id: AccountId,
        ) -> Result<Vec<TransactionRecord>, TransferError> {
            Err(TransferError::Internal("connection refused".to_string()))
        }

        async fn health_check(&self) -> Result<(), TransferError> {
            Err(TransferError::Internal("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_health_check_store_down() {
        let engine = TransferEngine::new(
            Arc::new(UnreachableStore),
            Arc::new(MockPublisher::new()),
            EngineConfig::default(),
        );
        let state = Arc::new(AppState::new(Arc::new(engine)));

        let err = health_check(State(state)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code, error_codes::SERVICE_UNAVAILABLE);
        assert_eq!(err.msg, "unavailable");
    }
}
