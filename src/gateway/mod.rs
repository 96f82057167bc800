pub mod handlers;
pub mod state;
pub mod types;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request},
    middleware::{Next, from_fn},
    response::Response,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::core_types::AccountId;
use crate::transfer::TransferEngine;
use state::AppState;
use types::ApiError;

/// Header carrying the caller id, set by the authenticating proxy in front of us
pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity injected into request extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: AccountId,
}

/// Parse the caller id from request headers.
pub fn user_from_headers(headers: &HeaderMap) -> Result<AuthenticatedUser, ApiError> {
    let raw = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| ApiError::unauthorized("Missing X-User-Id header"))?;
    let user_id = raw
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<AccountId>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::unauthorized("Invalid X-User-Id header"))?;
    Ok(AuthenticatedUser { user_id })
}

/// Axum middleware that trusts the upstream identity header.
async fn identity_middleware(
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let user = user_from_headers(request.headers())?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Build the gateway router
pub fn router(state: Arc<AppState>) -> Router {
    let private_routes = Router::new()
        .route("/api/v1/transfer", post(handlers::create_transfer))
        .route("/api/v1/transactions", get(handlers::list_transactions))
        .route("/api/v1/balance", get(handlers::get_balance))
        .route_layer(from_fn(identity_middleware));

    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .merge(private_routes)
        .with_state(state)
}

/// Start HTTP Gateway server
pub async fn run_server(config: &GatewayConfig, engine: Arc<TransferEngine>) -> anyhow::Result<()> {
    let app = router(Arc::new(AppState::new(engine)));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {}: {} (port {} may already be in use)",
            addr,
            e,
            config.port
        )
    })?;

    tracing::info!(%addr, "Gateway listening");
    println!("🚀 Gateway listening on http://{}", addr);
    println!("🔒 Transfer API: /api/v1/{{transfer,transactions,balance}} (X-User-Id required)");

    axum::serve(listener, app).await?;
    Ok(())
}
