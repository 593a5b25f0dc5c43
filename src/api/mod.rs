//! HTTP surface of the broker.
//!
//! Two POST-only endpoints plus a metrics snapshot. Any other method or path
//! gets a plain `404 Not found`. Errors are turned into status codes and
//! `{ok:false, error}` bodies here and nowhere else.

use crate::auth::authorization_value;
use crate::error::BrokerError;
use crate::metrics::{BrokerMetrics, MetricsSnapshot};
use crate::oauth::{ExchangeRequest, FlowContext, MintedToken, TokenExchangeFlow, TokenMintFlow};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::error::Category;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};


/// Path of the authorization-code exchange endpoint
pub const EXCHANGE_PATH: &str = "/functions/v1/google_oauth_exchange";

/// Path of the access-token mint endpoint
pub const MINT_PATH: &str = "/functions/v1/google_token_mint";

/// Shared application state for the broker API
#[derive(Clone)]
pub struct BrokerAppState {
    pub exchange: Arc<TokenExchangeFlow>,
    pub mint: Arc<TokenMintFlow>,
    pub metrics: BrokerMetrics,
}

impl BrokerAppState {
    pub fn new(ctx: FlowContext) -> Self {
        let metrics = ctx.metrics.clone();
        Self {
            exchange: Arc::new(TokenExchangeFlow::new(ctx.clone())),
            mint: Arc::new(TokenMintFlow::new(ctx)),
            metrics,
        }
    }
}

/// Success body of the exchange endpoint
#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

/// Error body of both endpoints
#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: Value,
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = match &self {
            BrokerError::BadRequest(_) | BrokerError::Provider(_) | BrokerError::NoCredentials => {
                StatusCode::BAD_REQUEST
            }
            BrokerError::Unauthorized => StatusCode::UNAUTHORIZED,
            BrokerError::Cipher(_)
            | BrokerError::Storage(_)
            | BrokerError::Misconfigured
            | BrokerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Provider payloads pass through as-is (object or message)
        let error = match &self {
            BrokerError::Provider(payload) => payload.clone(),
            BrokerError::BadRequest(msg) => Value::String(msg.clone()),
            other => Value::String(other.to_string()),
        };

        if status.is_server_error() {
            error!(status = %status.as_u16(), error = %self, "Request failed");
        } else {
            debug!(status = %status.as_u16(), error = %self, "Request rejected");
        }

        let body = Json(ErrorResponse { ok: false, error });

        (status, body).into_response()
    }
}

/// Create the broker router
pub fn create_broker_router(state: BrokerAppState) -> Router {
    Router::new()
        .route(EXCHANGE_PATH, post(exchange_token).fallback(not_found))
        .route(MINT_PATH, post(mint_token).fallback(not_found))
        .route("/metrics", get(metrics_snapshot))
        .fallback(not_found)
        .with_state(Arc::new(state))
}

/// POST /functions/v1/google_oauth_exchange
///
/// Body: `{ code, code_verifier, redirect_uri }`. An unreadable body counts as
/// missing parameters.
async fn exchange_token(
    State(state): State<Arc<BrokerAppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<OkResponse>, BrokerError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ExchangeRequest::default()
    } else {
        serde_json::from_slice::<ExchangeRequest>(&body).unwrap_or_else(|e| {
            warn!(
                category = body_error_category(&e),
                "Exchange request body is not a JSON object"
            );
            ExchangeRequest::default()
        })
    };

    state
        .exchange
        .run(authorization_value(&headers), &request)
        .await?;

    Ok(Json(OkResponse { ok: true }))
}

/// Coarse reason a request body failed to parse.
///
/// serde's messages can quote the offending input, so only the category is logged.
fn body_error_category(e: &serde_json::Error) -> &'static str {
    match e.classify() {
        Category::Io => "io",
        Category::Syntax => "syntax",
        Category::Data => "data",
        Category::Eof => "eof",
    }
}

/// POST /functions/v1/google_token_mint
async fn mint_token(
    State(state): State<Arc<BrokerAppState>>,
    headers: HeaderMap,
) -> Result<Json<MintedToken>, BrokerError> {
    let minted = state.mint.run(authorization_value(&headers)).await?;
    Ok(Json(minted))
}

/// GET /metrics
async fn metrics_snapshot(State(state): State<Arc<BrokerAppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}
