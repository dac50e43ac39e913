//! REST handlers for the loyalty surface.
//!
//! These endpoints are the entire contract the storefront may call; no
//! client computes tiers or balances itself.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use loyalty_core::error::LoyaltyError;
use loyalty_core::ledger::{CustomerLoyaltyBalance, HistoryPage, LedgerEntry};
use loyalty_engine::{
    AccrualService, BalanceAggregator, ExpirySweeper, RedemptionService, SweepReport,
};
use loyalty_ledger::LedgerVerification;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub accrual: Arc<AccrualService>,
    pub redemption: Arc<RedemptionService>,
    pub aggregator: Arc<BalanceAggregator>,
    pub sweeper: Arc<ExpirySweeper>,
    pub node_id: String,
    pub start_time: Instant,
}

#[derive(Debug, Deserialize)]
pub struct EarnRequest {
    pub customer_id: Uuid,
    pub points: i64,
    pub description: String,
    pub order_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub customer_id: Uuid,
    pub points: i64,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub customer_id: Uuid,
    pub points: i64,
    pub description: String,
    #[serde(default)]
    pub authorized_override: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_page")]
    pub page: u32,
    pub limit: Option<u32>,
}

fn default_page() -> u32 {
    1
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn map_error(err: LoyaltyError) -> ApiError {
    let (status, code) = match &err {
        LoyaltyError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
        LoyaltyError::InsufficientPoints { .. } => (StatusCode::CONFLICT, "insufficient_points"),
        LoyaltyError::ConcurrencyConflict(_) => (StatusCode::CONFLICT, "concurrent_update"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        metrics::counter!("loyalty.api.errors").increment(1);
    }
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: err.to_string(),
        }),
    )
}

/// POST /v1/loyalty/earn — credit points from a completed order.
pub async fn handle_earn(
    State(state): State<AppState>,
    Json(request): Json<EarnRequest>,
) -> Result<(StatusCode, Json<LedgerEntry>), ApiError> {
    state
        .accrual
        .earn(
            request.customer_id,
            request.points,
            &request.description,
            request.order_id,
            request.expires_at,
        )
        .map(|entry| (StatusCode::CREATED, Json(entry)))
        .map_err(|e| {
            warn!(customer_id = %request.customer_id, error = %e, "Earn rejected");
            map_error(e)
        })
}

/// POST /v1/loyalty/redeem — spend points against the current balance.
pub async fn handle_redeem(
    State(state): State<AppState>,
    Json(request): Json<RedeemRequest>,
) -> Result<Json<LedgerEntry>, ApiError> {
    state
        .redemption
        .redeem(request.customer_id, request.points, &request.description)
        .map(Json)
        .map_err(|e| {
            warn!(customer_id = %request.customer_id, error = %e, "Redemption rejected");
            map_error(e)
        })
}

/// POST /v1/loyalty/adjust — signed administrative correction.
pub async fn handle_adjust(
    State(state): State<AppState>,
    Json(request): Json<AdjustRequest>,
) -> Result<Json<LedgerEntry>, ApiError> {
    state
        .accrual
        .adjust(
            request.customer_id,
            request.points,
            &request.description,
            request.authorized_override,
        )
        .map(Json)
        .map_err(|e| {
            warn!(customer_id = %request.customer_id, error = %e, "Adjustment rejected");
            map_error(e)
        })
}

/// GET /v1/loyalty/balance/:customer_id — balance, lifetime points, and
/// tier standing.
pub async fn handle_balance(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Json<CustomerLoyaltyBalance> {
    Json(state.aggregator.get_balance(customer_id))
}

/// GET /v1/loyalty/history/:customer_id — ledger history, newest first.
pub async fn handle_history(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> Json<HistoryPage> {
    Json(
        state
            .aggregator
            .list_history(customer_id, params.page, params.limit),
    )
}

/// GET /v1/loyalty/verify/:customer_id — replay and hash-chain check.
pub async fn handle_verify(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Json<LedgerVerification> {
    Json(state.aggregator.verify(customer_id))
}

/// POST /v1/loyalty/sweep — run an expiry sweep now (admin trigger; the
/// background task covers the schedule).
pub async fn handle_sweep(State(state): State<AppState>) -> Json<SweepReport> {
    Json(state.sweeper.run_once(Utc::now()))
}

/// GET /health — health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — readiness probe for Kubernetes.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live — liveness probe for Kubernetes.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
