//! HTTP boundary: two POST actions over the engines, permissive CORS,
//! bearer-token identity. Everything here is plumbing; the accounting
//! rules live in [`crate::mining`] and [`crate::payout`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AuthProvider;
use crate::domain::{Error, Profile, Withdrawal};
use crate::mining::MiningEngine;
use crate::payout::WithdrawalEngine;

#[derive(Clone)]
pub struct AppState {
    pub mining: Arc<MiningEngine>,
    pub withdrawals: Arc<WithdrawalEngine>,
    pub auth: Arc<dyn AuthProvider>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/mining", post(mining))
        .route("/withdraw", post(withdraw))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> Result<(), Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "mining engine listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Client-facing projection of the ledger row. The concurrency version
/// token stays inside the process.
#[derive(Debug, Serialize)]
pub struct ProfileView {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_mined: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub mining_rate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub energy_level: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub multiplier: Decimal,
    pub tap_count: u64,
    pub auto_mining_enabled: bool,
}

impl From<&Profile> for ProfileView {
    fn from(p: &Profile) -> Self {
        Self {
            total_mined: p.total_mined,
            mining_rate: p.mining_rate,
            energy_level: p.energy_level,
            multiplier: p.multiplier,
            tap_count: p.tap_count,
            auto_mining_enabled: p.auto_mining_enabled,
        }
    }
}

#[derive(Debug, Serialize)]
struct WithdrawalView {
    id: uuid::Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    wallet_address: String,
    status: crate::domain::WithdrawalStatus,
    created_at: chrono::DateTime<Utc>,
}

impl From<&Withdrawal> for WithdrawalView {
    fn from(w: &Withdrawal) -> Self {
        Self {
            id: w.id,
            amount: w.amount,
            wallet_address: w.wallet_address.clone(),
            status: w.status,
            created_at: w.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MiningRequest {
    action: String,
}

#[derive(Debug, Deserialize)]
struct WithdrawRequest {
    action: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    amount: Option<Decimal>,
    wallet_address: Option<String>,
}

#[derive(Debug, Serialize)]
struct WithdrawResponse {
    success: bool,
    withdrawal: WithdrawalView,
    #[serde(with = "rust_decimal::serde::float")]
    new_balance: Decimal,
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": env!("CARGO_PKG_NAME") }))
}

async fn mining(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<MiningRequest>,
) -> Response {
    let user_id = match authenticate(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(e) => return error_response(e),
    };

    let now = Utc::now();
    let result = match req.action.as_str() {
        "tap" => state.mining.tap(&user_id, now).await,
        "get_stats" => state.mining.reconcile(&user_id, now).await,
        "enable_auto" => state.mining.set_auto_mining(&user_id, true, now).await,
        "disable_auto" => state.mining.set_auto_mining(&user_id, false, now).await,
        other => Err(Error::InvalidAction(other.to_string())),
    };

    match result {
        Ok(profile) => Json(json!({ "profile": ProfileView::from(&profile) })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn withdraw(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<WithdrawRequest>,
) -> Response {
    let user_id = match authenticate(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(e) => return error_response(e),
    };

    match req.action.as_str() {
        "withdraw" => {
            // A missing amount or address falls through to the engine's
            // validation and comes back as the matching 400.
            let amount = req.amount.unwrap_or(Decimal::ZERO);
            let destination = req.wallet_address.unwrap_or_default();
            match state
                .withdrawals
                .withdraw(&user_id, amount, &destination, Utc::now())
                .await
            {
                Ok(receipt) => Json(WithdrawResponse {
                    success: true,
                    withdrawal: WithdrawalView::from(&receipt.withdrawal),
                    new_balance: receipt.new_balance,
                })
                .into_response(),
                Err(e) => error_response(e),
            }
        }
        "history" => match state.withdrawals.history(&user_id).await {
            Ok(withdrawals) => Json(json!({
                "withdrawals": withdrawals.iter().map(WithdrawalView::from).collect::<Vec<_>>(),
            }))
            .into_response(),
            Err(e) => error_response(e),
        },
        other => error_response(Error::InvalidAction(other.to_string())),
    }
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, Error> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(Error::Unauthorized)?;
    state.auth.authenticate(token).await
}

fn http_status(err: &Error) -> StatusCode {
    match err {
        Error::Unauthorized => StatusCode::UNAUTHORIZED,
        Error::ProfileNotFound | Error::WithdrawalNotFound => StatusCode::NOT_FOUND,
        Error::InvalidAction(_)
        | Error::InsufficientEnergy { .. }
        | Error::InvalidAmount { .. }
        | Error::InvalidDestination(_)
        | Error::InsufficientBalance
        | Error::WithdrawalInProgress
        | Error::IllegalTransition { .. } => StatusCode::BAD_REQUEST,
        Error::Conflict | Error::Storage(_) | Error::Io(_) | Error::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: Error) -> Response {
    let status = http_status(&err);
    let body = match &err {
        // The rejected tap still advanced the row; hand the caller the
        // persisted state alongside the rejection.
        Error::InsufficientEnergy { profile } => json!({
            "error": err.to_string(),
            "profile": ProfileView::from(profile.as_ref()),
        }),
        _ if status.is_server_error() => {
            tracing::error!(error = %err, "request failed");
            json!({ "error": "Internal server error" })
        }
        _ => json!({ "error": err.to_string() }),
    };
    (status, Json(body)).into_response()
}
