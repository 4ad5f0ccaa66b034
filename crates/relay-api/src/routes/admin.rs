//! 운영 엔드포인트: 헬스, 비상 정지, 포지션 스냅샷.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "halted": state.router.is_halted(),
        "accounts": state.router.account_count(),
        "strategies": state.router.strategy_count(),
        "timestamp": Utc::now(),
    }))
}

/// POST /emergency-stop
pub async fn emergency_stop(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.router.halt();
    warn!("운영자 요청으로 비상 정지 활성화");
    Json(json!({ "halted": true }))
}

/// POST /resume
pub async fn resume(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.router.resume();
    Json(json!({ "halted": false }))
}

/// 포지션 항목.
#[derive(Debug, Serialize)]
pub struct PositionEntry {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// 계좌 스냅샷 응답.
#[derive(Debug, Serialize)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub total_balance: Decimal,
    pub available_balance: Decimal,
    pub positions: Vec<PositionEntry>,
}

/// GET /accounts/{account_id}/positions
pub async fn account_positions(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<AccountSnapshot>, ApiError> {
    let balance = state.ledger.balance(&account_id).await?;
    let positions = state.ledger.positions(&account_id).await?;

    Ok(Json(AccountSnapshot {
        account_id,
        total_balance: balance.total,
        available_balance: balance.available,
        positions: positions
            .into_iter()
            .map(|p| PositionEntry {
                symbol: p.symbol,
                quantity: p.quantity,
                avg_price: p.avg_price,
                updated_at: p.updated_at,
            })
            .collect(),
    }))
}
