//! 주문 조회 엔드포인트.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// 주문 상태 응답.
#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub order_id: String,
    pub status: String,
    pub symbol: String,
    pub action: String,
    pub transition: String,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realized_pnl: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// GET /orders/{order_id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let trade = state.store.get_trade(order_id).await?;

    Ok(Json(OrderStatusResponse {
        order_id: trade.id.to_string(),
        status: trade.status.to_string(),
        symbol: trade.symbol,
        action: trade.side.to_string(),
        transition: trade.transition.to_string(),
        quantity: trade.quantity,
        filled_quantity: trade.filled_quantity,
        price: trade.avg_fill_price.or(trade.limit_price),
        realized_pnl: trade.realized_pnl,
        reject_reason: trade.reject_reason,
        timestamp: trade.fill_time.unwrap_or(trade.signal_time),
    }))
}
