//! 웹훅 수신 엔드포인트.
//!
//! 차트/알림 도구의 POST 페이로드를 그대로 라우터에 넘깁니다.
//! 파싱/검증은 엔진 소관이고, 여기서는 결과를 HTTP 응답으로 변환만 합니다.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use relay_core::domain::trade::Trade;

use crate::error::ApiError;
use crate::state::AppState;

/// 접수 응답.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub order_id: String,
    pub status: String,
    pub symbol: String,
    pub action: String,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub account_id: String,
    pub timestamp: DateTime<Utc>,
}

impl From<Trade> for WebhookResponse {
    fn from(trade: Trade) -> Self {
        Self {
            order_id: trade.id.to_string(),
            status: trade.status.to_string(),
            symbol: trade.symbol,
            action: trade.side.to_string(),
            quantity: trade.quantity,
            filled_quantity: trade.filled_quantity,
            account_id: trade.account_id,
            timestamp: trade.signal_time,
        }
    }
}

/// POST /webhook
pub async fn receive_webhook(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let trade = state.router.route(&payload).await?;
    Ok(Json(WebhookResponse::from(trade)))
}
