//! 인바운드 웹훅 시그널 파싱/정규화.
//!
//! 차트/알림 도구가 보내는 JSON 페이로드를 검증된 내부 표현으로 변환합니다.
//! 원본 페이로드는 감사 목적으로 Trade에 그대로 보존되며, 여기서는
//! 필수 필드 존재와 형식만 확인합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::trade::Side;
use crate::error::RejectReason;

/// 역직렬화용 원시 페이로드.
#[derive(Debug, Deserialize)]
struct RawPayload {
    symbol: String,
    action: String,
    quantity: i64,
    webhook_token: String,
    #[serde(default)]
    price: Option<Decimal>,
}

/// 정규화된 인바운드 시그널.
///
/// `quantity == 0`은 "보유 포지션 전량" 센티널입니다. 실제 수량은
/// SignalRouter가 현재 포지션을 조회하여 결정합니다.
#[derive(Debug, Clone)]
pub struct WebhookSignal {
    /// 종목 코드 (대문자 정규화)
    pub symbol: String,
    /// 주문 방향
    pub side: Side,
    /// 요청 수량 (0 = 전량)
    pub quantity: u32,
    /// 웹훅 토큰 (전략 식별용)
    pub webhook_token: String,
    /// 지정가 힌트 (없으면 시장가)
    pub price: Option<Decimal>,
    /// 수신 시각
    pub received_at: DateTime<Utc>,
}

impl WebhookSignal {
    /// 원시 JSON 페이로드를 파싱하고 정규화합니다.
    ///
    /// 필수 필드 누락, 잘못된 action, 음수 수량, 0 이하의 가격은
    /// 모두 `RejectReason::MalformedSignal`로 거부됩니다.
    pub fn parse(raw: &serde_json::Value) -> Result<Self, RejectReason> {
        let payload: RawPayload = serde_json::from_value(raw.clone())
            .map_err(|e| RejectReason::MalformedSignal(e.to_string()))?;

        let symbol = payload.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(RejectReason::MalformedSignal("symbol이 비어 있습니다".to_string()));
        }

        let side = match payload.action.trim().to_uppercase().as_str() {
            "BUY" => Side::Buy,
            "SELL" => Side::Sell,
            other => {
                return Err(RejectReason::MalformedSignal(format!(
                    "지원하지 않는 action: {other}"
                )))
            }
        };

        let quantity = u32::try_from(payload.quantity).map_err(|_| {
            RejectReason::MalformedSignal(format!("잘못된 수량: {}", payload.quantity))
        })?;

        if let Some(price) = payload.price {
            if price <= Decimal::ZERO {
                return Err(RejectReason::MalformedSignal(format!("잘못된 가격: {price}")));
            }
        }

        let token = payload.webhook_token.trim().to_string();
        if token.is_empty() {
            return Err(RejectReason::MalformedSignal(
                "webhook_token이 비어 있습니다".to_string(),
            ));
        }

        Ok(Self {
            symbol,
            side,
            quantity,
            webhook_token: token,
            price: payload.price,
            received_at: Utc::now(),
        })
    }

    /// 전량 거래 센티널 여부.
    pub fn is_full_position(&self) -> bool {
        self.quantity == 0
    }
}
