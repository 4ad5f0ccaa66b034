//! 거래(주문 인스턴스) 엔티티와 생애주기 상태.
//!
//! 이 모듈은 시그널이 주문으로 변환된 이후의 모든 상태를 표현합니다:
//! - `Side` - 매수/매도 방향
//! - `TransitionType` - 포지션 전환 유형 (진입/청산/역전)
//! - `TradeStatus` - 생애주기 상태 머신 (SIGNAL → PENDING → FILLED | FAILED)
//! - `Trade` - 거래 엔티티 (감사용 원본 페이로드 포함)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 주문 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl Side {
    /// 반대 방향을 반환합니다.
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// 수량에 적용할 부호 (매수 +1, 매도 -1).
    pub fn sign(self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// 포지션 전환 유형.
///
/// 현재 포지션 부호와 요청 방향/수량의 관계로 결정됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransitionType {
    /// 신규 진입 또는 같은 방향 증가
    Entry,
    /// 기존 포지션 전량/부분 청산
    Exit,
    /// 반대 포지션을 넘어서는 방향 전환 (청산 leg + 진입 leg)
    Reverse,
}

impl std::fmt::Display for TransitionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionType::Entry => write!(f, "ENTRY"),
            TransitionType::Exit => write!(f, "EXIT"),
            TransitionType::Reverse => write!(f, "REVERSE"),
        }
    }
}

/// 거래 생애주기 상태.
///
/// 상태는 앞으로만 진행하며 되돌아가지 않습니다.
/// `Filled`와 `Failed`는 종결 상태입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    /// 시그널 수신 (영속화된 접수증)
    Signal,
    /// 브로커 제출 진행 중
    Pending,
    /// 체결 완료
    Filled,
    /// 실패 (리스크 거부, 브로커 거부, 재시도 소진 등)
    Failed,
}

impl TradeStatus {
    /// 종결 상태 여부.
    pub fn is_terminal(self) -> bool {
        matches!(self, TradeStatus::Filled | TradeStatus::Failed)
    }

    /// 허용되는 전이인지 확인합니다.
    ///
    /// SIGNAL → PENDING | FAILED, PENDING → FILLED | FAILED 만 허용.
    pub fn can_transition_to(self, next: TradeStatus) -> bool {
        matches!(
            (self, next),
            (TradeStatus::Signal, TradeStatus::Pending)
                | (TradeStatus::Signal, TradeStatus::Failed)
                | (TradeStatus::Pending, TradeStatus::Filled)
                | (TradeStatus::Pending, TradeStatus::Failed)
        )
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeStatus::Signal => write!(f, "SIGNAL"),
            TradeStatus::Pending => write!(f, "PENDING"),
            TradeStatus::Filled => write!(f, "FILLED"),
            TradeStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// 거래 엔티티.
///
/// 하나의 전략/계좌에 속하며, 시그널 수신 시점에 `Signal` 상태로 생성되어
/// 이후 단계가 실패하더라도 영속적인 접수 기록으로 남습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// 고유 거래 ID
    pub id: Uuid,
    /// 소속 계좌
    pub account_id: String,
    /// 소속 전략
    pub strategy_id: String,
    /// 종목 코드 (예: "005930")
    pub symbol: String,
    /// 주문 방향
    pub side: Side,
    /// 포지션 전환 유형
    pub transition: TransitionType,
    /// 요청 수량 (REVERSE의 경우 순 목표 수량)
    pub quantity: Decimal,
    /// 지정가 (None = 시장가)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    /// 생애주기 상태
    pub status: TradeStatus,
    /// 체결 수량
    pub filled_quantity: Decimal,
    /// 평균 체결가
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_fill_price: Option<Decimal>,
    /// 수수료
    pub commission: Decimal,
    /// 실현 손익 (청산 leg가 있는 체결에만)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realized_pnl: Option<Decimal>,
    /// 브로커 주문번호
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_order_id: Option<String>,
    /// 실패/거부 사유 (FAILED 상태에만)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    /// 수신한 원본 시그널 페이로드 (감사용, 내용 불투명)
    pub signal_payload: serde_json::Value,
    /// 시그널 수신 시각
    pub signal_time: DateTime<Utc>,
    /// 체결 시각
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_time: Option<DateTime<Utc>>,
}

impl Trade {
    /// 시그널로부터 `Signal` 상태의 거래를 생성합니다.
    #[allow(clippy::too_many_arguments)]
    pub fn from_signal(
        account_id: impl Into<String>,
        strategy_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        transition: TransitionType,
        quantity: Decimal,
        limit_price: Option<Decimal>,
        signal_payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.into(),
            strategy_id: strategy_id.into(),
            symbol: symbol.into(),
            side,
            transition,
            quantity,
            limit_price,
            status: TradeStatus::Signal,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            commission: Decimal::ZERO,
            realized_pnl: None,
            broker_order_id: None,
            reject_reason: None,
            signal_payload,
            signal_time: Utc::now(),
            fill_time: None,
        }
    }

    /// 시장가 주문 여부.
    pub fn is_market_order(&self) -> bool {
        self.limit_price.is_none()
    }

    /// 체결 결과를 반영합니다. 상태 전이는 호출자가 책임집니다.
    pub fn record_fill(
        &mut self,
        filled_quantity: Decimal,
        avg_fill_price: Decimal,
        commission: Decimal,
        broker_order_id: impl Into<String>,
        fill_time: DateTime<Utc>,
    ) {
        self.filled_quantity = filled_quantity;
        self.avg_fill_price = Some(avg_fill_price);
        self.commission = commission;
        self.broker_order_id = Some(broker_order_id.into());
        self.fill_time = Some(fill_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_trade() -> Trade {
        Trade::from_signal(
            "acc-1",
            "momentum",
            "005930",
            Side::Buy,
            TransitionType::Entry,
            dec!(10),
            Some(dec!(70000)),
            serde_json::json!({"action": "BUY"}),
        )
    }

    #[test]
    fn test_status_forward_only() {
        use TradeStatus::*;

        assert!(Signal.can_transition_to(Pending));
        assert!(Signal.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Filled));
        assert!(Pending.can_transition_to(Failed));

        // 역행 금지
        assert!(!Pending.can_transition_to(Signal));
        assert!(!Filled.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Signal));
        assert!(!Filled.can_transition_to(Failed));
    }

    #[test]
    fn test_terminal_states() {
        assert!(TradeStatus::Filled.is_terminal());
        assert!(TradeStatus::Failed.is_terminal());
        assert!(!TradeStatus::Signal.is_terminal());
        assert!(!TradeStatus::Pending.is_terminal());
    }

    #[test]
    fn test_market_order_detection() {
        let mut trade = sample_trade();
        assert!(!trade.is_market_order());

        trade.limit_price = None;
        assert!(trade.is_market_order());
    }

    #[test]
    fn test_side_sign() {
        assert_eq!(Side::Buy.sign(), dec!(1));
        assert_eq!(Side::Sell.sign(), dec!(-1));
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }
}
