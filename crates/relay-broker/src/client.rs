//! 브로커 클라이언트 경계.
//!
//! 실행 엔진은 이 trait을 통해서만 브로커와 통신합니다.
//! 실거래는 `KisBroker`, 테스트는 `MockBroker`가 구현합니다.

use async_trait::async_trait;
use rust_decimal::Decimal;

use relay_core::domain::trade::Side;

use crate::error::BrokerError;

/// 브로커에 제출할 주문 티켓.
#[derive(Debug, Clone)]
pub struct OrderTicket {
    /// 종목 코드
    pub symbol: String,
    /// 주문 방향
    pub side: Side,
    /// 주문 수량 (정수 단위)
    pub quantity: u32,
    /// 지정가 (None = 시장가)
    pub limit_price: Option<Decimal>,
}

/// 주문 접수 응답.
#[derive(Debug, Clone)]
pub struct OrderAck {
    /// 브로커 주문번호
    pub broker_order_id: String,
}

/// 브로커 측 주문 상태.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerOrderState {
    /// 접수됨 (미체결)
    Accepted,
    /// 부분 체결
    PartiallyFilled,
    /// 전량 체결
    Filled,
    /// 취소/거부됨
    Cancelled,
}

/// 체결 조회 결과.
#[derive(Debug, Clone)]
pub struct FillReport {
    /// 주문 상태
    pub state: BrokerOrderState,
    /// 체결 수량
    pub filled_quantity: Decimal,
    /// 평균 체결가 (체결 수량이 0이면 None)
    pub avg_fill_price: Option<Decimal>,
}

/// 브로커 클라이언트.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// 브로커 이름 (로깅용).
    fn broker_name(&self) -> &str;

    /// 유효한 접근 토큰을 보장합니다 (만료 시 갱신).
    async fn ensure_credential(&self) -> Result<(), BrokerError>;

    /// 만료된 토큰을 폐기하고 강제 재발급합니다.
    async fn refresh_credential(&self) -> Result<(), BrokerError>;

    /// 주문을 제출합니다.
    async fn submit_order(&self, ticket: &OrderTicket) -> Result<OrderAck, BrokerError>;

    /// 주문 체결 상태를 조회합니다.
    async fn query_order(
        &self,
        symbol: &str,
        broker_order_id: &str,
    ) -> Result<FillReport, BrokerError>;
}
