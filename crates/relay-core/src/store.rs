//! 영속성 경계.
//!
//! 실행 엔진은 이 trait을 통해서만 상태를 기록합니다.
//! 구현체는 메모리(테스트/단독 실행)와 PostgreSQL 두 가지이며,
//! 상태 전이 규칙(`TradeStatus::can_transition_to`)은 구현체가 강제합니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::account::Balance;
use crate::domain::position::Position;
use crate::domain::trade::{Trade, TradeStatus};

/// 저장소 오류.
#[derive(Debug, Error)]
pub enum StoreError {
    /// 동시 변경 충돌 (CAS 실패 또는 유니크 위반)
    #[error("영속성 충돌: {0}")]
    Conflict(String),

    /// 대상 행 없음
    #[error("대상을 찾을 수 없음: {0}")]
    NotFound(String),

    /// 백엔드 오류 (연결, 직렬화 등)
    #[error("저장소 백엔드 오류: {0}")]
    Backend(String),
}

impl StoreError {
    /// 충돌 여부. 호출자는 충돌에 한해 1회 재시도합니다.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// 체결 반영에 필요한 전체 변경 집합.
///
/// Trade 종결, 포지션 갱신, 잔고 갱신은 반드시 하나의 원자 단위로
/// 기록되어야 합니다. 부분 반영된 상태는 존재할 수 없습니다.
///
/// `final_status`는 보통 `Filled`이지만, REVERSE의 청산 leg만 체결되고
/// 진입 leg가 실패한 경우 체결 효과를 반영하면서 `Failed`로 종결합니다.
#[derive(Debug, Clone)]
pub struct FillRecord {
    /// 대상 거래
    pub trade_id: Uuid,
    /// 종결 상태 (Filled 또는 Failed)
    pub final_status: TradeStatus,
    /// 실패 사유 (final_status가 Failed일 때만)
    pub reject_reason: Option<String>,
    /// 체결 수량
    pub filled_quantity: Decimal,
    /// 평균 체결가
    pub avg_fill_price: Decimal,
    /// 수수료
    pub commission: Decimal,
    /// 청산 leg의 실현 손익 (청산 없으면 None)
    pub realized_pnl: Option<Decimal>,
    /// 브로커 주문 번호
    pub broker_order_id: String,
    /// 체결 시각
    pub fill_time: DateTime<Utc>,
    /// 반영 후 포지션
    pub position: Position,
    /// 반영 후 잔고
    pub balance: Balance,
}

/// 거래/포지션/잔고 저장소.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// 새 Trade 행을 삽입합니다 (상태 SIGNAL).
    ///
    /// 시그널 수신의 내구성 지점입니다. 이 호출이 성공해야만
    /// 이후 단계가 진행됩니다.
    async fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError>;

    /// 상태를 조건부로 전이합니다 (compare-and-set).
    ///
    /// 현재 상태가 `from`이 아니거나 `from -> to`가 허용되지 않는
    /// 전이면 `Conflict`를 반환합니다.
    async fn update_status(
        &self,
        trade_id: Uuid,
        from: TradeStatus,
        to: TradeStatus,
        reject_reason: Option<String>,
    ) -> Result<(), StoreError>;

    /// 체결을 원자적으로 기록합니다 (Trade 종결 + 포지션 + 잔고).
    ///
    /// 현재 상태가 `Pending`이 아니면 `Conflict`를 반환합니다.
    async fn record_fill(&self, record: &FillRecord) -> Result<(), StoreError>;

    /// Trade 단건 조회.
    async fn get_trade(&self, trade_id: Uuid) -> Result<Trade, StoreError>;

    /// (계좌, 종목) 포지션 조회. 행이 없으면 None.
    async fn position(&self, account_id: &str, symbol: &str)
        -> Result<Option<Position>, StoreError>;

    /// 계좌의 전체 포지션 목록 (수량 0 포함).
    async fn positions(&self, account_id: &str) -> Result<Vec<Position>, StoreError>;

    /// 계좌 잔고 조회.
    async fn balance(&self, account_id: &str) -> Result<Balance, StoreError>;

    /// 잔고 upsert (시작 시 초기화 및 브로커 동기화용).
    async fn upsert_balance(&self, balance: &Balance) -> Result<(), StoreError>;

    /// 지정 시각 이후 전략의 실현 손익 합계 (FILLED 거래 기준).
    async fn realized_pnl_since(
        &self,
        strategy_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Decimal, StoreError>;

    /// 지정 시각 이후 계좌의 실현 손익 합계.
    async fn account_realized_pnl_since(
        &self,
        account_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Decimal, StoreError>;
}
