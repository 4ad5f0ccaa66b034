//! 파이프라인 에러 분류.
//!
//! 거부/실패 사유는 전 구간에서 하나의 분류 체계를 공유합니다.
//! 시그널 거부와 리스크 거부는 해당 Trade만 FAILED로 종결되고
//! 이후 시그널 수신에는 영향을 주지 않습니다.

use serde::Serialize;
use thiserror::Error;

/// 시그널이 주문으로 이어지지 못한 사유.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "error_kind", content = "message")]
pub enum RejectReason {
    /// 필수 필드 누락 또는 형식 오류
    #[error("시그널 형식 오류: {0}")]
    MalformedSignal(String),

    /// 웹훅 토큰이 어떤 전략과도 일치하지 않음
    #[error("인증 실패: 유효하지 않은 웹훅 토큰")]
    Unauthorized,

    /// 전략 또는 소속 계좌가 비활성 상태
    #[error("전략 비활성: {0}")]
    StrategyInactive(String),

    /// 비상 정지 중
    #[error("거래 정지 중: 비상 정지가 활성화되어 있습니다")]
    TradingHalted,

    /// 거래 가능 시간 창 밖
    #[error("거래 가능 시간이 아님")]
    OutsideTradingHours,

    /// 전략 일일 손실 한도 초과
    #[error("전략 일일 손실 한도 초과: 당일 {daily_pnl}, 한도 {limit}")]
    DailyLossExceeded { daily_pnl: String, limit: String },

    /// 계좌 전체 일일 손실 한도 초과
    #[error("계좌 일일 손실 한도 초과: 당일 {daily_pnl}, 한도 {limit}")]
    GlobalLossExceeded { daily_pnl: String, limit: String },

    /// 포지션 비율 한도 초과
    #[error("포지션 비율 한도 초과: 예상 {projected_ratio}, 한도 {max_ratio}")]
    PositionRatioExceeded {
        projected_ratio: String,
        max_ratio: String,
    },

    /// 사용 가능 잔고 부족
    #[error("잔고 부족: 필요 {required}, 사용 가능 {available}")]
    InsufficientBalance { required: String, available: String },

    /// 재시도 소진 후 브로커 제출 실패
    #[error("브로커 제출 실패: {0}")]
    BrokerSubmissionFailed(String),

    /// 브로커의 명시적 거부 (재시도 없음)
    #[error("브로커 주문 거부: {0}")]
    BrokerRejected(String),

    /// 영속성 충돌이 재시도 후에도 해소되지 않음 (수동 대사 필요)
    #[error("원장 불일치: {0}")]
    LedgerInconsistency(String),
}

impl RejectReason {
    /// 응답 분류용 식별자.
    pub fn kind(&self) -> &'static str {
        match self {
            RejectReason::MalformedSignal(_) => "MalformedSignal",
            RejectReason::Unauthorized => "Unauthorized",
            RejectReason::StrategyInactive(_) => "StrategyInactive",
            RejectReason::TradingHalted => "TradingHalted",
            RejectReason::OutsideTradingHours => "OutsideTradingHours",
            RejectReason::DailyLossExceeded { .. } => "DailyLossExceeded",
            RejectReason::GlobalLossExceeded { .. } => "GlobalLossExceeded",
            RejectReason::PositionRatioExceeded { .. } => "PositionRatioExceeded",
            RejectReason::InsufficientBalance { .. } => "InsufficientBalance",
            RejectReason::BrokerSubmissionFailed(_) => "BrokerSubmissionFailed",
            RejectReason::BrokerRejected(_) => "BrokerRejected",
            RejectReason::LedgerInconsistency(_) => "LedgerInconsistency",
        }
    }

    /// 리스크 게이트 거부 여부.
    pub fn is_risk_rejection(&self) -> bool {
        matches!(
            self,
            RejectReason::OutsideTradingHours
                | RejectReason::DailyLossExceeded { .. }
                | RejectReason::GlobalLossExceeded { .. }
                | RejectReason::PositionRatioExceeded { .. }
                | RejectReason::InsufficientBalance { .. }
        )
    }

    /// 호출자 측 오류(4xx 상당) 여부.
    ///
    /// 형식/인증/리스크 거부는 호출자에게 귀속되고,
    /// 브로커 실패와 원장 불일치는 서버 측 실패로 분류합니다.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            RejectReason::BrokerSubmissionFailed(_) | RejectReason::LedgerInconsistency(_)
        )
    }
}
