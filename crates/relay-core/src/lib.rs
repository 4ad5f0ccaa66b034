//! relay-core: 시그널 중계 파이프라인의 도메인 모델과 공용 타입.
//!
//! - 도메인: Trade / Position / Balance / Strategy / WebhookSignal
//! - 에러 분류: RejectReason
//! - 영속성 경계: TradeStore trait
//! - 설정: AppConfig 스냅샷

pub mod config;
pub mod domain;
pub mod error;
pub mod store;

pub use config::{AppConfig, ExecutorSettings};
pub use domain::{
    Account, AccountKind, Balance, FillOutcome, Position, Side, Strategy, Trade, TradeStatus,
    TradingHours, TransitionType, WebhookSignal,
};
pub use error::RejectReason;
pub use store::{FillRecord, StoreError, TradeStore};
