//! 도메인 모델.

pub mod account;
pub mod position;
pub mod signal;
pub mod strategy;
pub mod trade;

pub use account::{Account, AccountKind, Balance};
pub use position::{FillOutcome, Position};
pub use signal::WebhookSignal;
pub use strategy::{Strategy, TradingHours};
pub use trade::{Side, Trade, TradeStatus, TransitionType};
