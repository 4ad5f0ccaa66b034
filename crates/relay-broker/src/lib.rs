//! relay-broker: 브로커 클라이언트 경계와 KIS 어댑터.
//!
//! - `BrokerClient` trait (제출 / 체결 조회 / 자격 증명)
//! - 고정 배수 지연 재시도 유틸리티
//! - KIS 어댑터 (OAuth 토큰 캐시, 현금 주문, 일별 체결 조회)
//! - 테스트용 `MockBroker`

pub mod client;
pub mod error;
pub mod kis;
pub mod mock;
pub mod retry;

pub use client::{BrokerClient, BrokerOrderState, FillReport, OrderAck, OrderTicket};
pub use error::BrokerError;
pub use kis::{KisAuth, KisBroker, KisEnvironment};
pub use mock::{MockBroker, SubmitScript};
pub use retry::{with_retry, RetryConfig};
