//! relay-engine: 시그널 → 주문 실행 엔진.
//!
//! - `SignalRouter` - 파싱 / 인증 / 전환 해석 / 파이프라인 구동
//! - `RiskGate` - 고정 순서 리스크 검사
//! - `OrderExecutor` - 계좌별 직렬화, 재시도, REVERSE 2-leg 실행
//! - `PositionLedger` - 예약 노출과 체결의 원자적 반영
//! - `MemoryStore` - 테스트/단독 실행용 저장소

pub mod executor;
pub mod ledger;
pub mod memory_store;
pub mod risk;
pub mod router;

pub use executor::OrderExecutor;
pub use ledger::{FilledLeg, PositionLedger};
pub use memory_store::MemoryStore;
pub use risk::{daily_window_start, RiskContext, RiskGate};
pub use router::SignalRouter;
