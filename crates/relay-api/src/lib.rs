//! 웹훅 신호 수신 API 서버.
//!
//! TradingView 스타일 웹훅을 받아 신호 라우터로 전달하고,
//! 주문/포지션 조회와 운영 엔드포인트를 제공합니다.

pub mod error;
pub mod repository;
pub mod routes;
pub mod state;
