//! 영속성 구현체.

pub mod trades;

pub use trades::PgTradeStore;
