//! 한국투자증권(KIS) 어댑터.

pub mod auth;
pub mod client;

pub use auth::{KisAuth, KisEnvironment};
pub use client::KisBroker;
