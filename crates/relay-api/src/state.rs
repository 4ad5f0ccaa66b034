//! 애플리케이션 공유 상태.

use std::sync::Arc;

use relay_core::store::TradeStore;
use relay_engine::ledger::PositionLedger;
use relay_engine::router::SignalRouter;

/// 핸들러에 주입되는 공유 상태.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<SignalRouter>,
    pub ledger: Arc<PositionLedger>,
    pub store: Arc<dyn TradeStore>,
}

impl AppState {
    pub fn new(
        router: Arc<SignalRouter>,
        ledger: Arc<PositionLedger>,
        store: Arc<dyn TradeStore>,
    ) -> Self {
        Self {
            router,
            ledger,
            store,
        }
    }
}
