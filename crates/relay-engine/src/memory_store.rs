//! 메모리 TradeStore 구현.
//!
//! 테스트와 DATABASE_URL 없는 단독 실행에서 사용합니다.
//! 상태 전이 규칙은 PostgreSQL 구현과 동일하게 강제합니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use relay_core::domain::account::Balance;
use relay_core::domain::position::Position;
use relay_core::domain::trade::{Trade, TradeStatus};
use relay_core::store::{FillRecord, StoreError, TradeStore};

#[derive(Default)]
struct Books {
    trades: HashMap<Uuid, Trade>,
    positions: HashMap<(String, String), Position>,
    balances: HashMap<String, Balance>,
}

/// 메모리 저장소.
pub struct MemoryStore {
    books: RwLock<Books>,
    /// 다음 N회의 record_fill을 Conflict로 실패시킴 (충돌 경로 테스트용)
    inject_conflicts: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            books: RwLock::new(Books::default()),
            inject_conflicts: AtomicU32::new(0),
        }
    }

    /// 다음 `n`회의 record_fill이 Conflict를 반환하도록 설정합니다.
    pub fn inject_conflicts(&self, n: u32) {
        self.inject_conflicts.store(n, Ordering::SeqCst);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        let mut books = self.books.write().await;
        if books.trades.contains_key(&trade.id) {
            return Err(StoreError::Conflict(format!("거래 {} 중복", trade.id)));
        }
        books.trades.insert(trade.id, trade.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        trade_id: Uuid,
        from: TradeStatus,
        to: TradeStatus,
        reject_reason: Option<String>,
    ) -> Result<(), StoreError> {
        let mut books = self.books.write().await;
        let trade = books
            .trades
            .get_mut(&trade_id)
            .ok_or_else(|| StoreError::NotFound(format!("거래 {trade_id}")))?;

        if trade.status != from {
            return Err(StoreError::Conflict(format!(
                "거래 {trade_id}: 기대 상태 {from}, 현재 {}",
                trade.status
            )));
        }
        if !from.can_transition_to(to) {
            return Err(StoreError::Conflict(format!(
                "거래 {trade_id}: 허용되지 않는 전이 {from} -> {to}"
            )));
        }

        trade.status = to;
        if let Some(reason) = reject_reason {
            trade.reject_reason = Some(reason);
        }
        Ok(())
    }

    async fn record_fill(&self, record: &FillRecord) -> Result<(), StoreError> {
        if self
            .inject_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Conflict("주입된 충돌".to_string()));
        }

        if !record.final_status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "종결 상태가 아님: {}",
                record.final_status
            )));
        }

        let mut books = self.books.write().await;
        let trade = books
            .trades
            .get_mut(&record.trade_id)
            .ok_or_else(|| StoreError::NotFound(format!("거래 {}", record.trade_id)))?;

        if trade.status != TradeStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "거래 {}: PENDING이 아닌 상태 {}에서 체결 기록",
                record.trade_id, trade.status
            )));
        }

        trade.status = record.final_status;
        trade.reject_reason = record.reject_reason.clone();
        trade.realized_pnl = record.realized_pnl;
        trade.record_fill(
            record.filled_quantity,
            record.avg_fill_price,
            record.commission,
            record.broker_order_id.clone(),
            record.fill_time,
        );

        let key = (
            record.position.account_id.clone(),
            record.position.symbol.clone(),
        );
        books.positions.insert(key, record.position.clone());
        books
            .balances
            .insert(record.balance.account_id.clone(), record.balance.clone());

        Ok(())
    }

    async fn get_trade(&self, trade_id: Uuid) -> Result<Trade, StoreError> {
        let books = self.books.read().await;
        books
            .trades
            .get(&trade_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("거래 {trade_id}")))
    }

    async fn position(
        &self,
        account_id: &str,
        symbol: &str,
    ) -> Result<Option<Position>, StoreError> {
        let books = self.books.read().await;
        Ok(books
            .positions
            .get(&(account_id.to_string(), symbol.to_string()))
            .cloned())
    }

    async fn positions(&self, account_id: &str) -> Result<Vec<Position>, StoreError> {
        let books = self.books.read().await;
        let mut positions: Vec<Position> = books
            .positions
            .values()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    async fn balance(&self, account_id: &str) -> Result<Balance, StoreError> {
        let books = self.books.read().await;
        books
            .balances
            .get(account_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("잔고 {account_id}")))
    }

    async fn upsert_balance(&self, balance: &Balance) -> Result<(), StoreError> {
        let mut books = self.books.write().await;
        books
            .balances
            .insert(balance.account_id.clone(), balance.clone());
        Ok(())
    }

    async fn realized_pnl_since(
        &self,
        strategy_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Decimal, StoreError> {
        let books = self.books.read().await;
        Ok(books
            .trades
            .values()
            .filter(|t| {
                t.strategy_id == strategy_id
                    && t.fill_time.map(|ft| ft >= since).unwrap_or(false)
            })
            .filter_map(|t| t.realized_pnl)
            .sum())
    }

    async fn account_realized_pnl_since(
        &self,
        account_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Decimal, StoreError> {
        let books = self.books.read().await;
        Ok(books
            .trades
            .values()
            .filter(|t| {
                t.account_id == account_id
                    && t.fill_time.map(|ft| ft >= since).unwrap_or(false)
            })
            .filter_map(|t| t.realized_pnl)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::domain::trade::{Side, TransitionType};
    use rust_decimal_macros::dec;

    fn sample_trade() -> Trade {
        Trade::from_signal(
            "acc-1",
            "momentum",
            "005930",
            Side::Buy,
            TransitionType::Entry,
            dec!(10),
            Some(dec!(70000)),
            serde_json::json!({}),
        )
    }

    fn fill_record(trade: &Trade) -> FillRecord {
        let position = Position::flat("acc-1", "005930")
            .apply_fill(Side::Buy, dec!(10), dec!(70000))
            .position;
        let balance = Balance::new("acc-1", dec!(10_000_000)).apply_fill(
            Side::Buy,
            dec!(10),
            dec!(70000),
            dec!(105),
        );
        FillRecord {
            trade_id: trade.id,
            final_status: TradeStatus::Filled,
            reject_reason: None,
            filled_quantity: dec!(10),
            avg_fill_price: dec!(70000),
            commission: dec!(105),
            realized_pnl: None,
            broker_order_id: "ORD001".to_string(),
            fill_time: Utc::now(),
            position,
            balance,
        }
    }

    #[tokio::test]
    async fn test_status_cas() {
        let store = MemoryStore::new();
        let trade = sample_trade();
        store.insert_trade(&trade).await.unwrap();

        store
            .update_status(trade.id, TradeStatus::Signal, TradeStatus::Pending, None)
            .await
            .unwrap();

        // 같은 전이 재시도는 충돌
        let err = store
            .update_status(trade.id, TradeStatus::Signal, TradeStatus::Pending, None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_record_fill_requires_pending() {
        let store = MemoryStore::new();
        let trade = sample_trade();
        store.insert_trade(&trade).await.unwrap();

        // SIGNAL 상태에서 체결 기록은 충돌
        let err = store.record_fill(&fill_record(&trade)).await.unwrap_err();
        assert!(err.is_conflict());

        store
            .update_status(trade.id, TradeStatus::Signal, TradeStatus::Pending, None)
            .await
            .unwrap();
        store.record_fill(&fill_record(&trade)).await.unwrap();

        let stored = store.get_trade(trade.id).await.unwrap();
        assert_eq!(stored.status, TradeStatus::Filled);
        assert_eq!(stored.filled_quantity, dec!(10));

        let position = store.position("acc-1", "005930").await.unwrap().unwrap();
        assert_eq!(position.quantity, dec!(10));
        let balance = store.balance("acc-1").await.unwrap();
        assert_eq!(balance.available, dec!(9_299_895));
    }

    #[tokio::test]
    async fn test_injected_conflict_consumed() {
        let store = MemoryStore::new();
        let trade = sample_trade();
        store.insert_trade(&trade).await.unwrap();
        store
            .update_status(trade.id, TradeStatus::Signal, TradeStatus::Pending, None)
            .await
            .unwrap();

        store.inject_conflicts(1);
        assert!(store.record_fill(&fill_record(&trade)).await.is_err());
        // 주입 소진 후 성공
        assert!(store.record_fill(&fill_record(&trade)).await.is_ok());
    }

    #[tokio::test]
    async fn test_realized_pnl_window() {
        let store = MemoryStore::new();
        let mut trade = sample_trade();
        trade.status = TradeStatus::Filled;
        trade.realized_pnl = Some(dec!(-50000));
        trade.fill_time = Some(Utc::now());
        store.insert_trade(&trade).await.unwrap();

        let since = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(
            store.realized_pnl_since("momentum", since).await.unwrap(),
            dec!(-50000)
        );
        assert_eq!(
            store.account_realized_pnl_since("acc-1", since).await.unwrap(),
            dec!(-50000)
        );

        let future = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(
            store.realized_pnl_since("momentum", future).await.unwrap(),
            dec!(0)
        );
    }
}
