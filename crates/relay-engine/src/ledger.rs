//! 포지션 원장.
//!
//! 저장소 위에서 다음을 관리합니다:
//! - PENDING 거래의 예약 노출 (리스크 평가 시 합산)
//! - 종목별 최근 관측 가격 (시장가 주문의 노출 추정용)
//! - 체결의 원자적 반영 (포지션 + 잔고 + 거래 종결)
//!
//! 체결 반영 중 영속성 충돌은 1회 재시도하고, 그래도 실패하면
//! `LedgerInconsistency`로 수동 대사 대상으로 표시합니다.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use relay_core::domain::account::Balance;
use relay_core::domain::position::Position;
use relay_core::domain::trade::{Side, Trade, TradeStatus};
use relay_core::error::RejectReason;
use relay_core::store::{FillRecord, StoreError, TradeStore};

/// 거래 1건의 체결 leg 결과 (커밋 전 집계용).
#[derive(Debug, Clone)]
pub struct FilledLeg {
    pub side: Side,
    pub filled_quantity: Decimal,
    pub avg_fill_price: Decimal,
    pub commission: Decimal,
    pub broker_order_id: String,
}

/// 예약된 노출 항목.
struct Reservation {
    account_id: String,
    symbol: String,
    amount: Decimal,
}

/// 포지션 원장.
pub struct PositionLedger {
    store: Arc<dyn TradeStore>,
    reservations: RwLock<HashMap<Uuid, Reservation>>,
    last_prices: RwLock<HashMap<String, Decimal>>,
}

impl PositionLedger {
    pub fn new(store: Arc<dyn TradeStore>) -> Self {
        Self {
            store,
            reservations: RwLock::new(HashMap::new()),
            last_prices: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn TradeStore> {
        &self.store
    }

    /// PENDING 거래의 예상 노출을 예약합니다.
    pub async fn reserve(&self, trade_id: Uuid, account_id: &str, symbol: &str, amount: Decimal) {
        let mut reservations = self.reservations.write().await;
        reservations.insert(
            trade_id,
            Reservation {
                account_id: account_id.to_string(),
                symbol: symbol.to_string(),
                amount,
            },
        );
    }

    /// 예약을 해제합니다 (종결 시).
    pub async fn release(&self, trade_id: Uuid) {
        let mut reservations = self.reservations.write().await;
        reservations.remove(&trade_id);
    }

    /// (계좌, 종목)의 예약 노출 합계.
    pub async fn reserved_exposure(&self, account_id: &str, symbol: &str) -> Decimal {
        let reservations = self.reservations.read().await;
        reservations
            .values()
            .filter(|r| r.account_id == account_id && r.symbol == symbol)
            .map(|r| r.amount)
            .sum()
    }

    /// 종목의 최근 관측 가격을 갱신합니다.
    ///
    /// 지정가 힌트가 있는 시그널과 체결가가 공급원입니다.
    pub async fn observe_price(&self, symbol: &str, price: Decimal) {
        let mut prices = self.last_prices.write().await;
        prices.insert(symbol.to_string(), price);
    }

    /// 종목의 최근 관측 가격.
    pub async fn last_price(&self, symbol: &str) -> Option<Decimal> {
        let prices = self.last_prices.read().await;
        prices.get(symbol).copied()
    }

    /// (계좌, 종목) 현재 포지션. 행이 없으면 플랫으로 취급합니다.
    pub async fn position(&self, account_id: &str, symbol: &str) -> Result<Position, StoreError> {
        Ok(self
            .store
            .position(account_id, symbol)
            .await?
            .unwrap_or_else(|| Position::flat(account_id, symbol)))
    }

    /// 계좌 잔고.
    pub async fn balance(&self, account_id: &str) -> Result<Balance, StoreError> {
        self.store.balance(account_id).await
    }

    /// 계좌 전체 포지션 목록 (수량 0 포함).
    pub async fn positions(&self, account_id: &str) -> Result<Vec<Position>, StoreError> {
        self.store.positions(account_id).await
    }

    /// 체결 leg들을 집계하여 원자적으로 커밋합니다.
    ///
    /// leg는 제출 순서대로 포지션에 반영됩니다 (REVERSE는 청산 leg 먼저).
    /// 충돌 시 1회 재시도, 이후 `LedgerInconsistency`.
    pub async fn commit_fill(
        &self,
        trade: &Trade,
        legs: &[FilledLeg],
        final_status: TradeStatus,
        reject_reason: Option<String>,
    ) -> Result<Position, RejectReason> {
        let mut position = self
            .position(&trade.account_id, &trade.symbol)
            .await
            .map_err(|e| RejectReason::LedgerInconsistency(e.to_string()))?;
        let mut balance = self
            .balance(&trade.account_id)
            .await
            .map_err(|e| RejectReason::LedgerInconsistency(e.to_string()))?;

        let mut total_filled = Decimal::ZERO;
        let mut total_value = Decimal::ZERO;
        let mut total_commission = Decimal::ZERO;
        let mut realized_pnl: Option<Decimal> = None;
        let mut order_ids: Vec<String> = Vec::new();

        for leg in legs {
            let outcome = position.apply_fill(leg.side, leg.filled_quantity, leg.avg_fill_price);
            if let Some(pnl) = outcome.realized_pnl {
                realized_pnl = Some(realized_pnl.unwrap_or(Decimal::ZERO) + pnl);
            }
            position = outcome.position;
            balance = balance.apply_fill(
                leg.side,
                leg.filled_quantity,
                leg.avg_fill_price,
                leg.commission,
            );

            total_filled += leg.filled_quantity;
            total_value += leg.filled_quantity * leg.avg_fill_price;
            total_commission += leg.commission;
            order_ids.push(leg.broker_order_id.clone());

            self.observe_price(&trade.symbol, leg.avg_fill_price).await;
        }

        let avg_fill_price = if total_filled.is_zero() {
            Decimal::ZERO
        } else {
            total_value / total_filled
        };

        let record = FillRecord {
            trade_id: trade.id,
            final_status,
            reject_reason,
            filled_quantity: total_filled,
            avg_fill_price,
            commission: total_commission,
            realized_pnl,
            broker_order_id: order_ids.join(","),
            fill_time: Utc::now(),
            position: position.clone(),
            balance,
        };

        match self.store.record_fill(&record).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                warn!(trade_id = %trade.id, error = %e, "체결 기록 충돌, 1회 재시도");
                if let Err(e) = self.store.record_fill(&record).await {
                    error!(
                        trade_id = %trade.id,
                        error = %e,
                        "체결 기록 재시도 실패, 수동 대사 필요"
                    );
                    return Err(RejectReason::LedgerInconsistency(e.to_string()));
                }
            }
            Err(e) => {
                error!(trade_id = %trade.id, error = %e, "체결 기록 실패, 수동 대사 필요");
                return Err(RejectReason::LedgerInconsistency(e.to_string()));
            }
        }

        info!(
            trade_id = %trade.id,
            symbol = %trade.symbol,
            filled = %total_filled,
            avg_price = %avg_fill_price,
            position = %position.quantity,
            status = %final_status,
            "체결 반영 완료"
        );

        Ok(position)
    }
}
