//! PostgreSQL TradeStore 구현.
//!
//! 상태 전이는 `WHERE status = $기대값` 조건부 UPDATE로 강제하고,
//! 체결 반영은 단일 트랜잭션(거래 종결 + 포지션 upsert + 잔고 upsert)으로
//! 수행합니다. 조건 불일치는 `Conflict`로 분류되어 호출자가 1회
//! 재시도합니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use relay_core::domain::account::Balance;
use relay_core::domain::position::Position;
use relay_core::domain::trade::{Side, Trade, TradeStatus, TransitionType};
use relay_core::store::{FillRecord, StoreError, TradeStore};

/// trades 행.
#[derive(sqlx::FromRow)]
struct TradeRow {
    id: Uuid,
    account_id: String,
    strategy_id: String,
    symbol: String,
    side: String,
    transition: String,
    quantity: Decimal,
    limit_price: Option<Decimal>,
    status: String,
    filled_quantity: Decimal,
    avg_fill_price: Option<Decimal>,
    commission: Decimal,
    realized_pnl: Option<Decimal>,
    broker_order_id: Option<String>,
    reject_reason: Option<String>,
    signal_payload: serde_json::Value,
    signal_time: DateTime<Utc>,
    fill_time: Option<DateTime<Utc>>,
}

fn parse_side(s: &str) -> Result<Side, StoreError> {
    match s {
        "BUY" => Ok(Side::Buy),
        "SELL" => Ok(Side::Sell),
        other => Err(StoreError::Backend(format!("알 수 없는 side: {other}"))),
    }
}

fn parse_transition(s: &str) -> Result<TransitionType, StoreError> {
    match s {
        "ENTRY" => Ok(TransitionType::Entry),
        "EXIT" => Ok(TransitionType::Exit),
        "REVERSE" => Ok(TransitionType::Reverse),
        other => Err(StoreError::Backend(format!("알 수 없는 transition: {other}"))),
    }
}

fn parse_status(s: &str) -> Result<TradeStatus, StoreError> {
    match s {
        "SIGNAL" => Ok(TradeStatus::Signal),
        "PENDING" => Ok(TradeStatus::Pending),
        "FILLED" => Ok(TradeStatus::Filled),
        "FAILED" => Ok(TradeStatus::Failed),
        other => Err(StoreError::Backend(format!("알 수 없는 status: {other}"))),
    }
}

impl TradeRow {
    fn into_trade(self) -> Result<Trade, StoreError> {
        Ok(Trade {
            id: self.id,
            account_id: self.account_id,
            strategy_id: self.strategy_id,
            symbol: self.symbol,
            side: parse_side(&self.side)?,
            transition: parse_transition(&self.transition)?,
            quantity: self.quantity,
            limit_price: self.limit_price,
            status: parse_status(&self.status)?,
            filled_quantity: self.filled_quantity,
            avg_fill_price: self.avg_fill_price,
            commission: self.commission,
            realized_pnl: self.realized_pnl,
            broker_order_id: self.broker_order_id,
            reject_reason: self.reject_reason,
            signal_payload: self.signal_payload,
            signal_time: self.signal_time,
            fill_time: self.fill_time,
        })
    }
}

/// PostgreSQL 저장소.
pub struct PgTradeStore {
    pool: PgPool,
}

impl PgTradeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 스키마를 적용합니다 (idempotent).
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let sql = include_str!("../../migrations/0001_init.sql");
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn backend(e: sqlx::Error) -> StoreError {
        // 23505 = unique_violation
        if let sqlx::Error::Database(db) = &e {
            if db.code().as_deref() == Some("23505") {
                return StoreError::Conflict(db.message().to_string());
            }
        }
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
impl TradeStore for PgTradeStore {
    async fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, account_id, strategy_id, symbol, side, transition,
                quantity, limit_price, status, filled_quantity, commission,
                signal_payload, signal_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(trade.id)
        .bind(&trade.account_id)
        .bind(&trade.strategy_id)
        .bind(&trade.symbol)
        .bind(trade.side.to_string())
        .bind(trade.transition.to_string())
        .bind(trade.quantity)
        .bind(trade.limit_price)
        .bind(trade.status.to_string())
        .bind(trade.filled_quantity)
        .bind(trade.commission)
        .bind(&trade.signal_payload)
        .bind(trade.signal_time)
        .execute(&self.pool)
        .await
        .map_err(Self::backend)?;

        Ok(())
    }

    async fn update_status(
        &self,
        trade_id: Uuid,
        from: TradeStatus,
        to: TradeStatus,
        reject_reason: Option<String>,
    ) -> Result<(), StoreError> {
        if !from.can_transition_to(to) {
            return Err(StoreError::Conflict(format!(
                "거래 {trade_id}: 허용되지 않는 전이 {from} -> {to}"
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE trades
            SET status = $1,
                reject_reason = COALESCE($2, reject_reason)
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(to.to_string())
        .bind(reject_reason)
        .bind(trade_id)
        .bind(from.to_string())
        .execute(&self.pool)
        .await
        .map_err(Self::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "거래 {trade_id}: 기대 상태 {from} 아님"
            )));
        }
        Ok(())
    }

    async fn record_fill(&self, record: &FillRecord) -> Result<(), StoreError> {
        if !record.final_status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "종결 상태가 아님: {}",
                record.final_status
            )));
        }

        let mut tx = self.pool.begin().await.map_err(Self::backend)?;

        let result = sqlx::query(
            r#"
            UPDATE trades
            SET status = $1,
                reject_reason = $2,
                filled_quantity = $3,
                avg_fill_price = $4,
                commission = $5,
                realized_pnl = $6,
                broker_order_id = $7,
                fill_time = $8
            WHERE id = $9 AND status = 'PENDING'
            "#,
        )
        .bind(record.final_status.to_string())
        .bind(&record.reject_reason)
        .bind(record.filled_quantity)
        .bind(record.avg_fill_price)
        .bind(record.commission)
        .bind(record.realized_pnl)
        .bind(&record.broker_order_id)
        .bind(record.fill_time)
        .bind(record.trade_id)
        .execute(&mut *tx)
        .await
        .map_err(Self::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "거래 {}: PENDING 아님",
                record.trade_id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO positions (account_id, symbol, quantity, avg_price, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (account_id, symbol)
            DO UPDATE SET quantity = $3, avg_price = $4, updated_at = $5
            "#,
        )
        .bind(&record.position.account_id)
        .bind(&record.position.symbol)
        .bind(record.position.quantity)
        .bind(record.position.avg_price)
        .bind(record.position.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(Self::backend)?;

        sqlx::query(
            r#"
            INSERT INTO balances (account_id, total, available, unrealized_pnl, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (account_id)
            DO UPDATE SET total = $2, available = $3, unrealized_pnl = $4, updated_at = $5
            "#,
        )
        .bind(&record.balance.account_id)
        .bind(record.balance.total)
        .bind(record.balance.available)
        .bind(record.balance.unrealized_pnl)
        .bind(record.balance.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(Self::backend)?;

        tx.commit().await.map_err(Self::backend)?;
        Ok(())
    }

    async fn get_trade(&self, trade_id: Uuid) -> Result<Trade, StoreError> {
        let row: Option<TradeRow> = sqlx::query_as("SELECT * FROM trades WHERE id = $1")
            .bind(trade_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::backend)?;

        row.ok_or_else(|| StoreError::NotFound(format!("거래 {trade_id}")))?
            .into_trade()
    }

    async fn position(
        &self,
        account_id: &str,
        symbol: &str,
    ) -> Result<Option<Position>, StoreError> {
        let row = sqlx::query(
            "SELECT quantity, avg_price, updated_at FROM positions WHERE account_id = $1 AND symbol = $2",
        )
        .bind(account_id)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::backend)?;

        Ok(row.map(|r| Position {
            account_id: account_id.to_string(),
            symbol: symbol.to_string(),
            quantity: r.get("quantity"),
            avg_price: r.get("avg_price"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn positions(&self, account_id: &str) -> Result<Vec<Position>, StoreError> {
        let rows = sqlx::query(
            "SELECT symbol, quantity, avg_price, updated_at FROM positions WHERE account_id = $1 ORDER BY symbol",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::backend)?;

        Ok(rows
            .into_iter()
            .map(|r| Position {
                account_id: account_id.to_string(),
                symbol: r.get("symbol"),
                quantity: r.get("quantity"),
                avg_price: r.get("avg_price"),
                updated_at: r.get("updated_at"),
            })
            .collect())
    }

    async fn balance(&self, account_id: &str) -> Result<Balance, StoreError> {
        let row = sqlx::query(
            "SELECT total, available, unrealized_pnl, updated_at FROM balances WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::backend)?;

        row.map(|r| Balance {
            account_id: account_id.to_string(),
            total: r.get("total"),
            available: r.get("available"),
            unrealized_pnl: r.get("unrealized_pnl"),
            updated_at: r.get("updated_at"),
        })
        .ok_or_else(|| StoreError::NotFound(format!("잔고 {account_id}")))
    }

    async fn upsert_balance(&self, balance: &Balance) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO balances (account_id, total, available, unrealized_pnl, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (account_id)
            DO UPDATE SET total = $2, available = $3, unrealized_pnl = $4, updated_at = $5
            "#,
        )
        .bind(&balance.account_id)
        .bind(balance.total)
        .bind(balance.available)
        .bind(balance.unrealized_pnl)
        .bind(balance.updated_at)
        .execute(&self.pool)
        .await
        .map_err(Self::backend)?;
        Ok(())
    }

    async fn realized_pnl_since(
        &self,
        strategy_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Decimal, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(realized_pnl), 0) AS pnl
            FROM trades
            WHERE strategy_id = $1 AND fill_time >= $2
            "#,
        )
        .bind(strategy_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::backend)?;

        Ok(row.get("pnl"))
    }

    async fn account_realized_pnl_since(
        &self,
        account_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Decimal, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(realized_pnl), 0) AS pnl
            FROM trades
            WHERE account_id = $1 AND fill_time >= $2
            "#,
        )
        .bind(account_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::backend)?;

        Ok(row.get("pnl"))
    }
}
