//! 주문 실행기.
//!
//! SIGNAL → PENDING → {FILLED | FAILED} 상태 머신을 구동합니다.
//!
//! # 직렬화
//!
//! 계좌별 Mutex를 잔고 재확인부터 원장 커밋까지 보유합니다.
//! 같은 계좌의 시그널은 순차 실행되고, 다른 계좌는 병렬로 진행됩니다.
//!
//! # 재시도
//!
//! 고정 배수 지연 (n회째 대기 = n × retry_delay). 브로커의 명시적 거부는
//! 재시도하지 않고 즉시 FAILED. 토큰 만료는 1회 투명 갱신 후
//! 1회만 재제출합니다.
//!
//! # REVERSE
//!
//! 단일 순 주문 대신 청산 leg와 진입 leg를 같은 락 보유 구간에서
//! 순차 제출합니다. 청산만 체결되고 진입이 실패하면 청산 효과를
//! 반영한 채 FAILED로 종결합니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use relay_broker::client::{BrokerClient, BrokerOrderState, OrderTicket};
use relay_broker::error::BrokerError;
use relay_broker::retry::{with_retry, RetryConfig};
use relay_core::config::{AccountConfig, ExecutorSettings};
use relay_core::domain::strategy::Strategy;
use relay_core::domain::trade::{Trade, TradeStatus, TransitionType};
use relay_core::error::RejectReason;
use relay_core::store::TradeStore;

use crate::ledger::{FilledLeg, PositionLedger};
use crate::risk::{daily_window_start, RiskContext, RiskGate};

/// 주문 실행기.
pub struct OrderExecutor {
    store: Arc<dyn TradeStore>,
    ledger: Arc<PositionLedger>,
    brokers: HashMap<String, Arc<dyn BrokerClient>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    settings: ExecutorSettings,
}

impl OrderExecutor {
    pub fn new(
        store: Arc<dyn TradeStore>,
        ledger: Arc<PositionLedger>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            store,
            ledger,
            brokers: HashMap::new(),
            locks: DashMap::new(),
            settings,
        }
    }

    /// 계좌에 브로커를 연결합니다.
    pub fn with_broker(mut self, account_id: impl Into<String>, broker: Arc<dyn BrokerClient>) -> Self {
        self.brokers.insert(account_id.into(), broker);
        self
    }

    fn account_lock(&self, account_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 리스크 평가 컨텍스트를 조립합니다.
    pub async fn assemble_risk_context(
        &self,
        strategy: &Strategy,
        account: &AccountConfig,
        trade: &Trade,
    ) -> Result<RiskContext, RejectReason> {
        let now = chrono::Utc::now();
        let window_start = daily_window_start(&strategy.hours, now);

        let strategy_daily_pnl = self
            .store
            .realized_pnl_since(&strategy.id, window_start)
            .await
            .map_err(|e| RejectReason::LedgerInconsistency(e.to_string()))?;
        let account_daily_pnl = self
            .store
            .account_realized_pnl_since(&account.id, window_start)
            .await
            .map_err(|e| RejectReason::LedgerInconsistency(e.to_string()))?;

        let balance = self
            .ledger
            .balance(&account.id)
            .await
            .map_err(|e| RejectReason::LedgerInconsistency(e.to_string()))?;
        let position = self
            .ledger
            .position(&account.id, &trade.symbol)
            .await
            .map_err(|e| RejectReason::LedgerInconsistency(e.to_string()))?;
        let reserved_exposure = self
            .ledger
            .reserved_exposure(&account.id, &trade.symbol)
            .await;

        let price_hint = self.ledger.last_price(&trade.symbol).await;

        Ok(RiskContext {
            now,
            transition: trade.transition,
            strategy_daily_pnl,
            account_daily_pnl,
            global_max_daily_loss: account.global_max_daily_loss,
            account_kind: account.kind,
            futures_margin_rate: self.settings.futures_margin_rate,
            total_balance: balance.total,
            available_balance: balance.available,
            symbol_position: position.quantity,
            reserved_exposure,
            order_quantity: trade.quantity * trade.side.sign(),
            reference_price: trade.limit_price.or(price_hint),
        })
    }

    /// 거래를 실행합니다.
    ///
    /// 호출 시점에 거래는 SIGNAL 상태로 영속화되어 있어야 합니다.
    /// 같은 거래 ID로 재호출하면 제출 없이 현재 상태를 반환합니다.
    pub async fn execute(
        &self,
        trade: &Trade,
        strategy: &Strategy,
        account: &AccountConfig,
    ) -> Result<Trade, RejectReason> {
        let broker = self
            .brokers
            .get(&account.id)
            .cloned()
            .ok_or_else(|| {
                RejectReason::BrokerSubmissionFailed(format!(
                    "계좌 {}에 브로커가 구성되지 않음",
                    account.id
                ))
            })?;

        let lock = self.account_lock(&account.id);
        let _guard = lock.lock().await;

        // 멱등성: SIGNAL이 아니면 이미 처리 중이거나 종결됨
        let current = self
            .store
            .get_trade(trade.id)
            .await
            .map_err(|e| RejectReason::LedgerInconsistency(e.to_string()))?;
        if current.status != TradeStatus::Signal {
            info!(
                trade_id = %trade.id,
                status = %current.status,
                "이미 처리된 거래, 재제출 생략"
            );
            return Ok(current);
        }

        // 락 보유 상태에서 리스크 재확인 (잔고/노출이 변했을 수 있음)
        let ctx = self.assemble_risk_context(strategy, account, trade).await?;
        if let Err(reason) = RiskGate::evaluate(strategy, &ctx) {
            warn!(
                trade_id = %trade.id,
                reason = reason.kind(),
                "락 보유 중 리스크 재확인 거부"
            );
            self.fail_trade(trade, TradeStatus::Signal, &reason).await;
            return Err(reason);
        }

        // SIGNAL → PENDING. 충돌이면 다른 경로가 선점한 것
        if let Err(e) = self
            .store
            .update_status(trade.id, TradeStatus::Signal, TradeStatus::Pending, None)
            .await
        {
            if e.is_conflict() {
                let current = self
                    .store
                    .get_trade(trade.id)
                    .await
                    .map_err(|e| RejectReason::LedgerInconsistency(e.to_string()))?;
                return Ok(current);
            }
            return Err(RejectReason::LedgerInconsistency(e.to_string()));
        }

        if let Some(value) = ctx.order_value() {
            self.ledger
                .reserve(trade.id, &account.id, &trade.symbol, value)
                .await;
        }

        let result = self.run_legs(trade, &*broker).await;
        self.ledger.release(trade.id).await;
        result
    }

    /// 제출 leg들을 실행하고 종결합니다.
    async fn run_legs(
        &self,
        trade: &Trade,
        broker: &dyn BrokerClient,
    ) -> Result<Trade, RejectReason> {
        let tickets = self.build_tickets(trade).await?;

        let mut filled: Vec<FilledLeg> = Vec::new();
        for (index, ticket) in tickets.iter().enumerate() {
            match self.submit_and_wait(broker, ticket).await {
                Ok(leg) => filled.push(leg),
                Err(reason) => {
                    if filled.is_empty() {
                        // 아무 것도 체결되지 않음: 단순 FAILED
                        self.fail_trade(trade, TradeStatus::Pending, &reason).await;
                    } else {
                        // REVERSE 청산 leg만 체결: 효과 반영 후 FAILED
                        error!(
                            trade_id = %trade.id,
                            failed_leg = index,
                            reason = reason.kind(),
                            "역전 진입 leg 실패, 청산 효과만 반영"
                        );
                        self.ledger
                            .commit_fill(
                                trade,
                                &filled,
                                TradeStatus::Failed,
                                Some(reason.to_string()),
                            )
                            .await?;
                    }
                    return Err(reason);
                }
            }
        }

        self.ledger
            .commit_fill(trade, &filled, TradeStatus::Filled, None)
            .await?;

        self.store
            .get_trade(trade.id)
            .await
            .map_err(|e| RejectReason::LedgerInconsistency(e.to_string()))
    }

    /// 전환 유형에 따른 제출 티켓 목록.
    ///
    /// REVERSE는 청산 leg 후 진입 leg 순서입니다.
    async fn build_tickets(&self, trade: &Trade) -> Result<Vec<OrderTicket>, RejectReason> {
        let total = trade.quantity.to_u32().ok_or_else(|| {
            RejectReason::MalformedSignal(format!("수량 변환 실패: {}", trade.quantity))
        })?;

        if trade.transition != TransitionType::Reverse {
            return Ok(vec![OrderTicket {
                symbol: trade.symbol.clone(),
                side: trade.side,
                quantity: total,
                limit_price: trade.limit_price,
            }]);
        }

        let position = self
            .ledger
            .position(&trade.account_id, &trade.symbol)
            .await
            .map_err(|e| RejectReason::LedgerInconsistency(e.to_string()))?;
        let close = position.quantity.abs().to_u32().ok_or_else(|| {
            RejectReason::MalformedSignal(format!("포지션 수량 변환 실패: {}", position.quantity))
        })?;
        let open = total.saturating_sub(close);

        debug!(
            trade_id = %trade.id,
            close_quantity = close,
            open_quantity = open,
            "역전 주문 leg 분할"
        );

        let mut tickets = Vec::new();
        if close > 0 {
            tickets.push(OrderTicket {
                symbol: trade.symbol.clone(),
                side: trade.side,
                quantity: close,
                limit_price: trade.limit_price,
            });
        }
        if open > 0 {
            tickets.push(OrderTicket {
                symbol: trade.symbol.clone(),
                side: trade.side,
                quantity: open,
                limit_price: trade.limit_price,
            });
        }
        Ok(tickets)
    }

    /// 주문 1건을 제출하고 체결을 확인합니다.
    async fn submit_and_wait(
        &self,
        broker: &dyn BrokerClient,
        ticket: &OrderTicket,
    ) -> Result<FilledLeg, RejectReason> {
        let retry = RetryConfig {
            max_retries: self.settings.retry_count,
            base_delay: self.settings.retry_delay(),
        };

        let ack = match with_retry(&retry, || broker.submit_order(ticket)).await {
            Ok(ack) => ack,
            Err(e) if e.is_auth_expired() => {
                // 토큰 만료: 1회 투명 갱신 후 1회만 재제출
                info!("접근 토큰 만료, 갱신 후 재제출");
                broker
                    .refresh_credential()
                    .await
                    .map_err(|e| RejectReason::BrokerSubmissionFailed(e.to_string()))?;
                with_retry(&RetryConfig::no_retry(), || broker.submit_order(ticket))
                    .await
                    .map_err(Self::map_broker_error)?
            }
            Err(e) => return Err(Self::map_broker_error(e)),
        };

        self.wait_for_fill(broker, ticket, &ack.broker_order_id)
            .await
    }

    /// 체결 확인 폴링.
    ///
    /// 타임아웃까지 체결이 확인되지 않으면, 부분 체결분이 있으면 그만큼
    /// 반영하고 없으면 제출 실패로 처리합니다.
    async fn wait_for_fill(
        &self,
        broker: &dyn BrokerClient,
        ticket: &OrderTicket,
        broker_order_id: &str,
    ) -> Result<FilledLeg, RejectReason> {
        let deadline = Instant::now() + self.settings.fill_timeout();
        let mut last_report = None;

        loop {
            match broker.query_order(&ticket.symbol, broker_order_id).await {
                Ok(report) => {
                    match report.state {
                        BrokerOrderState::Filled => {
                            let avg = report.avg_fill_price.ok_or_else(|| {
                                RejectReason::LedgerInconsistency(format!(
                                    "주문 {broker_order_id}: 체결가 없는 체결 보고"
                                ))
                            })?;
                            return Ok(self.leg_from(ticket, report.filled_quantity, avg, broker_order_id));
                        }
                        BrokerOrderState::Cancelled => {
                            return Err(RejectReason::BrokerRejected(format!(
                                "주문 {broker_order_id} 취소됨"
                            )));
                        }
                        _ => last_report = Some(report),
                    }
                }
                Err(e) => {
                    debug!(error = %e, "체결 조회 실패, 다음 폴링에서 재시도");
                }
            }

            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(self.settings.fill_poll_interval()).await;
        }

        // 타임아웃: 부분 체결분이 있으면 반영
        if let Some(report) = last_report {
            if report.filled_quantity > Decimal::ZERO {
                if let Some(avg) = report.avg_fill_price {
                    warn!(
                        broker_order_id,
                        filled = %report.filled_quantity,
                        "체결 확인 타임아웃, 부분 체결분만 반영"
                    );
                    return Ok(self.leg_from(ticket, report.filled_quantity, avg, broker_order_id));
                }
            }
        }

        Err(RejectReason::BrokerSubmissionFailed(format!(
            "주문 {broker_order_id} 체결 확인 타임아웃"
        )))
    }

    fn leg_from(
        &self,
        ticket: &OrderTicket,
        filled_quantity: Decimal,
        avg_fill_price: Decimal,
        broker_order_id: &str,
    ) -> FilledLeg {
        let commission = filled_quantity * avg_fill_price * self.settings.commission_rate;
        FilledLeg {
            side: ticket.side,
            filled_quantity,
            avg_fill_price,
            commission,
            broker_order_id: broker_order_id.to_string(),
        }
    }

    /// 거래를 FAILED로 종결합니다 (원장 변경 없음).
    async fn fail_trade(&self, trade: &Trade, from: TradeStatus, reason: &RejectReason) {
        if let Err(e) = self
            .store
            .update_status(trade.id, from, TradeStatus::Failed, Some(reason.to_string()))
            .await
        {
            error!(
                trade_id = %trade.id,
                error = %e,
                "FAILED 전이 기록 실패"
            );
        }
    }

    fn map_broker_error(e: BrokerError) -> RejectReason {
        match e {
            BrokerError::Rejected { code, message } => {
                RejectReason::BrokerRejected(format!("[{code}] {message}"))
            }
            other => RejectReason::BrokerSubmissionFailed(other.to_string()),
        }
    }
}
