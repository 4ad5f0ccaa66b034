//! 시그널 라우터.
//!
//! 인바운드 웹훅 페이로드를 받아 파이프라인을 구동합니다:
//! 비상 정지 확인 → 파싱 → 토큰 조회 → 수량/전환 해석 →
//! SIGNAL 영속화 → 리스크 평가 → 실행기 위임.
//!
//! 토큰 조회는 등록된 모든 전략을 항상 끝까지 순회하며 상수 시간
//! 비교를 수행합니다. 어느 토큰이 일치 근처인지조차 응답 시간으로
//! 드러나지 않아야 합니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use tracing::{info, warn};

use relay_core::config::AccountConfig;
use relay_core::domain::position::Position;
use relay_core::domain::signal::WebhookSignal;
use relay_core::domain::strategy::Strategy;
use relay_core::domain::trade::{Side, Trade, TradeStatus, TransitionType};
use relay_core::error::RejectReason;
use relay_core::store::TradeStore;

use crate::executor::OrderExecutor;
use crate::ledger::PositionLedger;
use crate::risk::RiskGate;

/// 요청 수량과 현재 포지션으로 주문 수량과 전환 유형을 결정합니다.
///
/// `requested == 0`은 전량 센티널입니다: 반대 방향 포지션이 있으면
/// 그 절대 수량으로 해석하고, 청산할 포지션이 없으면 거부합니다.
fn resolve_order(
    position: &Position,
    side: Side,
    requested: u32,
) -> Result<(Decimal, TransitionType), RejectReason> {
    let position_sign = position.quantity.signum();
    let closing = !position.is_flat() && position_sign != side.sign();

    let quantity = if requested == 0 {
        if !closing {
            return Err(RejectReason::MalformedSignal(
                "전량 센티널(수량 0)인데 청산할 포지션이 없습니다".to_string(),
            ));
        }
        position.quantity.abs()
    } else {
        Decimal::from(requested)
    };

    let transition = if !closing {
        TransitionType::Entry
    } else if quantity <= position.quantity.abs() {
        TransitionType::Exit
    } else {
        TransitionType::Reverse
    };

    Ok((quantity, transition))
}

/// 시그널 라우터.
pub struct SignalRouter {
    strategies: Vec<Strategy>,
    accounts: HashMap<String, AccountConfig>,
    store: Arc<dyn TradeStore>,
    ledger: Arc<PositionLedger>,
    executor: Arc<OrderExecutor>,
    halted: AtomicBool,
}

impl SignalRouter {
    pub fn new(
        strategies: Vec<Strategy>,
        accounts: Vec<AccountConfig>,
        store: Arc<dyn TradeStore>,
        ledger: Arc<PositionLedger>,
        executor: Arc<OrderExecutor>,
    ) -> Self {
        Self {
            strategies,
            accounts: accounts.into_iter().map(|a| (a.id.clone(), a)).collect(),
            store,
            ledger,
            executor,
            halted: AtomicBool::new(false),
        }
    }

    /// 비상 정지를 활성화합니다. 이후의 모든 시그널은 거부됩니다.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
        warn!("비상 정지 활성화");
    }

    /// 비상 정지를 해제합니다.
    pub fn resume(&self) {
        self.halted.store(false, Ordering::SeqCst);
        info!("비상 정지 해제, 시그널 수신 재개");
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// 등록된 계좌 수 (헬스 응답용).
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// 등록된 전략 수 (헬스 응답용).
    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    /// 토큰으로 전략을 찾습니다. 항상 전체를 순회합니다.
    fn strategy_by_token(&self, token: &str) -> Option<&Strategy> {
        let mut found = None;
        for strategy in &self.strategies {
            if strategy.token_matches(token) && found.is_none() {
                found = Some(strategy);
            }
        }
        found
    }

    /// 인바운드 시그널을 처리합니다.
    ///
    /// 성공 시 종결된(FILLED) 거래를 반환합니다. 거부/실패 사유는
    /// `RejectReason`으로 반환되며, SIGNAL 영속화 이후의 거부는
    /// 거래 행이 FAILED로 남습니다.
    pub async fn route(&self, raw: &serde_json::Value) -> Result<Trade, RejectReason> {
        // 비상 정지는 파싱보다 먼저 확인
        if self.is_halted() {
            return Err(RejectReason::TradingHalted);
        }

        let signal = WebhookSignal::parse(raw)?;

        let strategy = self
            .strategy_by_token(&signal.webhook_token)
            .ok_or(RejectReason::Unauthorized)?;

        if !strategy.is_active {
            return Err(RejectReason::StrategyInactive(strategy.id.clone()));
        }
        let account = self
            .accounts
            .get(&strategy.account_id)
            .ok_or_else(|| RejectReason::StrategyInactive(strategy.id.clone()))?;
        if !account.is_active {
            return Err(RejectReason::StrategyInactive(format!(
                "계좌 {} 비활성",
                account.id
            )));
        }

        if let Some(price) = signal.price {
            self.ledger.observe_price(&signal.symbol, price).await;
        }

        let position = self
            .ledger
            .position(&account.id, &signal.symbol)
            .await
            .map_err(|e| RejectReason::LedgerInconsistency(e.to_string()))?;
        let (quantity, transition) = resolve_order(&position, signal.side, signal.quantity)?;

        let trade = Trade::from_signal(
            account.id.clone(),
            strategy.id.clone(),
            signal.symbol.clone(),
            signal.side,
            transition,
            quantity,
            signal.price,
            raw.clone(),
        );

        // 내구성 지점: 이 행이 존재해야만 다음 단계가 진행됨
        self.store
            .insert_trade(&trade)
            .await
            .map_err(|e| RejectReason::LedgerInconsistency(e.to_string()))?;

        info!(
            trade_id = %trade.id,
            strategy = %strategy.id,
            symbol = %trade.symbol,
            side = %trade.side,
            transition = %transition,
            quantity = %quantity,
            "시그널 수신"
        );

        let ctx = self
            .executor
            .assemble_risk_context(strategy, account, &trade)
            .await?;
        if let Err(reason) = RiskGate::evaluate(strategy, &ctx) {
            warn!(
                trade_id = %trade.id,
                reason = reason.kind(),
                "리스크 게이트 거부"
            );
            if let Err(e) = self
                .store
                .update_status(
                    trade.id,
                    TradeStatus::Signal,
                    TradeStatus::Failed,
                    Some(reason.to_string()),
                )
                .await
            {
                warn!(trade_id = %trade.id, error = %e, "거부 상태 기록 실패");
            }
            return Err(reason);
        }

        self.executor.execute(&trade, strategy, account).await
    }
}
