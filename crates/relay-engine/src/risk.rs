//! 리스크 게이트.
//!
//! 순서가 고정된 검사를 단락 평가합니다:
//! 거래 시간 → 전략 일일 손실 → 계좌 일일 손실 → 포지션 비율 → 잔고.
//! 첫 번째 실패가 거부 사유가 되며, 거부는 해당 거래만 FAILED로
//! 종결하고 이후 시그널 수신에는 영향을 주지 않습니다.
//!
//! 포지션 비율은 주문 종목 단위입니다: 기존 포지션과 주문 수량의
//! 부호를 상쇄한 예상 수량으로 평가하므로, 역전 주문은 총액이 아니라
//! 순 수량만큼만 노출로 계산됩니다.
//!
//! 포지션 비율과 잔고 검사는 주문 금액을 추정할 수 있을 때만 수행합니다.
//! 가격을 전혀 모르는 시장가 주문은 이 두 검사를 통과시키고 브로커의
//! 증거금 검사에 위임합니다.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use relay_core::domain::account::AccountKind;
use relay_core::domain::strategy::{Strategy, TradingHours};
use relay_core::domain::trade::TransitionType;
use relay_core::error::RejectReason;

/// 일일 손실 창의 시작 시각 (전략 시간대 기준 당일 0시, UTC 환산).
pub fn daily_window_start(hours: &TradingHours, now: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = hours.local_date(now).and_time(NaiveTime::MIN);
    match hours.timezone.from_local_datetime(&midnight).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // 시간대 전환으로 0시가 존재하지 않는 극단 케이스
        None => now - chrono::Duration::hours(24),
    }
}

/// 평가에 필요한 상태 스냅샷.
///
/// 호출자(라우터/실행기)가 저장소와 원장에서 조립합니다.
/// 평가 자체는 순수 함수라 단독으로 테스트할 수 있습니다.
#[derive(Debug, Clone)]
pub struct RiskContext {
    /// 평가 시각
    pub now: DateTime<Utc>,
    /// 포지션 전환 유형
    pub transition: TransitionType,
    /// 전략 기준 당일 실현 손익
    pub strategy_daily_pnl: Decimal,
    /// 계좌 기준 당일 실현 손익
    pub account_daily_pnl: Decimal,
    /// 계좌 전체 일일 손실 한도 (없으면 무제한)
    pub global_max_daily_loss: Option<Decimal>,
    /// 계좌 유형
    pub account_kind: AccountKind,
    /// 선물 증거금률
    pub futures_margin_rate: Decimal,
    /// 계좌 총 잔고
    pub total_balance: Decimal,
    /// 사용 가능 잔고
    pub available_balance: Decimal,
    /// 주문 종목의 현재 부호 있는 포지션 수량
    pub symbol_position: Decimal,
    /// 주문 종목의 PENDING 예약 노출
    pub reserved_exposure: Decimal,
    /// 부호 있는 주문 수량 (매수 양수, 매도 음수)
    pub order_quantity: Decimal,
    /// 평가 기준 가격 (지정가 또는 최근 관측가, 없으면 None)
    pub reference_price: Option<Decimal>,
}

impl RiskContext {
    /// 이번 주문의 예상 금액 (가격 추정 불가면 None).
    pub fn order_value(&self) -> Option<Decimal> {
        self.reference_price
            .map(|price| self.order_quantity.abs() * price)
    }
}

/// 리스크 게이트.
pub struct RiskGate;

impl RiskGate {
    /// 고정 순서 검사를 수행합니다.
    pub fn evaluate(strategy: &Strategy, ctx: &RiskContext) -> Result<(), RejectReason> {
        // 1. 거래 가능 시간
        if !strategy.hours.contains(ctx.now) {
            return Err(RejectReason::OutsideTradingHours);
        }

        // 2. 전략 일일 손실 한도
        if ctx.strategy_daily_pnl <= -strategy.max_daily_loss {
            return Err(RejectReason::DailyLossExceeded {
                daily_pnl: ctx.strategy_daily_pnl.to_string(),
                limit: strategy.max_daily_loss.to_string(),
            });
        }

        // 3. 계좌 전체 일일 손실 한도
        if let Some(limit) = ctx.global_max_daily_loss {
            if ctx.account_daily_pnl <= -limit {
                return Err(RejectReason::GlobalLossExceeded {
                    daily_pnl: ctx.account_daily_pnl.to_string(),
                    limit: limit.to_string(),
                });
            }
        }

        // 청산은 노출을 줄이므로 비율/잔고 검사를 건너뜀
        if ctx.transition == TransitionType::Exit {
            return Ok(());
        }

        let Some(price) = ctx.reference_price else {
            debug!("주문 금액 추정 불가, 비율/잔고 검사 생략");
            return Ok(());
        };
        let order_value = ctx.order_quantity.abs() * price;

        // 4. 종목 포지션 비율 (부호 상쇄 후, 예약 노출 포함)
        if ctx.total_balance > Decimal::ZERO {
            let projected_quantity = ctx.symbol_position + ctx.order_quantity;
            let projected = projected_quantity.abs() * price + ctx.reserved_exposure;
            let projected_ratio = projected / ctx.total_balance;
            if projected_ratio > strategy.max_position_ratio {
                return Err(RejectReason::PositionRatioExceeded {
                    projected_ratio: projected_ratio.round_dp(4).to_string(),
                    max_ratio: strategy.max_position_ratio.to_string(),
                });
            }
        }

        // 5. 사용 가능 잔고 (선물은 증거금 기준)
        let required = match ctx.account_kind {
            AccountKind::Equity => order_value,
            AccountKind::Futures => order_value * ctx.futures_margin_rate,
        };
        if required > ctx.available_balance {
            return Err(RejectReason::InsufficientBalance {
                required: required.to_string(),
                available: ctx.available_balance.to_string(),
            });
        }

        Ok(())
    }
}
