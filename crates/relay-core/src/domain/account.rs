//! 계좌와 잔고.
//!
//! 계좌는 생성 이후 활성 플래그를 제외하면 불변입니다.
//! 잔고는 체결 반영 또는 주기적 브로커 동기화로만 변경됩니다 (PositionLedger 소관).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::trade::Side;

/// 계좌 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// 주식 (현물)
    Equity,
    /// 선물
    Futures,
}

impl std::fmt::Display for AccountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountKind::Equity => write!(f, "equity"),
            AccountKind::Futures => write!(f, "futures"),
        }
    }
}

/// 계좌.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// 계좌 식별자
    pub id: String,
    /// 표시용 이름
    pub name: String,
    /// 계좌 유형
    pub kind: AccountKind,
    /// 모의투자 여부
    pub is_virtual: bool,
    /// 활성 여부 (생성 후 변경 가능한 유일한 필드)
    pub is_active: bool,
    /// 기준 통화 (예: "KRW")
    pub currency: String,
}

impl Account {
    /// 선물 계좌 여부.
    pub fn is_futures(&self) -> bool {
        self.kind == AccountKind::Futures
    }
}

/// 계좌 잔고.
///
/// 계좌와 1:1로 소유되며 PositionLedger만 변경합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// 소속 계좌
    pub account_id: String,
    /// 총 잔고 (평가액 포함)
    pub total: Decimal,
    /// 사용 가능 잔고
    pub available: Decimal,
    /// 미실현 손익
    pub unrealized_pnl: Decimal,
    /// 마지막 갱신 시각
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// 초기 잔고 생성 (total = available, 미실현 0).
    pub fn new(account_id: impl Into<String>, initial: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            total: initial,
            available: initial,
            unrealized_pnl: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    /// 체결 금액을 잔고에 반영한 새 잔고를 반환합니다.
    ///
    /// 매수: 사용 가능 잔고에서 (수량 × 체결가 + 수수료) 차감.
    /// 매도: (수량 × 체결가 - 수수료) 가산.
    pub fn apply_fill(
        &self,
        side: Side,
        filled_quantity: Decimal,
        fill_price: Decimal,
        commission: Decimal,
    ) -> Balance {
        let gross = filled_quantity * fill_price;
        let available = match side {
            Side::Buy => self.available - gross - commission,
            Side::Sell => self.available + gross - commission,
        };
        Balance {
            account_id: self.account_id.clone(),
            total: self.total,
            available,
            unrealized_pnl: self.unrealized_pnl,
            updated_at: Utc::now(),
        }
    }

    /// 브로커 동기화 값으로 갱신한 새 잔고를 반환합니다.
    pub fn synced(&self, total: Decimal, available: Decimal, unrealized_pnl: Decimal) -> Balance {
        Balance {
            account_id: self.account_id.clone(),
            total,
            available,
            unrealized_pnl,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_buy_fill_decreases_available() {
        let balance = Balance::new("acc-1", dec!(10_000_000));
        let after = balance.apply_fill(Side::Buy, dec!(1), dec!(500_000), dec!(750));

        assert_eq!(after.available, dec!(9_499_250));
        assert_eq!(after.total, dec!(10_000_000));
    }

    #[test]
    fn test_sell_fill_increases_available() {
        let balance = Balance::new("acc-1", dec!(1_000_000));
        let after = balance.apply_fill(Side::Sell, dec!(10), dec!(70_000), dec!(1_050));

        assert_eq!(after.available, dec!(1_698_950));
    }
}
