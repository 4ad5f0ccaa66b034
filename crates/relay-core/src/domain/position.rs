//! (계좌, 종목) 단위 포지션.
//!
//! 부호 있는 수량(양수 = 롱)과 거래량 가중 평균 단가를 유지합니다.
//! 체결 반영은 순수 함수 `apply_fill`로 표현되어 단독으로 테스트할 수 있습니다.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::trade::Side;

/// 체결이 포지션에 반영된 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct FillOutcome {
    /// 반영 후 포지션
    pub position: Position,
    /// 이번 체결로 청산된 수량 (없으면 0)
    pub closed_quantity: Decimal,
    /// 청산 leg의 실현 손익 (수수료 차감 전, 청산 없으면 None)
    pub realized_pnl: Option<Decimal>,
}

/// (계좌, 종목) 포지션.
///
/// 행은 최초 체결 시 생성되고 이후 절대 삭제되지 않습니다.
/// 수량 0은 유효한 상태이며 "없음"과 다릅니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// 소속 계좌
    pub account_id: String,
    /// 종목 코드
    pub symbol: String,
    /// 부호 있는 수량 (양수 = 롱, 음수 = 숏)
    pub quantity: Decimal,
    /// 거래량 가중 평균 단가 (플랫이면 0)
    pub avg_price: Decimal,
    /// 마지막 갱신 시각
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// 빈(플랫) 포지션 생성.
    pub fn flat(account_id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            symbol: symbol.into(),
            quantity: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    /// 롱 포지션 여부.
    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    /// 숏 포지션 여부.
    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }

    /// 플랫(수량 0) 여부.
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// 지정 가격 기준 명목 노출 금액.
    pub fn exposure(&self, price: Decimal) -> Decimal {
        self.quantity.abs() * price
    }

    /// 체결을 반영한 새 포지션을 계산합니다 (순수 함수).
    ///
    /// 평균 단가 규칙:
    /// - 플랫 → 신규: 체결가
    /// - 같은 방향 증가: 가중 평균 재계산
    /// - 부분/전량 청산: 평균 단가 유지 (수량만 감소), 플랫 도달 시 0
    /// - 방향 역전: 새 방향의 평균 단가는 체결가
    ///
    /// 청산되는 수량이 있으면 그 구간의 실현 손익을 함께 반환합니다.
    pub fn apply_fill(&self, side: Side, filled_quantity: Decimal, fill_price: Decimal) -> FillOutcome {
        let signed_fill = filled_quantity * side.sign();
        let new_quantity = self.quantity + signed_fill;

        // 부호가 반대인 구간만큼 청산으로 간주
        let closed_quantity = if self.quantity.signum() * signed_fill.signum() < Decimal::ZERO {
            self.quantity.abs().min(filled_quantity)
        } else {
            Decimal::ZERO
        };

        let realized_pnl = if closed_quantity > Decimal::ZERO {
            // 롱 청산: (체결가 - 평단) * 수량, 숏 청산: (평단 - 체결가) * 수량
            let per_unit = (fill_price - self.avg_price) * self.quantity.signum();
            Some(per_unit * closed_quantity)
        } else {
            None
        };

        let avg_price = if new_quantity.is_zero() {
            Decimal::ZERO
        } else if self.quantity.is_zero() || new_quantity.signum() != self.quantity.signum() {
            // 신규 진입 또는 방향 역전
            fill_price
        } else if new_quantity.abs() > self.quantity.abs() {
            // 같은 방향 증가: 가중 평균
            let total_cost = self.quantity.abs() * self.avg_price + filled_quantity * fill_price;
            total_cost / new_quantity.abs()
        } else {
            // 부분 청산: 평단 유지
            self.avg_price
        };

        FillOutcome {
            position: Position {
                account_id: self.account_id.clone(),
                symbol: self.symbol.clone(),
                quantity: new_quantity,
                avg_price,
                updated_at: Utc::now(),
            },
            closed_quantity,
            realized_pnl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_entry_sets_fill_price() {
        let pos = Position::flat("acc-1", "005930");
        let out = pos.apply_fill(Side::Buy, dec!(10), dec!(70000));

        assert_eq!(out.position.quantity, dec!(10));
        assert_eq!(out.position.avg_price, dec!(70000));
        assert_eq!(out.closed_quantity, dec!(0));
        assert!(out.realized_pnl.is_none());
    }

    #[test]
    fn test_same_direction_weighted_average() {
        let pos = Position::flat("acc-1", "005930")
            .apply_fill(Side::Buy, dec!(10), dec!(70000))
            .position;
        let out = pos.apply_fill(Side::Buy, dec!(10), dec!(72000));

        assert_eq!(out.position.quantity, dec!(20));
        assert_eq!(out.position.avg_price, dec!(71000));
    }

    #[test]
    fn test_partial_close_keeps_avg_price() {
        let pos = Position::flat("acc-1", "005930")
            .apply_fill(Side::Buy, dec!(10), dec!(70000))
            .position;
        let out = pos.apply_fill(Side::Sell, dec!(4), dec!(75000));

        assert_eq!(out.position.quantity, dec!(6));
        assert_eq!(out.position.avg_price, dec!(70000));
        assert_eq!(out.closed_quantity, dec!(4));
        // (75000 - 70000) * 4
        assert_eq!(out.realized_pnl, Some(dec!(20000)));
    }

    #[test]
    fn test_full_close_resets_avg_price() {
        let pos = Position::flat("acc-1", "005930")
            .apply_fill(Side::Buy, dec!(10), dec!(70000))
            .position;
        let out = pos.apply_fill(Side::Sell, dec!(10), dec!(68000));

        assert!(out.position.is_flat());
        assert_eq!(out.position.avg_price, dec!(0));
        assert_eq!(out.realized_pnl, Some(dec!(-20000)));
    }

    #[test]
    fn test_reverse_sets_new_avg_price() {
        let pos = Position::flat("acc-1", "101S3000")
            .apply_fill(Side::Buy, dec!(5), dec!(350));
        let out = pos.position.apply_fill(Side::Sell, dec!(8), dec!(360));

        assert_eq!(out.position.quantity, dec!(-3));
        assert_eq!(out.position.avg_price, dec!(360));
        assert_eq!(out.closed_quantity, dec!(5));
        // 롱 5계약을 360에 청산: (360 - 350) * 5
        assert_eq!(out.realized_pnl, Some(dec!(50)));
    }

    #[test]
    fn test_short_close_pnl() {
        let pos = Position::flat("acc-1", "101S3000")
            .apply_fill(Side::Sell, dec!(5), dec!(360))
            .position;
        let out = pos.apply_fill(Side::Buy, dec!(5), dec!(350));

        assert!(out.position.is_flat());
        // 숏 청산: (360 - 350) * 5 이익
        assert_eq!(out.realized_pnl, Some(dec!(50)));
    }

    #[test]
    fn test_zero_quantity_is_valid_state() {
        let pos = Position::flat("acc-1", "005930")
            .apply_fill(Side::Buy, dec!(1), dec!(100))
            .position
            .apply_fill(Side::Sell, dec!(1), dec!(100))
            .position;

        assert!(pos.is_flat());
        assert!(!pos.is_long());
        assert!(!pos.is_short());
        assert_eq!(pos.exposure(dec!(100)), dec!(0));
    }
}
