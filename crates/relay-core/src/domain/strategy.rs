//! 전략과 거래 시간대.
//!
//! 전략은 정확히 하나의 계좌에 속하고, 전역적으로 유일한 웹훅 토큰으로
//! 인바운드 시그널과 바인딩됩니다. 리스크 한도는 시작 시 로드된 설정
//! 스냅샷의 일부로, 실행 중에는 읽기 전용입니다.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// 전략 시간대 기준의 거래 가능 시간 창.
///
/// `close < open`이면 자정을 넘는 야간 세션으로 해석합니다 (선물 야간장).
#[derive(Debug, Clone, Deserialize)]
pub struct TradingHours {
    /// 전략 시간대 (예: "Asia/Seoul")
    pub timezone: Tz,
    /// 장 시작 (현지 시각)
    pub open: NaiveTime,
    /// 장 마감 (현지 시각)
    pub close: NaiveTime,
}

impl TradingHours {
    /// 지정 시각이 거래 가능 창 안에 있는지 확인합니다.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.timezone).time();
        if self.open <= self.close {
            local >= self.open && local <= self.close
        } else {
            // 자정을 넘는 세션
            local >= self.open || local <= self.close
        }
    }

    /// 일일 손실 창의 기준이 되는 현지 날짜.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.timezone).date_naive()
    }
}

/// 전략.
///
/// 여러 전략이 하나의 계좌를 공유할 수 있습니다.
#[derive(Debug, Clone)]
pub struct Strategy {
    /// 전략 식별자
    pub id: String,
    /// 소속 계좌
    pub account_id: String,
    /// 웹훅 토큰 (전역 유일, 상수 시간 비교로만 조회)
    pub webhook_token: SecretString,
    /// 단일 포지션이 계좌 잔고에서 차지할 수 있는 최대 비율
    pub max_position_ratio: Decimal,
    /// 일일 최대 손실 (절대 금액, 양수로 표기)
    pub max_daily_loss: Decimal,
    /// 거래 가능 시간 창
    pub hours: TradingHours,
    /// 활성 여부
    pub is_active: bool,
}

impl Strategy {
    /// 웹훅 토큰이 일치하는지 상수 시간으로 비교합니다.
    ///
    /// 토큰 내용에 따라 비교 시간이 달라지지 않아야 하므로
    /// 모든 바이트를 항상 순회하며 차이를 누적합니다.
    pub fn token_matches(&self, candidate: &str) -> bool {
        constant_time_eq(
            self.webhook_token.expose_secret().as_bytes(),
            candidate.as_bytes(),
        )
    }
}

/// 길이가 같을 때 내용에 독립적인 시간으로 바이트열을 비교합니다.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
