//! 설정 로딩.
//!
//! TOML 파일 + 환경 변수(`RELAY__` 접두사) 레이어로 구성되며,
//! 시작 시 한 번 로드된 뒤 실행 중에는 읽기 전용 스냅샷으로 취급합니다.
//! 전략/계좌 구성 변경은 재시작으로만 반영됩니다.

use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::account::{Account, AccountKind};
use crate::domain::strategy::{Strategy, TradingHours};

/// 설정 로딩 오류.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("설정 로딩 실패: {0}")]
    Load(#[from] config::ConfigError),

    #[error("설정 검증 실패: {0}")]
    Invalid(String),
}

/// HTTP 서버 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// 주문 실행기 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSettings {
    /// 브로커 제출 최대 재시도 횟수
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// 재시도 기본 지연 (n회째 대기 = n × retry_delay)
    #[serde(default = "default_retry_delay_ms", rename = "retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// 체결 확인 폴링 주기
    #[serde(default = "default_fill_poll_ms", rename = "fill_poll_interval_ms")]
    pub fill_poll_interval_ms: u64,
    /// 체결 확인 타임아웃
    #[serde(default = "default_fill_timeout_ms", rename = "fill_timeout_ms")]
    pub fill_timeout_ms: u64,
    /// 선물 증거금률 (노출 계산 시 명목 금액에 곱함)
    #[serde(default = "default_margin_rate")]
    pub futures_margin_rate: Decimal,
    /// 수수료율 (체결 금액 대비)
    #[serde(default = "default_commission_rate")]
    pub commission_rate: Decimal,
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_fill_poll_ms() -> u64 {
    500
}

fn default_fill_timeout_ms() -> u64 {
    30_000
}

fn default_margin_rate() -> Decimal {
    dec!(0.10)
}

fn default_commission_rate() -> Decimal {
    dec!(0.00015)
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            fill_poll_interval_ms: default_fill_poll_ms(),
            fill_timeout_ms: default_fill_timeout_ms(),
            futures_margin_rate: default_margin_rate(),
            commission_rate: default_commission_rate(),
        }
    }
}

impl ExecutorSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn fill_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fill_poll_interval_ms)
    }

    pub fn fill_timeout(&self) -> Duration {
        Duration::from_millis(self.fill_timeout_ms)
    }
}

/// 계좌 설정 항목.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub id: String,
    pub name: String,
    pub kind: AccountKind,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// 시작 잔고 (브로커 동기화 전 기준값)
    pub initial_balance: Decimal,
    /// 계좌 전체 일일 손실 한도 (없으면 무제한)
    #[serde(default)]
    pub global_max_daily_loss: Option<Decimal>,
    /// KIS 앱 키
    pub app_key: String,
    /// KIS 앱 시크릿
    pub app_secret: String,
    /// 계좌번호 (종합계좌 8자리)
    pub account_number: String,
    /// 상품 코드 (뒤 2자리)
    #[serde(default = "default_product_code")]
    pub product_code: String,
}

fn default_true() -> bool {
    true
}

fn default_currency() -> String {
    "KRW".to_string()
}

fn default_product_code() -> String {
    "01".to_string()
}

impl AccountConfig {
    pub fn to_account(&self) -> Account {
        Account {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            is_virtual: self.is_virtual,
            is_active: self.is_active,
            currency: self.currency.clone(),
        }
    }
}

/// 전략 설정 항목.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    pub id: String,
    pub account_id: String,
    pub webhook_token: String,
    pub max_position_ratio: Decimal,
    pub max_daily_loss: Decimal,
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
    #[serde(default = "default_open")]
    pub open: NaiveTime,
    #[serde(default = "default_close")]
    pub close: NaiveTime,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_timezone() -> Tz {
    chrono_tz::Asia::Seoul
}

fn default_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).expect("정적 시각")
}

fn default_close() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).expect("정적 시각")
}

impl StrategyConfig {
    pub fn to_strategy(&self) -> Strategy {
        Strategy {
            id: self.id.clone(),
            account_id: self.account_id.clone(),
            webhook_token: SecretString::from(self.webhook_token.clone()),
            max_position_ratio: self.max_position_ratio,
            max_daily_loss: self.max_daily_loss,
            hours: TradingHours {
                timezone: self.timezone,
                open: self.open,
                close: self.close,
            },
            is_active: self.is_active,
        }
    }
}

/// 애플리케이션 설정 스냅샷.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub executor: ExecutorSettings,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
    /// PostgreSQL 연결 문자열 (없으면 메모리 저장소)
    #[serde(default)]
    pub database_url: Option<String>,
}

impl AppConfig {
    /// 파일 + 환경 변수 레이어로 설정을 로드합니다.
    ///
    /// 환경 변수는 `RELAY_SERVER__PORT=9000` 형식으로 파일 값을 덮어씁니다.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("RELAY").separator("__"))
            .build()?;

        let app: AppConfig = settings.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    /// 구성 정합성 검증.
    ///
    /// 토큰 중복과 존재하지 않는 계좌 참조는 시작 시점에 거부합니다.
    /// 같은 계좌의 전략들은 시간대가 일치해야 합니다. 계좌 일일 손실
    /// 한도의 날짜 창이 전략 시간대로 계산되기 때문입니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for strategy in &self.strategies {
            if !self.accounts.iter().any(|a| a.id == strategy.account_id) {
                return Err(ConfigError::Invalid(format!(
                    "전략 {}이(가) 존재하지 않는 계좌 {}을(를) 참조합니다",
                    strategy.id, strategy.account_id
                )));
            }
            if strategy.max_position_ratio <= Decimal::ZERO
                || strategy.max_position_ratio > Decimal::ONE
            {
                return Err(ConfigError::Invalid(format!(
                    "전략 {}의 max_position_ratio가 (0, 1] 범위를 벗어납니다",
                    strategy.id
                )));
            }
        }

        for (i, a) in self.strategies.iter().enumerate() {
            for b in self.strategies.iter().skip(i + 1) {
                if a.webhook_token == b.webhook_token {
                    return Err(ConfigError::Invalid(format!(
                        "전략 {}와 {}의 웹훅 토큰이 중복됩니다",
                        a.id, b.id
                    )));
                }
                if a.account_id == b.account_id && a.timezone != b.timezone {
                    return Err(ConfigError::Invalid(format!(
                        "같은 계좌 {}의 전략 {}와 {}의 시간대가 다릅니다 ({} / {})",
                        a.account_id, a.id, b.id, a.timezone, b.timezone
                    )));
                }
            }
        }

        Ok(())
    }

    /// 계좌 조회.
    pub fn account(&self, account_id: &str) -> Option<&AccountConfig> {
        self.accounts.iter().find(|a| a.id == account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_account(id: &str) -> AccountConfig {
        AccountConfig {
            id: id.to_string(),
            name: "테스트 계좌".to_string(),
            kind: AccountKind::Equity,
            is_virtual: true,
            is_active: true,
            currency: "KRW".to_string(),
            initial_balance: dec!(10_000_000),
            global_max_daily_loss: None,
            app_key: "key".to_string(),
            app_secret: "secret".to_string(),
            account_number: "12345678".to_string(),
            product_code: "01".to_string(),
        }
    }

    fn base_strategy(id: &str, account_id: &str, token: &str) -> StrategyConfig {
        StrategyConfig {
            id: id.to_string(),
            account_id: account_id.to_string(),
            webhook_token: token.to_string(),
            max_position_ratio: dec!(0.10),
            max_daily_loss: dec!(1_000_000),
            timezone: default_timezone(),
            open: default_open(),
            close: default_close(),
            is_active: true,
        }
    }

    #[test]
    fn test_validate_ok() {
        let cfg = AppConfig {
            server: ServerSettings::default(),
            executor: ExecutorSettings::default(),
            accounts: vec![base_account("acc-1")],
            strategies: vec![base_strategy("s1", "acc-1", "tok_a")],
            database_url: None,
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_account() {
        let cfg = AppConfig {
            server: ServerSettings::default(),
            executor: ExecutorSettings::default(),
            accounts: vec![base_account("acc-1")],
            strategies: vec![base_strategy("s1", "acc-2", "tok_a")],
            database_url: None,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_token() {
        let cfg = AppConfig {
            server: ServerSettings::default(),
            executor: ExecutorSettings::default(),
            accounts: vec![base_account("acc-1")],
            strategies: vec![
                base_strategy("s1", "acc-1", "tok_a"),
                base_strategy("s2", "acc-1", "tok_a"),
            ],
            database_url: None,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_mixed_timezone_on_same_account() {
        let mut other_tz = base_strategy("s2", "acc-1", "tok_b");
        other_tz.timezone = chrono_tz::America::New_York;
        let cfg = AppConfig {
            server: ServerSettings::default(),
            executor: ExecutorSettings::default(),
            accounts: vec![base_account("acc-1"), base_account("acc-2")],
            strategies: vec![base_strategy("s1", "acc-1", "tok_a"), other_tz],
            database_url: None,
        };
        assert!(cfg.validate().is_err());

        // 계좌가 다르면 시간대가 달라도 허용
        let mut separated = base_strategy("s2", "acc-2", "tok_b");
        separated.timezone = chrono_tz::America::New_York;
        let cfg = AppConfig {
            server: ServerSettings::default(),
            executor: ExecutorSettings::default(),
            accounts: vec![base_account("acc-1"), base_account("acc-2")],
            strategies: vec![base_strategy("s1", "acc-1", "tok_a"), separated],
            database_url: None,
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_ratio_out_of_range() {
        let mut strategy = base_strategy("s1", "acc-1", "tok_a");
        strategy.max_position_ratio = dec!(1.5);
        let cfg = AppConfig {
            server: ServerSettings::default(),
            executor: ExecutorSettings::default(),
            accounts: vec![base_account("acc-1")],
            strategies: vec![strategy],
            database_url: None,
        };
        assert!(cfg.validate().is_err());
    }
}
