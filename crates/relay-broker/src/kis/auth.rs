//! KIS OAuth 토큰 관리.
//!
//! KIS API는 접근 토큰 발급을 분당 1회로 제한하므로 발급된 토큰을
//! 만료 시각과 함께 캐시하고, 갱신은 Mutex로 직렬화하여 동시 요청이
//! 중복 발급을 일으키지 않게 합니다.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::BrokerError;

/// 실전투자 API 서버.
const LIVE_BASE_URL: &str = "https://openapi.koreainvestment.com:9443";
/// 모의투자 API 서버.
const VIRTUAL_BASE_URL: &str = "https://openapivts.koreainvestment.com:29443";

/// 만료 전 선제 갱신 여유 (초).
const EXPIRY_MARGIN_SECS: i64 = 60;

/// KIS 환경 (실전/모의).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KisEnvironment {
    /// 실전투자
    Live,
    /// 모의투자
    Virtual,
}

impl KisEnvironment {
    pub fn base_url(self) -> &'static str {
        match self {
            KisEnvironment::Live => LIVE_BASE_URL,
            KisEnvironment::Virtual => VIRTUAL_BASE_URL,
        }
    }

    /// TR ID를 환경에 맞게 변환합니다.
    ///
    /// 모의투자는 실전 TR ID의 첫 글자 `T`를 `V`로 치환한 코드를
    /// 사용합니다 (예: TTTC0802U → VTTC0802U).
    pub fn tr_id(self, live_tr_id: &str) -> String {
        match self {
            KisEnvironment::Live => live_tr_id.to_string(),
            KisEnvironment::Virtual => {
                if let Some(rest) = live_tr_id.strip_prefix('T') {
                    format!("V{rest}")
                } else {
                    live_tr_id.to_string()
                }
            }
        }
    }
}

/// 캐시된 접근 토큰.
struct CachedToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Utc::now() + ChronoDuration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

/// 토큰 발급 응답.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// KIS OAuth 관리자.
///
/// 계좌당 하나씩 생성되며 해당 계좌의 모든 API 호출이 공유합니다.
pub struct KisAuth {
    http: reqwest::Client,
    environment: KisEnvironment,
    app_key: String,
    app_secret: SecretString,
    cached: Mutex<Option<CachedToken>>,
}

impl KisAuth {
    pub fn new(
        http: reqwest::Client,
        environment: KisEnvironment,
        app_key: impl Into<String>,
        app_secret: SecretString,
    ) -> Self {
        Self {
            http,
            environment,
            app_key: app_key.into(),
            app_secret,
            cached: Mutex::new(None),
        }
    }

    pub fn environment(&self) -> KisEnvironment {
        self.environment
    }

    pub fn base_url(&self) -> &'static str {
        self.environment.base_url()
    }

    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    pub fn app_secret(&self) -> &str {
        self.app_secret.expose_secret()
    }

    /// 유효한 접근 토큰을 반환합니다. 캐시가 만료 임박이면 재발급합니다.
    pub async fn access_token(&self) -> Result<String, BrokerError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_valid() {
                return Ok(token.token.expose_secret().to_string());
            }
            debug!("접근 토큰 만료 임박, 재발급");
        }

        let fresh = self.issue_token().await?;
        let token = fresh.token.expose_secret().to_string();
        *cached = Some(fresh);
        Ok(token)
    }

    /// 캐시를 폐기하고 강제로 재발급합니다.
    ///
    /// 브로커가 EGW00123(토큰 만료)을 반환한 경우에 사용합니다.
    pub async fn force_refresh(&self) -> Result<String, BrokerError> {
        let mut cached = self.cached.lock().await;
        warn!("접근 토큰 강제 재발급");

        let fresh = self.issue_token().await?;
        let token = fresh.token.expose_secret().to_string();
        *cached = Some(fresh);
        Ok(token)
    }

    /// 캐시된 토큰을 무효화합니다 (재발급은 다음 호출 시).
    pub async fn invalidate(&self) {
        let mut cached = self.cached.lock().await;
        *cached = None;
    }

    async fn issue_token(&self) -> Result<CachedToken, BrokerError> {
        let url = format!("{}/oauth2/tokenP", self.base_url());
        let body = serde_json::json!({
            "grant_type": "client_credentials",
            "appkey": self.app_key,
            "appsecret": self.app_secret.expose_secret(),
        });

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(BrokerError::Authentication(format!(
                "토큰 발급 거부: HTTP {status}"
            )));
        }
        if !status.is_success() {
            return Err(BrokerError::Api {
                code: status.as_str().to_string(),
                message: "토큰 발급 실패".to_string(),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::Parse(e.to_string()))?;

        let expires_at = Utc::now() + ChronoDuration::seconds(token.expires_in);
        info!(
            environment = ?self.environment,
            expires_at = %expires_at,
            "접근 토큰 발급 완료"
        );

        Ok(CachedToken {
            token: SecretString::from(token.access_token),
            expires_at,
        })
    }
}
