//! 브로커 API 에러 분류.
//!
//! 실행기의 재시도 판단은 전적으로 이 분류에 의존합니다:
//! - 일시적 오류(네트워크, 타임아웃) → 재시도 가능
//! - 명시적 거부(Rejected) → 재시도 금지, 즉시 FAILED
//! - 인증 만료(AuthExpired) → 토큰 갱신 후 1회 투명 재시도

use thiserror::Error;

/// 브로커 호출 오류.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// 네트워크 오류 (연결 실패, DNS 등)
    #[error("네트워크 오류: {0}")]
    Network(String),

    /// 요청 타임아웃
    #[error("요청 타임아웃: {0}")]
    Timeout(String),

    /// 접근 토큰 만료 (갱신 후 재시도 가능)
    #[error("접근 토큰 만료")]
    AuthExpired,

    /// 인증 실패 (자격 증명 오류, 갱신으로 해소 불가)
    #[error("인증 실패: {0}")]
    Authentication(String),

    /// 브로커의 명시적 주문 거부
    #[error("주문 거부 [{code}]: {message}")]
    Rejected { code: String, message: String },

    /// 응답 파싱 실패
    #[error("응답 파싱 실패: {0}")]
    Parse(String),

    /// 기타 API 오류
    #[error("API 오류 [{code}]: {message}")]
    Api { code: String, message: String },
}

impl BrokerError {
    /// 재시도 가능한 일시적 오류 여부.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BrokerError::Network(_) | BrokerError::Timeout(_) | BrokerError::Api { .. }
        )
    }

    /// 재시도해도 해소되지 않는 치명적 오류 여부.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BrokerError::Rejected { .. } | BrokerError::Authentication(_)
        )
    }

    /// 토큰 갱신으로 해소 가능한 오류 여부.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, BrokerError::AuthExpired)
    }
}

impl From<reqwest::Error> for BrokerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BrokerError::Timeout(e.to_string())
        } else if e.is_decode() {
            BrokerError::Parse(e.to_string())
        } else {
            BrokerError::Network(e.to_string())
        }
    }
}
