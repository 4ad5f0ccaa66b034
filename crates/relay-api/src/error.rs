//! API 에러 응답 변환.
//!
//! 거부 사유를 HTTP 상태 코드와 `{error_kind, message}` JSON 본문으로
//! 변환합니다. 토큰 불일치는 어떤 전략이 존재하는지 힌트를 주지 않도록
//! 메시지를 고정합니다.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use relay_core::error::RejectReason;
use relay_core::store::StoreError;

/// API 오류.
#[derive(Debug)]
pub enum ApiError {
    /// 파이프라인 거부/실패
    Reject(RejectReason),
    /// 대상 리소스 없음
    NotFound(String),
    /// 저장소 오류
    Store(StoreError),
}

impl From<RejectReason> for ApiError {
    fn from(reason: RejectReason) -> Self {
        ApiError::Reject(reason)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            other => ApiError::Store(other),
        }
    }
}

fn reject_status(reason: &RejectReason) -> StatusCode {
    match reason {
        RejectReason::MalformedSignal(_) => StatusCode::BAD_REQUEST,
        RejectReason::Unauthorized => StatusCode::UNAUTHORIZED,
        RejectReason::StrategyInactive(_) => StatusCode::FORBIDDEN,
        RejectReason::TradingHalted => StatusCode::SERVICE_UNAVAILABLE,
        RejectReason::OutsideTradingHours
        | RejectReason::DailyLossExceeded { .. }
        | RejectReason::GlobalLossExceeded { .. }
        | RejectReason::PositionRatioExceeded { .. }
        | RejectReason::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RejectReason::BrokerSubmissionFailed(_) | RejectReason::BrokerRejected(_) => {
            StatusCode::BAD_GATEWAY
        }
        RejectReason::LedgerInconsistency(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_kind, message) = match self {
            ApiError::Reject(reason) => {
                (reject_status(&reason), reason.kind(), reason.to_string())
            }
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                format!("대상을 찾을 수 없음: {what}"),
            ),
            ApiError::Store(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "StoreError",
                e.to_string(),
            ),
        };

        let body = Json(json!({
            "error_kind": error_kind,
            "message": message,
        }));
        (status, body).into_response()
    }
}
