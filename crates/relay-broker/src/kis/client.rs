//! KIS 국내 주식 주문 어댑터.
//!
//! 현금 매수/매도 주문 제출과 일별 체결 조회를 `BrokerClient`로 노출합니다.
//!
//! # TR ID
//!
//! | 작업        | 실전       | 모의       |
//! |-------------|-----------|-----------|
//! | 현금 매수   | TTTC0802U | VTTC0802U |
//! | 현금 매도   | TTTC0801U | VTTC0801U |
//! | 일별 체결   | TTTC8001R | VTTC8001R |

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};

use relay_core::domain::trade::Side;

use super::auth::KisAuth;
use crate::client::{BrokerClient, BrokerOrderState, FillReport, OrderAck, OrderTicket};
use crate::error::BrokerError;

/// 현금 매수 TR (실전).
const TR_ORDER_BUY: &str = "TTTC0802U";
/// 현금 매도 TR (실전).
const TR_ORDER_SELL: &str = "TTTC0801U";
/// 주식 일별 주문 체결 조회 TR (실전).
const TR_ORDER_STATUS: &str = "TTTC8001R";

/// 접근 토큰 만료 응답 코드.
const MSG_CD_TOKEN_EXPIRED: &str = "EGW00123";

/// 지정가 주문 구분 코드.
const ORD_DVSN_LIMIT: &str = "00";
/// 시장가 주문 구분 코드.
const ORD_DVSN_MARKET: &str = "01";

/// 주문 응답 공통 래퍼.
#[derive(Debug, Deserialize)]
struct KisResponse<T> {
    rt_cd: String,
    msg_cd: String,
    msg1: String,
    output: Option<T>,
}

/// 주문 접수 output.
#[derive(Debug, Deserialize)]
struct OrderOutput {
    #[serde(rename = "ODNO")]
    order_no: String,
}

/// 체결 조회 응답.
#[derive(Debug, Deserialize)]
struct StatusResponse {
    rt_cd: String,
    msg_cd: String,
    msg1: String,
    #[serde(default)]
    output1: Vec<StatusRow>,
}

/// 체결 조회 output1 행.
#[derive(Debug, Deserialize)]
struct StatusRow {
    /// 주문번호
    odno: String,
    /// 총 체결 수량
    tot_ccld_qty: String,
    /// 평균가
    avg_prvs: String,
    /// 잔여 수량
    rmn_qty: String,
    /// 취소 여부 ("Y"/"N")
    #[serde(default)]
    cncl_yn: String,
}

/// KIS 현금 주문 브로커.
///
/// 계좌당 하나씩 생성되고 `KisAuth`를 공유합니다.
pub struct KisBroker {
    http: reqwest::Client,
    auth: Arc<KisAuth>,
    /// 종합계좌번호 (앞 8자리)
    account_number: String,
    /// 계좌상품코드 (뒤 2자리)
    product_code: String,
}

impl KisBroker {
    pub fn new(
        http: reqwest::Client,
        auth: Arc<KisAuth>,
        account_number: impl Into<String>,
        product_code: impl Into<String>,
    ) -> Self {
        Self {
            http,
            auth,
            account_number: account_number.into(),
            product_code: product_code.into(),
        }
    }

    pub fn auth(&self) -> &Arc<KisAuth> {
        &self.auth
    }

    /// 공통 헤더를 구성합니다.
    async fn headers(&self, live_tr_id: &str) -> Result<Vec<(String, String)>, BrokerError> {
        let token = self.auth.access_token().await?;
        Ok(vec![
            ("authorization".to_string(), format!("Bearer {token}")),
            ("appkey".to_string(), self.auth.app_key().to_string()),
            ("appsecret".to_string(), self.auth.app_secret().to_string()),
            (
                "tr_id".to_string(),
                self.auth.environment().tr_id(live_tr_id),
            ),
        ])
    }

    /// rt_cd/msg_cd를 BrokerError로 분류합니다.
    fn classify_failure(msg_cd: &str, msg1: &str) -> BrokerError {
        if msg_cd == MSG_CD_TOKEN_EXPIRED {
            return BrokerError::AuthExpired;
        }
        // 주문 거부 계열 (주문가능금액 부족 등)은 재시도 대상이 아님
        if msg_cd.starts_with("APBK") || msg_cd.starts_with("40") {
            return BrokerError::Rejected {
                code: msg_cd.to_string(),
                message: msg1.to_string(),
            };
        }
        BrokerError::Api {
            code: msg_cd.to_string(),
            message: msg1.to_string(),
        }
    }
}

#[async_trait]
impl BrokerClient for KisBroker {
    fn broker_name(&self) -> &str {
        "kis"
    }

    async fn ensure_credential(&self) -> Result<(), BrokerError> {
        self.auth.access_token().await?;
        Ok(())
    }

    async fn refresh_credential(&self) -> Result<(), BrokerError> {
        self.auth.force_refresh().await?;
        Ok(())
    }

    async fn submit_order(&self, ticket: &OrderTicket) -> Result<OrderAck, BrokerError> {
        let live_tr_id = match ticket.side {
            Side::Buy => TR_ORDER_BUY,
            Side::Sell => TR_ORDER_SELL,
        };

        let (ord_dvsn, ord_unpr) = match ticket.limit_price {
            Some(price) => (ORD_DVSN_LIMIT, price.normalize().to_string()),
            None => (ORD_DVSN_MARKET, "0".to_string()),
        };

        let url = format!(
            "{}/uapi/domestic-stock/v1/trading/order-cash",
            self.auth.base_url()
        );
        let body = serde_json::json!({
            "CANO": self.account_number,
            "ACNT_PRDT_CD": self.product_code,
            "PDNO": ticket.symbol,
            "ORD_DVSN": ord_dvsn,
            "ORD_QTY": ticket.quantity.to_string(),
            "ORD_UNPR": ord_unpr,
        });

        debug!(
            symbol = %ticket.symbol,
            side = %ticket.side,
            quantity = ticket.quantity,
            ord_dvsn,
            "KIS 주문 제출"
        );

        let mut request = self.http.post(&url).json(&body);
        for (name, value) in self.headers(live_tr_id).await? {
            request = request.header(name, value);
        }

        let response: KisResponse<OrderOutput> = request.send().await?.json().await?;

        if response.rt_cd != "0" {
            warn!(
                msg_cd = %response.msg_cd,
                msg1 = %response.msg1,
                "KIS 주문 제출 실패"
            );
            return Err(Self::classify_failure(&response.msg_cd, &response.msg1));
        }

        let output = response
            .output
            .ok_or_else(|| BrokerError::Parse("주문 응답에 output이 없습니다".to_string()))?;

        info!(
            symbol = %ticket.symbol,
            broker_order_id = %output.order_no,
            "KIS 주문 접수 완료"
        );

        Ok(OrderAck {
            broker_order_id: output.order_no,
        })
    }

    async fn query_order(
        &self,
        symbol: &str,
        broker_order_id: &str,
    ) -> Result<FillReport, BrokerError> {
        let url = format!(
            "{}/uapi/domestic-stock/v1/trading/inquire-daily-ccld",
            self.auth.base_url()
        );
        let today = chrono::Utc::now()
            .with_timezone(&chrono_tz_seoul())
            .format("%Y%m%d")
            .to_string();

        let mut request = self.http.get(&url).query(&[
            ("CANO", self.account_number.as_str()),
            ("ACNT_PRDT_CD", self.product_code.as_str()),
            ("INQR_STRT_DT", today.as_str()),
            ("INQR_END_DT", today.as_str()),
            ("SLL_BUY_DVSN_CD", "00"),
            ("PDNO", symbol),
            ("ODNO", broker_order_id),
            ("CCLD_DVSN", "00"),
            ("INQR_DVSN", "00"),
            ("INQR_DVSN_1", ""),
            ("INQR_DVSN_3", "00"),
            ("EXCG_ID_DVSN_CD", "KRX"),
            ("CTX_AREA_FK100", ""),
            ("CTX_AREA_NK100", ""),
        ]);
        for (name, value) in self.headers(TR_ORDER_STATUS).await? {
            request = request.header(name, value);
        }

        let response: StatusResponse = request.send().await?.json().await?;

        if response.rt_cd != "0" {
            return Err(Self::classify_failure(&response.msg_cd, &response.msg1));
        }

        let row = response
            .output1
            .into_iter()
            .find(|row| row.odno == broker_order_id)
            .ok_or_else(|| {
                BrokerError::Parse(format!("주문 {broker_order_id} 조회 결과 없음"))
            })?;

        let filled: Decimal = row
            .tot_ccld_qty
            .parse()
            .map_err(|_| BrokerError::Parse(format!("체결 수량 파싱 실패: {}", row.tot_ccld_qty)))?;
        let remaining: Decimal = row
            .rmn_qty
            .parse()
            .map_err(|_| BrokerError::Parse(format!("잔여 수량 파싱 실패: {}", row.rmn_qty)))?;

        let avg_fill_price = if filled > Decimal::ZERO {
            Some(row.avg_prvs.parse().map_err(|_| {
                BrokerError::Parse(format!("평균가 파싱 실패: {}", row.avg_prvs))
            })?)
        } else {
            None
        };

        let state = if row.cncl_yn == "Y" {
            BrokerOrderState::Cancelled
        } else if remaining.is_zero() && filled > Decimal::ZERO {
            BrokerOrderState::Filled
        } else if filled > Decimal::ZERO {
            BrokerOrderState::PartiallyFilled
        } else {
            BrokerOrderState::Accepted
        };

        Ok(FillReport {
            state,
            filled_quantity: filled,
            avg_fill_price,
        })
    }
}

/// 국내 주문 조회 기준 시간대.
fn chrono_tz_seoul() -> chrono_tz::Tz {
    chrono_tz::Asia::Seoul
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_token_expired() {
        let err = KisBroker::classify_failure("EGW00123", "기간이 만료된 token 입니다.");
        assert!(err.is_auth_expired());
    }

    #[test]
    fn test_classify_order_rejection() {
        let err = KisBroker::classify_failure("APBK0918", "주문가능금액을 초과했습니다.");
        assert!(matches!(err, BrokerError::Rejected { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_classify_transient_api_error() {
        let err = KisBroker::classify_failure("EGW00201", "초당 거래건수를 초과하였습니다.");
        assert!(err.is_retryable());
    }
}
