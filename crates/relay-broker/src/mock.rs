//! 테스트용 Mock 브로커.
//!
//! 제출 결과를 스크립트로 지정하고 호출 횟수/순서를 검증할 수 있습니다.
//! 스크립트가 비어 있으면 기본 동작(접수 성공, 전량 체결)을 수행합니다.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::client::{BrokerClient, BrokerOrderState, FillReport, OrderAck, OrderTicket};
use crate::error::BrokerError;

/// 제출 1회에 대한 스크립트 결과.
pub enum SubmitScript {
    /// 접수 성공
    Accept,
    /// 지정한 오류 반환
    Fail(BrokerError),
}

/// Mock 브로커.
pub struct MockBroker {
    /// 제출 스크립트 (비어 있으면 항상 성공)
    submit_scripts: Mutex<VecDeque<SubmitScript>>,
    /// 체결 조회 스크립트 (비어 있으면 전량 체결)
    fill_scripts: Mutex<VecDeque<FillReport>>,
    /// 기록된 제출 티켓
    submissions: Mutex<Vec<OrderTicket>>,
    /// 제출 중 인위적 지연 (동시성 관찰용)
    submit_delay: Duration,
    /// 현재 동시 제출 수
    in_flight: AtomicU32,
    /// 관찰된 최대 동시 제출 수
    max_in_flight: AtomicU32,
    /// 자격 증명 갱신 호출 횟수
    refresh_calls: AtomicU32,
    /// 기본 체결가
    default_fill_price: Decimal,
    next_order_no: AtomicU32,
}

impl MockBroker {
    pub fn new(default_fill_price: Decimal) -> Self {
        Self {
            submit_scripts: Mutex::new(VecDeque::new()),
            fill_scripts: Mutex::new(VecDeque::new()),
            submissions: Mutex::new(Vec::new()),
            submit_delay: Duration::ZERO,
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            default_fill_price,
            next_order_no: AtomicU32::new(1),
        }
    }

    /// 제출 중 지연을 추가합니다 (동시 제출 관찰용).
    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    /// 다음 제출 결과를 스크립트에 추가합니다.
    pub async fn script_submit(&self, script: SubmitScript) {
        self.submit_scripts.lock().await.push_back(script);
    }

    /// 다음 체결 조회 결과를 스크립트에 추가합니다.
    pub async fn script_fill(&self, report: FillReport) {
        self.fill_scripts.lock().await.push_back(report);
    }

    /// 기록된 제출 티켓 목록.
    pub async fn submissions(&self) -> Vec<OrderTicket> {
        self.submissions.lock().await.clone()
    }

    /// 제출 호출 횟수.
    pub async fn submit_count(&self) -> usize {
        self.submissions.lock().await.len()
    }

    /// 관찰된 최대 동시 제출 수.
    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// 자격 증명 갱신 호출 횟수.
    pub fn refresh_count(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    fn broker_name(&self) -> &str {
        "mock"
    }

    async fn ensure_credential(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn refresh_credential(&self) -> Result<(), BrokerError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn submit_order(&self, ticket: &OrderTicket) -> Result<OrderAck, BrokerError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }

        self.submissions.lock().await.push(ticket.clone());
        let script = self.submit_scripts.lock().await.pop_front();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match script {
            Some(SubmitScript::Fail(e)) => Err(e),
            Some(SubmitScript::Accept) | None => {
                let no = self.next_order_no.fetch_add(1, Ordering::SeqCst);
                Ok(OrderAck {
                    broker_order_id: format!("MOCK{no:07}"),
                })
            }
        }
    }

    async fn query_order(
        &self,
        _symbol: &str,
        broker_order_id: &str,
    ) -> Result<FillReport, BrokerError> {
        if let Some(report) = self.fill_scripts.lock().await.pop_front() {
            return Ok(report);
        }

        // 기본 동작: 마지막 제출 수량 전량 체결
        let submissions = self.submissions.lock().await;
        let quantity = submissions
            .last()
            .map(|t| Decimal::from(t.quantity))
            .unwrap_or(Decimal::ZERO);
        drop(submissions);

        let _ = broker_order_id;
        Ok(FillReport {
            state: BrokerOrderState::Filled,
            filled_quantity: quantity,
            avg_fill_price: Some(self.default_fill_price),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::domain::trade::Side;
    use rust_decimal_macros::dec;

    fn ticket() -> OrderTicket {
        OrderTicket {
            symbol: "005930".to_string(),
            side: Side::Buy,
            quantity: 10,
            limit_price: Some(dec!(70000)),
        }
    }

    #[tokio::test]
    async fn test_default_accept_and_fill() {
        let broker = MockBroker::new(dec!(70000));
        let ack = broker.submit_order(&ticket()).await.unwrap();

        let report = broker.query_order("005930", &ack.broker_order_id).await.unwrap();
        assert_eq!(report.state, BrokerOrderState::Filled);
        assert_eq!(report.filled_quantity, dec!(10));
        assert_eq!(report.avg_fill_price, Some(dec!(70000)));
    }

    #[tokio::test]
    async fn test_scripted_failure_then_success() {
        let broker = MockBroker::new(dec!(70000));
        broker
            .script_submit(SubmitScript::Fail(BrokerError::Timeout("1".to_string())))
            .await;
        broker.script_submit(SubmitScript::Accept).await;

        assert!(broker.submit_order(&ticket()).await.is_err());
        assert!(broker.submit_order(&ticket()).await.is_ok());
        assert_eq!(broker.submit_count().await, 2);
    }
}
