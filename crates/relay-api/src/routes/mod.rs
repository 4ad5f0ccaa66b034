//! HTTP 라우트.

pub mod admin;
pub mod orders;
pub mod webhook;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// API 라우터 구성.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(webhook::receive_webhook))
        .route("/orders/{order_id}", get(orders::get_order))
        .route("/health", get(admin::health))
        .route("/emergency-stop", post(admin::emergency_stop))
        .route("/resume", post(admin::resume))
        .route(
            "/accounts/{account_id}/positions",
            get(admin::account_positions),
        )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use chrono::NaiveTime;
    use rust_decimal_macros::dec;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use relay_broker::client::BrokerClient;
    use relay_broker::mock::MockBroker;
    use relay_core::config::{AccountConfig, ExecutorSettings};
    use relay_core::domain::account::{AccountKind, Balance};
    use relay_core::domain::strategy::{Strategy, TradingHours};
    use relay_core::store::TradeStore;
    use relay_engine::executor::OrderExecutor;
    use relay_engine::ledger::PositionLedger;
    use relay_engine::memory_store::MemoryStore;
    use relay_engine::router::SignalRouter;

    use crate::state::AppState;

    fn account() -> AccountConfig {
        AccountConfig {
            id: "acc-1".to_string(),
            name: "테스트".to_string(),
            kind: AccountKind::Equity,
            is_virtual: true,
            is_active: true,
            currency: "KRW".to_string(),
            initial_balance: dec!(10_000_000),
            global_max_daily_loss: None,
            app_key: "k".to_string(),
            app_secret: "s".to_string(),
            account_number: "12345678".to_string(),
            product_code: "01".to_string(),
        }
    }

    fn strategy() -> Strategy {
        Strategy {
            id: "momentum".to_string(),
            account_id: "acc-1".to_string(),
            webhook_token: SecretString::from("tok_abc"),
            max_position_ratio: dec!(0.10),
            max_daily_loss: dec!(1_000_000),
            hours: TradingHours {
                timezone: chrono_tz::Asia::Seoul,
                open: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
                close: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
            },
            is_active: true,
        }
    }

    async fn app() -> Router {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_balance(&Balance::new("acc-1", dec!(10_000_000)))
            .await
            .unwrap();
        let ledger = Arc::new(PositionLedger::new(store.clone() as Arc<dyn TradeStore>));
        let settings = ExecutorSettings {
            retry_count: 1,
            retry_delay_ms: 10,
            fill_poll_interval_ms: 10,
            fill_timeout_ms: 200,
            futures_margin_rate: dec!(0.10),
            commission_rate: dec!(0.00015),
        };
        let broker = Arc::new(MockBroker::new(dec!(70000)));
        let executor = Arc::new(
            OrderExecutor::new(
                store.clone() as Arc<dyn TradeStore>,
                ledger.clone(),
                settings,
            )
            .with_broker("acc-1", broker as Arc<dyn BrokerClient>),
        );
        let router = Arc::new(SignalRouter::new(
            vec![strategy()],
            vec![account()],
            store.clone() as Arc<dyn TradeStore>,
            ledger.clone(),
            executor,
        ));
        let state = AppState::new(router, ledger, store as Arc<dyn TradeStore>);
        super::create_api_router().with_state(state)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn buy_signal() -> Value {
        json!({
            "symbol": "005930",
            "action": "BUY",
            "quantity": 10,
            "webhook_token": "tok_abc",
            "price": 70000
        })
    }

    #[tokio::test]
    async fn test_webhook_fill_and_order_lookup() {
        let app = app().await;

        let response = app
            .clone()
            .oneshot(post_json("/webhook", buy_signal()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "FILLED");
        assert_eq!(body["symbol"], "005930");
        assert_eq!(body["account_id"], "acc-1");

        let order_id = body["order_id"].as_str().unwrap().to_string();
        let response = app
            .oneshot(get(&format!("/orders/{order_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "FILLED");
        assert_eq!(body["filled_quantity"], "10");
        assert_eq!(body["transition"], "ENTRY");
    }

    #[tokio::test]
    async fn test_webhook_unauthorized() {
        let app = app().await;

        let mut signal = buy_signal();
        signal["webhook_token"] = json!("tok_wrong");
        let response = app.oneshot(post_json("/webhook", signal)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error_kind"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_webhook_malformed() {
        let app = app().await;

        let response = app
            .oneshot(post_json("/webhook", json!({"garbage": true})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error_kind"], "MalformedSignal");
    }

    #[tokio::test]
    async fn test_emergency_stop_and_resume() {
        let app = app().await;

        let response = app
            .clone()
            .oneshot(post_json("/emergency-stop", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(post_json("/webhook", buy_signal()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let health = body_json(app.clone().oneshot(get("/health")).await.unwrap()).await;
        assert_eq!(health["halted"], true);

        let response = app
            .clone()
            .oneshot(post_json("/resume", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(post_json("/webhook", buy_signal()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_order_not_found() {
        let app = app().await;

        let response = app
            .oneshot(get("/orders/00000000-0000-0000-0000-000000000000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_account_positions_snapshot() {
        let app = app().await;

        app.clone()
            .oneshot(post_json("/webhook", buy_signal()))
            .await
            .unwrap();

        let response = app
            .oneshot(get("/accounts/acc-1/positions"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["account_id"], "acc-1");
        let positions = body["positions"].as_array().unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0]["symbol"], "005930");
        assert_eq!(positions[0]["quantity"], "10");
    }
}
