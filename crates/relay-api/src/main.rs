//! 신호 중계 API 서버.
//!
//! 설정을 로드하고 저장소/브로커/실행기를 조립한 뒤
//! Axum 서버를 시작합니다.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use relay_api::routes::create_api_router;
use relay_api::repository::PgTradeStore;
use relay_api::state::AppState;
use relay_broker::client::BrokerClient;
use relay_broker::kis::{KisAuth, KisBroker, KisEnvironment};
use relay_core::config::{AccountConfig, AppConfig};
use relay_core::domain::account::Balance;
use relay_core::store::{StoreError, TradeStore};
use relay_engine::executor::OrderExecutor;
use relay_engine::ledger::PositionLedger;
use relay_engine::memory_store::MemoryStore;
use relay_engine::router::SignalRouter;

/// 저장소 선택.
///
/// `database_url`이 있으면 PostgreSQL, 없으면 메모리 저장소를 사용합니다.
async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn TradeStore>> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(5))
                .connect(url)
                .await?;
            let store = PgTradeStore::new(pool);
            store.ensure_schema().await?;
            info!("PostgreSQL 저장소 연결 완료");
            Ok(Arc::new(store))
        }
        None => {
            warn!("database_url 미설정, 메모리 저장소 사용 (재시작 시 초기화)");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// 계좌 잔고 시드.
///
/// 저장소에 잔고가 없는 계좌만 설정의 initial_balance로 초기화합니다.
async fn seed_balances(
    store: &Arc<dyn TradeStore>,
    accounts: &[AccountConfig],
) -> anyhow::Result<()> {
    for account in accounts {
        match store.balance(&account.id).await {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => {
                store
                    .upsert_balance(&Balance::new(&account.id, account.initial_balance))
                    .await?;
                info!(
                    account_id = %account.id,
                    initial_balance = %account.initial_balance,
                    "계좌 잔고 초기화"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// 계좌별 KIS 브로커 클라이언트 생성.
fn build_broker(http: &reqwest::Client, account: &AccountConfig) -> Arc<dyn BrokerClient> {
    let environment = if account.is_virtual {
        KisEnvironment::Virtual
    } else {
        KisEnvironment::Live
    };
    let auth = Arc::new(KisAuth::new(
        http.clone(),
        environment,
        account.app_key.clone(),
        SecretString::from(account.app_secret.clone()),
    ));
    Arc::new(KisBroker::new(
        http.clone(),
        auth,
        account.account_number.clone(),
        account.product_code.clone(),
    ))
}

/// CORS 미들웨어 구성.
///
/// `RELAY_CORS_ORIGINS` 환경 변수(쉼표 구분)가 있으면 해당 origin만 허용하고,
/// 없으면 개발 모드로 간주하여 모든 origin을 허용합니다.
fn cors_layer() -> CorsLayer {
    let allow_origin = match std::env::var("RELAY_CORS_ORIGINS") {
        Ok(origins) if !origins.is_empty() => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                warn!("RELAY_CORS_ORIGINS에 유효한 origin 없음, 전체 허용");
                AllowOrigin::any()
            } else {
                AllowOrigin::list(origins)
            }
        }
        _ => {
            warn!("RELAY_CORS_ORIGINS 미설정, 모든 origin 허용 (개발 모드)");
            AllowOrigin::any()
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_api=info,relay_engine=info,tower_http=debug".into()),
        )
        .init();

    let config_path =
        std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "config/relay".to_string());
    let config = AppConfig::load(&config_path)?;
    info!(
        accounts = config.accounts.len(),
        strategies = config.strategies.len(),
        "설정 로드 완료"
    );

    let store = build_store(&config).await?;
    seed_balances(&store, &config.accounts).await?;

    let ledger = Arc::new(PositionLedger::new(store.clone()));

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let mut executor = OrderExecutor::new(store.clone(), ledger.clone(), config.executor.clone());
    for account in config.accounts.iter().filter(|a| a.is_active) {
        executor = executor.with_broker(&account.id, build_broker(&http, account));
        info!(
            account_id = %account.id,
            is_virtual = account.is_virtual,
            "브로커 클라이언트 등록"
        );
    }

    let router = Arc::new(SignalRouter::new(
        config.strategies.iter().map(|s| s.to_strategy()).collect(),
        config.accounts.clone(),
        store.clone(),
        ledger.clone(),
        Arc::new(executor),
    ));

    let state = AppState::new(router, ledger, store);

    let app = create_api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .layer(cors_layer());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "웹훅 수신 대기 시작");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("서버 정상 종료");
    Ok(())
}

/// Ctrl+C 또는 SIGTERM 대기.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl+C 핸들러 설치 실패: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => warn!("SIGTERM 핸들러 설치 실패: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Ctrl+C 수신, 종료 시작"),
        _ = terminate => warn!("SIGTERM 수신, 종료 시작"),
    }
}
