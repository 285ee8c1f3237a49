use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::util::ServiceExt;

use api::{router, AppState};
use candles::{CandleAggregator, CandleStore};
use common::{Alert, AlertKind, AlertPriority, ExitReason, OrderSide, Timeframe, Trade, TradingMode};
use engine::Trader;
use monitor::{AlertStore, SignalMonitor};
use paper::PaperClient;
use portfolio::{Portfolio, RiskConfig, TradeStore};
use strategy::{StrategyParams, TrendStrategy};

const TOKEN: &str = "test-token";

async fn test_db() -> SqlitePool {
    let db = SqlitePool::connect("sqlite::memory:").await.unwrap();
    for ddl in [
        r#"CREATE TABLE candles (
            symbol TEXT NOT NULL, timeframe TEXT NOT NULL, period_start TEXT NOT NULL,
            open REAL NOT NULL, high REAL NOT NULL, low REAL NOT NULL,
            close REAL NOT NULL, volume REAL NOT NULL,
            PRIMARY KEY (symbol, timeframe, period_start))"#,
        r#"CREATE TABLE trades (
            id TEXT PRIMARY KEY, symbol TEXT NOT NULL, side TEXT NOT NULL,
            amount REAL NOT NULL, price REAL NOT NULL, timestamp TEXT NOT NULL,
            strategy_name TEXT NOT NULL, status TEXT NOT NULL,
            exit_reason TEXT, realized_pnl REAL)"#,
        r#"CREATE TABLE alerts (
            id TEXT PRIMARY KEY, kind TEXT NOT NULL, symbol TEXT NOT NULL,
            timestamp TEXT NOT NULL, message TEXT NOT NULL, priority TEXT NOT NULL,
            data TEXT NOT NULL, read INTEGER NOT NULL DEFAULT 0)"#,
    ] {
        sqlx::query(ddl).execute(&db).await.unwrap();
    }
    db
}

async fn test_state() -> AppState {
    let db = test_db().await;
    let trade_store = TradeStore::new(db.clone());
    let alert_store = AlertStore::new(db.clone());

    let (_trader, handle) = Trader::new(
        vec!["BTCUSDT".to_string()],
        Duration::from_secs(30),
        Box::new(TrendStrategy::new("trend", StrategyParams::default())),
        Portfolio::new(10_000.0, RiskConfig::default()),
        CandleAggregator::new(Timeframe::M1),
        SignalMonitor::new(),
        Arc::new(PaperClient::new(10.0)),
        CandleStore::new(db.clone()),
        trade_store.clone(),
    );

    AppState {
        engine: handle,
        trade_store,
        alert_store,
        trading_mode: TradingMode::Paper,
        dashboard_token: TOKEN.to_string(),
        initial_balance: 10_000.0,
    }
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(t) = token {
        builder = builder.header("Authorization", format!("Bearer {t}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(t) = token {
        builder = builder.header("Authorization", format!("Bearer {t}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_needs_no_auth() {
    let app = router(test_state().await);
    let response = app.oneshot(get("/healthz", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["engine"], "stopped");
    assert_eq!(body["mode"], "paper");
}

#[tokio::test]
async fn protected_routes_reject_bad_tokens() {
    let state = test_state().await;

    for uri in ["/api/portfolio", "/api/trades", "/api/signals", "/api/alerts"] {
        let response = router(state.clone()).oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");

        let response = router(state.clone())
            .oneshot(get(uri, Some("wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }

    let response = router(state.clone())
        .oneshot(post("/api/engine/start", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn portfolio_returns_published_snapshot() {
    let app = router(test_state().await);
    let response = app
        .oneshot(get("/api/portfolio", Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["cash_balance"], json!(10_000.0));
    assert_eq!(body["trade_count"], json!(0));
}

#[tokio::test]
async fn trades_paginate_and_filter_by_symbol() {
    let state = test_state().await;
    for i in 0..3 {
        let trade = Trade::filled("BTCUSDT", OrderSide::Buy, 1.0, 100.0 + i as f64, "trend");
        state.trade_store.insert(&trade).await.unwrap();
    }
    state
        .trade_store
        .insert(&Trade::filled("ETHUSDT", OrderSide::Buy, 1.0, 2000.0, "trend"))
        .await
        .unwrap();

    let response = router(state.clone())
        .oneshot(get("/api/trades?limit=2&page=1", Some(TOKEN)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["trades"].as_array().unwrap().len(), 2);
    assert_eq!(body["total"], json!(4));

    let response = router(state.clone())
        .oneshot(get("/api/trades?symbol=ETHUSDT", Some(TOKEN)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["trades"].as_array().unwrap().len(), 1);
    assert_eq!(body["trades"][0]["symbol"], "ETHUSDT");
}

#[tokio::test]
async fn performance_folds_realized_pnls() {
    let state = test_state().await;
    for (price, pnl) in [(110.0, 100.0), (90.0, -50.0)] {
        let mut trade = Trade::filled("BTCUSDT", OrderSide::Sell, 1.0, price, "trend");
        trade.exit_reason = Some(ExitReason::Signal);
        trade.realized_pnl = Some(pnl);
        state.trade_store.insert(&trade).await.unwrap();
    }

    let response = router(state)
        .oneshot(get("/api/performance", Some(TOKEN)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["trade_count"], json!(2));
    assert_eq!(body["win_rate"], json!(0.5));
    assert_eq!(body["total_pnl_usd"], json!(50.0));
    assert_eq!(body["equity_curve"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn alerts_filter_and_mark_read() {
    let state = test_state().await;
    let alert = Alert::new(
        AlertKind::StopLossHit,
        "BTCUSDT",
        "stop hit",
        AlertPriority::Warning,
        json!({}),
    );
    state.alert_store.insert(&alert).await.unwrap();

    let response = router(state.clone())
        .oneshot(get("/api/alerts?kind=bogus", Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router(state.clone())
        .oneshot(get("/api/alerts?kind=stop_loss_hit&unread=true", Some(TOKEN)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["alerts"].as_array().unwrap().len(), 1);
    assert_eq!(body["alerts"][0]["read"], json!(false));

    let uri = format!("/api/alerts/{}/read", alert.id);
    let response = router(state.clone())
        .oneshot(post(&uri, Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router(state.clone())
        .oneshot(post("/api/alerts/nope/read", Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router(state)
        .oneshot(get("/api/alerts?unread=true", Some(TOKEN)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert!(body["alerts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn engine_control_accepts_commands() {
    let state = test_state().await;
    let response = router(state.clone())
        .oneshot(post("/api/engine/start", Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = router(state)
        .oneshot(post("/api/engine/stop", Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}
