use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use candles::{CandleAggregator, CandleStore};
use common::{
    Candle, EngineCommand, EngineState, Error, ExchangeClient, ExitReason, OrderResult, OrderSide,
    Result, Signal, Ticker, Timeframe,
};
use engine::{EngineHandle, Trader};
use monitor::SignalMonitor;
use portfolio::{Portfolio, RiskConfig, TradeFilter, TradeStore};
use strategy::Strategy;

/// Exchange double: quotes a settable price, records orders, fills at the
/// quoted price with no slippage.
struct MockExchange {
    price: Mutex<f64>,
    orders: Mutex<Vec<(OrderSide, f64)>>,
    fail_tickers: AtomicBool,
    fail_orders: AtomicBool,
}

impl MockExchange {
    fn new(price: f64) -> Arc<Self> {
        Arc::new(Self {
            price: Mutex::new(price),
            orders: Mutex::new(Vec::new()),
            fail_tickers: AtomicBool::new(false),
            fail_orders: AtomicBool::new(false),
        })
    }

    fn set_price(&self, price: f64) {
        *self.price.lock().unwrap() = price;
    }

    fn order_sides(&self) -> Vec<OrderSide> {
        self.orders.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn ticker(&self, symbol: &str) -> Result<Ticker> {
        if self.fail_tickers.load(Ordering::SeqCst) {
            return Err(Error::Exchange("ticker unavailable".into()));
        }
        Ok(Ticker {
            symbol: symbol.to_string(),
            price: *self.price.lock().unwrap(),
            timestamp: Utc::now(),
        })
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: f64,
        _price: Option<f64>,
    ) -> Result<OrderResult> {
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(Error::Exchange("order rejected".into()));
        }
        let price = *self.price.lock().unwrap();
        self.orders.lock().unwrap().push((side, amount));
        Ok(OrderResult {
            order_id: "mock-1".to_string(),
            symbol: symbol.to_string(),
            side,
            amount,
            fill_price: price,
            timestamp: Utc::now(),
        })
    }
}

/// Strategy double: replays a fixed sequence of signal values, then holds.
struct ScriptedStrategy {
    values: VecDeque<f64>,
}

impl ScriptedStrategy {
    fn new(values: &[f64]) -> Box<Self> {
        Box::new(Self {
            values: values.iter().copied().collect(),
        })
    }
}

impl Strategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn min_candles(&self) -> usize {
        1
    }

    fn generate_signal(&mut self, _candles: &[Candle]) -> Signal {
        Signal::new(self.values.pop_front().unwrap_or(0.0), None)
    }
}

async fn test_stores() -> (CandleStore, TradeStore) {
    let db = SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::query(
        r#"
        CREATE TABLE candles (
            symbol TEXT NOT NULL,
            timeframe TEXT NOT NULL,
            period_start TEXT NOT NULL,
            open REAL NOT NULL, high REAL NOT NULL,
            low REAL NOT NULL, close REAL NOT NULL,
            volume REAL NOT NULL,
            PRIMARY KEY (symbol, timeframe, period_start)
        )
        "#,
    )
    .execute(&db)
    .await
    .unwrap();
    sqlx::query(
        r#"
        CREATE TABLE trades (
            id TEXT PRIMARY KEY,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL,
            amount REAL NOT NULL,
            price REAL NOT NULL,
            timestamp TEXT NOT NULL,
            strategy_name TEXT NOT NULL,
            status TEXT NOT NULL,
            exit_reason TEXT,
            realized_pnl REAL
        )
        "#,
    )
    .execute(&db)
    .await
    .unwrap();
    (CandleStore::new(db.clone()), TradeStore::new(db))
}

async fn new_trader(
    exchange: Arc<MockExchange>,
    script: &[f64],
) -> (Trader, EngineHandle, TradeStore) {
    let (candle_store, trade_store) = test_stores().await;
    let (trader, handle) = Trader::new(
        vec!["BTCUSDT".to_string()],
        Duration::from_millis(5),
        ScriptedStrategy::new(script),
        Portfolio::new(10_000.0, RiskConfig::default()),
        CandleAggregator::new(Timeframe::M1),
        SignalMonitor::new(),
        exchange,
        candle_store,
        trade_store.clone(),
    );
    (trader, handle, trade_store)
}

#[tokio::test]
async fn execution_is_edge_triggered_on_sign_flips() {
    let exchange = MockExchange::new(100.0);
    let (mut trader, _handle, _store) =
        new_trader(exchange.clone(), &[1.0, 1.0, -1.0, 1.0, 1.0]).await;

    for _ in 0..5 {
        trader.run_cycle().await;
    }

    // +1 buys, staying +1 does nothing, -1 sells, +1 buys again.
    assert_eq!(
        exchange.order_sides(),
        vec![OrderSide::Buy, OrderSide::Sell, OrderSide::Buy]
    );
}

#[tokio::test]
async fn position_sizing_respects_max_position_pct() {
    let exchange = MockExchange::new(50.0);
    let (mut trader, _handle, _store) = new_trader(exchange.clone(), &[1.0]).await;

    trader.run_cycle().await;

    let orders = exchange.orders.lock().unwrap().clone();
    assert_eq!(orders.len(), 1);
    // min(10000 × 0.95, 10000 × 0.07) / 50 = 14 units.
    assert!((orders[0].1 - 14.0).abs() < 1e-9);
}

#[tokio::test]
async fn stop_loss_exits_before_signal_evaluation() {
    let exchange = MockExchange::new(100.0);
    let (mut trader, _handle, trade_store) = new_trader(exchange.clone(), &[1.0, 0.0]).await;

    trader.run_cycle().await;
    assert_eq!(exchange.order_sides(), vec![OrderSide::Buy]);

    // Default stop_loss_pct 0.15 puts the stop at 85.0.
    exchange.set_price(84.99);
    trader.run_cycle().await;

    assert_eq!(exchange.order_sides(), vec![OrderSide::Buy, OrderSide::Sell]);
    let trades = trade_store
        .list(&TradeFilter { limit: 10, ..Default::default() })
        .await
        .unwrap();
    let sell = trades.iter().find(|t| t.side == OrderSide::Sell).unwrap();
    assert_eq!(sell.exit_reason, Some(ExitReason::StopLoss));
    assert!(sell.realized_pnl.unwrap() < 0.0);
}

#[tokio::test]
async fn failed_order_leaves_portfolio_untouched() {
    let exchange = MockExchange::new(100.0);
    let (mut trader, _handle, trade_store) = new_trader(exchange.clone(), &[1.0, -1.0]).await;
    exchange.fail_orders.store(true, Ordering::SeqCst);

    trader.run_cycle().await;
    trader.run_cycle().await;

    assert!(exchange.order_sides().is_empty());
    assert_eq!(trade_store.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn ticker_failure_skips_the_symbol() {
    let exchange = MockExchange::new(100.0);
    let (mut trader, _handle, _store) = new_trader(exchange.clone(), &[1.0]).await;
    exchange.fail_tickers.store(true, Ordering::SeqCst);

    trader.run_cycle().await;

    assert!(exchange.order_sides().is_empty());
}

#[tokio::test]
async fn snapshot_published_every_tenth_cycle() {
    let exchange = MockExchange::new(100.0);
    let (mut trader, handle, _store) = new_trader(exchange.clone(), &[1.0]).await;

    for _ in 0..9 {
        trader.run_cycle().await;
    }
    // Still the construction-time snapshot.
    assert!(handle.snapshot().await.positions.is_empty());

    trader.run_cycle().await;
    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.positions.len(), 1);
    assert!(snapshot.cash_balance < 10_000.0);
}

#[tokio::test]
async fn start_and_stop_commands_gate_the_loop() {
    let exchange = MockExchange::new(100.0);
    let (trader, handle, _store) = new_trader(exchange.clone(), &[]).await;
    tokio::spawn(trader.run());

    assert_eq!(handle.state().await, EngineState::Stopped);

    handle.send(EngineCommand::Start).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.state().await, EngineState::Running);

    handle.send(EngineCommand::Stop).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.state().await, EngineState::Stopped);
}

#[tokio::test]
async fn commands_to_a_dead_loop_are_dropped_quietly() {
    let exchange = MockExchange::new(100.0);
    let (trader, handle, _store) = new_trader(exchange.clone(), &[]).await;
    drop(trader);

    // The loop task is gone; the handle must absorb the command without
    // panicking and the state must stay put.
    handle.send(EngineCommand::Start).await;
    assert_eq!(handle.state().await, EngineState::Stopped);
}
