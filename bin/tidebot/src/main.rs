use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use candles::{CandleAggregator, CandleStore};
use common::{Alert, Config, ExchangeClient, PriceUpdate, TradingMode};
use engine::{BinanceClient, BinanceTickStream, Trader};
use monitor::{AlertStore, SignalMonitor};
use paper::PaperClient;
use portfolio::{Portfolio, RiskConfig, TradeStore};
use strategy::{StrategyFileConfig, TrendStrategy};

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!(mode = %cfg.trading_mode, symbols = ?cfg.symbols, "Tidebot starting");

    // ── Database ──────────────────────────────────────────────────────────────
    let db = SqlitePool::connect(&cfg.database_url)
        .await
        .unwrap_or_else(|e| panic!("Failed to connect to database: {e}"));
    sqlx::migrate!("../../migrations")
        .run(&db)
        .await
        .unwrap_or_else(|e| panic!("Database migration failed: {e}"));
    info!("Database ready");

    let candle_store = CandleStore::new(db.clone());
    let trade_store = TradeStore::new(db.clone());
    let alert_store = AlertStore::new(db.clone());

    // ── Strategy ──────────────────────────────────────────────────────────────
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path);
    let params = strategy_file.resolve();
    info!(
        name = %strategy_file.name,
        preset = %strategy_file.preset,
        "Strategy configured"
    );
    let strategy = TrendStrategy::new(strategy_file.name.clone(), params);

    // ── Exchange client (injected based on TRADING_MODE) ──────────────────────
    let exchange: Arc<dyn ExchangeClient> = match cfg.trading_mode {
        TradingMode::Live => {
            info!("Live trading mode — using BinanceClient");
            Arc::new(BinanceClient::new(&cfg.binance_api_key, &cfg.binance_secret))
        }
        TradingMode::Paper => {
            // Real quotes through the unsigned ticker endpoint, simulated fills.
            info!(slippage_bps = cfg.paper_slippage_bps, "Paper trading mode — using PaperClient");
            let quotes = Arc::new(BinanceClient::new("", ""));
            Arc::new(PaperClient::with_upstream(quotes, cfg.paper_slippage_bps))
        }
    };

    // ── Alert persistence ─────────────────────────────────────────────────────
    let (alert_tx, mut alert_rx) = mpsc::channel::<Alert>(256);
    let mut monitor = SignalMonitor::with_alert_channel(alert_tx);
    monitor.set_win_rate_threshold(cfg.win_rate_threshold);
    {
        let alert_store = alert_store.clone();
        tokio::spawn(async move {
            while let Some(alert) = alert_rx.recv().await {
                if let Err(e) = alert_store.insert(&alert).await {
                    warn!(error = %e, "alert persistence failed");
                }
            }
        });
    }

    // ── Trading loop ──────────────────────────────────────────────────────────
    let portfolio = Portfolio::new(cfg.initial_balance_usd, RiskConfig::default());
    let aggregator = CandleAggregator::new(cfg.timeframe);

    let (mut trader, engine_handle) = Trader::new(
        cfg.symbols.clone(),
        Duration::from_secs(cfg.update_interval_secs),
        Box::new(strategy),
        portfolio,
        aggregator,
        monitor,
        exchange,
        candle_store,
        trade_store.clone(),
    );
    trader.bootstrap_history().await;

    // Live mode streams ticks into the loop task; paper mode polls quotes.
    if cfg.trading_mode == TradingMode::Live {
        let (tick_tx, tick_rx) = mpsc::channel::<PriceUpdate>(1024);
        for symbol in &cfg.symbols {
            let stream = BinanceTickStream::new(symbol.clone(), tick_tx.clone());
            tokio::spawn(stream.run());
        }
        trader.attach_tick_stream(tick_rx);
    }

    // ── Dashboard API ─────────────────────────────────────────────────────────
    let api_state = api::AppState {
        engine: engine_handle.clone(),
        trade_store,
        alert_store,
        trading_mode: cfg.trading_mode,
        dashboard_token: cfg.dashboard_token.clone(),
        initial_balance: cfg.initial_balance_usd,
    };

    // ── Spawn all tasks ───────────────────────────────────────────────────────
    let port = cfg.dashboard_port;
    tokio::spawn(trader.run());
    tokio::spawn(api::serve(api_state, port));

    info!("All subsystems started. Trading loop is stopped — POST /api/engine/start to begin.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
    info!("Shutdown signal received. Exiting.");
}
