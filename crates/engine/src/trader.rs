use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use candles::{CandleAggregator, CandleStore};
use common::{
    Candle, EngineCommand, EngineState, ExchangeClient, ExitReason, OrderSide, PriceUpdate,
    SignalState, Trade,
};
use monitor::SignalMonitor;
use portfolio::{Portfolio, PortfolioSnapshot, TradeStore};
use strategy::Strategy;

/// Cloneable handle passed to other crates (API).
///
/// Read paths go through the published snapshot and signal states, never
/// through the live [`Portfolio`] — the loop stays the single writer.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
    snapshot: Arc<RwLock<PortfolioSnapshot>>,
    signals: Arc<RwLock<Vec<SignalState>>>,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        if let Err(e) = self.command_tx.send(cmd).await {
            warn!(command = ?e.0, "engine loop is gone, command dropped");
        }
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    pub async fn snapshot(&self) -> PortfolioSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn signals(&self) -> Vec<SignalState> {
        self.signals.read().await.clone()
    }
}

/// The live trading loop. Owns the portfolio, aggregator, strategy,
/// monitor and exchange client; everything is passed in explicitly at
/// construction.
pub struct Trader {
    symbols: Vec<String>,
    update_interval: Duration,
    strategy: Box<dyn Strategy>,
    portfolio: Portfolio,
    aggregator: CandleAggregator,
    monitor: SignalMonitor,
    exchange: Arc<dyn ExchangeClient>,
    candle_store: CandleStore,
    trade_store: TradeStore,

    /// Previous signal value per symbol; order issuance is edge-triggered
    /// on sign flips, not on the value itself.
    last_signal: HashMap<String, f64>,
    cycle_count: u64,
    /// True once a live tick stream feeds the aggregator, so polled
    /// quotes are not double-counted.
    stream_fed: bool,

    state: Arc<RwLock<EngineState>>,
    command_rx: Option<mpsc::Receiver<EngineCommand>>,
    tick_rx: Option<mpsc::Receiver<PriceUpdate>>,
    snapshot_out: Arc<RwLock<PortfolioSnapshot>>,
    signals_out: Arc<RwLock<Vec<SignalState>>>,
}

/// The aggregate snapshot is logged and republished every this many cycles.
const SNAPSHOT_EVERY: u64 = 10;

impl Trader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbols: Vec<String>,
        update_interval: Duration,
        strategy: Box<dyn Strategy>,
        portfolio: Portfolio,
        aggregator: CandleAggregator,
        monitor: SignalMonitor,
        exchange: Arc<dyn ExchangeClient>,
        candle_store: CandleStore,
        trade_store: TradeStore,
    ) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let state = Arc::new(RwLock::new(EngineState::Stopped));
        let snapshot_out = Arc::new(RwLock::new(portfolio.snapshot()));
        let signals_out = Arc::new(RwLock::new(Vec::new()));

        let handle = EngineHandle {
            command_tx,
            state: state.clone(),
            snapshot: snapshot_out.clone(),
            signals: signals_out.clone(),
        };

        let trader = Trader {
            symbols,
            update_interval,
            strategy,
            portfolio,
            aggregator,
            monitor,
            exchange,
            candle_store,
            trade_store,
            last_signal: HashMap::new(),
            cycle_count: 0,
            stream_fed: false,
            state,
            command_rx: Some(command_rx),
            tick_rx: None,
            snapshot_out,
            signals_out,
        };

        (trader, handle)
    }

    /// Attach a live tick stream. Ticks feed the aggregator between
    /// cycles; polled tickers then only supply price marks.
    pub fn attach_tick_stream(&mut self, rx: mpsc::Receiver<PriceUpdate>) {
        self.tick_rx = Some(rx);
        self.stream_fed = true;
    }

    /// Seed in-memory candle history from the candle store.
    pub async fn bootstrap_history(&mut self) {
        let limit = self.strategy.min_candles() as i64;
        for symbol in self.symbols.clone() {
            match self
                .candle_store
                .recent(&symbol, self.aggregator.timeframe(), limit)
                .await
            {
                Ok(stored) if !stored.is_empty() => {
                    info!(symbol, count = stored.len(), "bootstrapped candle history");
                    self.aggregator.bootstrap(&symbol, stored);
                }
                Ok(_) => {}
                Err(e) => warn!(symbol, error = %e, "candle history bootstrap failed"),
            }
        }
    }

    /// Drive the loop until the command channel closes.
    /// Call from `tokio::spawn`.
    pub async fn run(mut self) {
        let Some(mut command_rx) = self.command_rx.take() else {
            return;
        };
        let mut tick_rx = self.tick_rx.take();

        info!(
            symbols = ?self.symbols,
            interval = ?self.update_interval,
            "trader initialized in stopped state, waiting for start command"
        );

        let mut interval = tokio::time::interval(self.update_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = command_rx.recv() => match cmd {
                    Some(EngineCommand::Start) => {
                        let current = *self.state.read().await;
                        if current == EngineState::Running {
                            info!("trader already running");
                            continue;
                        }
                        info!("trader starting");
                        *self.state.write().await = EngineState::Running;
                    }
                    Some(EngineCommand::Stop) => {
                        info!("trader stopping");
                        *self.state.write().await = EngineState::Stopped;
                    }
                    None => {
                        warn!("command channel closed, shutting down trader");
                        break;
                    }
                },

                tick = recv_tick(&mut tick_rx) => match tick {
                    Some(update) => {
                        if let Some(closed) = self.aggregator.process_tick(&update) {
                            self.persist_candle(&closed).await;
                        }
                    }
                    None => {
                        warn!("tick stream closed, falling back to polled quotes");
                        tick_rx = None;
                        self.stream_fed = false;
                    }
                },

                _ = interval.tick() => {
                    // The running flag is only consulted at cycle
                    // boundaries; a cycle never stops half way.
                    if *self.state.read().await == EngineState::Running {
                        self.run_cycle().await;
                    }
                }
            }
        }
    }

    /// One full trading cycle. Deterministic and public so tests can
    /// drive the loop directly without timers.
    pub async fn run_cycle(&mut self) {
        self.cycle_count += 1;

        // 1. Quotes. A failing symbol is skipped this cycle, never fatal.
        let mut prices: HashMap<String, f64> = HashMap::new();
        for symbol in self.symbols.clone() {
            match self.exchange.ticker(&symbol).await {
                Ok(ticker) => {
                    prices.insert(symbol.clone(), ticker.price);
                    if !self.stream_fed {
                        let update = PriceUpdate {
                            symbol: symbol.clone(),
                            price: ticker.price,
                            timestamp: ticker.timestamp,
                            volume: None,
                            change_24h: None,
                        };
                        if let Some(closed) = self.aggregator.process_tick(&update) {
                            self.persist_candle(&closed).await;
                        }
                    }
                }
                Err(e) => warn!(symbol, error = %e, "ticker fetch failed, skipping symbol"),
            }
        }

        // 2. Mark held positions.
        self.portfolio.update_prices(&prices);

        // 3. Protective exits run before any new signal is considered.
        for symbol in self.portfolio.check_stop_losses(&prices) {
            if let Some(&price) = prices.get(&symbol) {
                self.execute_exit(&symbol, price, ExitReason::StopLoss).await;
            }
        }
        for symbol in self.portfolio.check_take_profits(&prices) {
            if let Some(&price) = prices.get(&symbol) {
                // A stop exit above may already have removed it.
                if self.portfolio.position(&symbol).is_some() {
                    self.execute_exit(&symbol, price, ExitReason::TakeProfit).await;
                }
            }
        }

        // 4–7. Signals and edge-triggered execution.
        for symbol in self.symbols.clone() {
            let Some(&price) = prices.get(&symbol) else {
                continue;
            };

            let candles = self.candles_for(&symbol).await;
            if candles.is_empty() {
                continue;
            }

            let signal = self.strategy.generate_signal(&candles);
            self.monitor
                .update_signal(&symbol, signal.value, price, signal.snapshot.as_ref());

            let prev = self.last_signal.get(&symbol).copied().unwrap_or(0.0);
            self.last_signal.insert(symbol.clone(), signal.value);

            if signal.value > 0.0 && prev <= 0.0 {
                self.execute_entry(&symbol, price).await;
            } else if signal.value < 0.0 && prev >= 0.0 {
                if self.portfolio.position(&symbol).is_some() {
                    self.execute_exit(&symbol, price, ExitReason::Signal).await;
                }
            } else {
                debug!(symbol, value = signal.value, prev, "no signal edge");
            }
        }

        // 8. Publish for readers; log the aggregate view periodically.
        *self.signals_out.write().await = self.monitor.signal_states();
        if self.cycle_count % SNAPSHOT_EVERY == 0 {
            let snapshot = self.portfolio.snapshot();
            info!(
                cycle = self.cycle_count,
                total_value = snapshot.total_value,
                cash = snapshot.cash_balance,
                positions = snapshot.positions.len(),
                trades = snapshot.trade_count,
                "portfolio snapshot"
            );
            *self.snapshot_out.write().await = snapshot;
        }
    }

    /// The candle window handed to the strategy: closed history plus the
    /// forming candle, falling back to the persisted store when the
    /// in-memory aggregator is still short.
    async fn candles_for(&mut self, symbol: &str) -> Vec<Candle> {
        let need = self.strategy.min_candles();
        let mut candles = self.aggregator.history(symbol, None);
        if let Some(open) = self.aggregator.current(symbol) {
            candles.push(open.clone());
        }
        if candles.len() >= need {
            return candles;
        }

        match self
            .candle_store
            .recent(symbol, self.aggregator.timeframe(), need as i64)
            .await
        {
            Ok(stored) if stored.len() > candles.len() => stored,
            Ok(_) => candles,
            Err(e) => {
                warn!(symbol, error = %e, "candle store fallback failed");
                candles
            }
        }
    }

    async fn execute_entry(&mut self, symbol: &str, price: f64) {
        if !self.portfolio.can_open_position(symbol) {
            debug!(symbol, "entry suppressed by portfolio guard");
            return;
        }
        let amount = self.portfolio.position_size(price);
        if amount <= 0.0 {
            return;
        }

        // Portfolio state only moves once the exchange confirms the fill.
        match self
            .exchange
            .place_order(symbol, OrderSide::Buy, amount, None)
            .await
        {
            Ok(fill) => {
                if !self
                    .portfolio
                    .open_position(symbol, fill.amount, fill.fill_price, None)
                {
                    warn!(symbol, "order filled but position rejected by risk limits");
                    return;
                }
                let trade = Trade::filled(
                    symbol,
                    OrderSide::Buy,
                    fill.amount,
                    fill.fill_price,
                    self.strategy.name(),
                );
                self.record(trade).await;
            }
            Err(e) => warn!(symbol, error = %e, "buy order failed, no position opened"),
        }
    }

    async fn execute_exit(&mut self, symbol: &str, price: f64, reason: ExitReason) {
        let Some(position) = self.portfolio.position(symbol) else {
            return;
        };
        let amount = position.amount;

        match self
            .exchange
            .place_order(symbol, OrderSide::Sell, amount, None)
            .await
        {
            Ok(fill) => {
                let Some(pnl) = self.portfolio.close_position(symbol, fill.fill_price) else {
                    return;
                };
                let mut trade = Trade::filled(
                    symbol,
                    OrderSide::Sell,
                    amount,
                    fill.fill_price,
                    self.strategy.name(),
                );
                trade.exit_reason = Some(reason);
                trade.realized_pnl = Some(pnl);
                info!(
                    symbol,
                    mark = price,
                    fill = fill.fill_price,
                    pnl,
                    reason = %reason,
                    "position closed"
                );

                match reason {
                    ExitReason::StopLoss => self.monitor.log_stop_loss(&trade),
                    ExitReason::TakeProfit => self.monitor.log_take_profit(&trade),
                    ExitReason::Signal => self.monitor.log_trade_execution(&trade),
                }
                self.portfolio.record_trade(trade.clone());
                if let Err(e) = self.trade_store.insert(&trade).await {
                    warn!(error = %e, "trade persistence failed");
                }
            }
            Err(e) => warn!(symbol, error = %e, "sell order failed, position kept"),
        }
    }

    async fn record(&mut self, trade: Trade) {
        self.monitor.log_trade_execution(&trade);
        self.portfolio.record_trade(trade.clone());
        if let Err(e) = self.trade_store.insert(&trade).await {
            warn!(error = %e, "trade persistence failed");
        }
    }

    async fn persist_candle(&self, candle: &Candle) {
        // Best effort; duplicate buckets are ignored by the store.
        if let Err(e) = self.candle_store.insert(candle).await {
            warn!(symbol = %candle.symbol, error = %e, "candle persistence failed");
        }
    }
}

async fn recv_tick(rx: &mut Option<mpsc::Receiver<PriceUpdate>>) -> Option<PriceUpdate> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
