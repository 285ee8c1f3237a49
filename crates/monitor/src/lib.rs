//! Signal monitoring and alerting.
//!
//! The [`SignalMonitor`] watches per-symbol signal values, raises a typed
//! [`Alert`] when the classification transitions, translates trade events
//! into alerts, and tracks a rolling win rate over completed trades.

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, warn};

use common::{
    Alert, AlertKind, AlertPriority, IndicatorSnapshot, SignalKind, SignalState, Trade,
};

mod store;

pub use store::{AlertFilter, AlertStore};

/// Synchronous callback invoked for every alert the monitor raises.
pub type AlertSubscriber = Box<dyn Fn(&Alert) + Send + Sync>;

/// How many alerts the in-memory log keeps.
const MAX_RECENT_ALERTS: usize = 200;

/// Streak length that earns a `HighWinStreak` alert.
const WIN_STREAK_ALERT: i32 = 5;

/// Win rate is re-checked after every this many completed trades.
const WIN_RATE_CHECK_EVERY: u32 = 10;

pub struct SignalMonitor {
    states: HashMap<String, SignalState>,
    subscribers: Vec<AlertSubscriber>,
    recent: VecDeque<Alert>,
    alert_tx: Option<mpsc::Sender<Alert>>,
    /// Positive while winning, negative while losing.
    streak: i32,
    completed_trades: u32,
    winning_trades: u32,
    win_rate_threshold: f64,
}

impl Default for SignalMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalMonitor {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
            subscribers: Vec::new(),
            recent: VecDeque::with_capacity(MAX_RECENT_ALERTS),
            alert_tx: None,
            streak: 0,
            completed_trades: 0,
            winning_trades: 0,
            win_rate_threshold: 0.60,
        }
    }

    /// Alerts are additionally pushed onto `tx`, typically drained by a
    /// persistence task writing an [`AlertStore`].
    pub fn with_alert_channel(tx: mpsc::Sender<Alert>) -> Self {
        let mut monitor = Self::new();
        monitor.alert_tx = Some(tx);
        monitor
    }

    pub fn set_win_rate_threshold(&mut self, threshold: f64) {
        self.win_rate_threshold = threshold;
    }

    /// Register a synchronous subscriber. Panics inside the callback are
    /// caught and logged, never propagated to the caller.
    pub fn subscribe<F: Fn(&Alert) + Send + Sync + 'static>(&mut self, f: F) {
        self.subscribers.push(Box::new(f));
    }

    /// Record a new signal value for `symbol`.
    ///
    /// The stored [`SignalState`] (price and indicator snapshot included) is
    /// overwritten on every call; an alert is raised only when the sign
    /// classification actually transitions, or when the first observed state
    /// for a symbol is already non-HOLD. `last_change` moves only on those
    /// transitions.
    pub fn update_signal(
        &mut self,
        symbol: &str,
        value: f64,
        price: f64,
        snapshot: Option<&IndicatorSnapshot>,
    ) -> Option<Alert> {
        let kind = SignalKind::from_value(value);
        let now = Utc::now();

        let (transitioned, last_change) = match self.states.get(symbol) {
            Some(prev) if prev.signal_type == kind => (false, prev.last_change),
            Some(_) => (true, now),
            None => (kind != SignalKind::Hold, now),
        };

        self.states.insert(
            symbol.to_string(),
            SignalState {
                symbol: symbol.to_string(),
                current_signal: value,
                signal_type: kind,
                last_change,
                price,
                rsi: snapshot.and_then(|s| s.rsi),
                ma_fast: snapshot.and_then(|s| s.ma_fast),
                ma_slow: snapshot.and_then(|s| s.ma_slow),
                trend: snapshot.and_then(|s| s.trend_bullish),
            },
        );

        if !transitioned {
            return None;
        }

        let alert = Alert::new(
            AlertKind::SignalChange,
            symbol,
            format!("{symbol}: signal changed to {kind} at {price:.2}"),
            AlertPriority::Info,
            json!({ "signal": value, "price": price }),
        );
        self.dispatch(&alert);
        Some(alert)
    }

    /// An order was filled. Closing trades (SELL side) additionally feed the
    /// win/loss streak and the rolling win rate.
    pub fn log_trade_execution(&mut self, trade: &Trade) {
        let alert = Alert::new(
            AlertKind::TradeExecuted,
            &trade.symbol,
            format!(
                "{} {} {:.6} @ {:.2}",
                trade.side, trade.symbol, trade.amount, trade.price
            ),
            AlertPriority::Info,
            json!({
                "trade_id": trade.id,
                "side": trade.side.to_string(),
                "amount": trade.amount,
                "price": trade.price,
                "realized_pnl": trade.realized_pnl,
            }),
        );
        self.dispatch(&alert);
        if let Some(pnl) = trade.realized_pnl {
            self.record_outcome(&trade.symbol, pnl);
        }
    }

    /// A position was closed by its stop-loss level.
    pub fn log_stop_loss(&mut self, trade: &Trade) {
        let pnl = trade.realized_pnl.unwrap_or(0.0);
        let alert = Alert::new(
            AlertKind::StopLossHit,
            &trade.symbol,
            format!(
                "{}: stop-loss hit at {:.2} (P&L {:.2})",
                trade.symbol, trade.price, pnl
            ),
            AlertPriority::Warning,
            json!({ "trade_id": trade.id, "price": trade.price, "realized_pnl": pnl }),
        );
        self.dispatch(&alert);
        self.record_outcome(&trade.symbol, pnl);
    }

    /// A position was closed by its take-profit level.
    pub fn log_take_profit(&mut self, trade: &Trade) {
        let pnl = trade.realized_pnl.unwrap_or(0.0);
        let alert = Alert::new(
            AlertKind::TakeProfitHit,
            &trade.symbol,
            format!(
                "{}: take-profit hit at {:.2} (P&L {:.2})",
                trade.symbol, trade.price, pnl
            ),
            AlertPriority::Info,
            json!({ "trade_id": trade.id, "price": trade.price, "realized_pnl": pnl }),
        );
        self.dispatch(&alert);
        self.record_outcome(&trade.symbol, pnl);
    }

    /// Latest signal state per symbol, for the API layer.
    pub fn signal_states(&self) -> Vec<SignalState> {
        let mut states: Vec<SignalState> = self.states.values().cloned().collect();
        states.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        states
    }

    /// Most recent alerts, newest last.
    pub fn recent_alerts(&self) -> impl Iterator<Item = &Alert> {
        self.recent.iter()
    }

    pub fn streak(&self) -> i32 {
        self.streak
    }

    pub fn win_rate(&self) -> Option<f64> {
        if self.completed_trades == 0 {
            None
        } else {
            Some(self.winning_trades as f64 / self.completed_trades as f64)
        }
    }

    fn record_outcome(&mut self, symbol: &str, pnl: f64) {
        self.completed_trades += 1;
        if pnl >= 0.0 {
            self.winning_trades += 1;
            if self.streak < 0 {
                self.streak = 0;
            }
            self.streak += 1;
        } else {
            if self.streak > 0 {
                self.streak = 0;
            }
            self.streak -= 1;
        }

        if self.streak >= WIN_STREAK_ALERT {
            let alert = Alert::new(
                AlertKind::HighWinStreak,
                symbol,
                format!("{} consecutive winning trades", self.streak),
                AlertPriority::Info,
                json!({ "streak": self.streak }),
            );
            self.dispatch(&alert);
        }

        if self.completed_trades % WIN_RATE_CHECK_EVERY == 0 {
            let rate = self.winning_trades as f64 / self.completed_trades as f64;
            if rate < self.win_rate_threshold {
                let alert = Alert::new(
                    AlertKind::WinRateWarning,
                    symbol,
                    format!(
                        "win rate {:.0}% over {} trades is below {:.0}%",
                        rate * 100.0,
                        self.completed_trades,
                        self.win_rate_threshold * 100.0
                    ),
                    AlertPriority::Warning,
                    json!({ "win_rate": rate, "completed_trades": self.completed_trades }),
                );
                self.dispatch(&alert);
            }
        }
    }

    fn dispatch(&mut self, alert: &Alert) {
        if self.recent.len() == MAX_RECENT_ALERTS {
            self.recent.pop_front();
        }
        self.recent.push_back(alert.clone());

        for subscriber in &self.subscribers {
            if catch_unwind(AssertUnwindSafe(|| subscriber(alert))).is_err() {
                error!(kind = %alert.kind, symbol = %alert.symbol, "alert subscriber panicked");
            }
        }

        if let Some(tx) = &self.alert_tx {
            if let Err(e) = tx.try_send(alert.clone()) {
                warn!(error = %e, "alert persistence channel unavailable, dropping alert");
            }
        }
    }
}
