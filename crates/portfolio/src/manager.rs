use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::{Position, Trade};

/// User-configurable risk parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Cap on a single symbol's share of portfolio value
    /// (production default lowered to 0.07 from an earlier 0.30).
    pub max_position_pct: f64,
    /// Stop distance as a fraction of the entry price.
    pub stop_loss_pct: f64,
    /// Target gain as a fraction of the entry price.
    pub take_profit_pct: f64,
    /// Fraction of the initial balance that must stay in cash.
    pub cash_reserve_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_pct: 0.07,
            stop_loss_pct: 0.15,
            take_profit_pct: 0.30,
            cash_reserve_pct: 0.10,
        }
    }
}

/// Bounds for the volatility-adjusted stop distance.
const STOP_PCT_MIN: f64 = 0.08;
const STOP_PCT_MAX: f64 = 0.20;

/// Owns cash and open positions; enforces sizing and stop/take-profit
/// discipline; computes P&L.
///
/// Single-writer: exactly one trading loop mutates this. External
/// observers read point-in-time snapshots only. Trade records are
/// appended by the loop with `record_trade`, paired one-to-one with
/// each open/close.
pub struct Portfolio {
    config: RiskConfig,
    initial_balance: f64,
    cash_balance: f64,
    positions: HashMap<String, Position>,
    trade_log: Vec<Trade>,
}

impl Portfolio {
    pub fn new(initial_balance: f64, config: RiskConfig) -> Self {
        Self {
            config,
            initial_balance,
            cash_balance: initial_balance,
            positions: HashMap::new(),
            trade_log: Vec::new(),
        }
    }

    pub fn cash_balance(&self) -> f64 {
        self.cash_balance
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    pub fn trade_log(&self) -> &[Trade] {
        &self.trade_log
    }

    /// Cash plus the mark-to-market value of every open position.
    pub fn total_value(&self) -> f64 {
        self.cash_balance
            + self
                .positions
                .values()
                .map(|p| p.amount * p.current_price)
                .sum::<f64>()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.positions.values().map(|p| p.unrealized_pnl()).sum()
    }

    /// True iff no position exists for `symbol` and the cash reserve
    /// floor is intact.
    pub fn can_open_position(&self, symbol: &str) -> bool {
        !self.positions.contains_key(symbol)
            && self.cash_balance > self.initial_balance * self.config.cash_reserve_pct
    }

    /// Quantity to buy at `price`:
    /// `min(cash × 0.95, total_value × max_position_pct) / price`.
    pub fn position_size(&self, price: f64) -> f64 {
        if price <= 0.0 {
            return 0.0;
        }
        let available = (self.cash_balance * 0.95)
            .min(self.total_value() * self.config.max_position_pct);
        if available <= 0.0 {
            return 0.0;
        }
        available / price
    }

    /// Open a long. Returns false (no mutation) when the guard fails or
    /// the cost exceeds cash. `volatility` adjusts the stop distance when
    /// supplied; the live path never supplies one today.
    pub fn open_position(
        &mut self,
        symbol: &str,
        amount: f64,
        price: f64,
        volatility: Option<f64>,
    ) -> bool {
        if !self.can_open_position(symbol) {
            warn!(symbol, "open_position rejected: guard failed");
            return false;
        }
        let cost = amount * price;
        if amount <= 0.0 || price <= 0.0 || cost > self.cash_balance {
            warn!(symbol, cost, cash = self.cash_balance, "open_position rejected: insufficient cash");
            return false;
        }

        let stop_pct = match volatility {
            Some(v) => (self.config.stop_loss_pct * (0.8 + v)).clamp(STOP_PCT_MIN, STOP_PCT_MAX),
            None => self.config.stop_loss_pct,
        };

        self.cash_balance -= cost;
        self.positions.insert(
            symbol.to_string(),
            Position {
                symbol: symbol.to_string(),
                amount,
                entry_price: price,
                entry_time: Utc::now(),
                stop_loss: price * (1.0 - stop_pct),
                take_profit: price * (1.0 + self.config.take_profit_pct),
                current_price: price,
            },
        );
        info!(symbol, amount, price, cash = self.cash_balance, "Position opened");
        true
    }

    /// Close the position for `symbol` at `price`. Returns the realized
    /// P&L, or None (no mutation) when no position exists.
    pub fn close_position(&mut self, symbol: &str, price: f64) -> Option<f64> {
        let position = self.positions.remove(symbol)?;
        let proceeds = position.amount * price;
        self.cash_balance += proceeds;
        let realized = proceeds - position.amount * position.entry_price;
        info!(
            symbol,
            price,
            realized_pnl = realized,
            cash = self.cash_balance,
            "Position closed"
        );
        Some(realized)
    }

    /// Mark every held position to the latest price. Symbols without a
    /// fresh price are left untouched.
    pub fn update_prices(&mut self, prices: &HashMap<String, f64>) {
        for (symbol, position) in self.positions.iter_mut() {
            if let Some(&price) = prices.get(symbol) {
                position.current_price = price;
            }
        }
    }

    /// Symbols whose latest price is at or below their stop level.
    /// Pure query — the caller decides whether to act.
    pub fn check_stop_losses(&self, prices: &HashMap<String, f64>) -> Vec<String> {
        self.positions
            .values()
            .filter(|p| prices.get(&p.symbol).is_some_and(|&price| price <= p.stop_loss))
            .map(|p| p.symbol.clone())
            .collect()
    }

    /// Symbols whose latest price is at or above their take-profit level.
    pub fn check_take_profits(&self, prices: &HashMap<String, f64>) -> Vec<String> {
        self.positions
            .values()
            .filter(|p| prices.get(&p.symbol).is_some_and(|&price| price >= p.take_profit))
            .map(|p| p.symbol.clone())
            .collect()
    }

    /// Append one trade record. Called by the loop, exactly once per
    /// executed open/close.
    pub fn record_trade(&mut self, trade: Trade) {
        self.trade_log.push(trade);
    }

    /// Point-in-time view for the API layer.
    pub fn snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot {
            cash_balance: self.cash_balance,
            total_value: self.total_value(),
            unrealized_pnl: self.unrealized_pnl(),
            positions: self.positions.values().cloned().collect(),
            trade_count: self.trade_log.len(),
        }
    }
}

/// Serializable snapshot published by the trading loop for read-only
/// observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash_balance: f64,
    pub total_value: f64,
    pub unrealized_pnl: f64,
    pub positions: Vec<Position>,
    pub trade_count: usize,
}

impl Default for PortfolioSnapshot {
    fn default() -> Self {
        Self {
            cash_balance: 0.0,
            total_value: 0.0,
            unrealized_pnl: 0.0,
            positions: Vec::new(),
            trade_count: 0,
        }
    }
}
