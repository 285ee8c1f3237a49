use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use common::{Candle, IndicatorSnapshot, Signal};

use crate::config::StrategyParams;
use crate::indicators::{adx, macd, rolling_volume_mean, rsi, sma};
use crate::Strategy;

/// The one parameterized trend-following strategy.
///
/// A finite-state machine over {Flat, Long} per symbol. Entry is the AND
/// of every confirmation filter; exit is the OR of any single exit
/// condition. Cooldown is keyed per symbol off the last entry candle,
/// not the last exit.
pub struct TrendStrategy {
    name: String,
    params: StrategyParams,
    /// Open long per symbol. Absence means Flat.
    open: HashMap<String, OpenLong>,
    /// Period-start of the last entry per symbol, for the cooldown.
    last_entry: HashMap<String, DateTime<Utc>>,
}

struct OpenLong {
    entry_price: f64,
}

impl TrendStrategy {
    pub fn new(name: impl Into<String>, params: StrategyParams) -> Self {
        Self {
            name: name.into(),
            params,
            open: HashMap::new(),
            last_entry: HashMap::new(),
        }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    fn cooldown_elapsed(&self, symbol: &str, latest: &Candle) -> bool {
        let Some(entry_start) = self.last_entry.get(symbol) else {
            return true;
        };
        let periods = (latest.period_start - *entry_start).num_seconds()
            / latest.timeframe.secs();
        periods >= self.params.cooldown_periods as i64
    }

    fn enter(&mut self, latest: &Candle, value: f64, snapshot: IndicatorSnapshot) -> Signal {
        self.open.insert(
            latest.symbol.clone(),
            OpenLong {
                entry_price: latest.close,
            },
        );
        self.last_entry
            .insert(latest.symbol.clone(), latest.period_start);
        debug!(
            strategy = %self.name,
            symbol = %latest.symbol,
            price = latest.close,
            value,
            "Entry signal"
        );
        Signal::new(value, Some(snapshot))
    }
}

impl Strategy for TrendStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_candles(&self) -> usize {
        let p = &self.params;
        [
            p.slow_ma + 1,
            p.rsi_period + 1,
            p.macd_slow + p.macd_signal,
            p.trend_slow_ma,
            p.volume_window + 1,
            2 * p.adx_period + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(1)
    }

    fn generate_signal(&mut self, candles: &[Candle]) -> Signal {
        let Some(latest) = candles.last() else {
            return Signal::hold();
        };
        if candles.len() < self.min_candles() {
            return Signal::hold();
        }

        let p = self.params.clone();
        let symbol = latest.symbol.clone();

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        let prev_closes = &closes[..closes.len() - 1];

        // Entry crossover: fast over slow on this candle, at-or-below on the prior one.
        let fast_now = sma(&closes, p.fast_ma);
        let slow_now = sma(&closes, p.slow_ma);
        let fast_prev = sma(prev_closes, p.fast_ma);
        let slow_prev = sma(prev_closes, p.slow_ma);
        let (crossed_up, crossed_down) = match (fast_now, slow_now, fast_prev, slow_prev) {
            (Some(fp), Some(sp), Some(fq), Some(sq)) => (fq <= sq && fp > sp, fq >= sq && fp < sp),
            _ => (false, false),
        };

        let rsi_now = rsi(&closes, p.rsi_period);
        let macd_now = macd(&closes, p.macd_fast, p.macd_slow, p.macd_signal);
        let adx_now = adx(&highs, &lows, &closes, p.adx_period);

        let trend_bullish = match (sma(&closes, p.trend_fast_ma), sma(&closes, p.trend_slow_ma)) {
            (Some(fast), Some(slow)) => fast > slow,
            _ => false,
        };
        let volume_ok = rolling_volume_mean(&volumes, p.volume_window)
            .map(|mean| latest.volume > p.volume_multiplier * mean)
            .unwrap_or(false);
        let macd_bullish = macd_now.map(|m| m.is_bullish()).unwrap_or(false);
        // NaN-free by construction: a degenerate ADX is None, i.e. not trending.
        let adx_ok = adx_now.map(|a| a > p.adx_threshold).unwrap_or(false);

        let snapshot = IndicatorSnapshot {
            rsi: rsi_now,
            ma_fast: fast_now,
            ma_slow: slow_now,
            macd: macd_now.map(|m| m.macd),
            macd_signal: macd_now.map(|m| m.signal),
            adx: adx_now,
            trend_bullish: Some(trend_bullish),
        };

        // LONG: any single exit condition closes the position.
        if let Some(open) = self.open.get(&symbol) {
            let stop_level = open.entry_price * (1.0 - p.stop_loss_pct);
            let take_level = open.entry_price * (1.0 + p.take_profit_pct);
            let rsi_exit = rsi_now.map(|r| r >= p.rsi_overbought).unwrap_or(false);

            if crossed_down
                || rsi_exit
                || latest.close <= stop_level
                || latest.close >= take_level
            {
                self.open.remove(&symbol);
                debug!(strategy = %self.name, symbol = %symbol, price = latest.close, "Exit signal");
                return Signal::new(-1.0, Some(snapshot));
            }
            return Signal::new(0.0, Some(snapshot));
        }

        // FLAT: entry needs every filter at once.
        let rsi_below_overbought = rsi_now.map(|r| r < p.rsi_overbought).unwrap_or(false);
        let filters_pass = rsi_below_overbought
            && trend_bullish
            && self.cooldown_elapsed(&symbol, latest)
            && volume_ok
            && macd_bullish
            && adx_ok;

        if filters_pass && crossed_up {
            return self.enter(latest, 1.0, snapshot);
        }

        // Secondary path: deep oversold inside a bullish trend, no
        // crossover required, every other filter still mandatory.
        let oversold = rsi_now.map(|r| r < p.rsi_oversold).unwrap_or(false);
        if filters_pass && oversold {
            return self.enter(latest, 0.5, snapshot);
        }

        Signal::new(0.0, Some(snapshot))
    }
}
