use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use common::{Candle, PriceUpdate, Timeframe};

/// Folds a stream of tick-level price updates into fixed-interval OHLCV
/// candles per symbol.
///
/// Ticks must arrive in non-decreasing timestamp order per symbol. A tick
/// for an already-closed period is logged and ignored, never fatal.
/// Closed candles go into a bounded per-symbol ring (oldest evicted first);
/// persistence is the caller's job, via the candle returned by
/// [`CandleAggregator::process_tick`].
pub struct CandleAggregator {
    timeframe: Timeframe,
    max_history: usize,
    open: HashMap<String, Candle>,
    history: HashMap<String, VecDeque<Candle>>,
}

impl CandleAggregator {
    pub const DEFAULT_MAX_HISTORY: usize = 500;

    pub fn new(timeframe: Timeframe) -> Self {
        Self::with_max_history(timeframe, Self::DEFAULT_MAX_HISTORY)
    }

    pub fn with_max_history(timeframe: Timeframe, max_history: usize) -> Self {
        Self {
            timeframe,
            max_history,
            open: HashMap::new(),
            history: HashMap::new(),
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Process one tick. Returns the candle closed by this tick, if any,
    /// so the caller can persist it best-effort.
    pub fn process_tick(&mut self, update: &PriceUpdate) -> Option<Candle> {
        use std::cmp::Ordering;

        let period_start = self.timeframe.bucket_start(update.timestamp);
        let open_period = self.open.get(&update.symbol).map(|c| c.period_start);

        match open_period.map(|p| p.cmp(&period_start)) {
            Some(Ordering::Equal) => {
                self.open
                    .get_mut(&update.symbol)
                    .expect("open candle present")
                    .apply_tick(update);
                None
            }
            Some(Ordering::Less) => {
                // New period: close the old candle, open a fresh one.
                let closed = self
                    .open
                    .remove(&update.symbol)
                    .expect("open candle present");
                self.push_closed(closed.clone());
                self.open
                    .insert(update.symbol.clone(), Candle::from_tick(update, self.timeframe));
                debug!(
                    symbol = %closed.symbol,
                    period_start = %closed.period_start,
                    close = closed.close,
                    "Candle closed"
                );
                Some(closed)
            }
            Some(Ordering::Greater) => {
                // Tick belongs to an already-closed period: caller error.
                warn!(
                    symbol = %update.symbol,
                    tick_ts = %update.timestamp,
                    open_period = ?open_period,
                    "Out-of-order tick for closed period ignored"
                );
                None
            }
            None => {
                self.open
                    .insert(update.symbol.clone(), Candle::from_tick(update, self.timeframe));
                None
            }
        }
    }

    /// Closed candles for a symbol, most-recent-last. Empty for unknown
    /// symbols. `limit` takes the most recent N.
    pub fn history(&self, symbol: &str, limit: Option<usize>) -> Vec<Candle> {
        let Some(ring) = self.history.get(symbol) else {
            return Vec::new();
        };
        let take = limit.unwrap_or(ring.len()).min(ring.len());
        ring.iter().skip(ring.len() - take).cloned().collect()
    }

    /// The still-open candle for a symbol, if any.
    pub fn current(&self, symbol: &str) -> Option<&Candle> {
        self.open.get(symbol)
    }

    /// Seed closed-candle history from persisted candles (oldest first).
    /// Used at startup so the strategy has enough lookback before live
    /// ticks arrive.
    pub fn bootstrap(&mut self, symbol: &str, candles: Vec<Candle>) {
        for candle in candles {
            if candle.timeframe != self.timeframe {
                warn!(
                    symbol,
                    got = %candle.timeframe,
                    want = %self.timeframe,
                    "Skipping bootstrap candle with mismatched timeframe"
                );
                continue;
            }
            self.push_closed(candle);
        }
    }

    fn push_closed(&mut self, candle: Candle) {
        let ring = self.history.entry(candle.symbol.clone()).or_default();
        ring.push_back(candle);
        while ring.len() > self.max_history {
            ring.pop_front();
        }
    }
}
