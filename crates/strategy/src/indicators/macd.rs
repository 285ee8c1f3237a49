use super::ema_series;

/// MACD line and signal line at the latest bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
}

impl MacdValue {
    /// Momentum confirmation used by entry filters.
    pub fn is_bullish(&self) -> bool {
        self.macd > self.signal
    }
}

/// MACD: `EMA(fast) − EMA(slow)` with an EMA of that line as the signal.
/// Needs at least `slow + signal` close prices (oldest first).
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<MacdValue> {
    if fast >= slow || closes.len() < slow + signal {
        return None;
    }

    let ema_fast = ema_series(closes, fast);
    let ema_slow = ema_series(closes, slow);
    let macd_line: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();

    let signal_line = ema_series(&macd_line, signal);

    Some(MacdValue {
        macd: *macd_line.last()?,
        signal: *signal_line.last()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macd_returns_none_with_insufficient_data() {
        let prices = vec![100.0; 30]; // need >= 35 for 12/26/9
        assert!(macd(&prices, 12, 26, 9).is_none());
    }

    #[test]
    fn macd_rejects_fast_not_below_slow() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        assert!(macd(&prices, 26, 12, 9).is_none());
    }

    #[test]
    fn macd_bullish_after_sharp_reversal_up() {
        // Down then sharply up: MACD line rises through its signal line.
        let mut prices: Vec<f64> = (0..20).map(|i| 100.0 - i as f64 * 0.5).collect();
        prices.extend((0..20).map(|i| 90.0 + i as f64 * 2.0));
        let value = macd(&prices, 3, 6, 3).unwrap();
        assert!(value.is_bullish(), "expected bullish MACD, got {value:?}");
    }

    #[test]
    fn macd_bearish_after_sharp_reversal_down() {
        let mut prices: Vec<f64> = (0..20).map(|i| 100.0 + i as f64 * 0.5).collect();
        prices.extend((0..20).map(|i| 110.0 - i as f64 * 2.0));
        let value = macd(&prices, 3, 6, 3).unwrap();
        assert!(!value.is_bullish(), "expected bearish MACD, got {value:?}");
    }

    #[test]
    fn macd_near_zero_on_flat_series() {
        let prices = vec![100.0; 50];
        let value = macd(&prices, 12, 26, 9).unwrap();
        assert!(value.macd.abs() < 1e-9);
        assert!(value.signal.abs() < 1e-9);
    }
}
