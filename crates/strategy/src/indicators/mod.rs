//! Pure indicator functions over price/volume sequences (oldest first).
//! Every function returns `None` on insufficient data; callers treat
//! `None` as "filter fails", never as an error.

pub mod adx;
pub mod atr;
pub mod macd;
pub mod rsi;

pub use adx::adx;
pub use atr::atr;
pub use macd::{macd, MacdValue};
pub use rsi::rsi;

/// Simple moving average of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    Some(values[values.len() - period..].iter().sum::<f64>() / period as f64)
}

/// Recursive EMA over the whole series, returning one value per input.
/// `ema[0] = data[0]`, then `ema[i] = k*data[i] + (1-k)*ema[i-1]`.
pub fn ema_series(data: &[f64], period: usize) -> Vec<f64> {
    if data.is_empty() || period == 0 {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = data[0];
    out.push(prev);
    for &value in &data[1..] {
        prev = value * k + prev * (1.0 - k);
        out.push(prev);
    }
    out
}

/// EMA of the last value of the series.
pub fn ema(data: &[f64], period: usize) -> Option<f64> {
    if data.len() < period {
        return None;
    }
    ema_series(data, period).last().copied()
}

/// Mean of the last `window` values, excluding the final one — the
/// baseline a current volume is compared against for confirmation.
pub fn rolling_volume_mean(volumes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || volumes.len() < window + 1 {
        return None;
    }
    let end = volumes.len() - 1;
    Some(volumes[end - window..end].iter().sum::<f64>() / window as f64)
}
