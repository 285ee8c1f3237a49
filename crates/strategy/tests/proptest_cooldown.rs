use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use common::{Candle, Timeframe};
use strategy::{Strategy, StrategyParams, TrendStrategy};

const T0: i64 = 1_700_000_400; // 5m-aligned

fn candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            symbol: "BTCUSDT".into(),
            period_start: Utc
                .timestamp_opt(T0 + 300 * i as i64, 0)
                .single()
                .unwrap(),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1.0,
            timeframe: Timeframe::M5,
        })
        .collect()
}

/// Every filter wide open so the cooldown is the only entry brake left.
fn permissive_params(cooldown_periods: usize) -> StrategyParams {
    StrategyParams {
        fast_ma: 2,
        slow_ma: 4,
        rsi_period: 3,
        rsi_overbought: 100.5,
        rsi_oversold: 30.0,
        macd_fast: 2,
        macd_slow: 3,
        macd_signal: 2,
        trend_fast_ma: 2,
        trend_slow_ma: 4,
        volume_window: 3,
        volume_multiplier: 0.0,
        adx_period: 2,
        adx_threshold: 0.0,
        cooldown_periods,
        stop_loss_pct: 0.15,
        take_profit_pct: 10.0,
    }
}

proptest! {
    /// For any close series, no two entry signals land within the
    /// cooldown window: consecutive BUY candles sit at least
    /// `cooldown_periods` candles apart.
    #[test]
    fn entries_never_land_inside_the_cooldown_window(
        closes in proptest::collection::vec(50.0f64..150.0, 10..60),
        cooldown in 1usize..10,
    ) {
        let mut strategy = TrendStrategy::new("prop", permissive_params(cooldown));
        let series = candles(&closes);

        let mut buy_indices = Vec::new();
        for i in 0..series.len() {
            let signal = strategy.generate_signal(&series[..=i]);
            if signal.value > 0.0 {
                buy_indices.push(i);
            }
        }

        for pair in buy_indices.windows(2) {
            prop_assert!(
                pair[1] - pair[0] >= cooldown,
                "entries at candles {} and {} violate a {}-candle cooldown",
                pair[0], pair[1], cooldown
            );
        }
    }
}
