use serde::{Deserialize, Serialize};

/// Every tunable of the trend strategy. The old zoo of near-identical
/// strategy variants collapses into named presets over this one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    /// Fast/slow moving averages driving the entry crossover.
    pub fast_ma: usize,
    pub slow_ma: usize,

    /// RSI momentum oscillator.
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,

    /// MACD confirmation.
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,

    /// Higher-timeframe trend filter: bullish iff fast MA > slow MA.
    pub trend_fast_ma: usize,
    pub trend_slow_ma: usize,

    /// Volume confirmation: current volume must exceed
    /// `volume_multiplier × rolling mean` over `volume_window` candles.
    pub volume_window: usize,
    pub volume_multiplier: f64,

    /// Trend-strength filter.
    pub adx_period: usize,
    pub adx_threshold: f64,

    /// Minimum candles between successive entries, per symbol,
    /// measured from the last entry.
    pub cooldown_periods: usize,

    /// Strategy-level exit levels as fractions of the entry price.
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            fast_ma: 8,
            slow_ma: 21,
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            trend_fast_ma: 50,
            trend_slow_ma: 200,
            volume_window: 20,
            volume_multiplier: 1.2,
            adx_period: 14,
            adx_threshold: 25.0,
            cooldown_periods: 6,
            stop_loss_pct: 0.15,
            take_profit_pct: 0.30,
        }
    }
}

impl StrategyParams {
    /// Named parameter sets. Variant selection is data, not code.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "swing" => Some(Self::default()),
            "scalp" => Some(Self {
                fast_ma: 5,
                slow_ma: 13,
                trend_fast_ma: 20,
                trend_slow_ma: 50,
                volume_multiplier: 1.5,
                cooldown_periods: 3,
                stop_loss_pct: 0.05,
                take_profit_pct: 0.10,
                ..Self::default()
            }),
            "conservative" => Some(Self {
                fast_ma: 10,
                slow_ma: 30,
                rsi_overbought: 65.0,
                adx_threshold: 30.0,
                cooldown_periods: 12,
                stop_loss_pct: 0.10,
                take_profit_pct: 0.20,
                ..Self::default()
            }),
            _ => None,
        }
    }
}

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// name = "BTC swing"
/// preset = "swing"
///
/// [overrides]
/// cooldown_periods = 4
/// adx_threshold = 20.0
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    /// Human-readable name shown in logs, trades and the dashboard.
    pub name: String,
    /// Preset identifier: "swing", "scalp" or "conservative".
    pub preset: String,
    /// Field-level overrides applied on top of the preset.
    #[serde(default)]
    pub overrides: toml::value::Table,
}

impl StrategyFileConfig {
    /// Load from a TOML file. Exits the process on error — a broken
    /// strategy config is a fatal startup failure.
    pub fn load(path: &str) -> Self {
        let content = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read strategy config at '{path}': {e}"));
        toml::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse strategy config at '{path}': {e}"))
    }

    /// Resolve the preset plus overrides into concrete parameters.
    pub fn resolve(&self) -> StrategyParams {
        let base = StrategyParams::preset(&self.preset)
            .unwrap_or_else(|| panic!("Unknown strategy preset '{}'", self.preset));

        if self.overrides.is_empty() {
            return base;
        }

        // Serialize the preset, splice the override table in, deserialize.
        let mut table = match toml::Value::try_from(&base) {
            Ok(toml::Value::Table(t)) => t,
            _ => panic!("StrategyParams must serialize to a table"),
        };
        for (key, value) in &self.overrides {
            if !table.contains_key(key) {
                panic!("Unknown strategy parameter override '{key}'");
            }
            table.insert(key.clone(), value.clone());
        }
        toml::Value::Table(table)
            .try_into()
            .unwrap_or_else(|e| panic!("Invalid strategy parameter override: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_match_production_knobs() {
        let p = StrategyParams::default();
        assert_eq!(p.fast_ma, 8);
        assert_eq!(p.slow_ma, 21);
        assert_eq!(p.rsi_period, 14);
        assert_eq!(p.trend_slow_ma, 200);
    }

    #[test]
    fn presets_resolve_by_name() {
        assert!(StrategyParams::preset("swing").is_some());
        assert!(StrategyParams::preset("scalp").is_some());
        assert!(StrategyParams::preset("conservative").is_some());
        assert!(StrategyParams::preset("week2v2").is_none());
    }

    #[test]
    fn overrides_apply_on_top_of_preset() {
        let cfg: StrategyFileConfig = toml::from_str(
            r#"
            name = "test"
            preset = "swing"

            [overrides]
            cooldown_periods = 4
            adx_threshold = 20.0
            "#,
        )
        .unwrap();
        let params = cfg.resolve();
        assert_eq!(params.cooldown_periods, 4);
        assert_eq!(params.adx_threshold, 20.0);
        // untouched fields keep preset values
        assert_eq!(params.fast_ma, 8);
    }

    #[test]
    #[should_panic(expected = "Unknown strategy parameter override")]
    fn unknown_override_key_panics() {
        let cfg: StrategyFileConfig = toml::from_str(
            r#"
            name = "test"
            preset = "swing"

            [overrides]
            not_a_knob = 1
            "#,
        )
        .unwrap();
        let _ = cfg.resolve();
    }
}
