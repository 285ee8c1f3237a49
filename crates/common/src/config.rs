use crate::{Timeframe, TradingMode};

/// All configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    // Exchange credentials (required in live mode only)
    pub binance_api_key: String,
    pub binance_secret: String,

    // Dashboard
    pub dashboard_token: String,
    pub dashboard_port: u16,

    // Trading
    pub trading_mode: TradingMode,
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    pub update_interval_secs: u64,
    pub initial_balance_usd: f64,
    pub paper_slippage_bps: f64,
    pub win_rate_threshold: f64,

    // Database
    pub database_url: String,

    // Strategy config file path
    pub strategy_config_path: String,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let trading_mode = match required_env("TRADING_MODE").to_lowercase().as_str() {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => panic!("ERROR: TRADING_MODE must be 'paper' or 'live', got: '{other}'"),
        };

        // Exchange credentials are only exercised in live mode.
        let (binance_api_key, binance_secret) = match trading_mode {
            TradingMode::Live => (required_env("BINANCE_API_KEY"), required_env("BINANCE_SECRET")),
            TradingMode::Paper => (
                optional_env("BINANCE_API_KEY").unwrap_or_default(),
                optional_env("BINANCE_SECRET").unwrap_or_default(),
            ),
        };

        let symbols: Vec<String> = required_env("SYMBOLS")
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            panic!("SYMBOLS must contain at least one trading symbol, e.g. 'BTCUSDT,ETHUSDT'");
        }

        let timeframe_raw = optional_env("TIMEFRAME").unwrap_or_else(|| "1m".to_string());
        let timeframe = Timeframe::parse(&timeframe_raw)
            .unwrap_or_else(|| panic!("TIMEFRAME '{timeframe_raw}' is not one of 1m/5m/15m/1h/4h/1d"));

        Config {
            binance_api_key,
            binance_secret,
            dashboard_token: required_env("DASHBOARD_TOKEN"),
            dashboard_port: optional_env("DASHBOARD_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            trading_mode,
            symbols,
            timeframe,
            update_interval_secs: optional_env("UPDATE_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            initial_balance_usd: optional_env("INITIAL_BALANCE_USD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000.0),
            paper_slippage_bps: optional_env("PAPER_SLIPPAGE_BPS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10.0),
            win_rate_threshold: optional_env("WIN_RATE_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.60),
            database_url: required_env("DATABASE_URL"),
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string()),
        }
    }
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
