use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Candle bucket width. Buckets are aligned to multiples of the
/// timeframe duration from the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn secs(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::H1 => 3_600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }

    /// Floor-align a timestamp to the start of its bucket.
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self.secs();
        let aligned = ts.timestamp().div_euclid(secs) * secs;
        Utc.timestamp_opt(aligned, 0).single().unwrap_or(ts)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Timeframe::M1),
            "5m" => Some(Timeframe::M5),
            "15m" => Some(Timeframe::M15),
            "1h" => Some(Timeframe::H1),
            "4h" => Some(Timeframe::H4),
            "1d" => Some(Timeframe::D1),
            _ => None,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        };
        write!(f, "{s}")
    }
}

/// One OHLCV candle. `period_start` is the open time of the bucket,
/// aligned per `Timeframe::bucket_start`. Invariant: `low <= open,close <= high`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub period_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timeframe: Timeframe,
}

impl Candle {
    /// Start a new candle from the first tick of its period.
    pub fn from_tick(update: &PriceUpdate, timeframe: Timeframe) -> Self {
        Self {
            symbol: update.symbol.clone(),
            period_start: timeframe.bucket_start(update.timestamp),
            open: update.price,
            high: update.price,
            low: update.price,
            close: update.price,
            volume: update.volume.unwrap_or(0.0),
            timeframe,
        }
    }

    /// Fold a subsequent tick of the same period into the open candle.
    pub fn apply_tick(&mut self, update: &PriceUpdate) {
        self.high = self.high.max(update.price);
        self.low = self.low.min(update.price);
        self.close = update.price;
        self.volume += update.volume.unwrap_or(0.0);
    }
}

/// Tick-level price update from the exchange feed. Consumed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub volume: Option<f64>,
    pub change_24h: Option<f64>,
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum ExitReason {
    Signal,
    StopLoss,
    TakeProfit,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Signal => write!(f, "signal"),
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TakeProfit => write!(f, "take_profit"),
        }
    }
}

/// Immutable record of one executed order. Appended to the portfolio
/// trade log and the trade store; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub amount: f64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub strategy_name: String,
    pub status: String,
    pub exit_reason: Option<ExitReason>,
    /// Set on closing trades only.
    pub realized_pnl: Option<f64>,
}

impl Trade {
    pub fn filled(
        symbol: impl Into<String>,
        side: OrderSide,
        amount: f64,
        price: f64,
        strategy_name: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            amount,
            price,
            timestamp: Utc::now(),
            strategy_name: strategy_name.into(),
            status: "filled".to_string(),
            exit_reason: None,
            realized_pnl: None,
        }
    }
}

/// An open long position. At most one per symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub amount: f64,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub current_price: f64,
}

impl Position {
    pub fn unrealized_pnl(&self) -> f64 {
        self.amount * (self.current_price - self.entry_price)
    }
}

/// Sign classification of a signal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Buy,
    Sell,
    Hold,
}

impl SignalKind {
    /// Classify a numeric signal by sign.
    pub fn from_value(value: f64) -> Self {
        if value > 0.0 {
            SignalKind::Buy
        } else if value < 0.0 {
            SignalKind::Sell
        } else {
            SignalKind::Hold
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Buy => write!(f, "BUY"),
            SignalKind::Sell => write!(f, "SELL"),
            SignalKind::Hold => write!(f, "HOLD"),
        }
    }
}

/// Indicator values captured alongside a signal, for the monitor and API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: Option<f64>,
    pub ma_fast: Option<f64>,
    pub ma_slow: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub adx: Option<f64>,
    pub trend_bullish: Option<bool>,
}

/// The single result type every strategy returns: a value in [-1, 1],
/// its classification, and an optional indicator snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub value: f64,
    pub kind: SignalKind,
    pub snapshot: Option<IndicatorSnapshot>,
}

impl Signal {
    pub fn new(value: f64, snapshot: Option<IndicatorSnapshot>) -> Self {
        Self {
            value,
            kind: SignalKind::from_value(value),
            snapshot,
        }
    }

    /// The benign "nothing to do / not enough data" result.
    pub fn hold() -> Self {
        Self::new(0.0, None)
    }
}

/// Latest known signal for one symbol, owned by the Signal Monitor.
/// `last_change` moves only when `signal_type` actually transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalState {
    pub symbol: String,
    pub current_signal: f64,
    pub signal_type: SignalKind,
    pub last_change: DateTime<Utc>,
    pub price: f64,
    pub rsi: Option<f64>,
    pub ma_fast: Option<f64>,
    pub ma_slow: Option<f64>,
    pub trend: Option<bool>,
}

/// Alert category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum AlertKind {
    SignalChange,
    TradeExecuted,
    StopLossHit,
    TakeProfitHit,
    WinRateWarning,
    HighWinStreak,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertKind::SignalChange => "signal_change",
            AlertKind::TradeExecuted => "trade_executed",
            AlertKind::StopLossHit => "stop_loss_hit",
            AlertKind::TakeProfitHit => "take_profit_hit",
            AlertKind::WinRateWarning => "win_rate_warning",
            AlertKind::HighWinStreak => "high_win_streak",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum AlertPriority {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertPriority::Info => write!(f, "info"),
            AlertPriority::Warning => write!(f, "warning"),
            AlertPriority::Critical => write!(f, "critical"),
        }
    }
}

/// Immutable, append-only alert record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub kind: AlertKind,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub priority: AlertPriority,
    pub data: serde_json::Value,
}

impl Alert {
    pub fn new(
        kind: AlertKind,
        symbol: impl Into<String>,
        message: impl Into<String>,
        priority: AlertPriority,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            symbol: symbol.into(),
            timestamp: Utc::now(),
            message: message.into(),
            priority,
            data,
        }
    }
}

/// Latest price quote from the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Exchange acknowledgement of a placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub amount: f64,
    pub fill_price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Whether the bot trades against the real exchange or simulates fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Current state of the trading loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
        }
    }
}

/// Commands sent to the trading loop via its command channel.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    Start,
    Stop,
}
