use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tracing::{info, warn};
use url::Url;

use common::{PriceUpdate, Result};

/// Binance trade WebSocket stream for a single symbol.
///
/// Connects to the `@trade` stream, parses events into [`PriceUpdate`]s and
/// pushes them over an mpsc channel consumed inside the trading loop task,
/// so candle aggregation keeps a single writer. Reconnects automatically
/// with exponential backoff.
pub struct BinanceTickStream {
    symbol: String,
    tick_tx: mpsc::Sender<PriceUpdate>,
}

impl BinanceTickStream {
    pub fn new(symbol: impl Into<String>, tick_tx: mpsc::Sender<PriceUpdate>) -> Self {
        Self {
            symbol: symbol.into(),
            tick_tx,
        }
    }

    /// Run the stream loop forever, reconnecting on failure.
    /// Call this inside a `tokio::spawn`.
    pub async fn run(self) {
        let mut backoff = Duration::from_secs(1);
        const MAX_BACKOFF: Duration = Duration::from_secs(60);

        loop {
            info!(symbol = %self.symbol, "connecting to Binance trade stream");
            match self.connect_once().await {
                Ok(()) => {
                    info!(symbol = %self.symbol, "trade stream closed cleanly");
                    // Clean close (e.g. 24h session end) — reconnect shortly.
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    backoff = Duration::from_secs(1);
                }
                Err(e) => {
                    warn!(symbol = %self.symbol, error = %e, backoff = ?backoff, "trade stream error, reconnecting");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn connect_once(&self) -> Result<()> {
        let url_str = format!(
            "wss://stream.binance.com:9443/ws/{}@trade",
            self.symbol.to_lowercase()
        );
        let url = Url::parse(&url_str).map_err(|e| common::Error::WebSocket(e.to_string()))?;

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| common::Error::WebSocket(e.to_string()))?;

        let (_, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            let msg = msg.map_err(|e| common::Error::WebSocket(e.to_string()))?;

            if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                match parse_trade_event(&self.symbol, &text) {
                    Ok(Some(update)) => {
                        if self.tick_tx.send(update).await.is_err() {
                            // Consumer gone — stop this stream.
                            return Ok(());
                        }
                    }
                    Ok(None) => {} // non-trade message, skip
                    Err(e) => {
                        warn!(error = %e, "failed to parse trade event");
                    }
                }
            }
        }

        Ok(())
    }
}

// ─── Binance trade JSON parsing ──────────────────────────────────────────────

#[derive(Deserialize)]
struct TradeEvent {
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "T")]
    trade_time_ms: i64,
}

fn parse_trade_event(symbol: &str, text: &str) -> Result<Option<PriceUpdate>> {
    // Trade messages carry an "e" field set to "trade".
    let value: serde_json::Value = serde_json::from_str(text)?;
    if value.get("e").and_then(|v| v.as_str()) != Some("trade") {
        return Ok(None);
    }

    let event: TradeEvent = serde_json::from_value(value)?;

    let price = event
        .price
        .parse::<f64>()
        .map_err(|e| common::Error::WebSocket(format!("bad trade price: {e}")))?;
    let volume = event.quantity.parse::<f64>().ok();

    let timestamp: DateTime<Utc> = Utc
        .timestamp_millis_opt(event.trade_time_ms)
        .single()
        .unwrap_or_else(Utc::now);

    Ok(Some(PriceUpdate {
        symbol: symbol.to_string(),
        price,
        timestamp,
        volume,
        change_24h: None,
    }))
}
