use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{Error, ExchangeClient, OrderResult, OrderSide, Result, Ticker};

/// Simulated exchange client for paper trading.
///
/// Fills are simulated at the latest known price with configurable slippage.
/// No real orders are ever sent to an exchange. Price discovery either
/// delegates to an upstream client (live prices, simulated fills) or runs a
/// deterministic in-memory walk for fully offline use.
pub struct PaperClient {
    /// Real client used for quotes only. Never receives orders.
    upstream: Option<Arc<dyn ExchangeClient>>,
    /// Latest known price per symbol.
    prices: Arc<RwLock<HashMap<String, Walk>>>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
}

#[derive(Debug, Clone, Copy)]
struct Walk {
    price: f64,
    step: u64,
}

/// Starting price for symbols the offline walk has never seen.
const WALK_SEED_PRICE: f64 = 100.0;

impl PaperClient {
    /// Fully offline client: quotes come from a deterministic random walk.
    pub fn new(slippage_bps: f64) -> Self {
        info!(slippage_bps, "paper client initialized (offline walk)");
        Self {
            upstream: None,
            prices: Arc::new(RwLock::new(HashMap::new())),
            slippage_bps,
        }
    }

    /// Quotes delegate to `upstream`; fills stay simulated.
    pub fn with_upstream(upstream: Arc<dyn ExchangeClient>, slippage_bps: f64) -> Self {
        info!(slippage_bps, "paper client initialized (upstream quotes)");
        Self {
            upstream: Some(upstream),
            prices: Arc::new(RwLock::new(HashMap::new())),
            slippage_bps,
        }
    }

    /// Update the latest price for a symbol, e.g. from a tick stream.
    pub async fn update_price(&self, symbol: &str, price: f64) {
        let mut prices = self.prices.write().await;
        let walk = prices.entry(symbol.to_string()).or_insert(Walk {
            price,
            step: 0,
        });
        walk.price = price;
    }

    async fn last_price(&self, symbol: &str) -> Option<f64> {
        self.prices.read().await.get(symbol).map(|w| w.price)
    }

    /// Advance the offline walk one step. Bounded pseudo-random drift so two
    /// runs over the same call sequence quote identical prices.
    async fn walk_price(&self, symbol: &str) -> f64 {
        let mut prices = self.prices.write().await;
        let walk = prices.entry(symbol.to_string()).or_insert(Walk {
            price: WALK_SEED_PRICE,
            step: 0,
        });
        walk.step += 1;
        let noise = (walk.step.wrapping_mul(2_654_435_761) % 2001) as f64;
        let drift = (noise / 1000.0 - 1.0) * 0.002;
        walk.price *= 1.0 + drift;
        walk.price
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    async fn ticker(&self, symbol: &str) -> Result<Ticker> {
        let price = match &self.upstream {
            Some(upstream) => {
                let ticker = upstream.ticker(symbol).await?;
                self.update_price(symbol, ticker.price).await;
                ticker.price
            }
            None => self.walk_price(symbol).await,
        };
        Ok(Ticker {
            symbol: symbol.to_string(),
            price,
            timestamp: Utc::now(),
        })
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: f64,
        price: Option<f64>,
    ) -> Result<OrderResult> {
        let mark = match price {
            Some(p) => p,
            None => self.last_price(symbol).await.ok_or_else(|| {
                Error::Exchange(format!(
                    "no price seen for {symbol} yet, cannot simulate a fill"
                ))
            })?,
        };

        // Buys pay more, sells receive less.
        let fill_price = match side {
            OrderSide::Buy => mark * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => mark * (1.0 - self.slippage_bps / 10_000.0),
        };

        debug!(
            symbol,
            side = %side,
            mark,
            fill = fill_price,
            amount,
            "paper fill simulated"
        );

        Ok(OrderResult {
            order_id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            amount,
            fill_price,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buy_fill_applies_positive_slippage() {
        let client = PaperClient::new(10.0); // 10 bps
        client.update_price("BTCUSDT", 1000.0).await;

        let fill = client
            .place_order("BTCUSDT", OrderSide::Buy, 0.01, None)
            .await
            .unwrap();

        let expected = 1000.0 * (1.0 + 10.0 / 10_000.0);
        assert!(
            (fill.fill_price - expected).abs() < 1e-9,
            "buy fill price {}, expected {expected}",
            fill.fill_price
        );
    }

    #[tokio::test]
    async fn sell_fill_applies_negative_slippage() {
        let client = PaperClient::new(10.0);
        client.update_price("BTCUSDT", 1000.0).await;

        let fill = client
            .place_order("BTCUSDT", OrderSide::Sell, 0.01, None)
            .await
            .unwrap();

        let expected = 1000.0 * (1.0 - 10.0 / 10_000.0);
        assert!((fill.fill_price - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn explicit_price_overrides_cached_mark() {
        let client = PaperClient::new(0.0);
        client.update_price("BTCUSDT", 1000.0).await;

        let fill = client
            .place_order("BTCUSDT", OrderSide::Buy, 1.0, Some(950.0))
            .await
            .unwrap();
        assert_eq!(fill.fill_price, 950.0);
    }

    #[tokio::test]
    async fn order_without_any_price_is_rejected() {
        let client = PaperClient::new(10.0);
        let result = client
            .place_order("BTCUSDT", OrderSide::Buy, 1.0, None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn offline_walk_is_deterministic() {
        let a = PaperClient::new(0.0);
        let b = PaperClient::new(0.0);

        for _ in 0..20 {
            let pa = a.ticker("BTCUSDT").await.unwrap().price;
            let pb = b.ticker("BTCUSDT").await.unwrap().price;
            assert_eq!(pa, pb);
            assert!(pa > 0.0);
        }
    }

    #[tokio::test]
    async fn ticker_feeds_order_marks() {
        let client = PaperClient::new(0.0);
        let quote = client.ticker("ETHUSDT").await.unwrap();
        let fill = client
            .place_order("ETHUSDT", OrderSide::Buy, 1.0, None)
            .await
            .unwrap();
        assert_eq!(fill.fill_price, quote.price);
    }
}
