use async_trait::async_trait;

use crate::{OrderResult, OrderSide, Result, Ticker};

/// Abstraction over the exchange connection.
///
/// `BinanceClient` implements this for live trading.
/// `PaperClient` implements this for simulation.
///
/// The trading loop is the only caller of `place_order`; a failed result
/// aborts that order without touching portfolio state.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Get the latest price quote for a symbol.
    async fn ticker(&self, symbol: &str) -> Result<Ticker>;

    /// Submit an order. `price` of `None` means a market order.
    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: f64,
        price: Option<f64>,
    ) -> Result<OrderResult>;
}
