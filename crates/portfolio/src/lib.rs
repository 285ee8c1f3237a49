pub mod manager;
pub mod store;

pub use manager::{Portfolio, PortfolioSnapshot, RiskConfig};
pub use store::{TradeFilter, TradeStore};
