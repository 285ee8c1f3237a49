pub mod binance;
pub mod trader;

pub use binance::{BinanceClient, BinanceTickStream};
pub use trader::{EngineHandle, Trader};
