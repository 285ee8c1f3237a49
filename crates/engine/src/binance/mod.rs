mod rest;
mod stream;

pub use rest::BinanceClient;
pub use stream::BinanceTickStream;
