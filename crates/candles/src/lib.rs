pub mod aggregator;
pub mod store;

pub use aggregator::CandleAggregator;
pub use store::CandleStore;
