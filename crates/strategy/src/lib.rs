pub mod config;
pub mod indicators;
pub mod trend;

pub use config::{StrategyFileConfig, StrategyParams};
pub use trend::TrendStrategy;

use common::{Candle, Signal};

/// All strategy implementations must satisfy this trait.
///
/// One entry point, one result type: a value in [-1, 1] plus its
/// BUY/SELL/HOLD classification. Implementations may hold per-symbol
/// state (position FSM, cooldown), hence `&mut self`.
pub trait Strategy: Send + Sync {
    /// Human-readable name of this strategy instance.
    fn name(&self) -> &str;

    /// Candles required before a non-HOLD signal is possible.
    fn min_candles(&self) -> usize;

    /// Evaluate the candle sequence (oldest first, ending at "now") and
    /// produce one signal for the latest candle. With fewer than
    /// `min_candles` candles this returns HOLD — never an error.
    fn generate_signal(&mut self, candles: &[Candle]) -> Signal;
}
