//! Strategy — edge calculation and Kelly stake sizing.

pub mod edge;
pub mod kelly;

pub use edge::{analyze, EdgeAnalysis, EdgeCalculator};
pub use kelly::{KellyCalculator, KellyConfig, SizedBet};
