pub mod candle;
pub mod kite;
pub mod source;

#[cfg(test)]
pub mod fixtures;

// Re-export the frame types for convenient access (e.g. `use crate::market_data::Candle`).
pub use candle::{Candle, CandleFrame, RawCandle};
pub use kite::KiteCandleSource;
pub use source::{CandleRequest, CandleSource};
