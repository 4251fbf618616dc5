// =============================================================================
// Regime Detection Module
// =============================================================================
//
// Trend / Range / Transition classification from:
// - ADX (trend strength)
// - Bollinger Band Width percentile (volatility expansion/contraction)

pub mod detector;

pub use detector::{band_context, classify, BandContext, RegimeThresholds};
