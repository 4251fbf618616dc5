// =============================================================================
// Shared types used across the TMV ranking engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Directional bias derived from the EMA stack and DI dominance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl Default for TrendDirection {
    fn default() -> Self {
        Self::Neutral
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "Bullish"),
            Self::Bearish => write!(f, "Bearish"),
            Self::Neutral => write!(f, "Neutral"),
        }
    }
}

/// Price behaviour classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    Trend,
    Range,
    Transition,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trend => write!(f, "Trend"),
            Self::Range => write!(f, "Range"),
            Self::Transition => write!(f, "Transition"),
        }
    }
}

/// Recency tag attached to every published row.
///
/// Ordered by severity: `Ok < Stale < Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DataQuality {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "STALE")]
    Stale,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl std::fmt::Display for DataQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Stale => write!(f, "STALE"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// How the scheduler is driven from `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// A single invocation, cron style.
    Once,
    /// Periodic runs plus the display API.
    Loop,
}

impl Default for RunMode {
    fn default() -> Self {
        Self::Loop
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "once" => Ok(Self::Once),
            "loop" => Ok(Self::Loop),
            other => Err(format!("unknown run mode '{other}' (expected once|loop)")),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Once => write!(f, "once"),
            Self::Loop => write!(f, "loop"),
        }
    }
}

/// Round to two decimal places, the precision used for every published number.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
