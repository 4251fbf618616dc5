use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::SymbolError;
use crate::market_data::CandleFrame;

/// What the scheduler asks a candle source for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleRequest {
    pub symbol: String,
    /// Broker interval name, e.g. `15minute` or `day`.
    pub interval: String,
    pub lookback_days: u32,
    /// End of the requested window.
    pub until: DateTime<FixedOffset>,
}

/// External provider of OHLCV history. May fail per symbol.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Return the validated, ascending series for `req.symbol`.
    ///
    /// Transport problems map to [`SymbolError::FetchFailure`]; malformed rows
    /// map to [`SymbolError::InvalidInput`].
    async fn fetch(&self, req: &CandleRequest) -> Result<CandleFrame, SymbolError>;

    /// Name used in logs.
    fn source_name(&self) -> &'static str;
}
