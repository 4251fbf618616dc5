use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::SymbolError;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV candle. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A candle row as delivered by a source, before validation. Any field may be
/// missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandle {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
}

// ---------------------------------------------------------------------------
// CandleFrame -- validated, ascending, deduplicated series
// ---------------------------------------------------------------------------

/// Validated OHLCV series for one symbol: ascending by timestamp with unique
/// timestamps and finite values in every column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleFrame {
    candles: Vec<Candle>,
}

impl CandleFrame {
    /// Build a frame from already-typed candles. Sorts ascending and keeps the
    /// last row seen for any duplicated timestamp.
    pub fn new(mut candles: Vec<Candle>) -> Self {
        // Stable sort keeps arrival order among equal timestamps, so the
        // reverse-dedup below retains the latest arrival.
        candles.sort_by_key(|c| c.timestamp);
        let mut deduped: Vec<Candle> = Vec::with_capacity(candles.len());
        for candle in candles {
            match deduped.last_mut() {
                Some(last) if last.timestamp == candle.timestamp => *last = candle,
                _ => deduped.push(candle),
            }
        }
        Self { candles: deduped }
    }

    /// Validate raw rows. Any row missing a column, or carrying an unparseable
    /// timestamp or a non-finite number, rejects the whole frame.
    pub fn from_raw(rows: Vec<RawCandle>) -> Result<Self, SymbolError> {
        let mut candles = Vec::with_capacity(rows.len());
        for (idx, row) in rows.into_iter().enumerate() {
            candles.push(validate_row(idx, row)?);
        }
        Ok(Self::new(candles))
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }
}

/// Parse a candle timestamp. Accepts RFC 3339 and the compact `+0530` offset
/// form used by the broker API.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%z"))
        .ok()
}

fn validate_row(idx: usize, row: RawCandle) -> Result<Candle, SymbolError> {
    let missing = |col: &str| SymbolError::InvalidInput(format!("row {idx}: missing column '{col}'"));

    let ts_raw = row.timestamp.as_deref().ok_or_else(|| missing("timestamp"))?;
    let timestamp = parse_timestamp(ts_raw).ok_or_else(|| {
        SymbolError::InvalidInput(format!("row {idx}: unparseable timestamp '{ts_raw}'"))
    })?;

    let open = row.open.ok_or_else(|| missing("open"))?;
    let high = row.high.ok_or_else(|| missing("high"))?;
    let low = row.low.ok_or_else(|| missing("low"))?;
    let close = row.close.ok_or_else(|| missing("close"))?;
    let volume = row.volume.ok_or_else(|| missing("volume"))?;

    for (name, value) in [
        ("open", open),
        ("high", high),
        ("low", low),
        ("close", close),
        ("volume", volume),
    ] {
        if !value.is_finite() {
            return Err(SymbolError::InvalidInput(format!(
                "row {idx}: non-finite value in column '{name}'"
            )));
        }
    }

    Ok(Candle {
        timestamp,
        open,
        high,
        low,
        close,
        volume,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
