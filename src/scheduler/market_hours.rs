// =============================================================================
// Clock and trading-hours gate
// =============================================================================

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};

use crate::config::MarketConfig;

/// Source of "now". Injected so runs can be replayed at any wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock, reported in the exchange's offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Trading days and session bounds in exchange-local time.
#[derive(Debug, Clone)]
pub struct TradingCalendar {
    offset: FixedOffset,
    days: Vec<Weekday>,
    open: NaiveTime,
    close: NaiveTime,
}

impl TradingCalendar {
    /// Convert any instant to exchange-local time.
    pub fn local(&self, at: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        at.with_timezone(&self.offset)
    }

    /// True on a trading day between open and close (both inclusive).
    pub fn is_open(&self, at: DateTime<FixedOffset>) -> bool {
        let local = self.local(at);
        let time = local.time();
        self.days.contains(&local.weekday()) && self.open <= time && time <= self.close
    }
}

impl From<&MarketConfig> for TradingCalendar {
    fn from(cfg: &MarketConfig) -> Self {
        Self {
            offset: cfg.offset(),
            days: cfg.trading_days.clone(),
            open: cfg.session_open,
            close: cfg.session_close,
        }
    }
}

/// Settable clock for tests.
#[cfg(test)]
#[derive(Debug)]
pub struct FixedClock(pub parking_lot::Mutex<DateTime<FixedOffset>>);

#[cfg(test)]
impl FixedClock {
    pub fn at(now: DateTime<FixedOffset>) -> Self {
        Self(parking_lot::Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.0.lock() = now;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.0.lock()
    }
}
