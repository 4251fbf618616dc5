// =============================================================================
// Freshness Classifier
// =============================================================================
//
// DataQuality is derived from timestamps alone:
//
//   age <= ok ceiling     => OK
//   age <= stale ceiling  => STALE
//   otherwise / no time   => UNKNOWN
//
// Negative ages (source clock ahead of ours) count as zero.
// =============================================================================

use chrono::{DateTime, Duration, FixedOffset};

use crate::config::FreshnessConfig;
use crate::types::DataQuality;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    ok_ceiling: Duration,
    stale_ceiling: Duration,
}

impl FreshnessPolicy {
    /// A stale ceiling below the ok ceiling is raised to match it.
    pub fn new(ok_ceiling: Duration, stale_ceiling: Duration) -> Self {
        Self {
            ok_ceiling,
            stale_ceiling: stale_ceiling.max(ok_ceiling),
        }
    }

    pub fn ok_ceiling(&self) -> Duration {
        self.ok_ceiling
    }

    pub fn stale_ceiling(&self) -> Duration {
        self.stale_ceiling
    }

    /// Tag a timestamp relative to `now`.
    pub fn classify(&self, timestamp: Option<DateTime<FixedOffset>>, now: DateTime<FixedOffset>) -> DataQuality {
        match timestamp {
            Some(ts) => self.classify_age(age(ts, now)),
            None => DataQuality::Unknown,
        }
    }

    pub fn classify_age(&self, age: Duration) -> DataQuality {
        if age <= self.ok_ceiling {
            DataQuality::Ok
        } else if age <= self.stale_ceiling {
            DataQuality::Stale
        } else {
            DataQuality::Unknown
        }
    }
}

impl From<&FreshnessConfig> for FreshnessPolicy {
    fn from(cfg: &FreshnessConfig) -> Self {
        Self::new(
            Duration::minutes(cfg.ok_minutes.max(0)),
            Duration::minutes(cfg.stale_minutes.max(0)),
        )
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::from(&FreshnessConfig::default())
    }
}

/// `now - ts`, floored at zero.
pub fn age(ts: DateTime<FixedOffset>, now: DateTime<FixedOffset>) -> Duration {
    (now - ts).max(Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::fixtures;

    #[test]
    fn boundaries_are_inclusive() {
        let p = FreshnessPolicy::default();
        assert_eq!(p.classify_age(Duration::minutes(20)), DataQuality::Ok);
        assert_eq!(p.classify_age(Duration::minutes(21)), DataQuality::Stale);
        assert_eq!(p.classify_age(Duration::minutes(120)), DataQuality::Stale);
        assert_eq!(p.classify_age(Duration::minutes(121)), DataQuality::Unknown);
    }

    #[test]
    fn missing_timestamp_is_unknown() {
        let p = FreshnessPolicy::default();
        let now = fixtures::session_start();
        assert_eq!(p.classify(None, now), DataQuality::Unknown);
        assert_eq!(
            p.classify(Some(now - Duration::minutes(5)), now),
            DataQuality::Ok
        );
    }

    #[test]
    fn future_timestamp_counts_as_fresh() {
        let p = FreshnessPolicy::default();
        let now = fixtures::session_start();
        let ts = now + Duration::minutes(3);
        assert_eq!(age(ts, now), Duration::zero());
        assert_eq!(p.classify(Some(ts), now), DataQuality::Ok);
    }

    #[test]
    fn quality_never_improves_as_time_passes() {
        let p = FreshnessPolicy::default();
        let ts = fixtures::session_start();
        let mut prev = DataQuality::Ok;
        for minutes in 0..300 {
            let q = p.classify(Some(ts), ts + Duration::minutes(minutes));
            assert!(q >= prev, "quality went from {prev} to {q} at {minutes}m");
            prev = q;
        }
        assert_eq!(prev, DataQuality::Unknown);
    }

    #[test]
    fn inverted_ceilings_are_normalised() {
        let p = FreshnessPolicy::new(Duration::minutes(30), Duration::minutes(10));
        assert_eq!(p.stale_ceiling(), Duration::minutes(30));
        assert_eq!(p.classify_age(Duration::minutes(31)), DataQuality::Unknown);
    }
}
