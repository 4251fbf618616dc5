// =============================================================================
// TMV Configuration — injected settings with atomic save
// =============================================================================
//
// Every tunable of the ranking pipeline lives here: trading hours, freshness
// ceilings, the baseline capture window, scoring weights and thresholds, the
// publish retry policy, fetch limits and the store backend.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry serde defaults so that adding new fields never
// breaks loading an older config file.
//
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveTime, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::RunMode;

/// Config file used when `TMV_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "tmv_config.json";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_utc_offset_minutes() -> i32 {
    5 * 60 + 30
}

fn default_trading_days() -> Vec<Weekday> {
    vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ]
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

fn default_session_open() -> NaiveTime {
    hm(9, 15)
}

fn default_session_close() -> NaiveTime {
    hm(15, 30)
}

fn default_capture_end() -> NaiveTime {
    hm(9, 30)
}

fn default_ok_minutes() -> i64 {
    20
}

fn default_stale_minutes() -> i64 {
    120
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_true() -> bool {
    true
}

fn default_interval() -> String {
    "15minute".to_string()
}

fn default_lookback_days() -> u32 {
    7
}

fn default_call_timeout_secs() -> u64 {
    15
}

fn default_concurrency() -> usize {
    4
}

fn default_run_interval_secs() -> u64 {
    300
}

fn default_store_dir() -> String {
    "data".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_kite_base_url() -> String {
    "https://api.kite.trade".to_string()
}

// =============================================================================
// Sections
// =============================================================================

/// Exchange calendar: local offset, trading weekdays and session bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Local exchange offset from UTC in minutes (IST = 330).
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,

    #[serde(default = "default_trading_days")]
    pub trading_days: Vec<Weekday>,

    #[serde(default = "default_session_open")]
    pub session_open: NaiveTime,

    #[serde(default = "default_session_close")]
    pub session_close: NaiveTime,
}

impl MarketConfig {
    /// Exchange offset; falls back to UTC on an out-of-range value.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| {
            warn!(minutes = self.utc_offset_minutes, "invalid utc offset, using UTC");
            Utc.fix()
        })
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: default_utc_offset_minutes(),
            trading_days: default_trading_days(),
            session_open: default_session_open(),
            session_close: default_session_close(),
        }
    }
}

/// Candle-age ceilings for the OK / STALE tags, in minutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessConfig {
    #[serde(default = "default_ok_minutes")]
    pub ok_minutes: i64,

    #[serde(default = "default_stale_minutes")]
    pub stale_minutes: i64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            ok_minutes: default_ok_minutes(),
            stale_minutes: default_stale_minutes(),
        }
    }
}

/// Local wall-clock window in which the daily baseline may be captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineConfig {
    #[serde(default = "default_session_open")]
    pub capture_start: NaiveTime,

    #[serde(default = "default_capture_end")]
    pub capture_end: NaiveTime,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            capture_start: default_session_open(),
            capture_end: default_capture_end(),
        }
    }
}

/// Composite weights. They need not sum to one; the composite is clamped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub trend: f64,
    pub momentum: f64,
    pub volume: f64,
    pub volatility: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            trend: 0.35,
            momentum: 0.35,
            volume: 0.20,
            volatility: 0.10,
        }
    }
}

/// Scoring constants. These are tuning knobs, not validated trading wisdom.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Fewer candles than this yields `InsufficientData`.
    pub min_candles: usize,
    pub weights: ScoreWeights,
    /// Added when momentum bias agrees with trend direction.
    pub confirmation_bonus: f64,
    /// Subtracted when momentum bias opposes trend direction.
    pub conflict_penalty: f64,

    // --- Indicator periods ---------------------------------------------------
    pub ema_fast: usize,
    pub ema_mid: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub adx_period: usize,
    pub atr_period: usize,
    pub mfi_period: usize,
    pub bb_period: usize,
    pub bb_mult: f64,
    pub volume_avg_period: usize,
    /// Trailing band-width window for the percentile rank.
    pub width_window: usize,
    /// Bars used for every "short-term acceleration" delta.
    pub accel_bars: usize,

    // --- Trend -------------------------------------------------------------
    /// EMA21/EMA50 gap (% of price) below which the stack is not "aligned".
    pub min_ema_separation_pct: f64,
    pub alignment_bonus: f64,
    pub di_bonus: f64,
    pub adx_floor: f64,
    pub adx_scale: f64,
    pub adx_cap: f64,
    pub slope_bars: usize,
    pub slope_cap: f64,

    // --- Momentum ----------------------------------------------------------
    pub rsi_clamp: f64,
    pub rsi_accel_clamp: f64,
    pub macd_clamp: f64,
    pub macd_accel_clamp: f64,
    /// Momentum above `5 + band` is bullish bias, below `5 - band` bearish.
    pub momentum_bias_band: f64,

    // --- Volume ------------------------------------------------------------
    pub volume_ratio_clamp: f64,
    pub obv_clamp: f64,
    pub mfi_clamp: f64,
    pub mfi_accel_clamp: f64,

    // --- Volatility --------------------------------------------------------
    pub width_rank_scale: f64,
    pub expansion_clamp: f64,

    // --- Confidence --------------------------------------------------------
    pub confidence_base: f64,
    pub agreement_bonus: f64,
    pub adx_confidence_threshold: f64,
    pub adx_confidence_bonus: f64,
    pub volume_ratio_threshold: f64,
    pub volume_confidence_bonus: f64,
    pub macd_accel_bonus: f64,

    // --- Regime ------------------------------------------------------------
    pub trend_adx: f64,
    pub range_adx: f64,
    pub width_percentile_split: f64,

    // --- Reversal ----------------------------------------------------------
    pub reversal_base: f64,
    pub extreme_increment: f64,
    pub exhaustion_adx: f64,
    pub exhaustion_increment: f64,
    pub expansion_decrement: f64,

    /// Cap on the number of signal reasons per row.
    pub max_reasons: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_candles: 60,
            weights: ScoreWeights::default(),
            confirmation_bonus: 0.6,
            conflict_penalty: 0.8,

            ema_fast: 8,
            ema_mid: 21,
            ema_slow: 50,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            adx_period: 14,
            atr_period: 14,
            mfi_period: 14,
            bb_period: 20,
            bb_mult: 2.0,
            volume_avg_period: 20,
            width_window: 200,
            accel_bars: 3,

            min_ema_separation_pct: 0.1,
            alignment_bonus: 3.0,
            di_bonus: 1.5,
            adx_floor: 15.0,
            adx_scale: 0.1,
            adx_cap: 3.0,
            slope_bars: 5,
            slope_cap: 2.5,

            rsi_clamp: 4.0,
            rsi_accel_clamp: 2.0,
            macd_clamp: 2.5,
            macd_accel_clamp: 1.5,
            momentum_bias_band: 0.5,

            volume_ratio_clamp: 2.0,
            obv_clamp: 1.5,
            mfi_clamp: 2.0,
            mfi_accel_clamp: 1.0,

            width_rank_scale: 4.0,
            expansion_clamp: 1.5,

            confidence_base: 0.35,
            agreement_bonus: 0.2,
            adx_confidence_threshold: 25.0,
            adx_confidence_bonus: 0.15,
            volume_ratio_threshold: 1.2,
            volume_confidence_bonus: 0.15,
            macd_accel_bonus: 0.1,

            trend_adx: 22.0,
            range_adx: 18.0,
            width_percentile_split: 0.45,

            reversal_base: 0.10,
            extreme_increment: 0.40,
            exhaustion_adx: 25.0,
            exhaustion_increment: 0.20,
            expansion_decrement: 0.10,

            max_reasons: 6,
        }
    }
}

/// Bounded exponential backoff for transient store failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Full jitter: each delay is drawn uniformly from `[0, backoff]`.
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: true,
        }
    }
}

/// Candle fetching limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_interval")]
    pub interval: String,

    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    #[serde(default = "default_call_timeout_secs")]
    pub timeout_secs: u64,

    /// Symbols fetched in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_kite_base_url")]
    pub kite_base_url: String,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            lookback_days: default_lookback_days(),
            timeout_secs: default_call_timeout_secs(),
            concurrency: default_concurrency(),
            kite_base_url: default_kite_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub run_mode: RunMode,

    #[serde(default = "default_run_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            run_mode: RunMode::default(),
            interval_secs: default_run_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    #[default]
    File,
    Http,
}

/// Where the published table, baselines and watchdog marker live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,

    #[serde(default = "default_store_dir")]
    pub dir: String,

    /// Base URL for the HTTP store.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_call_timeout_secs")]
    pub timeout_secs: u64,
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            dir: default_store_dir(),
            url: None,
            timeout_secs: default_call_timeout_secs(),
        }
    }
}

/// Symbols to rank: an explicit list wins over the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchlistConfig {
    #[serde(default)]
    pub symbols: Vec<String>,

    /// CSV/text file whose first column holds the symbols (header skipped).
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

// =============================================================================
// TmvConfig
// =============================================================================

/// Top-level configuration for the TMV ranker.
///
/// Every section has a serde default so that older JSON files missing new
/// fields still deserialise correctly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TmvConfig {
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub freshness: FreshnessConfig,
    #[serde(default)]
    pub baseline: BaselineConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub watchlist: WatchlistConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl TmvConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read tmv config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse tmv config from {}", path.display()))?;

        info!(
            path = %path.display(),
            run_mode = %config.schedule.run_mode,
            store = ?config.store.kind,
            "tmv config loaded"
        );

        Ok(config)
    }

    /// Load from `TMV_CONFIG` (or the default path), falling back to defaults,
    /// then apply environment overrides.
    pub fn from_env() -> Self {
        let path = std::env::var("TMV_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = match Self::load(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path, error = %e, "using default tmv config");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(list) = lookup("TMV_SYMBOLS") {
            self.watchlist.symbols = list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(mode) = lookup("TMV_RUN_MODE") {
            match mode.parse() {
                Ok(m) => self.schedule.run_mode = m,
                Err(e) => warn!(value = %mode, error = %e, "ignoring TMV_RUN_MODE"),
            }
        }
        if let Some(addr) = lookup("TMV_BIND_ADDR") {
            self.api.bind_addr = addr;
        }
        if let Some(dir) = lookup("TMV_STORE_DIR") {
            self.store.kind = StoreKind::File;
            self.store.dir = dir;
        }
        if let Some(url) = lookup("TMV_STORE_URL") {
            self.store.kind = StoreKind::Http;
            self.store.url = Some(url);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = TmvConfig::default();
        assert_eq!(cfg.market.utc_offset_minutes, 330);
        assert_eq!(cfg.market.trading_days.len(), 5);
        assert_eq!(cfg.market.session_open, hm(9, 15));
        assert_eq!(cfg.market.session_close, hm(15, 30));
        assert_eq!(cfg.freshness.ok_minutes, 20);
        assert_eq!(cfg.freshness.stale_minutes, 120);
        assert_eq!(cfg.baseline.capture_end, hm(9, 30));
        assert_eq!(cfg.scoring.min_candles, 60);
        assert!((cfg.scoring.confirmation_bonus - 0.6).abs() < f64::EPSILON);
        assert!((cfg.scoring.conflict_penalty - 0.8).abs() < f64::EPSILON);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.store.kind, StoreKind::File);
        assert_eq!(cfg.schedule.run_mode, RunMode::Loop);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: TmvConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.fetch.interval, "15minute");
        assert_eq!(cfg.fetch.lookback_days, 7);
        assert!((cfg.scoring.weights.trend - 0.35).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{
            "market": { "session_open": "09:00:00", "trading_days": ["Mon"] },
            "scoring": { "min_candles": 80, "weights": { "trend": 0.5 } },
            "store": { "kind": "http", "url": "http://store.local" }
        }"#;
        let cfg: TmvConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.market.session_open, hm(9, 0));
        assert_eq!(cfg.market.session_close, hm(15, 30));
        assert_eq!(cfg.market.trading_days, vec![Weekday::Mon]);
        assert_eq!(cfg.scoring.min_candles, 80);
        assert!((cfg.scoring.weights.trend - 0.5).abs() < f64::EPSILON);
        assert!((cfg.scoring.weights.momentum - 0.35).abs() < f64::EPSILON);
        assert_eq!(cfg.scoring.ema_slow, 50);
        assert_eq!(cfg.store.kind, StoreKind::Http);
        assert_eq!(cfg.store.url.as_deref(), Some("http://store.local"));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("TMV_SYMBOLS", " infy, tcs ,,"),
            ("TMV_RUN_MODE", "once"),
            ("TMV_STORE_URL", "http://example.test"),
        ]
        .into_iter()
        .collect();

        let mut cfg = TmvConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.watchlist.symbols, vec!["infy", "tcs"]);
        assert_eq!(cfg.schedule.run_mode, RunMode::Once);
        assert_eq!(cfg.store.kind, StoreKind::Http);
    }

    #[test]
    fn bad_run_mode_is_ignored() {
        let mut cfg = TmvConfig::default();
        cfg.apply_overrides(|k| (k == "TMV_RUN_MODE").then(|| "sometimes".to_string()));
        assert_eq!(cfg.schedule.run_mode, RunMode::Loop);
    }

    #[test]
    fn offset_is_ist_by_default() {
        assert_eq!(MarketConfig::default().offset().local_minus_utc(), 19_800);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tmv_config.json");
        std::fs::write(&path, r#"{ "fetch": { "concurrency": 9 } }"#).unwrap();
        let loaded = TmvConfig::load(&path).unwrap();
        assert_eq!(loaded.fetch.concurrency, 9);
        assert_eq!(loaded.freshness.ok_minutes, 20);
    }
}
