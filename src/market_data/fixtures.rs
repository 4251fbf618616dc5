//! Deterministic candle series and a local HTTP harness shared by unit tests.

use chrono::{DateTime, Duration, FixedOffset, TimeZone};

use crate::market_data::{Candle, CandleFrame};
use crate::scoring::ScoreRecord;
use crate::types::{Regime, TrendDirection};

pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()
}

/// 09:15 IST on Monday 2024-03-04.
pub fn session_start() -> DateTime<FixedOffset> {
    ist().with_ymd_and_hms(2024, 3, 4, 9, 15, 0).unwrap()
}

/// Build candles from closes and volumes, one per `step` ending at `end`.
pub fn build(closes: &[f64], volumes: &[f64], end: DateTime<FixedOffset>, step: Duration) -> Vec<Candle> {
    let n = closes.len();
    closes
        .iter()
        .zip(volumes.iter())
        .enumerate()
        .map(|(i, (&close, &volume))| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let spread = (close * 0.004).max(0.05);
            Candle {
                timestamp: end - step * (n - 1 - i) as i32,
                open,
                high: open.max(close) + spread,
                low: open.min(close) - spread,
                close,
                volume,
            }
        })
        .collect()
}

/// Daily candles ending at `end`.
pub fn daily(closes: &[f64], volumes: &[f64], end: DateTime<FixedOffset>) -> CandleFrame {
    CandleFrame::new(build(closes, volumes, end, Duration::days(1)))
}

/// Steadily rising close with expanding volume.
pub fn rising(n: usize) -> CandleFrame {
    let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64 * 1.2).collect();
    let volumes: Vec<f64> = (0..n).map(|i| 10_000.0 + i as f64 * 400.0).collect();
    daily(&closes, &volumes, session_start())
}

/// Steadily falling close with expanding volume.
pub fn falling(n: usize) -> CandleFrame {
    let closes: Vec<f64> = (0..n).map(|i| 300.0 - i as f64 * 1.2).collect();
    let volumes: Vec<f64> = (0..n).map(|i| 10_000.0 + i as f64 * 400.0).collect();
    daily(&closes, &volumes, session_start())
}

/// Tight alternating series with no directional drift. Every candle shares
/// the same high and low so directional movement is exactly zero.
pub fn oscillating(n: usize) -> CandleFrame {
    let end = session_start();
    let candles = (0..n)
        .map(|i| {
            let (open, close) = if i % 2 == 0 { (100.6, 100.0) } else { (100.0, 100.6) };
            Candle {
                timestamp: end - Duration::days((n - 1 - i) as i64),
                open,
                high: 101.0,
                low: 99.6,
                close,
                volume: 20_000.0,
            }
        })
        .collect();
    CandleFrame::new(candles)
}

/// Gentle sideways wobble followed by a sharp final surge of `surge` points,
/// ending overbought and above the upper band.
pub fn late_surge(n: usize, surge: f64) -> CandleFrame {
    let mut closes: Vec<f64> = (0..n)
        .map(|i| 100.0 + (i as f64 * 0.7).sin() * 1.5)
        .collect();
    let start = n.saturating_sub(6);
    for (k, close) in closes.iter_mut().enumerate().skip(start) {
        *close += surge * (k - start + 1) as f64 / 6.0;
    }
    let volumes = vec![15_000.0; n];
    daily(&closes, &volumes, session_start())
}

/// A hand-built score row for pipeline tests that don't care about indicators.
pub fn score_record(symbol: &str, tmv: f64, at: DateTime<FixedOffset>) -> ScoreRecord {
    ScoreRecord {
        symbol: symbol.to_string(),
        tmv_score: tmv,
        trend_score: 5.0,
        momentum_score: 5.0,
        volume_score: 4.0,
        volatility_score: 5.0,
        confidence: 0.5,
        trend_direction: TrendDirection::Neutral,
        regime: Regime::Transition,
        reversal_probability: 0.1,
        signal_reason: Vec::new(),
        candle_time: at,
        as_of: at,
        last_price: 100.0,
        change_pct: 0.0,
    }
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
