// =============================================================================
// Kite Connect candle source — historical OHLCV over REST
// =============================================================================
//
// SECURITY: the access token is never logged or serialised. Every request
// carries `X-Kite-Version: 3` and `Authorization: token <key>:<access_token>`.
//
// Instrument tokens are resolved through the LTP quote endpoint and cached per
// source instance for the lifetime of the process.
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::{debug, instrument};

use crate::error::SymbolError;
use crate::market_data::source::{CandleRequest, CandleSource};
use crate::market_data::{CandleFrame, RawCandle};

const EXCHANGE: &str = "NSE";

/// REST client for the broker's historical-candle API.
pub struct KiteCandleSource {
    base_url: String,
    client: reqwest::Client,
    token_cache: RwLock<HashMap<String, u64>>,
}

impl KiteCandleSource {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a source against `base_url` (production, sandbox or a local
    /// mock). A trailing slash is dropped.
    pub fn new(
        base_url: impl Into<String>,
        api_key: &str,
        access_token: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("X-Kite-Version", HeaderValue::from_static("3"));
        let auth = HeaderValue::from_str(&format!("token {api_key}:{access_token}"))
            .context("broker credentials contain invalid header characters")?;
        default_headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .context("failed to build broker HTTP client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "KiteCandleSource initialised");

        Ok(Self {
            base_url,
            client,
            token_cache: RwLock::new(HashMap::new()),
        })
    }

    // -------------------------------------------------------------------------
    // Instrument lookup
    // -------------------------------------------------------------------------

    /// Resolve the numeric instrument token for `symbol` via the LTP endpoint.
    #[instrument(skip(self), name = "kite::instrument_token")]
    async fn instrument_token(&self, symbol: &str) -> Result<u64, SymbolError> {
        if let Some(token) = self.token_cache.read().get(symbol).copied() {
            return Ok(token);
        }

        let key = format!("{EXCHANGE}:{symbol}");
        let url = format!("{}/quote/ltp", self.base_url);
        let body = self
            .get_json(&url, &[("i", key.as_str())], symbol)
            .await?;

        let token = body["data"][key.as_str()]["instrument_token"]
            .as_u64()
            .ok_or_else(|| fetch_failure(symbol, format!("no instrument token for {key}")))?;

        self.token_cache.write().insert(symbol.to_string(), token);
        debug!(symbol, token, "instrument token resolved");
        Ok(token)
    }

    // -------------------------------------------------------------------------
    // HTTP helper
    // -------------------------------------------------------------------------

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
        symbol: &str,
    ) -> Result<serde_json::Value, SymbolError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| fetch_failure(symbol, format!("request failed: {e}")))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| fetch_failure(symbol, format!("unreadable response: {e}")))?;

        if !status.is_success() || body["status"].as_str() != Some("success") {
            let message = body["message"].as_str().unwrap_or("no message");
            return Err(fetch_failure(
                symbol,
                format!("broker returned {status}: {message}"),
            ));
        }

        Ok(body)
    }
}

#[async_trait]
impl CandleSource for KiteCandleSource {
    #[instrument(skip(self, req), fields(symbol = %req.symbol, interval = %req.interval), name = "kite::fetch")]
    async fn fetch(&self, req: &CandleRequest) -> Result<CandleFrame, SymbolError> {
        let token = self.instrument_token(&req.symbol).await?;

        let from = req.until - ChronoDuration::days(i64::from(req.lookback_days.max(1)));
        let from_s = from.format("%Y-%m-%d %H:%M:%S").to_string();
        let to_s = req.until.format("%Y-%m-%d %H:%M:%S").to_string();

        let url = format!(
            "{}/instruments/historical/{}/{}",
            self.base_url, token, req.interval
        );
        let body = self
            .get_json(&url, &[("from", from_s.as_str()), ("to", to_s.as_str())], &req.symbol)
            .await?;

        let rows = body["data"]["candles"]
            .as_array()
            .ok_or_else(|| fetch_failure(&req.symbol, "response missing data.candles"))?;

        if rows.is_empty() {
            return Err(fetch_failure(&req.symbol, "no historical data returned"));
        }

        let raw: Vec<RawCandle> = rows.iter().map(parse_candle_row).collect();
        let frame = CandleFrame::from_raw(raw)?;
        debug!(symbol = %req.symbol, candles = frame.len(), "historical candles fetched");
        Ok(frame)
    }

    fn source_name(&self) -> &'static str {
        "kite"
    }
}

/// Broker rows are positional arrays: `[timestamp, open, high, low, close, volume]`.
/// Absent or mistyped cells become `None` and are rejected during validation.
fn parse_candle_row(row: &serde_json::Value) -> RawCandle {
    RawCandle {
        timestamp: row[0].as_str().map(str::to_string),
        open: row[1].as_f64(),
        high: row[2].as_f64(),
        low: row[3].as_f64(),
        close: row[4].as_f64(),
        volume: row[5].as_f64(),
    }
}

fn fetch_failure(symbol: &str, reason: impl Into<String>) -> SymbolError {
    SymbolError::FetchFailure {
        symbol: symbol.to_string(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap as RequestHeaders, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    use crate::market_data::fixtures::{serve, session_start};

    const INFY_TOKEN: u64 = 408_065;

    /// Local stand-in for the broker: LTP lookup plus a configurable
    /// historical response.
    struct MockBroker {
        ltp_calls: AtomicUsize,
        historical_calls: AtomicUsize,
        historical: Mutex<(StatusCode, String)>,
        seen: Mutex<Vec<HashMap<String, String>>>,
    }

    impl MockBroker {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                ltp_calls: AtomicUsize::new(0),
                historical_calls: AtomicUsize::new(0),
                historical: Mutex::new((StatusCode::OK, candles_body().to_string())),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn respond(&self, status: StatusCode, body: impl Into<String>) {
            *self.historical.lock() = (status, body.into());
        }
    }

    fn candles_body() -> Value {
        json!({
            "status": "success",
            "data": { "candles": [
                ["2024-03-04T09:30:00+0530", 1500.5, 1504.0, 1499.0, 1503.0, 12000],
                ["2024-03-04T09:15:00+0530", 1498.0, 1502.0, 1497.5, 1500.5, 18000]
            ]}
        })
    }

    async fn ltp(State(broker): State<Arc<MockBroker>>, Query(q): Query<HashMap<String, String>>) -> Json<Value> {
        broker.ltp_calls.fetch_add(1, Ordering::SeqCst);
        let key = q.get("i").cloned().unwrap_or_default();
        let mut data = serde_json::Map::new();
        if key == "NSE:INFY" {
            data.insert(key, json!({ "instrument_token": INFY_TOKEN, "last_price": 1503.0 }));
        }
        Json(json!({ "status": "success", "data": data }))
    }

    async fn historical(
        State(broker): State<Arc<MockBroker>>,
        Path((token, interval)): Path<(u64, String)>,
        Query(mut q): Query<HashMap<String, String>>,
        headers: RequestHeaders,
    ) -> Response {
        broker.historical_calls.fetch_add(1, Ordering::SeqCst);
        q.insert("token".into(), token.to_string());
        q.insert("interval".into(), interval);
        for name in ["authorization", "x-kite-version"] {
            if let Some(v) = headers.get(name).and_then(|v| v.to_str().ok()) {
                q.insert(name.into(), v.to_string());
            }
        }
        broker.seen.lock().push(q);

        let (status, body) = broker.historical.lock().clone();
        (status, [("content-type", "application/json")], body).into_response()
    }

    async fn source_for(broker: &Arc<MockBroker>) -> KiteCandleSource {
        let router = Router::new()
            .route("/quote/ltp", get(ltp))
            .route("/instruments/historical/:token/:interval", get(historical))
            .with_state(broker.clone());
        let base = serve(router).await;
        KiteCandleSource::new(base, "key", "secret", Duration::from_secs(5)).unwrap()
    }

    fn request(symbol: &str) -> CandleRequest {
        CandleRequest {
            symbol: symbol.to_string(),
            interval: "15minute".to_string(),
            lookback_days: 2,
            until: session_start(),
        }
    }

    async fn fetch_err(broker: &Arc<MockBroker>) -> String {
        let src = source_for(broker).await;
        match src.fetch(&request("INFY")).await {
            Err(SymbolError::FetchFailure { symbol, reason }) => {
                assert_eq!(symbol, "INFY");
                reason
            }
            other => panic!("expected fetch failure, got {other:?}"),
        }
    }

    #[test]
    fn parse_row_positional() {
        let row = serde_json::json!(["2015-12-28T09:15:00+0530", 1386.4, 1388, 1381.05, 1385.1, 788]);
        let raw = parse_candle_row(&row);
        assert_eq!(raw.timestamp.as_deref(), Some("2015-12-28T09:15:00+0530"));
        assert_eq!(raw.high, Some(1388.0));
        assert_eq!(raw.volume, Some(788.0));
    }

    #[test]
    fn short_row_leaves_columns_missing() {
        let row = serde_json::json!(["2015-12-28T09:15:00+0530", 1386.4, 1388]);
        let raw = parse_candle_row(&row);
        assert!(raw.low.is_none());
        assert!(raw.volume.is_none());
        assert!(matches!(
            CandleFrame::from_raw(vec![raw]),
            Err(SymbolError::InvalidInput(_))
        ));
    }

    #[test]
    fn client_builds_with_plain_credentials() {
        let src = KiteCandleSource::new(
            "http://127.0.0.1:9/",
            "key",
            "token",
            Duration::from_secs(1),
        )
        .expect("should build");
        assert_eq!(src.base_url, "http://127.0.0.1:9");
        assert_eq!(src.source_name(), "kite");
    }

    #[test]
    fn newline_in_credentials_is_rejected() {
        assert!(KiteCandleSource::new("http://127.0.0.1:9", "key", "bad\ntoken", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn fetch_sends_window_and_credentials() {
        let broker = MockBroker::new();
        let src = source_for(&broker).await;

        let frame = src.fetch(&request("INFY")).await.unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.last().map(|c| c.close), Some(1503.0));

        let seen = broker.seen.lock()[0].clone();
        let until = session_start();
        let from = until - ChronoDuration::days(2);
        assert_eq!(seen["token"], INFY_TOKEN.to_string());
        assert_eq!(seen["interval"], "15minute");
        assert_eq!(seen["from"], from.format("%Y-%m-%d %H:%M:%S").to_string());
        assert_eq!(seen["to"], until.format("%Y-%m-%d %H:%M:%S").to_string());
        assert_eq!(seen["authorization"], "token key:secret");
        assert_eq!(seen["x-kite-version"], "3");
    }

    #[tokio::test]
    async fn instrument_token_is_resolved_once() {
        let broker = MockBroker::new();
        let src = source_for(&broker).await;

        src.fetch(&request("INFY")).await.unwrap();
        src.fetch(&request("INFY")).await.unwrap();
        assert_eq!(broker.ltp_calls.load(Ordering::SeqCst), 1);
        assert_eq!(broker.historical_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_symbol_is_fetch_failure() {
        let broker = MockBroker::new();
        let src = source_for(&broker).await;

        let err = src.fetch(&request("NOPE")).await.unwrap_err();
        assert!(matches!(err, SymbolError::FetchFailure { ref reason, .. } if reason.contains("NSE:NOPE")));
        assert_eq!(broker.historical_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn error_status_is_fetch_failure() {
        let broker = MockBroker::new();
        broker.respond(
            StatusCode::FORBIDDEN,
            json!({ "status": "error", "message": "Incorrect api_key or access_token.", "error_type": "TokenException" })
                .to_string(),
        );
        let reason = fetch_err(&broker).await;
        assert!(reason.contains("403"), "{reason}");
        assert!(reason.contains("Incorrect api_key"), "{reason}");
    }

    #[tokio::test]
    async fn ok_status_with_error_envelope_is_fetch_failure() {
        let broker = MockBroker::new();
        broker.respond(
            StatusCode::OK,
            json!({ "status": "error", "message": "Too many requests" }).to_string(),
        );
        let reason = fetch_err(&broker).await;
        assert!(reason.contains("Too many requests"), "{reason}");
    }

    #[tokio::test]
    async fn missing_candles_field_is_fetch_failure() {
        let broker = MockBroker::new();
        broker.respond(StatusCode::OK, json!({ "status": "success", "data": {} }).to_string());
        let reason = fetch_err(&broker).await;
        assert!(reason.contains("data.candles"), "{reason}");
    }

    #[tokio::test]
    async fn empty_candles_is_fetch_failure() {
        let broker = MockBroker::new();
        broker.respond(
            StatusCode::OK,
            json!({ "status": "success", "data": { "candles": [] } }).to_string(),
        );
        let reason = fetch_err(&broker).await;
        assert!(reason.contains("no historical data"), "{reason}");
    }

    #[tokio::test]
    async fn non_json_gateway_page_is_fetch_failure() {
        let broker = MockBroker::new();
        broker.respond(StatusCode::BAD_GATEWAY, "<html>502 Bad Gateway</html>");
        let reason = fetch_err(&broker).await;
        assert!(reason.contains("unreadable"), "{reason}");
    }

    #[tokio::test]
    async fn malformed_row_is_invalid_input() {
        let broker = MockBroker::new();
        broker.respond(
            StatusCode::OK,
            json!({ "status": "success", "data": { "candles": [
                ["2024-03-04T09:15:00+0530", 1498.0, 1502.0, 1497.5, 1500.5]
            ]}})
            .to_string(),
        );
        let src = source_for(&broker).await;
        let err = src.fetch(&request("INFY")).await.unwrap_err();
        assert!(matches!(err, SymbolError::InvalidInput(ref m) if m.contains("volume")));
    }
}
