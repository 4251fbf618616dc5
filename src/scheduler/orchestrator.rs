// =============================================================================
// Run orchestrator
// =============================================================================
//
// One invocation:
//
//   Idle ──(gate closed)──────────────────────────────▶ Skipped
//   Idle ──(gate open)──▶ Running ──▶ Publishing ──▶ Idle
//
// Running fetches and scores every watchlist symbol. Per-symbol failures are
// logged and excluded. Zero surviving rows aborts the run before the
// publisher is touched. Publishing happens exactly once, after every symbol
// has been processed.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use futures_util::{stream, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::baseline::{BaselineStore, BaselineTracker, CaptureWindow};
use crate::config::{FetchConfig, TmvConfig};
use crate::error::{RunError, SymbolError};
use crate::freshness::FreshnessPolicy;
use crate::market_data::{CandleRequest, CandleSource};
use crate::publisher::{
    Exclusion, PublishedTable, Publisher, RetryPolicy, RunOutcome, RunReport, Sleeper, TableStore,
};
use crate::scheduler::{Clock, TradingCalendar};
use crate::scoring::{ScoreRecord, ScoringEngine};
use crate::watchlist::WatchlistSource;

/// External handles a run needs, constructed once in `main`.
pub struct RunDeps {
    pub clock: Arc<dyn Clock>,
    pub watchlist: Arc<dyn WatchlistSource>,
    pub source: Arc<dyn CandleSource>,
    pub tables: Arc<dyn TableStore>,
    pub baselines: Arc<dyn BaselineStore>,
    pub sleeper: Arc<dyn Sleeper>,
}

pub struct Orchestrator {
    clock: Arc<dyn Clock>,
    calendar: TradingCalendar,
    watchlist: Arc<dyn WatchlistSource>,
    source: Arc<dyn CandleSource>,
    engine: ScoringEngine,
    baselines: BaselineTracker,
    freshness: FreshnessPolicy,
    publisher: Publisher,
    fetch: FetchConfig,
}

impl Orchestrator {
    pub fn new(cfg: &TmvConfig, deps: RunDeps) -> Self {
        Self {
            clock: deps.clock,
            calendar: TradingCalendar::from(&cfg.market),
            watchlist: deps.watchlist,
            source: deps.source,
            engine: ScoringEngine::new(cfg.scoring.clone()),
            baselines: BaselineTracker::new(deps.baselines, CaptureWindow::from(&cfg.baseline)),
            freshness: FreshnessPolicy::from(&cfg.freshness),
            publisher: Publisher::new(
                deps.tables,
                RetryPolicy::from(&cfg.retry),
                deps.sleeper,
                cfg.store.timeout(),
            ),
            fetch: cfg.fetch.clone(),
        }
    }

    /// Execute one run. `Ok` covers both a publish and a gated skip.
    pub async fn run_once(&self) -> Result<RunReport, RunError> {
        let run_id = Uuid::new_v4();
        let started_at = self.calendar.local(self.clock.now());

        if !self.calendar.is_open(started_at) {
            info!(%run_id, now = %started_at, "outside trading hours, run skipped");
            return Ok(self.report(run_id, started_at, RunOutcome::Skipped, 0, Vec::new()));
        }

        // ── 1. Watchlist ─────────────────────────────────────────────────
        let symbols = match self.watchlist.symbols().await {
            Ok(s) => s,
            Err(e) => {
                let reason = format!("{e:#}");
                error!(%run_id, error = %reason, "watchlist unavailable");
                self.fail(run_id, started_at, RunOutcome::WatchlistFailed, &reason, Vec::new())
                    .await;
                return Err(RunError::Watchlist(reason));
            }
        };
        info!(%run_id, symbols = symbols.len(), "run started");

        // ── 2. Fetch + score ─────────────────────────────────────────────
        let (scores, excluded) = self.score_all(&symbols, started_at).await;

        if scores.is_empty() {
            let err = RunError::EmptyResult {
                attempted: symbols.len(),
            };
            error!(%run_id, error = %err, "nothing to publish; previous table kept");
            self.fail(run_id, started_at, RunOutcome::EmptyResult, &err.to_string(), excluded)
                .await;
            return Err(err);
        }

        // ── 3. Baselines and deltas ──────────────────────────────────────
        if self.baselines.in_capture_window(started_at) {
            if let Err(e) = self.baselines.capture(&scores, started_at).await {
                warn!(%run_id, error = %e, "baseline capture failed");
            }
        }

        let mut deltas = match self.baselines.deltas(started_at.date_naive(), &scores).await {
            Ok(d) => d,
            Err(e) => {
                warn!(%run_id, error = %e, "baselines unavailable, deltas omitted");
                HashMap::new()
            }
        };

        // ── 4. Assemble and publish ──────────────────────────────────────
        let rows = scores
            .into_iter()
            .map(|score| {
                let delta = deltas.remove(&score.symbol);
                let quality = self.freshness.classify(Some(score.candle_time), started_at);
                (score, delta, quality)
            })
            .collect();
        let table = PublishedTable::assemble(run_id, started_at, rows);

        if let Err(e) = self.publisher.publish(&table, self.clock.now()).await {
            self.fail(run_id, started_at, RunOutcome::PersistenceFailed, &e.to_string(), excluded)
                .await;
            return Err(e.into());
        }

        Ok(self.report(run_id, started_at, RunOutcome::Published, table.len(), excluded))
    }

    /// Fetch and score every symbol, at most `concurrency` in flight. Output
    /// order follows the watchlist.
    async fn score_all(
        &self,
        symbols: &[String],
        as_of: DateTime<FixedOffset>,
    ) -> (Vec<ScoreRecord>, Vec<Exclusion>) {
        let results: Vec<(String, Result<ScoreRecord, SymbolError>)> = stream::iter(symbols.iter().cloned())
            .map(|symbol| async move {
                let result = self.score_symbol(&symbol, as_of).await;
                (symbol, result)
            })
            .buffered(self.fetch.concurrency.max(1))
            .collect()
            .await;

        let mut scores = Vec::with_capacity(results.len());
        let mut excluded = Vec::new();
        for (symbol, result) in results {
            match result {
                Ok(score) => scores.push(score),
                Err(e) => {
                    warn!(symbol = %symbol, kind = e.kind(), error = %e, "symbol excluded");
                    excluded.push(Exclusion {
                        symbol,
                        reason: format!("{}: {e}", e.kind()),
                    });
                }
            }
        }
        (scores, excluded)
    }

    async fn score_symbol(&self, symbol: &str, as_of: DateTime<FixedOffset>) -> Result<ScoreRecord, SymbolError> {
        let req = CandleRequest {
            symbol: symbol.to_string(),
            interval: self.fetch.interval.clone(),
            lookback_days: self.fetch.lookback_days,
            until: as_of,
        };

        let limit = self.fetch.timeout();
        let frame = match tokio::time::timeout(limit, self.source.fetch(&req)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(SymbolError::FetchFailure {
                    symbol: symbol.to_string(),
                    reason: format!("{} timed out after {limit:?}", self.source.source_name()),
                })
            }
        };

        self.engine.calculate_scores(symbol, &frame, as_of)
    }

    async fn fail(
        &self,
        run_id: Uuid,
        started_at: DateTime<FixedOffset>,
        outcome: RunOutcome,
        reason: &str,
        excluded: Vec<Exclusion>,
    ) {
        self.publisher.record_failure(run_id, self.clock.now(), reason).await;
        self.report(run_id, started_at, outcome, 0, excluded);
    }

    fn report(
        &self,
        run_id: Uuid,
        started_at: DateTime<FixedOffset>,
        outcome: RunOutcome,
        published_rows: usize,
        excluded: Vec<Exclusion>,
    ) -> RunReport {
        let report = RunReport {
            run_id,
            started_at,
            finished_at: self.calendar.local(self.clock.now()),
            outcome,
            published_rows,
            excluded,
        };
        info!(
            run_id = %report.run_id,
            outcome = %report.outcome,
            published_rows = report.published_rows,
            excluded = report.excluded.len(),
            "run finished"
        );
        report
    }

    /// Run every `every` until the task is dropped. Failed runs are logged
    /// and the loop carries on.
    pub async fn run_forever(&self, every: Duration) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(e) = self.run_once().await {
                error!(error = %e, "run failed");
            }
        }
    }
}
