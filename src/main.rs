// =============================================================================
// TMV Ranker — Main Entry Point
// =============================================================================
//
// `once`: a single gated run, cron style. Exits non-zero if the run fails.
// `loop`: periodic runs plus the read-only display API until Ctrl+C.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod baseline;
mod config;
mod error;
mod freshness;
mod indicators;
mod market_data;
mod publisher;
mod regime;
mod scheduler;
mod scoring;
mod types;
mod watchlist;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::baseline::BaselineStore;
use crate::config::{StoreConfig, StoreKind, TmvConfig, WatchlistConfig};
use crate::freshness::FreshnessPolicy;
use crate::market_data::KiteCandleSource;
use crate::publisher::{FileStore, HttpStore, MemoryStore, TableStore, TokioSleeper};
use crate::scheduler::{Orchestrator, RunDeps, SystemClock};
use crate::types::RunMode;
use crate::watchlist::{FileWatchlist, StaticWatchlist, WatchlistSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = TmvConfig::from_env();
    info!(
        run_mode = %config.schedule.run_mode,
        store = ?config.store.kind,
        interval = %config.fetch.interval,
        "TMV ranker starting"
    );

    // ── 2. External handles ──────────────────────────────────────────────
    let clock = Arc::new(SystemClock::new(config.market.offset()));
    let (tables, baselines) = open_store(&config.store).await?;
    let watchlist = watchlist_from(&config.watchlist)?;

    let api_key = std::env::var("KITE_API_KEY").context("KITE_API_KEY is not set")?;
    let access_token = std::env::var("KITE_ACCESS_TOKEN").context("KITE_ACCESS_TOKEN is not set")?;
    let source = Arc::new(KiteCandleSource::new(
        config.fetch.kite_base_url.clone(),
        &api_key,
        &access_token,
        config.fetch.timeout(),
    )?);

    let orchestrator = Arc::new(Orchestrator::new(
        &config,
        RunDeps {
            clock: clock.clone(),
            watchlist,
            source,
            tables: tables.clone(),
            baselines,
            sleeper: Arc::new(TokioSleeper),
        },
    ));

    // ── 3. Once mode ─────────────────────────────────────────────────────
    if config.schedule.run_mode == RunMode::Once {
        let report = orchestrator.run_once().await.context("run failed")?;
        info!(run_id = %report.run_id, outcome = %report.outcome, "done");
        return Ok(());
    }

    // ── 4. Display API ───────────────────────────────────────────────────
    let api_state = Arc::new(AppState::new(
        tables,
        FreshnessPolicy::from(&config.freshness),
        clock,
    ));
    let listener = tokio::net::TcpListener::bind(&config.api.bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {}", config.api.bind_addr))?;
    info!(addr = %config.api.bind_addr, "API server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, api::rest::router(api_state)).await {
            error!(error = %e, "API server failed");
        }
    });

    // ── 5. Scheduler loop ────────────────────────────────────────────────
    let every = Duration::from_secs(config.schedule.interval_secs.max(1));
    let loop_orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        info!(every_secs = every.as_secs(), "scheduler loop starting");
        loop_orchestrator.run_forever(every).await;
    });

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received; no run is published after this point");
    info!("TMV ranker shut down");
    Ok(())
}

/// Open the configured store. The same backend serves the table, the
/// watchdog marker and the baselines.
async fn open_store(cfg: &StoreConfig) -> anyhow::Result<(Arc<dyn TableStore>, Arc<dyn BaselineStore>)> {
    Ok(match cfg.kind {
        StoreKind::Memory => {
            warn!("memory store selected; published tables are lost on exit");
            shared(Arc::new(MemoryStore::new()))
        }
        StoreKind::File => {
            let store = FileStore::open(&cfg.dir)
                .await
                .with_context(|| format!("failed to open store directory {}", cfg.dir))?;
            shared(Arc::new(store))
        }
        StoreKind::Http => {
            let Some(url) = cfg.url.as_deref() else {
                bail!("store.kind is http but store.url is not set");
            };
            shared(Arc::new(HttpStore::new(url, cfg.timeout())?))
        }
    })
}

fn shared<S>(store: Arc<S>) -> (Arc<dyn TableStore>, Arc<dyn BaselineStore>)
where
    S: TableStore + BaselineStore + 'static,
{
    let tables: Arc<dyn TableStore> = store.clone();
    let baselines: Arc<dyn BaselineStore> = store;
    (tables, baselines)
}

fn watchlist_from(cfg: &WatchlistConfig) -> anyhow::Result<Arc<dyn WatchlistSource>> {
    if !cfg.symbols.is_empty() {
        return Ok(Arc::new(StaticWatchlist::new(&cfg.symbols)));
    }
    match &cfg.file {
        Some(path) => Ok(Arc::new(FileWatchlist::new(path))),
        None => bail!("no watchlist configured: set TMV_SYMBOLS or watchlist.file"),
    }
}
