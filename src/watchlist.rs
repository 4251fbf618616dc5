// =============================================================================
// Watchlist sources
// =============================================================================
//
// The scheduler only reads the list. Both sources normalise the same way:
// trim, uppercase, drop empties, drop duplicates keeping first occurrence.
// =============================================================================

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

/// Ordered list of symbols to score.
#[async_trait]
pub trait WatchlistSource: Send + Sync {
    async fn symbols(&self) -> Result<Vec<String>>;
}

pub fn normalise<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|s| s.as_ref().trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// A fixed list, normally from config or `TMV_SYMBOLS`.
#[derive(Debug, Clone)]
pub struct StaticWatchlist {
    symbols: Vec<String>,
}

impl StaticWatchlist {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            symbols: normalise(symbols),
        }
    }
}

#[async_trait]
impl WatchlistSource for StaticWatchlist {
    async fn symbols(&self) -> Result<Vec<String>> {
        Ok(self.symbols.clone())
    }
}

/// Text/CSV file: first line is a header, first column holds the symbol.
/// Re-read on every run so edits take effect without a restart.
#[derive(Debug, Clone)]
pub struct FileWatchlist {
    path: PathBuf,
}

impl FileWatchlist {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn parse_csv(content: &str) -> Vec<String> {
    normalise(
        content
            .lines()
            .skip(1)
            .map(|line| line.split(',').next().unwrap_or("").trim_matches('"')),
    )
}

#[async_trait]
impl WatchlistSource for FileWatchlist {
    async fn symbols(&self) -> Result<Vec<String>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read watchlist {}", self.path.display()))?;
        let symbols = parse_csv(&content);
        debug!(path = %self.path.display(), count = symbols.len(), "watchlist loaded");
        Ok(symbols)
    }
}
