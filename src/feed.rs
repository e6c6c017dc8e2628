//! Candle sources: the repository trait, its CSV implementation, chunked
//! backtest replay, and the live bar queue consumer.

use std::path::Path;

use anyhow::{Context as _, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::context::Context;
use crate::engine;
use crate::types::RawBar;
use crate::venue::OrderVenue;

/// Read-only source of historical bars, time-ordered.
pub trait CandleRepository {
    /// Bars with `from <= close_time <= to`, oldest first, at most
    /// `limit` of them.
    fn fetch(&self, from: i64, to: i64, limit: usize) -> Result<Vec<RawBar>>;
}

/// CSV-backed repository. Expects a header row of
/// `pair,period,open,high,low,close,close_time`.
pub struct CsvCandleRepository {
    rows: Vec<RawBar>,
}

impl CsvCandleRepository {
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("opening candle file {}", path.display()))?;
        let mut rows = Vec::new();
        for record in reader.deserialize() {
            let bar: RawBar =
                record.with_context(|| format!("parsing candle row in {}", path.display()))?;
            rows.push(bar);
        }
        rows.sort_by_key(|b| b.close_time);
        info!(count = rows.len(), file = %path.display(), "candle repository loaded");
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl CandleRepository for CsvCandleRepository {
    fn fetch(&self, from: i64, to: i64, limit: usize) -> Result<Vec<RawBar>> {
        Ok(self
            .rows
            .iter()
            .filter(|b| b.close_time >= from && b.close_time <= to)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Replay a time range through the pipeline in chunks. The cursor
/// advances past the last bar of each chunk, so chunk boundaries leave
/// no gaps and no overlaps. Returns the number of bars ingested.
pub fn replay<R: CandleRepository>(
    ctx: &mut Context,
    repo: &R,
    from: i64,
    to: i64,
    chunk_size: usize,
) -> Result<usize> {
    let chunk_size = chunk_size.max(1);
    let mut cursor = from;
    let mut total = 0;
    loop {
        let chunk = repo.fetch(cursor, to, chunk_size)?;
        let Some(last) = chunk.last() else {
            break;
        };
        cursor = last.close_time + 1;
        total += chunk.len();
        engine::ingest_batch(ctx, &chunk);
    }
    info!(total, from, to, "replay finished");
    Ok(total)
}

/// Drain the live bar queue, one bar at a time, into the pipeline, and
/// hand any resulting position requests to the venue. Runs until the
/// sender side closes.
pub async fn drain_live(
    ctx: &mut Context,
    rx: &mut mpsc::Receiver<RawBar>,
    venue: &dyn OrderVenue,
) {
    while let Some(bar) = rx.recv().await {
        if bar.high < bar.low {
            warn!(pair = %bar.pair, time = bar.close_time, "malformed bar dropped");
            continue;
        }
        engine::ingest(ctx, &bar);
        for request in ctx.outbox.drain(..) {
            venue.submit(request);
        }
    }
}
