//! The per-bar pipeline.
//!
//! Bars enter through [`ingest`], one at a time, in time order. Each bar
//! runs every stage in a fixed sequence over shared state; nothing else
//! mutates the stores. Feeding a stream bar-by-bar and feeding the same
//! bars in batches or chunks must leave identical state.

pub mod candle;
pub mod cob;
pub mod hunt;
pub mod liquidity;
pub mod mss;
pub mod pattern;
pub mod rules;
pub mod session;
pub mod signal;

use tracing::trace;

use crate::context::Context;
use crate::engine::candle::Candle;
use crate::engine::liquidity::LiquidityMode;
use crate::engine::session::MicroKind;
use crate::types::{RawBar, TimeRange};

/// Ingest one bar: store and classify the candle, then run every
/// pipeline stage. Returns the stored candle.
pub fn ingest(ctx: &mut Context, bar: &RawBar) -> Candle {
    let candle = ctx.candles.add(bar, &ctx.settings);
    ctx.candles.classify_deep(&candle.pair_period);
    run_bar(ctx, &candle);
    candle
}

/// Ingest a slice of bars sequentially.
pub fn ingest_batch(ctx: &mut Context, bars: &[RawBar]) {
    for bar in bars {
        ingest(ctx, bar);
    }
}

fn run_bar(ctx: &mut Context, candle: &Candle) {
    trace!(pair = %candle.pair_period, time = candle.time.unix, "bar");
    let now = candle.time.unix;

    if let Some(resolved) = ctx.sessions.resolve(now) {
        if resolved.created {
            ctx.micros.observe(MicroKind::Session, resolved.range);
        }
    }
    if let Some(resolved) = ctx.worktimes.resolve(now) {
        if resolved.created {
            ctx.micros.observe(MicroKind::Worktime, resolved.range);
        }
    }

    liquidity::generate_daily(&ctx.candles, &mut ctx.liquidity, &ctx.settings, candle);
    liquidity::generate_weekly(&ctx.candles, &mut ctx.liquidity, &ctx.settings, candle);

    for (windows, mode) in [
        (&ctx.sessions, LiquidityMode::BySession),
        (&ctx.worktimes, LiquidityMode::ByWorktime),
    ] {
        let closed: Vec<TimeRange> = windows
            .windows
            .iter()
            .filter(|w| now > w.range.end.unix)
            .map(|w| w.range)
            .collect();
        for range in closed {
            liquidity::generate_for_window(
                &ctx.candles,
                &mut ctx.liquidity,
                &ctx.settings,
                &candle.pair_period,
                mode,
                range,
            );
        }
    }

    rules::validate(
        &mut ctx.liquidity,
        &ctx.micros,
        &ctx.settings,
        &candle.pair_period,
    );

    cob::initiate(
        &mut ctx.blocks,
        &ctx.candles,
        &ctx.liquidity,
        &ctx.settings,
        candle,
    );
    pattern::evaluate(
        &mut ctx.blocks,
        &ctx.candles,
        &mut ctx.liquidity,
        &mut ctx.signals,
        &mut ctx.outbox,
        &ctx.settings,
        ctx.mode,
        candle,
        cob::fail_rules(),
    );

    mss::initiate(
        &mut ctx.shifts,
        &ctx.candles,
        &ctx.liquidity,
        &ctx.settings,
        candle,
    );
    pattern::evaluate(
        &mut ctx.shifts,
        &ctx.candles,
        &mut ctx.liquidity,
        &mut ctx.signals,
        &mut ctx.outbox,
        &ctx.settings,
        ctx.mode,
        candle,
        mss::fail_rules(),
    );

    hunt::scan(&ctx.candles, &mut ctx.liquidity, candle);
}
