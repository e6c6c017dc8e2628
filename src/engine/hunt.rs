//! Hunt detection: the moment price pierces a liquidity point.
//!
//! A point only becomes huntable after its source window has fully
//! closed. The first candle strictly piercing the level wins, and the
//! hunt is recorded once, irreversibly.

use tracing::debug;

use crate::engine::candle::{Candle, CandleStore};
use crate::engine::liquidity::LiquidityStore;
use crate::types::Direction;

/// Scan every live, unhunted point of the bar's instrument.
pub fn scan(candles: &CandleStore, liquidity: &mut LiquidityStore, candle: &Candle) {
    let pair = &candle.pair_period;
    let pending: Vec<(u64, Direction, f64, i64)> = liquidity
        .ring
        .iter()
        .filter(|p| {
            &p.pair_period == pair
                && !p.failed
                && !p.is_hunted()
                && candle.time.unix > p.window.end.unix
        })
        .map(|p| (p.id, p.direction, p.price, p.window.end.unix))
        .collect();

    for (id, direction, price, window_end) in pending {
        // A bar closing exactly on the window end can be the hunter;
        // scanning only starts once a later bar has arrived.
        let hit = candles
            .since(pair, window_end)
            .into_iter()
            .find_map(|c| match direction {
                Direction::Up if c.high > price => Some((c.time, c.high)),
                Direction::Down if c.low < price => Some((c.time, c.low)),
                _ => None,
            });
        if let Some((at, hunt_price)) = hit {
            debug!(id, %direction, price, hunt_price, "liquidity hunted");
            liquidity.mark_hunted(id, at, hunt_price);
        }
    }
}
