//! The shared setup state machine.
//!
//! MSS and COB produce the same kind of entity: three price levels plus a
//! lifecycle `FOUND -> TRIGGERED -> {STOPLOSS | TAKEPROFIT}` with `FAILED`
//! reachable from both live states. Everything below the level formulas is
//! common, so both detectors plug into this one evaluator via the
//! [`PatternSetup`] trait and a list of failure rules.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::candle::{Candle, CandleStore};
use crate::engine::liquidity::{LiquidityStore, LiquidityUsage};
use crate::engine::signal::{position_request, SignalStore};
use crate::ring::{RingStore, StoreItem};
use crate::settings::Settings;
use crate::types::{
    to_pips, Direction, PairPeriod, PositionRequest, RunMode, SignalStatus, TriggerKind,
    TriggerStatus,
};

/// The three prices of a setup. Entry side is derived from geometry:
/// a stop above the limit means price falls into the entry, a stop
/// below means it rises into it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Levels {
    pub limit: f64,
    pub stoploss: f64,
    pub takeprofit: f64,
    pub height: f64,
}

impl Levels {
    /// `None` when any price is non-positive or the stop sits on the
    /// limit (zero height).
    pub fn new(limit: f64, stoploss: f64, takeprofit: f64) -> Option<Self> {
        let height = (stoploss - limit).abs();
        (limit > 0.0 && stoploss > 0.0 && takeprofit > 0.0 && height > 0.0).then_some(Self {
            limit,
            stoploss,
            takeprofit,
            height,
        })
    }

    pub fn entry_from_above(&self) -> bool {
        self.stoploss > self.limit
    }

    pub fn height_pips(&self) -> f64 {
        to_pips(self.height)
    }

    pub fn limit_reached(&self, candle: &Candle) -> bool {
        if self.entry_from_above() {
            candle.low <= self.limit
        } else {
            candle.high >= self.limit
        }
    }

    pub fn stop_hit(&self, candle: &Candle) -> bool {
        if self.entry_from_above() {
            candle.high >= self.stoploss
        } else {
            candle.low <= self.stoploss
        }
    }

    pub fn target_hit(&self, candle: &Candle) -> bool {
        if self.entry_from_above() {
            candle.low <= self.takeprofit
        } else {
            candle.high >= self.takeprofit
        }
    }
}

/// Take-profit from the risk-reward multiple, pushed past the raw target
/// by the configured error buffer.
pub fn target_price(limit: f64, stoploss: f64, settings: &Settings) -> f64 {
    let rr = settings.float_or("RiskReward", 2.0);
    let err = settings.float_or("SignalTakeProfitError", 0.005);
    if stoploss > limit {
        limit - (stoploss - limit) * rr - err
    } else {
        limit + (limit - stoploss) * rr + err
    }
}

/// What a detector's entity must expose to the shared evaluator.
pub trait PatternSetup: StoreItem + Clone {
    const KIND: TriggerKind;

    fn pair_period(&self) -> &PairPeriod;
    fn direction(&self) -> Direction;
    fn levels(&self) -> &Levels;
    fn liquidity_id(&self) -> u64;
    fn status(&self) -> TriggerStatus;
    fn set_status(&mut self, status: TriggerStatus);
    /// Record the candle that converted FOUND to TRIGGERED.
    fn set_triggered_by(&mut self, candle_id: u64);
}

/// Detector-specific failure predicate; a `Some` reason fails the setup.
pub type FailRule<T> = fn(&T, &CandleStore, &Settings) -> Option<&'static str>;

/// Ring of setups plus the detector's id counter.
#[derive(Debug, Clone)]
pub struct SetupStore<T> {
    pub ring: RingStore<T>,
    next_id: u64,
}

impl<T: PatternSetup> SetupStore<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RingStore::new(capacity),
            next_id: 0,
        }
    }

    pub fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Advance every live setup of the bar's instrument by one bar.
///
/// Per setup: failure rules first, then the FOUND trigger check, then the
/// exit check with stop-loss strictly before take-profit. A setup that
/// triggers on this bar is exit-checked on this same bar.
#[allow(clippy::too_many_arguments)]
pub fn evaluate<T: PatternSetup>(
    setups: &mut SetupStore<T>,
    candles: &CandleStore,
    liquidity: &mut LiquidityStore,
    signals: &mut SignalStore,
    outbox: &mut Vec<PositionRequest>,
    settings: &Settings,
    mode: RunMode,
    candle: &Candle,
    fail_rules: &[FailRule<T>],
) {
    let live_ids: Vec<u64> = setups
        .ring
        .iter()
        .filter(|s| s.pair_period() == &candle.pair_period && !s.status().is_terminal())
        .map(|s| s.id())
        .collect();

    for id in live_ids {
        let Some(setup) = setups.ring.get_by_id(id) else {
            continue;
        };

        if let Some(reason) = fail_rules.iter().find_map(|rule| rule(setup, candles, settings)) {
            let was_triggered = setup.status() == TriggerStatus::Triggered;
            let liquidity_id = setup.liquidity_id();
            debug!(id, kind = %T::KIND, reason, "setup failed");
            setups.ring.update_by_id(id, |s| s.set_status(TriggerStatus::Failed));
            if was_triggered {
                signals.close(id, T::KIND, SignalStatus::Closed, candle.time);
                liquidity.set_usage_status(
                    liquidity_id,
                    id,
                    T::KIND,
                    TriggerStatus::Failed,
                    candle.time,
                );
            }
            continue;
        }

        if setup.status() == TriggerStatus::Found {
            let fires = match mode {
                RunMode::Live => true,
                RunMode::Backtest => setup.levels().limit_reached(candle),
            };
            if fires {
                let (pair, direction, levels, liquidity_id) = (
                    setup.pair_period().clone(),
                    setup.direction(),
                    *setup.levels(),
                    setup.liquidity_id(),
                );
                setups.ring.update_by_id(id, |s| {
                    s.set_status(TriggerStatus::Triggered);
                    s.set_triggered_by(candle.id);
                });
                let signal = signals.open(id, T::KIND, pair, direction, &levels, candle.time);
                liquidity.record_usage(
                    liquidity_id,
                    LiquidityUsage {
                        setup_id: id,
                        kind: T::KIND,
                        status: TriggerStatus::Triggered,
                        time: candle.time,
                    },
                );
                if mode == RunMode::Live {
                    if let Some(req) = position_request(&signal, settings) {
                        outbox.push(req);
                    }
                }
            }
        }

        let Some(setup) = setups.ring.get_by_id(id) else {
            continue;
        };
        if setup.status() != TriggerStatus::Triggered {
            continue;
        }
        let levels = *setup.levels();
        let liquidity_id = setup.liquidity_id();
        let outcome = if levels.stop_hit(candle) {
            Some((TriggerStatus::Stoploss, SignalStatus::Stoploss))
        } else if levels.target_hit(candle) {
            Some((TriggerStatus::Takeprofit, SignalStatus::Takeprofit))
        } else {
            None
        };
        if let Some((status, signal_status)) = outcome {
            debug!(id, kind = %T::KIND, %status, "setup closed");
            setups.ring.update_by_id(id, |s| s.set_status(status));
            signals.close(id, T::KIND, signal_status, candle.time);
            liquidity.set_usage_status(liquidity_id, id, T::KIND, status, candle.time);
        }
    }
}
