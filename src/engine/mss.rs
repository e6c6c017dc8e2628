//! Market structure shift detection.
//!
//! After a liquidity point is hunted, the market is expected to reverse.
//! The detector anchors on a pair of deep candles printed since the hunt:
//! the main deep (the extreme against the swept side) and the nearest
//! prior deep on the opposite side, whose extreme becomes the entry limit.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::candle::{Candle, CandleStore};
use crate::engine::liquidity::LiquidityStore;
use crate::engine::pattern::{target_price, FailRule, Levels, PatternSetup, SetupStore};
use crate::ring::StoreItem;
use crate::settings::Settings;
use crate::types::{Direction, PairPeriod, Stamp, TriggerKind, TriggerStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureShift {
    pub id: u64,
    pub pair_period: PairPeriod,
    pub direction: Direction,
    pub levels: Levels,
    pub liquidity_id: u64,
    pub main_deep_id: u64,
    pub second_deep_id: u64,
    pub triggered_by: Option<u64>,
    pub status: TriggerStatus,
    pub formed_at: Stamp,
}

impl StoreItem for StructureShift {
    fn id(&self) -> u64 {
        self.id
    }
}

impl PatternSetup for StructureShift {
    const KIND: TriggerKind = TriggerKind::Mss;

    fn pair_period(&self) -> &PairPeriod {
        &self.pair_period
    }
    fn direction(&self) -> Direction {
        self.direction
    }
    fn levels(&self) -> &Levels {
        &self.levels
    }
    fn liquidity_id(&self) -> u64 {
        self.liquidity_id
    }
    fn status(&self) -> TriggerStatus {
        self.status
    }
    fn set_status(&mut self, status: TriggerStatus) {
        self.status = status;
    }
    fn set_triggered_by(&mut self, candle_id: u64) {
        self.triggered_by = Some(candle_id);
    }
}

/// The deep extreme against the swept side: highest deep HIGH for a
/// falling shift, lowest deep LOW for a rising one.
fn main_deep<'a>(scanned: &[&'a Candle], direction: Direction) -> Option<&'a Candle> {
    match direction {
        Direction::Down => scanned
            .iter()
            .filter(|c| c.deep.is_some_and(|d| d.has_high()))
            .copied()
            .max_by(|a, b| a.high.total_cmp(&b.high)),
        Direction::Up => scanned
            .iter()
            .filter(|c| c.deep.is_some_and(|d| d.has_low()))
            .copied()
            .min_by(|a, b| a.low.total_cmp(&b.low)),
    }
}

/// The nearest opposite-side deep printed before the main deep.
fn second_deep<'a>(
    scanned: &[&'a Candle],
    direction: Direction,
    main: &Candle,
) -> Option<&'a Candle> {
    scanned
        .iter()
        .rev()
        .filter(|c| c.time.unix < main.time.unix)
        .find(|c| match direction {
            Direction::Down => c.deep.is_some_and(|d| d.has_low()),
            Direction::Up => c.deep.is_some_and(|d| d.has_high()),
        })
        .copied()
}

/// Look for a new shift against the most recently hunted point.
pub fn initiate(
    setups: &mut SetupStore<StructureShift>,
    candles: &CandleStore,
    liquidity: &LiquidityStore,
    settings: &Settings,
    candle: &Candle,
) {
    let pair = &candle.pair_period;
    let Some(point) = liquidity.latest_hunted(pair) else {
        return;
    };
    let Some(hunted_at) = point.hunted_at else {
        return;
    };
    let direction = point.direction.opposite();
    let scanned = candles.since(pair, hunted_at.unix);

    let Some(main) = main_deep(&scanned, direction) else {
        return;
    };
    let Some(second) = second_deep(&scanned, direction, main) else {
        return;
    };
    if setups
        .ring
        .iter()
        .any(|s| s.liquidity_id == point.id && s.main_deep_id == main.id)
    {
        return;
    }

    let sl_err = settings.float_or("SignalStopLossError", 0.005);
    let (limit, stoploss) = match direction {
        Direction::Down => (second.low, main.high + sl_err),
        Direction::Up => (second.high, main.low - sl_err),
    };
    let takeprofit = target_price(limit, stoploss, settings);
    let Some(levels) = Levels::new(limit, stoploss, takeprofit) else {
        return;
    };

    let id = setups.alloc_id();
    debug!(
        id,
        %direction,
        limit,
        stoploss,
        takeprofit,
        liquidity = point.id,
        "structure shift found"
    );
    setups.ring.push(StructureShift {
        id,
        pair_period: pair.clone(),
        direction,
        levels,
        liquidity_id: point.id,
        main_deep_id: main.id,
        second_deep_id: second.id,
        triggered_by: None,
        status: TriggerStatus::Found,
        formed_at: candle.time,
    });
}

fn big_height(
    setup: &StructureShift,
    _candles: &CandleStore,
    settings: &Settings,
) -> Option<&'static str> {
    let limit = settings.int_or("MSSBigHeightLimit", 11) as f64;
    (setup.levels.height_pips() >= limit).then_some("big-height")
}

fn anchors_evicted(
    setup: &StructureShift,
    candles: &CandleStore,
    _settings: &Settings,
) -> Option<&'static str> {
    (candles.get(setup.main_deep_id).is_none() || candles.get(setup.second_deep_id).is_none())
        .then_some("anchor-evicted")
}

/// Failure rules evaluated by the shared machine each bar.
pub fn fail_rules() -> &'static [FailRule<StructureShift>] {
    &[big_height, anchors_evicted]
}
