//! Candle order block detection.
//!
//! A block is read off the newest candles directly: a run of same-direction
//! body candles, a confirm candle that breaks the run, and a start candle a
//! fixed distance behind it. Levels come from the block's own extremes.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::candle::{Candle, CandleStore};
use crate::engine::liquidity::LiquidityStore;
use crate::engine::pattern::{target_price, FailRule, Levels, PatternSetup, SetupStore};
use crate::ring::StoreItem;
use crate::settings::Settings;
use crate::types::{CandleDirection, Direction, PairPeriod, Stamp, TriggerKind, TriggerStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBlock {
    pub id: u64,
    pub pair_period: PairPeriod,
    pub direction: Direction,
    pub levels: Levels,
    pub liquidity_id: u64,
    pub confirm_id: u64,
    pub body_ids: Vec<u64>,
    pub start_id: u64,
    pub triggered_by: Option<u64>,
    pub status: TriggerStatus,
    pub formed_at: Stamp,
}

impl StoreItem for OrderBlock {
    fn id(&self) -> u64 {
        self.id
    }
}

impl PatternSetup for OrderBlock {
    const KIND: TriggerKind = TriggerKind::Cob;

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

/// The candidate window, newest-first: confirm, body run, post-start
/// padding, start candle.
struct BlockWindow<'a> {
    confirm: &'a Candle,
    body: Vec<&'a Candle>,
    start: &'a Candle,
    direction: Direction,
}

fn block_window<'a>(window: &[&'a Candle], body_count: usize) -> Option<BlockWindow<'a>> {
    let confirm = window[0];
    let body: Vec<&Candle> = window[1..=body_count].to_vec();
    let start = window[window.len() - 1];

    let body_dir = body[0].direction;
    let same_run = body.iter().all(|c| c.direction == body_dir);
    if !same_run || body_dir == CandleDirection::Idle {
        return None;
    }
    if confirm.direction == body_dir {
        return None;
    }
    if start.direction != CandleDirection::Idle && start.direction != confirm.direction {
        return None;
    }
    let direction = match body_dir {
        CandleDirection::Up => Direction::Down,
        CandleDirection::Down => Direction::Up,
        CandleDirection::Idle => return None,
    };
    Some(BlockWindow {
        confirm,
        body,
        start,
        direction,
    })
}

/// Look for a new block ending at the newest candle.
pub fn initiate(
    setups: &mut SetupStore<OrderBlock>,
    candles: &CandleStore,
    liquidity: &LiquidityStore,
    settings: &Settings,
    candle: &Candle,
) {
    let pair = &candle.pair_period;
    let Some(point) = liquidity.latest_hunted(pair) else {
        return;
    };
    let body_count = settings.int_or("COBBodyCount", 3).max(1) as usize;
    let post_start = settings.int_or("COBPostStartCount", 1).max(0) as usize;
    let size = 2 + body_count + post_start;
    let window = candles.recent(pair, size);
    if window.len() < size {
        return;
    }
    let Some(block) = block_window(&window, body_count) else {
        return;
    };
    if setups
        .ring
        .iter()
        .any(|s| s.liquidity_id == point.id && s.confirm_id == block.confirm.id)
    {
        return;
    }

    let block_candles = || std::iter::once(block.confirm).chain(block.body.iter().copied());
    let (limit, stoploss) = match block.direction {
        Direction::Up => (
            block_candles().map(|c| c.low).fold(f64::INFINITY, f64::min),
            block.confirm.high,
        ),
        Direction::Down => (
            block_candles().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max),
            block.confirm.low,
        ),
    };
    let takeprofit = target_price(limit, stoploss, settings);
    let Some(levels) = Levels::new(limit, stoploss, takeprofit) else {
        return;
    };

    let id = setups.alloc_id();
    debug!(
        id,
        direction = %block.direction,
        limit,
        stoploss,
        takeprofit,
        liquidity = point.id,
        "order block found"
    );
    setups.ring.push(OrderBlock {
        id,
        pair_period: pair.clone(),
        direction: block.direction,
        levels,
        liquidity_id: point.id,
        confirm_id: block.confirm.id,
        body_ids: block.body.iter().map(|c| c.id).collect(),
        start_id: block.start.id,
        triggered_by: None,
        status: TriggerStatus::Found,
        formed_at: candle.time,
    });
}

fn big_height(
    setup: &OrderBlock,
    _candles: &CandleStore,
    settings: &Settings,
) -> Option<&'static str> {
    if !settings.bool_or("COBFailOnBigHeight", false) {
        return None;
    }
    let limit = settings.int_or("COBStopHeightLimit", 10) as f64;
    (setup.levels.height_pips() >= limit).then_some("big-height")
}

fn anchors_evicted(
    setup: &OrderBlock,
    candles: &CandleStore,
    _settings: &Settings,
) -> Option<&'static str> {
    let gone = candles.get(setup.confirm_id).is_none()
        || candles.get(setup.start_id).is_none()
        || setup.body_ids.iter().any(|id| candles.get(*id).is_none());
    gone.then_some("anchor-evicted")
}

/// Failure rules evaluated by the shared machine each bar.
pub fn fail_rules() -> &'static [FailRule<OrderBlock>] {
    &[big_height, anchors_evicted]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::liquidity::{LiquidityMode, LiquidityPoint};
    use crate::types::{RawBar, TimeRange};

    fn pp() -> PairPeriod {
        PairPeriod::new("EURUSD", 1)
    }

    fn bar(close_time: i64, high: f64, low: f64) -> RawBar {
        RawBar {
            pair: "EURUSD".into(),
            period: 1,
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            close_time,
        }
    }

    /// An idle bar under the span-based direction rule: zero range.
    fn idle_bar(close_time: i64, price: f64) -> RawBar {
        bar(close_time, price, price)
    }

    fn hunted_point(id: u64) -> LiquidityPoint {
        LiquidityPoint {
            id,
            pair_period: pp(),
            direction: Direction::Up,
            mode: LiquidityMode::Daily,
            price: 1.1002,
            formed_at: Stamp::from_unix(10),
            window: TimeRange::new(0, 50),
            touches: vec![Stamp::from_unix(10)],
            hunted_at: Some(Stamp::from_unix(55)),
            hunt_price: Some(1.1005),
            failed: false,
            used: Vec::new(),
        }
    }

    /// start(idle), post, three UP body bars, idle confirm.
    fn feed_block(candles: &mut CandleStore, settings: &Settings) {
        candles.add(&idle_bar(60, 1.1000), settings);
        candles.add(&bar(120, 1.1010, 1.0990), settings);
        candles.add(&bar(180, 1.1020, 1.1005), settings);
        candles.add(&bar(240, 1.1030, 1.1008), settings);
        candles.add(&bar(300, 1.1040, 1.1010), settings);
        candles.add(&idle_bar(360, 1.1015), settings);
    }

    fn run_initiate(
        candles: &CandleStore,
        setups: &mut SetupStore<OrderBlock>,
        liquidity: &LiquidityStore,
        settings: &Settings,
    ) {
        let newest = candles.ring.newest().unwrap().clone();
        initiate(setups, candles, liquidity, settings, &newest);
    }

    #[test]
    fn test_initiate_builds_block_levels() {
        let settings = Settings::seeded();
        let mut candles = CandleStore::new(50);
        let mut setups = SetupStore::new(10);
        let mut liquidity = LiquidityStore::new(10);
        liquidity.ring.push(hunted_point(1));
        feed_block(&mut candles, &settings);

        run_initiate(&candles, &mut setups, &liquidity, &settings);
        assert_eq!(setups.ring.len(), 1);
        let block = setups.ring.newest().unwrap();
        // UP body run breaks down: falling block.
        assert_eq!(block.direction, Direction::Down);
        assert!((block.levels.limit - 1.1040).abs() < 1e-9);
        assert!((block.levels.stoploss - 1.1015).abs() < 1e-9);
        assert!((block.levels.takeprofit - 1.1140).abs() < 1e-9);
        assert_eq!(block.body_ids.len(), 3);
        assert_eq!(block.confirm_id, 6);
        assert_eq!(block.start_id, 1);
    }

    #[test]
    fn test_initiate_dedupes_on_confirm() {
        let settings = Settings::seeded();
        let mut candles = CandleStore::new(50);
        let mut setups = SetupStore::new(10);
        let mut liquidity = LiquidityStore::new(10);
        liquidity.ring.push(hunted_point(1));
        feed_block(&mut candles, &settings);
        run_initiate(&candles, &mut setups, &liquidity, &settings);
        run_initiate(&candles, &mut setups, &liquidity, &settings);
        assert_eq!(setups.ring.len(), 1);
    }

    #[test]
    fn test_mixed_body_run_rejected() {
        let settings = Settings::seeded();
        let mut candles = CandleStore::new(50);
        let mut setups = SetupStore::new(10);
        let mut liquidity = LiquidityStore::new(10);
        liquidity.ring.push(hunted_point(1));
        candles.add(&idle_bar(60, 1.1000), &settings);
        candles.add(&bar(120, 1.1010, 1.0990), &settings);
        candles.add(&bar(180, 1.1020, 1.1005), &settings);
        // Idle bar inside the body run.
        candles.add(&idle_bar(240, 1.1030), &settings);
        candles.add(&bar(300, 1.1040, 1.1010), &settings);
        candles.add(&idle_bar(360, 1.1015), &settings);
        run_initiate(&candles, &mut setups, &liquidity, &settings);
        assert!(setups.ring.is_empty());
    }

    #[test]
    fn test_confirm_must_break_the_run() {
        let settings = Settings::seeded();
        let mut candles = CandleStore::new(50);
        let mut setups = SetupStore::new(10);
        let mut liquidity = LiquidityStore::new(10);
        liquidity.ring.push(hunted_point(1));
        candles.add(&idle_bar(60, 1.1000), &settings);
        candles.add(&bar(120, 1.1010, 1.0990), &settings);
        candles.add(&bar(180, 1.1020, 1.1005), &settings);
        candles.add(&bar(240, 1.1030, 1.1008), &settings);
        candles.add(&bar(300, 1.1040, 1.1010), &settings);
        // Confirm continues the UP run.
        candles.add(&bar(360, 1.1050, 1.1020), &settings);
        run_initiate(&candles, &mut setups, &liquidity, &settings);
        assert!(setups.ring.is_empty());
    }

    #[test]
    fn test_no_hunted_liquidity_means_no_block() {
        let settings = Settings::seeded();
        let mut candles = CandleStore::new(50);
        let mut setups = SetupStore::new(10);
        let liquidity = LiquidityStore::new(10);
        feed_block(&mut candles, &settings);
        run_initiate(&candles, &mut setups, &liquidity, &settings);
        assert!(setups.ring.is_empty());
    }

    #[test]
    fn test_height_rule_only_when_enabled() {
        let mut settings = Settings::seeded();
        let candles = CandleStore::new(10);
        let block = OrderBlock {
            id: 1,
            pair_period: pp(),
            direction: Direction::Down,
            // 25-pip height: over the 10-pip limit.
            levels: Levels::new(1.1040, 1.1015, 1.1140).unwrap(),
            liquidity_id: 1,
            confirm_id: 6,
            body_ids: vec![3, 4, 5],
            start_id: 1,
            triggered_by: None,
            status: TriggerStatus::Found,
            formed_at: Stamp::from_unix(360),
        };
        assert_eq!(big_height(&block, &candles, &settings), None);
        settings.set("COBFailOnBigHeight", "1", crate::settings::ParseTo::Bool);
        assert_eq!(big_height(&block, &candles, &settings), Some("big-height"));
    }

    #[test]
    fn test_anchor_eviction_checks_every_member() {
        let settings = Settings::seeded();
        let mut candles = CandleStore::new(50);
        feed_block(&mut candles, &settings);
        let block = OrderBlock {
            id: 1,
            pair_period: pp(),
            direction: Direction::Down,
            levels: Levels::new(1.1040, 1.1015, 1.1140).unwrap(),
            liquidity_id: 1,
            confirm_id: 6,
            body_ids: vec![3, 4, 5],
            start_id: 1,
            triggered_by: None,
            status: TriggerStatus::Found,
            formed_at: Stamp::from_unix(360),
        };
        assert_eq!(anchors_evicted(&block, &candles, &settings), None);
        let mut missing_body = block.clone();
        missing_body.body_ids = vec![3, 999, 5];
        assert_eq!(
            anchors_evicted(&missing_body, &candles, &settings),
            Some("anchor-evicted")
        );
    }
}
