//! Liquidity points: bounded-window price extrema.
//!
//! Points are generated from closed windows (previous local day, previous
//! week, ended session or work time), one per validated side, and then
//! live on: touched, hunted, consumed by setups, and eventually failed by
//! the invalidation rule table.

use std::fmt;

use chrono::{Datelike, Days, NaiveTime, TimeZone, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::candle::{Candle, CandleStore};
use crate::ring::{RingStore, StoreItem};
use crate::settings::Settings;
use crate::types::{Direction, PairPeriod, Stamp, TimeRange, TriggerKind, TriggerStatus};

/// Which window family produced a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquidityMode {
    Daily,
    Weekly,
    BySession,
    ByWorktime,
}

impl LiquidityMode {
    pub fn requires_pullback(self) -> bool {
        matches!(self, LiquidityMode::BySession | LiquidityMode::ByWorktime)
    }
}

impl fmt::Display for LiquidityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiquidityMode::Daily => write!(f, "daily"),
            LiquidityMode::Weekly => write!(f, "weekly"),
            LiquidityMode::BySession => write!(f, "by-session"),
            LiquidityMode::ByWorktime => write!(f, "by-worktime"),
        }
    }
}

/// One consumption of a point by a setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityUsage {
    pub setup_id: u64,
    pub kind: TriggerKind,
    pub status: TriggerStatus,
    pub time: Stamp,
}

/// A price level where resting orders are assumed to sit.
///
/// `failed` and `hunted_at` are monotonic: once set they are never
/// cleared, and a failed point is skipped by every downstream consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPoint {
    pub id: u64,
    pub pair_period: PairPeriod,
    pub direction: Direction,
    pub mode: LiquidityMode,
    pub price: f64,
    /// First touch of the extreme price inside the window.
    pub formed_at: Stamp,
    /// The source window the extreme was taken from.
    pub window: TimeRange,
    /// Every candle time that printed the extreme price, oldest first.
    pub touches: Vec<Stamp>,
    pub hunted_at: Option<Stamp>,
    pub hunt_price: Option<f64>,
    pub failed: bool,
    pub used: Vec<LiquidityUsage>,
}

impl StoreItem for LiquidityPoint {
    fn id(&self) -> u64 {
        self.id
    }
}

impl LiquidityPoint {
    pub fn is_hunted(&self) -> bool {
        self.hunted_at.is_some()
    }

    pub fn used_total(&self) -> usize {
        self.used.len()
    }

    pub fn used_with_status(&self, status: TriggerStatus) -> usize {
        self.used.iter().filter(|u| u.status == status).count()
    }

    pub fn used_of_kind(&self, kind: TriggerKind) -> usize {
        self.used.iter().filter(|u| u.kind == kind).count()
    }

    pub fn used_of_kind_with_status(&self, kind: TriggerKind, status: TriggerStatus) -> usize {
        self.used
            .iter()
            .filter(|u| u.kind == kind && u.status == status)
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct LiquidityStore {
    pub ring: RingStore<LiquidityPoint>,
    next_id: u64,
}

impl LiquidityStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RingStore::new(capacity),
            next_id: 0,
        }
    }

    fn window_exists(&self, pair: &PairPeriod, mode: LiquidityMode, window: &TimeRange) -> bool {
        self.ring
            .iter()
            .any(|p| &p.pair_period == pair && p.mode == mode && &p.window == window)
    }

    fn point_exists(
        &self,
        pair: &PairPeriod,
        direction: Direction,
        mode: LiquidityMode,
        formed_at: i64,
    ) -> bool {
        self.ring.iter().any(|p| {
            &p.pair_period == pair
                && p.direction == direction
                && p.mode == mode
                && p.formed_at.unix == formed_at
        })
    }

    fn add(
        &mut self,
        pair: &PairPeriod,
        direction: Direction,
        mode: LiquidityMode,
        price: f64,
        window: TimeRange,
        touches: Vec<Stamp>,
    ) {
        let Some(first) = touches.first().copied() else {
            return;
        };
        if self.point_exists(pair, direction, mode, first.unix) {
            return;
        }
        self.next_id += 1;
        debug!(mode = %mode, %direction, price, pair = %pair, "liquidity point");
        self.ring.push(LiquidityPoint {
            id: self.next_id,
            pair_period: pair.clone(),
            direction,
            mode,
            price,
            formed_at: first,
            window,
            touches,
            hunted_at: None,
            hunt_price: None,
            failed: false,
            used: Vec::new(),
        });
    }

    /// The live (non-failed) hunted point with the most recent hunt.
    pub fn latest_hunted(&self, pair: &PairPeriod) -> Option<&LiquidityPoint> {
        self.ring
            .iter()
            .filter(|p| &p.pair_period == pair && !p.failed && p.is_hunted())
            .max_by_key(|p| p.hunted_at.map(|s| s.unix))
    }

    /// Irreversibly fail a point. No-op when already failed.
    pub fn mark_failed(&mut self, id: u64, reason: &str) {
        self.ring.update_by_id(id, |p| {
            if !p.failed {
                p.failed = true;
                debug!(id, reason, "liquidity point failed");
            }
        });
    }

    /// Irreversibly record the hunt. No-op when already hunted.
    pub fn mark_hunted(&mut self, id: u64, at: Stamp, price: f64) {
        self.ring.update_by_id(id, |p| {
            if p.hunted_at.is_none() {
                p.hunted_at = Some(at);
                p.hunt_price = Some(price);
            }
        });
    }

    pub fn record_usage(&mut self, id: u64, usage: LiquidityUsage) {
        self.ring.update_by_id(id, |p| p.used.push(usage));
    }

    /// Rewrite the status of the usage entry a setup created earlier.
    pub fn set_usage_status(
        &mut self,
        id: u64,
        setup_id: u64,
        kind: TriggerKind,
        status: TriggerStatus,
        time: Stamp,
    ) {
        self.ring.update_by_id(id, |p| {
            if let Some(u) = p
                .used
                .iter_mut()
                .find(|u| u.setup_id == setup_id && u.kind == kind)
            {
                u.status = status;
                u.time = time;
            }
        });
    }
}

/// The configured reference timezone for day/week boundaries.
pub fn reference_tz(settings: &Settings) -> Tz {
    settings
        .str("BotTimezone")
        .and_then(|name| name.parse().ok())
        .unwrap_or(chrono_tz::America::New_York)
}

/// Both extremes of a candle run with their full touch lists.
struct Extremes {
    high: f64,
    high_touches: Vec<Stamp>,
    low: f64,
    low_touches: Vec<Stamp>,
}

fn extremes(candles: &[&Candle]) -> Option<Extremes> {
    let first = candles.first()?;
    let mut ext = Extremes {
        high: first.high,
        high_touches: vec![first.time],
        low: first.low,
        low_touches: vec![first.time],
    };
    for c in &candles[1..] {
        if c.high > ext.high {
            ext.high = c.high;
            ext.high_touches = vec![c.time];
        } else if c.high == ext.high {
            ext.high_touches.push(c.time);
        }
        if c.low < ext.low {
            ext.low = c.low;
            ext.low_touches = vec![c.time];
        } else if c.low == ext.low {
            ext.low_touches.push(c.time);
        }
    }
    Some(ext)
}

/// Pullback confirmation for session/work-time points: after the first
/// touch, price must have retreated by `range / (100 / percent)` from the
/// extreme. A non-positive percent disables the requirement.
fn pullback_confirmed(
    candles: &[&Candle],
    direction: Direction,
    extreme: f64,
    first_touch: i64,
    span: f64,
    settings: &Settings,
) -> bool {
    let percent = settings.int_or("LiquidityPullbackPercent", 30);
    if percent <= 0 {
        return true;
    }
    if span <= 0.0 {
        return false;
    }
    let depth = span / (100.0 / percent as f64);
    candles.iter().any(|c| {
        c.time.unix >= first_touch
            && match direction {
                Direction::Up => c.low <= extreme - depth,
                Direction::Down => c.high >= extreme + depth,
            }
    })
}

/// Generate up to two points (one per side) from one closed window.
/// Idempotent: a window already harvested, or a side whose formation
/// time already has a point, produces nothing.
pub fn generate_for_window(
    candles: &CandleStore,
    liquidity: &mut LiquidityStore,
    settings: &Settings,
    pair: &PairPeriod,
    mode: LiquidityMode,
    window: TimeRange,
) {
    if liquidity.window_exists(pair, mode, &window) {
        return;
    }
    let in_window = candles.between(pair, window.start.unix, window.end.unix);
    let Some(ext) = extremes(&in_window) else {
        return;
    };
    let span = ext.high - ext.low;

    let up_ok = !mode.requires_pullback()
        || ext.high_touches.first().is_some_and(|first| {
            pullback_confirmed(&in_window, Direction::Up, ext.high, first.unix, span, settings)
        });
    if up_ok {
        liquidity.add(pair, Direction::Up, mode, ext.high, window, ext.high_touches);
    }

    let down_ok = !mode.requires_pullback()
        || ext.low_touches.first().is_some_and(|first| {
            pullback_confirmed(&in_window, Direction::Down, ext.low, first.unix, span, settings)
        });
    if down_ok {
        liquidity.add(pair, Direction::Down, mode, ext.low, window, ext.low_touches);
    }
}

/// Daily generation: runs only on the candle landing exactly on local
/// midnight in the reference timezone, over the previous local day.
pub fn generate_daily(
    candles: &CandleStore,
    liquidity: &mut LiquidityStore,
    settings: &Settings,
    candle: &Candle,
) {
    let tz = reference_tz(settings);
    let local = candle.time.utc.with_timezone(&tz);
    if local.time() != NaiveTime::MIN {
        return;
    }
    let Some(window) = previous_local_day(&tz, candle) else {
        return;
    };
    generate_for_window(
        candles,
        liquidity,
        settings,
        &candle.pair_period,
        LiquidityMode::Daily,
        window,
    );
}

/// Weekly generation: runs only on the local start-of-week midnight
/// candle (weeks start Sunday), over the previous week.
pub fn generate_weekly(
    candles: &CandleStore,
    liquidity: &mut LiquidityStore,
    settings: &Settings,
    candle: &Candle,
) {
    let tz = reference_tz(settings);
    let local = candle.time.utc.with_timezone(&tz);
    if local.time() != NaiveTime::MIN || local.weekday() != Weekday::Sun {
        return;
    }
    let Some(start_date) = local
        .date_naive()
        .checked_sub_days(Days::new(7)) else {
        return;
    };
    let Some(start) = tz
        .from_local_datetime(&start_date.and_time(NaiveTime::MIN))
        .single()
    else {
        return;
    };
    let window = TimeRange::new(start.timestamp(), candle.time.unix - 1);
    generate_for_window(
        candles,
        liquidity,
        settings,
        &candle.pair_period,
        LiquidityMode::Weekly,
        window,
    );
}

fn previous_local_day(tz: &Tz, candle: &Candle) -> Option<TimeRange> {
    let local = candle.time.utc.with_timezone(tz);
    let prev = local.date_naive().pred_opt()?;
    let start = tz
        .from_local_datetime(&prev.and_time(NaiveTime::MIN))
        .single()?;
    Some(TimeRange::new(start.timestamp(), candle.time.unix - 1))
}
