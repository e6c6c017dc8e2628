//! Shared domain primitives used across the engine modules.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pip scale for 4-decimal FX quotes.
pub const PIP_SCALE: f64 = 10_000.0;

/// Price difference expressed in pips.
pub fn to_pips(diff: f64) -> f64 {
    diff * PIP_SCALE
}

/// Instrument identity: symbol plus bar period in minutes.
///
/// Every store is shared across instruments; entities carry their
/// `PairPeriod` and engines filter on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairPeriod {
    pub pair: String,
    pub period: u32,
}

impl PairPeriod {
    pub fn new(pair: impl Into<String>, period: u32) -> Self {
        Self {
            pair: pair.into(),
            period,
        }
    }
}

impl fmt::Display for PairPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}m", self.pair, self.period)
    }
}

/// Trade side of a liquidity point or setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
        }
    }
}

/// Per-candle direction label derived from the bar's own pip span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleDirection {
    Up,
    Down,
    Idle,
}

impl fmt::Display for CandleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandleDirection::Up => write!(f, "UP"),
            CandleDirection::Down => write!(f, "DOWN"),
            CandleDirection::Idle => write!(f, "IDLE"),
        }
    }
}

/// Local-extremum class of a candle within its 3-bar window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeepKind {
    Low,
    High,
    Both,
}

impl DeepKind {
    pub fn has_low(self) -> bool {
        matches!(self, DeepKind::Low | DeepKind::Both)
    }

    pub fn has_high(self) -> bool {
        matches!(self, DeepKind::High | DeepKind::Both)
    }
}

/// Which detector produced a setup / consumed a liquidity point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerKind {
    /// Driven-pattern detector slot. No such detector runs here, but the
    /// liquidity invalidation table carries its per-kind rules.
    Driven,
    Mss,
    Cob,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Driven => write!(f, "DRIVEN"),
            TriggerKind::Mss => write!(f, "MSS"),
            TriggerKind::Cob => write!(f, "COB"),
        }
    }
}

/// Lifecycle state of a setup (MSS or COB).
///
/// `Found -> Triggered -> {Stoploss | Takeprofit}` is the only forward
/// path; `Failed` is reachable from `Found` and `Triggered` and every
/// state past `Triggered` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerStatus {
    Found,
    Triggered,
    Stoploss,
    Takeprofit,
    Failed,
}

impl TriggerStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TriggerStatus::Found | TriggerStatus::Triggered)
    }
}

impl fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerStatus::Found => write!(f, "FOUND"),
            TriggerStatus::Triggered => write!(f, "TRIGGERED"),
            TriggerStatus::Stoploss => write!(f, "STOPLOSS"),
            TriggerStatus::Takeprofit => write!(f, "TAKEPROFIT"),
            TriggerStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Final state of a signal in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalStatus {
    Triggered,
    Stoploss,
    Takeprofit,
    /// The owning setup failed after triggering; the signal is closed
    /// without a stop or target outcome.
    Closed,
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalStatus::Triggered => write!(f, "TRIGGERED"),
            SignalStatus::Stoploss => write!(f, "STOPLOSS"),
            SignalStatus::Takeprofit => write!(f, "TAKEPROFIT"),
            SignalStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

/// How a setup's FOUND state converts to TRIGGERED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    /// A FOUND setup triggers unconditionally on its next evaluation.
    Live,
    /// A FOUND setup triggers only when the bar actually reaches the limit.
    Backtest,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Live => write!(f, "live"),
            RunMode::Backtest => write!(f, "backtest"),
        }
    }
}

/// A point in time carried in both unix-seconds and UTC calendar form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub unix: i64,
    pub utc: DateTime<Utc>,
}

impl Stamp {
    pub fn from_unix(unix: i64) -> Self {
        Self {
            unix,
            utc: DateTime::from_timestamp(unix, 0).unwrap_or(DateTime::UNIX_EPOCH),
        }
    }

    pub fn from_utc(utc: DateTime<Utc>) -> Self {
        Self {
            unix: utc.timestamp(),
            utc,
        }
    }
}

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Stamp,
    pub end: Stamp,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            start: Stamp::from_unix(start),
            end: Stamp::from_unix(end),
        }
    }

    pub fn contains(&self, unix: i64) -> bool {
        self.start.unix <= unix && unix <= self.end.unix
    }
}

/// One raw OHLC bar as delivered by a feed or repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub pair: String,
    pub period: u32,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Bar close time, unix seconds.
    pub close_time: i64,
}

impl RawBar {
    pub fn pair_period(&self) -> PairPeriod {
        PairPeriod::new(self.pair.clone(), self.period)
    }
}

/// Position-open intent handed to the order venue in live mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRequest {
    pub pair: String,
    pub direction: Direction,
    pub volume: f64,
    pub entry: f64,
    pub stoploss: f64,
    pub takeprofit: f64,
}
