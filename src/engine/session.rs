//! Trading sessions and work times.
//!
//! Both are configured as clock records ("HH:MM" start/end, UTC,
//! cross-midnight allowed) loaded before the first bar. As bars arrive,
//! the record covering the bar's time is materialized into a concrete
//! per-day window; each newly materialized window is also recorded as a
//! micro window, which is what the liquidity age rules count.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::ring::{RingStore, StoreItem};
use crate::types::TimeRange;

const DAY_SECS: i64 = 86_400;

/// A wall-clock time of day, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTime {
    pub hour: u32,
    pub minute: u32,
}

impl ClockTime {
    /// Parse "HH:MM".
    pub fn parse(text: &str) -> Result<Self> {
        let (h, m) = text
            .split_once(':')
            .with_context(|| format!("clock time {text:?} is not HH:MM"))?;
        let hour: u32 = h.parse().with_context(|| format!("bad hour in {text:?}"))?;
        let minute: u32 = m.parse().with_context(|| format!("bad minute in {text:?}"))?;
        if hour > 23 || minute > 59 {
            bail!("clock time {text:?} out of range");
        }
        Ok(Self { hour, minute })
    }

    fn seconds_of_day(self) -> i64 {
        i64::from(self.hour) * 3600 + i64::from(self.minute) * 60
    }
}

/// A configured recurring window, e.g. "London 07:00-16:00".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockRecord {
    pub title: String,
    pub start: ClockTime,
    pub end: ClockTime,
}

impl ClockRecord {
    pub fn new(title: impl Into<String>, start: &str, end: &str) -> Result<Self> {
        Ok(Self {
            title: title.into(),
            start: ClockTime::parse(start)?,
            end: ClockTime::parse(end)?,
        })
    }

    /// The concrete window containing `unix`, if this record covers it.
    /// An end at or before the start means the window crosses midnight.
    pub fn window_at(&self, unix: i64) -> Option<TimeRange> {
        let day = unix - unix.rem_euclid(DAY_SECS);
        let sod = unix - day;
        let start = self.start.seconds_of_day();
        let end = self.end.seconds_of_day();
        if start <= end {
            (start..=end)
                .contains(&sod)
                .then(|| TimeRange::new(day + start, day + end))
        } else if sod >= start {
            Some(TimeRange::new(day + start, day + DAY_SECS + end))
        } else if sod <= end {
            Some(TimeRange::new(day - DAY_SECS + start, day + end))
        } else {
            None
        }
    }
}

/// One materialized per-day window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub id: u64,
    pub title: String,
    pub range: TimeRange,
}

impl StoreItem for Window {
    fn id(&self) -> u64 {
        self.id
    }
}

/// Result of resolving a bar time against a book: the covering window
/// and whether this call materialized it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved {
    pub range: TimeRange,
    pub created: bool,
}

/// Clock records plus the ring of windows materialized from them.
/// One book serves sessions, another work times.
#[derive(Debug, Clone)]
pub struct SessionBook {
    records: Vec<ClockRecord>,
    pub windows: RingStore<Window>,
    next_id: u64,
}

impl SessionBook {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            windows: RingStore::new(capacity),
            next_id: 0,
        }
    }

    pub fn load_records(&mut self, records: Vec<ClockRecord>) {
        self.records = records;
    }

    pub fn records(&self) -> &[ClockRecord] {
        &self.records
    }

    /// Resolve a bar time: when some record covers it, return the
    /// concrete window, materializing it once per day. Windows are
    /// deduplicated by their exact range.
    pub fn resolve(&mut self, unix: i64) -> Option<Resolved> {
        let (title, range) = self
            .records
            .iter()
            .find_map(|r| r.window_at(unix).map(|w| (r.title.clone(), w)))?;
        if self.windows.iter().any(|w| w.range == range) {
            return Some(Resolved {
                range,
                created: false,
            });
        }
        self.next_id += 1;
        self.windows.push(Window {
            id: self.next_id,
            title,
            range,
        });
        Some(Resolved {
            range,
            created: true,
        })
    }
}

/// Which book a micro window came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MicroKind {
    Session,
    Worktime,
}

/// One observed session or work-time occurrence. The liquidity age
/// rules fail a point once enough of these started after its window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroWindow {
    pub id: u64,
    pub kind: MicroKind,
    pub range: TimeRange,
}

impl StoreItem for MicroWindow {
    fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone)]
pub struct MicroBook {
    pub ring: RingStore<MicroWindow>,
    next_id: u64,
}

impl MicroBook {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RingStore::new(capacity),
            next_id: 0,
        }
    }

    /// Record one occurrence, deduplicated by kind and range.
    pub fn observe(&mut self, kind: MicroKind, range: TimeRange) {
        if self.ring.iter().any(|m| m.kind == kind && m.range == range) {
            return;
        }
        self.next_id += 1;
        self.ring.push(MicroWindow {
            id: self.next_id,
            kind,
            range,
        });
    }

    /// How many retained micro windows of a kind started at or after
    /// the given time.
    pub fn count_started_at_or_after(&self, kind: MicroKind, unix: i64) -> usize {
        self.ring
            .iter()
            .filter(|m| m.kind == kind && m.range.start.unix >= unix)
            .count()
    }
}
