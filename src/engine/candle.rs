//! Candle construction, direction labeling, and deep classification.

use serde::{Deserialize, Serialize};

use crate::ring::{RingStore, StoreItem};
use crate::settings::Settings;
use crate::types::{to_pips, CandleDirection, DeepKind, PairPeriod, RawBar, Stamp};

/// One enriched OHLC candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub id: u64,
    pub pair_period: PairPeriod,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub time: Stamp,
    pub direction: CandleDirection,
    /// Local-extremum class, written one bar later once both neighbors
    /// are known.
    pub deep: Option<DeepKind>,
}

impl StoreItem for Candle {
    fn id(&self) -> u64 {
        self.id
    }
}

/// Direction from the bar's own high-low pip span against the buffer.
///
/// The span of a well-formed bar is never negative, so with a positive
/// buffer DOWN is unreachable; wide bars are UP and narrow bars IDLE.
/// That is the live behavior downstream rules were tuned against, so it
/// is kept as-is rather than "fixed" to an open/close comparison.
pub fn direction_of(bar: &RawBar, settings: &Settings) -> CandleDirection {
    let buff = settings.float_or("CandleDirectionBuff", 0.1);
    let span = to_pips(bar.high - bar.low);
    if span > buff {
        CandleDirection::Up
    } else if span < -buff {
        CandleDirection::Down
    } else {
        CandleDirection::Idle
    }
}

/// Candle store: a ring of candles shared across instruments, plus the
/// id counter that makes this engine the sole id authority for candles.
#[derive(Debug, Clone)]
pub struct CandleStore {
    pub ring: RingStore<Candle>,
    next_id: u64,
}

impl CandleStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RingStore::new(capacity),
            next_id: 0,
        }
    }

    /// Build and store the candle for a raw bar. Returns a clone of the
    /// stored candle; callers keep the id, not a reference.
    pub fn add(&mut self, bar: &RawBar, settings: &Settings) -> Candle {
        self.next_id += 1;
        let candle = Candle {
            id: self.next_id,
            pair_period: bar.pair_period(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            time: Stamp::from_unix(bar.close_time),
            direction: direction_of(bar, settings),
            deep: None,
        };
        self.ring.push(candle.clone());
        candle
    }

    pub fn get(&self, id: u64) -> Option<&Candle> {
        self.ring.get_by_id(id)
    }

    /// Newest-first candles for one instrument, at most `count`.
    pub fn recent(&self, pair: &PairPeriod, count: usize) -> Vec<&Candle> {
        self.ring
            .iter()
            .filter(|c| &c.pair_period == pair)
            .take(count)
            .collect()
    }

    /// Candles at or after `from_unix` for one instrument, oldest-first.
    pub fn since(&self, pair: &PairPeriod, from_unix: i64) -> Vec<&Candle> {
        let mut out: Vec<&Candle> = self
            .ring
            .iter()
            .filter(|c| &c.pair_period == pair && c.time.unix >= from_unix)
            .collect();
        out.reverse();
        out
    }

    /// Candles inside an inclusive unix range for one instrument,
    /// oldest-first.
    pub fn between(&self, pair: &PairPeriod, start: i64, end: i64) -> Vec<&Candle> {
        let mut out: Vec<&Candle> = self
            .ring
            .iter()
            .filter(|c| &c.pair_period == pair && c.time.unix >= start && c.time.unix <= end)
            .collect();
        out.reverse();
        out
    }

    /// Classify the candle one bar back for the given instrument.
    ///
    /// The 3-candle window is centered on the previous bar; strict
    /// inequalities on both neighbors. Runs after every add; a no-op
    /// until three candles of the instrument exist.
    pub fn classify_deep(&mut self, pair: &PairPeriod) {
        let window = self.recent(pair, 3);
        if window.len() < 3 {
            return;
        }
        let (after, middle, before) = (window[0], window[1], window[2]);
        let deeper_low = middle.low < before.low && middle.low < after.low;
        let deeper_high = middle.high > before.high && middle.high > after.high;
        let deep = match (deeper_low, deeper_high) {
            (true, true) => Some(DeepKind::Both),
            (true, false) => Some(DeepKind::Low),
            (false, true) => Some(DeepKind::High),
            (false, false) => None,
        };
        if let Some(kind) = deep {
            let id = middle.id;
            self.ring.update_by_id(id, |c| c.deep = Some(kind));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(close_time: i64, open: f64, high: f64, low: f64, close: f64) -> RawBar {
        RawBar {
            pair: "EURUSD".into(),
            period: 1,
            open,
            high,
            low,
            close,
            close_time,
        }
    }

    fn pp() -> PairPeriod {
        PairPeriod::new("EURUSD", 1)
    }

    #[test]
    fn test_direction_from_bar_span() {
        let settings = Settings::seeded();
        // 2-pip span clears the 0.1 buffer.
        let wide = bar(60, 1.1000, 1.1002, 1.1000, 1.1001);
        assert_eq!(direction_of(&wide, &settings), CandleDirection::Up);
        // Zero span is inside the buffer.
        let flat = bar(60, 1.1000, 1.1000, 1.1000, 1.1000);
        assert_eq!(direction_of(&flat, &settings), CandleDirection::Idle);
    }

    #[test]
    fn test_ids_are_sequential() {
        let settings = Settings::seeded();
        let mut store = CandleStore::new(10);
        let a = store.add(&bar(60, 1.0, 1.1, 0.9, 1.0), &settings);
        let b = store.add(&bar(120, 1.0, 1.1, 0.9, 1.0), &settings);
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[test]
    fn test_deep_classification_low() {
        let settings = Settings::seeded();
        let mut store = CandleStore::new(10);
        // Lows 5, 3, 6 / highs 10, 8, 12: middle is a deep LOW only.
        store.add(&bar(60, 7.0, 10.0, 5.0, 7.0), &settings);
        store.add(&bar(120, 6.0, 8.0, 3.0, 6.0), &settings);
        store.add(&bar(180, 8.0, 12.0, 6.0, 8.0), &settings);
        store.classify_deep(&pp());
        let middle = store.get(2).unwrap();
        assert_eq!(middle.deep, Some(DeepKind::Low));
        assert_eq!(store.get(1).unwrap().deep, None);
        assert_eq!(store.get(3).unwrap().deep, None);
    }

    #[test]
    fn test_deep_classification_both_and_strictness() {
        let settings = Settings::seeded();
        let mut store = CandleStore::new(10);
        store.add(&bar(60, 0.0, 10.0, 5.0, 0.0), &settings);
        store.add(&bar(120, 0.0, 12.0, 4.0, 0.0), &settings);
        store.add(&bar(180, 0.0, 11.0, 5.0, 0.0), &settings);
        store.classify_deep(&pp());
        assert_eq!(store.get(2).unwrap().deep, Some(DeepKind::Both));

        // Equal neighbor defeats the strict comparison.
        let mut store = CandleStore::new(10);
        store.add(&bar(60, 0.0, 10.0, 5.0, 0.0), &settings);
        store.add(&bar(120, 0.0, 10.0, 4.0, 0.0), &settings);
        store.add(&bar(180, 0.0, 11.0, 5.0, 0.0), &settings);
        store.classify_deep(&pp());
        assert_eq!(store.get(2).unwrap().deep, Some(DeepKind::Low));
    }

    #[test]
    fn test_classification_is_per_instrument() {
        let settings = Settings::seeded();
        let mut store = CandleStore::new(10);
        store.add(&bar(60, 0.0, 10.0, 5.0, 0.0), &settings);
        let mut other = bar(90, 0.0, 99.0, 0.1, 0.0);
        other.pair = "GBPUSD".into();
        store.add(&other, &settings);
        store.add(&bar(120, 0.0, 12.0, 4.0, 0.0), &settings);
        store.add(&bar(180, 0.0, 11.0, 5.0, 0.0), &settings);
        store.classify_deep(&pp());
        // Interleaved GBPUSD bar must not pollute the EURUSD window.
        assert_eq!(store.get(3).unwrap().deep, Some(DeepKind::Both));
    }

    #[test]
    fn test_between_and_since_are_oldest_first() {
        let settings = Settings::seeded();
        let mut store = CandleStore::new(10);
        for t in 1..=5 {
            store.add(&bar(t * 60, 1.0, 1.1, 0.9, 1.0), &settings);
        }
        let times: Vec<i64> = store.between(&pp(), 120, 240).iter().map(|c| c.time.unix).collect();
        assert_eq!(times, vec![120, 180, 240]);
        let times: Vec<i64> = store.since(&pp(), 240).iter().map(|c| c.time.unix).collect();
        assert_eq!(times, vec![240, 300]);
    }
}
