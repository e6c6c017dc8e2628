//! The signal ledger.
//!
//! Append-only record of every triggered setup. Ids are sequential and
//! assigned here; status transitions are written only by the setup that
//! owns the signal. In live mode a freshly opened signal can be turned
//! into a position-open request, unless its stop distance is too tight.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::pattern::Levels;
use crate::ring::{RingStore, StoreItem};
use crate::settings::Settings;
use crate::types::{
    to_pips, Direction, PairPeriod, PositionRequest, SignalStatus, Stamp, TriggerKind,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: u64,
    /// Id of the owning setup, scoped by `trigger_kind`.
    pub trigger_id: u64,
    pub trigger_kind: TriggerKind,
    pub pair_period: PairPeriod,
    pub direction: Direction,
    pub limit: f64,
    pub stoploss: f64,
    pub takeprofit: f64,
    pub status: SignalStatus,
    /// Entry time.
    pub time: Stamp,
    pub closed_at: Option<Stamp>,
}

impl StoreItem for Signal {
    fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone)]
pub struct SignalStore {
    pub ring: RingStore<Signal>,
    next_id: u64,
}

impl SignalStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RingStore::new(capacity),
            next_id: 0,
        }
    }

    /// Open a signal for a setup that just triggered. Returns a clone of
    /// the stored signal.
    pub fn open(
        &mut self,
        trigger_id: u64,
        trigger_kind: TriggerKind,
        pair_period: PairPeriod,
        direction: Direction,
        levels: &Levels,
        time: Stamp,
    ) -> Signal {
        self.next_id += 1;
        let signal = Signal {
            id: self.next_id,
            trigger_id,
            trigger_kind,
            pair_period,
            direction,
            limit: levels.limit,
            stoploss: levels.stoploss,
            takeprofit: levels.takeprofit,
            status: SignalStatus::Triggered,
            time,
            closed_at: None,
        };
        info!(
            id = signal.id,
            kind = %trigger_kind,
            %direction,
            limit = levels.limit,
            stoploss = levels.stoploss,
            takeprofit = levels.takeprofit,
            "signal opened"
        );
        self.ring.push(signal.clone());
        signal
    }

    /// Close the open signal belonging to a setup. No-op when the setup
    /// never opened one or the signal was already closed.
    pub fn close(
        &mut self,
        trigger_id: u64,
        trigger_kind: TriggerKind,
        status: SignalStatus,
        time: Stamp,
    ) {
        let id = self
            .ring
            .iter()
            .find(|s| {
                s.trigger_id == trigger_id
                    && s.trigger_kind == trigger_kind
                    && s.status == SignalStatus::Triggered
            })
            .map(|s| s.id);
        if let Some(id) = id {
            debug!(id, %status, "signal closed");
            self.ring.update_by_id(id, |s| {
                s.status = status;
                s.closed_at = Some(time);
            });
        }
    }
}

/// Build the venue request for a signal, or `None` when the stop sits
/// closer than `SignalMinStopDistancePips`.
pub fn position_request(signal: &Signal, settings: &Settings) -> Option<PositionRequest> {
    let min_pips = settings.int_or("SignalMinStopDistancePips", 3) as f64;
    let stop_pips = to_pips((signal.stoploss - signal.limit).abs());
    if stop_pips < min_pips {
        debug!(id = signal.id, stop_pips, "stop too tight, position suppressed");
        return None;
    }
    Some(PositionRequest {
        pair: signal.pair_period.pair.clone(),
        direction: signal.direction,
        volume: settings.float_or("OrderVolume", 0.01),
        entry: signal.limit,
        stoploss: signal.stoploss,
        takeprofit: signal.takeprofit,
    })
}
