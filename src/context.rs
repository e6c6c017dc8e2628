//! The engine's one shared state container.
//!
//! All stores live here and nowhere else. The pipeline borrows fields
//! disjointly; entities reference each other by id and re-fetch through
//! the owning store, never through long-lived references.

use serde_json::json;

use crate::engine::candle::CandleStore;
use crate::engine::cob::OrderBlock;
use crate::engine::liquidity::LiquidityStore;
use crate::engine::mss::StructureShift;
use crate::engine::pattern::SetupStore;
use crate::engine::session::{MicroBook, SessionBook};
use crate::engine::signal::SignalStore;
use crate::settings::Settings;
use crate::types::{PositionRequest, RunMode};

/// Per-store ring capacities.
#[derive(Debug, Clone, Copy)]
pub struct Capacities {
    pub candles: usize,
    pub liquidity: usize,
    pub shifts: usize,
    pub blocks: usize,
    pub signals: usize,
    pub sessions: usize,
    pub worktimes: usize,
    pub micros: usize,
}

impl Default for Capacities {
    fn default() -> Self {
        Self {
            candles: 5_000,
            liquidity: 1_000,
            shifts: 100,
            blocks: 100,
            signals: 50_000,
            sessions: 100,
            worktimes: 100,
            micros: 300,
        }
    }
}

pub struct Context {
    pub mode: RunMode,
    pub settings: Settings,
    pub candles: CandleStore,
    pub liquidity: LiquidityStore,
    pub shifts: SetupStore<StructureShift>,
    pub blocks: SetupStore<OrderBlock>,
    pub signals: SignalStore,
    pub sessions: SessionBook,
    pub worktimes: SessionBook,
    pub micros: MicroBook,
    /// Position requests produced this run and not yet handed to the
    /// venue. The host drains it after each bar.
    pub outbox: Vec<PositionRequest>,
}

impl Context {
    pub fn new(mode: RunMode, settings: Settings) -> Self {
        Self::with_capacities(mode, settings, Capacities::default())
    }

    pub fn with_capacities(mode: RunMode, settings: Settings, caps: Capacities) -> Self {
        Self {
            mode,
            settings,
            candles: CandleStore::new(caps.candles),
            liquidity: LiquidityStore::new(caps.liquidity),
            shifts: SetupStore::new(caps.shifts),
            blocks: SetupStore::new(caps.blocks),
            signals: SignalStore::new(caps.signals),
            sessions: SessionBook::new(caps.sessions),
            worktimes: SessionBook::new(caps.worktimes),
            micros: MicroBook::new(caps.micros),
            outbox: Vec::new(),
        }
    }

    /// Full engine state as JSON, for reports and equivalence checks.
    pub fn snapshot(&self) -> serde_json::Value {
        json!({
            "mode": self.mode,
            "candles": self.candles.ring.all(),
            "liquidity": self.liquidity.ring.all(),
            "shifts": self.shifts.ring.all(),
            "blocks": self.blocks.ring.all(),
            "signals": self.signals.ring.all(),
            "sessions": self.sessions.windows.all(),
            "worktimes": self.worktimes.windows.all(),
            "micros": self.micros.ring.all(),
        })
    }
}
