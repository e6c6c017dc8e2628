// Library crate - pattern detection engine over OHLC candle streams

pub mod context;
pub mod engine;
pub mod feed;
pub mod ring;
pub mod settings;
pub mod types;
pub mod venue;

// Re-export the pieces hosts touch directly
pub use context::{Capacities, Context};
pub use engine::{ingest, ingest_batch};
pub use settings::Settings;
pub use types::{RawBar, RunMode};
