//! The order venue boundary.
//!
//! The pipeline never performs I/O; it pushes position requests into the
//! context outbox and the host hands them to an [`OrderVenue`]. The HTTP
//! implementation is fire-and-forget: the POST runs on a spawned task and
//! only its acknowledgement is logged.

use tracing::{debug, info, warn};

use crate::types::PositionRequest;

pub trait OrderVenue: Send + Sync {
    fn submit(&self, request: PositionRequest);
}

/// Discards requests; used by backtests and tests.
pub struct NoopVenue;

impl OrderVenue for NoopVenue {
    fn submit(&self, request: PositionRequest) {
        debug!(pair = %request.pair, entry = request.entry, "position request discarded");
    }
}

/// POSTs each request as JSON to a single endpoint.
pub struct HttpVenue {
    client: reqwest::Client,
    url: String,
}

impl HttpVenue {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl OrderVenue for HttpVenue {
    fn submit(&self, request: PositionRequest) {
        let client = self.client.clone();
        let url = self.url.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&request).send().await {
                Ok(response) => info!(
                    status = %response.status(),
                    pair = %request.pair,
                    direction = %request.direction,
                    entry = request.entry,
                    "position submitted"
                ),
                Err(err) => warn!(%err, pair = %request.pair, "position submission failed"),
            }
        });
    }
}
