//! Log-driven game server state: classification, connection/name
//! correlation, the online player index, sessions, lifecycle status and raids.
//!
//! Nothing is held in memory between calls. Each operation is a short
//! sequence of individually atomic store steps with no surrounding
//! transaction, so a failure part-way leaves the earlier steps applied.

pub mod classify;
mod correlate;
mod keys;
pub mod models;
mod online;
mod pipeline;
mod raids;
mod session;
mod status;

pub use correlate::Correlator;
pub use online::{Admission, OnlineIndex};
pub use pipeline::{EventOutcome, FallbackGuess, IngestOutcome, LogEvent};
pub use raids::RaidLog;
pub use session::SessionTracker;
pub use status::StatusTracker;

use std::sync::Arc;
use std::time::Duration;

use skald_store::{Clock, Store, StoreError};
use thiserror::Error;

use crate::validation::ValidationError;

/// Tuning knobs for the tracker.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    /// Online index capacity
    pub max_online: usize,
    /// How long a connection id stays in the candidate window
    pub candidate_ttl: Duration,
    /// Maximum gap between a candidate sighting and a spawn for them to pair
    pub pair_window: Duration,
    /// TTL of player records, sessions and connection mappings
    pub player_ttl: Duration,
    /// TTL of the current status record
    pub status_ttl: Duration,
    /// History entries returned by a status read
    pub status_history_limit: usize,
    /// History entries kept in the store
    pub status_history_retain: usize,
    /// Raids kept in the store
    pub raid_retain: usize,
    /// Unclassified lines kept for debugging
    pub unclassified_retain: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            max_online: 10,
            candidate_ttl: Duration::from_secs(60),
            pair_window: Duration::from_secs(30),
            player_ttl: Duration::from_secs(24 * 3600),
            status_ttl: Duration::from_secs(7 * 24 * 3600),
            status_history_limit: 20,
            status_history_retain: 500,
            raid_retain: 100,
            unclassified_retain: 200,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    InvalidInput(#[from] ValidationError),

    #[error("state store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

/// Entry point to the tracker components. Cheap to clone.
#[derive(Clone)]
pub struct Tracker {
    store: Store,
    settings: Arc<TrackerSettings>,
}

impl Tracker {
    pub fn new(store: Store, settings: TrackerSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Processing-time source, shared with the store's expiry clock.
    pub fn clock(&self) -> &Clock {
        self.store.clock()
    }

    pub fn correlator(&self) -> Correlator<'_> {
        Correlator::new(&self.store, &self.settings)
    }

    pub fn online(&self) -> OnlineIndex<'_> {
        OnlineIndex::new(&self.store, &self.settings)
    }

    pub fn sessions(&self) -> SessionTracker<'_> {
        SessionTracker::new(&self.store, &self.settings)
    }

    pub fn status(&self) -> StatusTracker<'_> {
        StatusTracker::new(&self.store, &self.settings)
    }

    pub fn raids(&self) -> RaidLog<'_> {
        RaidLog::new(&self.store, &self.settings)
    }
}
