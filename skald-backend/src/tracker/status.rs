use skald_store::{Result, Store};
use tracing::{info, warn};

use super::TrackerSettings;
use super::keys;
use super::models::{ServerStatus, StatusRecord, StatusReport};

/// Current lifecycle phase plus an append-only, bounded history.
///
/// Transitions are not validated: the log stream is the source of truth and
/// may arrive out of order.
pub struct StatusTracker<'a> {
    store: &'a Store,
    settings: &'a TrackerSettings,
}

impl<'a> StatusTracker<'a> {
    pub(crate) fn new(store: &'a Store, settings: &'a TrackerSettings) -> Self {
        Self { store, settings }
    }

    pub async fn set_status(&self, status: ServerStatus, detail: &str, at: i64) -> Result<StatusRecord> {
        let record = StatusRecord {
            status,
            at,
            detail: detail.to_string(),
        };
        let payload = serde_json::to_string(&record).unwrap_or_default();

        self.store
            .set(keys::SERVER_STATUS, &payload, Some(self.settings.status_ttl))
            .await?;
        self.store.zadd(keys::SERVER_HISTORY, &payload, at).await?;

        // keep only the newest entries
        let retain = self.settings.status_history_retain as i64;
        self.store
            .zremrange_by_rank(keys::SERVER_HISTORY, 0, -(retain + 1))
            .await?;

        info!(status = status.as_str(), at, "server status changed");
        Ok(record)
    }

    pub async fn current(&self) -> Result<Option<StatusRecord>> {
        let raw = self.store.get(keys::SERVER_STATUS).await?;
        Ok(raw.and_then(|raw| decode(&raw)))
    }

    /// Current status and up to `limit` history entries, newest first.
    pub async fn report(&self, limit: usize) -> Result<StatusReport> {
        let current = self.current().await?;
        let history = if limit == 0 {
            Vec::new()
        } else {
            self.store
                .zrevrange(keys::SERVER_HISTORY, 0, limit as i64 - 1)
                .await?
                .iter()
                .filter_map(|raw| decode(raw))
                .collect()
        };

        Ok(StatusReport { current, history })
    }

    /// [`report`](Self::report) with the configured history length.
    pub async fn get_status(&self) -> Result<StatusReport> {
        self.report(self.settings.status_history_limit).await
    }
}

fn decode(raw: &str) -> Option<StatusRecord> {
    match serde_json::from_str(raw) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(%err, "skipping unreadable status record");
            None
        }
    }
}
