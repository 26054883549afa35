use serde::Serialize;
use skald_store::{Result, Store};
use tracing::{debug, warn};

use super::TrackerSettings;
use super::keys;
use super::models::RaidEvent;

/// Newest-first, bounded list of raids announced by the server.
pub struct RaidLog<'a> {
    store: &'a Store,
    settings: &'a TrackerSettings,
}

impl<'a> RaidLog<'a> {
    pub(crate) fn new(store: &'a Store, settings: &'a TrackerSettings) -> Self {
        Self { store, settings }
    }

    pub async fn record(&self, raid: &str, at: i64, detail: &str) -> Result<RaidEvent> {
        let event = RaidEvent {
            raid: raid.to_string(),
            time: at,
            detail: Some(detail.to_string()),
        };
        push_bounded(
            self.store,
            keys::RAIDS,
            &event,
            self.settings.raid_retain,
        )
        .await?;

        debug!(raid, at, "recorded raid");
        Ok(event)
    }

    /// Up to `limit` raids, newest first. Entries that cannot be read are
    /// reported as an `unknown` raid carrying the raw value.
    pub async fn recent(&self, limit: usize) -> Result<Vec<RaidEvent>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now = self.store.clock().now_ms();
        let items = self.store.lrange(keys::RAIDS, 0, limit as i64 - 1).await?;
        let raids = items
            .into_iter()
            .map(|raw| {
                serde_json::from_str(&raw).unwrap_or_else(|err| {
                    warn!(%err, "unreadable raid entry");
                    RaidEvent {
                        raid: "unknown".to_string(),
                        time: now,
                        detail: Some(raw),
                    }
                })
            })
            .collect();

        Ok(raids)
    }
}

/// Push `value` to the front of `list` and trim it to `retain` items.
pub(crate) async fn push_bounded<T: Serialize>(
    store: &Store,
    list: &str,
    value: &T,
    retain: usize,
) -> Result<()> {
    let payload = serde_json::to_string(value).unwrap_or_default();
    store.lpush(list, &payload).await?;
    store.ltrim(list, 0, retain as i64 - 1).await?;
    Ok(())
}
