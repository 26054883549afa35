use skald_store::{Result, Store};
use tracing::debug;

use super::TrackerSettings;
use super::keys;
use super::models::{PlayerRecord, PlayerSession};

const START: &str = "start";
const DEATHS: &str = "deaths";

/// Per-player counters for the current online stretch.
///
/// Sessions are removed together with the player (see
/// [`OnlineIndex::remove`](super::online::OnlineIndex::remove)); the TTL only
/// catches removals that never happened.
pub struct SessionTracker<'a> {
    store: &'a Store,
    settings: &'a TrackerSettings,
}

impl<'a> SessionTracker<'a> {
    pub(crate) fn new(store: &'a Store, settings: &'a TrackerSettings) -> Self {
        Self { store, settings }
    }

    /// Create the session if absent and refresh its TTL either way.
    pub async fn ensure_session(&self, player: &str, now: i64) -> Result<()> {
        let key = keys::session(player);
        let created = self.store.hset_nx(&key, START, &now.to_string()).await?;
        self.store.hset_nx(&key, DEATHS, "0").await?;
        self.store.expire(&key, self.settings.player_ttl).await?;

        if created {
            debug!(player, "started session");
        }
        Ok(())
    }

    /// Count a death in the player's session and mirror it on the player
    /// record. Returns the session's death count.
    pub async fn record_death(&self, player: &str, now: i64) -> Result<i64> {
        self.ensure_session(player, now).await?;
        let deaths = self
            .store
            .hincr_by(&keys::session(player), DEATHS, 1)
            .await?;

        let record_key = keys::player(player);
        let mut record = match self.store.get(&record_key).await? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|_| PlayerRecord::bare(player)),
            None => PlayerRecord::bare(player),
        };
        record.last_death_at = Some(now);
        record.session_deaths = Some(deaths);
        self.store
            .set(&record_key, &encode(&record), Some(self.settings.player_ttl))
            .await?;

        debug!(player, deaths, "recorded death");
        Ok(deaths)
    }

    pub async fn get(&self, player: &str) -> Result<Option<PlayerSession>> {
        let fields = self.store.hget_all(&keys::session(player)).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let mut session = PlayerSession { start: 0, deaths: 0 };
        for (field, value) in fields {
            match field.as_str() {
                START => session.start = value.parse().unwrap_or_default(),
                DEATHS => session.deaths = value.parse().unwrap_or_default(),
                _ => {}
            }
        }
        Ok(Some(session))
    }

    pub async fn end_session(&self, player: &str) -> Result<()> {
        self.store.delete(&keys::session(player)).await?;
        Ok(())
    }
}

pub(crate) fn encode(record: &PlayerRecord) -> String {
    // PlayerRecord holds only strings and integers, serialization cannot fail
    serde_json::to_string(record).unwrap_or_default()
}
