use skald_store::{Result, Store};
use tracing::{debug, warn};

use super::TrackerSettings;
use super::keys;
use super::models::ConnectionId;

/// Pairs connection ids seen on connect with the character name announced
/// shortly after. Best effort: whichever candidate is newest inside the
/// pairing window wins, and pairing does not consume the candidate.
pub struct Correlator<'a> {
    store: &'a Store,
    settings: &'a TrackerSettings,
}

impl<'a> Correlator<'a> {
    pub(crate) fn new(store: &'a Store, settings: &'a TrackerSettings) -> Self {
        Self { store, settings }
    }

    /// Add or refresh a candidate, then drop candidates older than the TTL.
    pub async fn record_candidate(&self, connection_id: &ConnectionId, now: i64) -> Result<()> {
        self.store
            .zadd(keys::STEAM_CANDIDATES, connection_id, now)
            .await?;

        let cutoff = now - self.settings.candidate_ttl.as_millis() as i64;
        let pruned = self
            .store
            .zremrange_by_score(keys::STEAM_CANDIDATES, i64::MIN, cutoff)
            .await?;

        debug!(%connection_id, pruned, "recorded connection candidate");
        Ok(())
    }

    /// Link `player` to the newest candidate seen less than one pairing
    /// window before `now`, in both directions.
    pub async fn pair_with_recent_candidate(
        &self,
        player: &str,
        now: i64,
    ) -> Result<Option<ConnectionId>> {
        let window = self.settings.pair_window.as_millis() as i64;
        let newest = self
            .store
            .zrevrange_by_score(keys::STEAM_CANDIDATES, now, now - window + 1, 0, 1)
            .await?;

        let Some(connection_id) = newest.first().and_then(|raw| parse_id(raw)) else {
            debug!(player, "no connection candidate to pair with");
            return Ok(None);
        };

        let ttl = Some(self.settings.player_ttl);
        self.store
            .set(&keys::steam_to_player(&connection_id), player, ttl)
            .await?;
        self.store
            .set(&keys::player_to_steam(player), &connection_id, ttl)
            .await?;

        debug!(player, %connection_id, "paired player with connection");
        Ok(Some(connection_id))
    }

    /// The player last paired with `connection_id`, if the mapping is still live.
    pub async fn resolve_player(&self, connection_id: &ConnectionId) -> Result<Option<String>> {
        self.store.get(&keys::steam_to_player(connection_id)).await
    }

    /// The connection id last paired with `player`.
    #[cfg(test)]
    pub async fn connection_for(&self, player: &str) -> Result<Option<ConnectionId>> {
        let raw = self.store.get(&keys::player_to_steam(player)).await?;
        Ok(raw.as_deref().and_then(parse_id))
    }

    /// The most recently seen candidate, regardless of age.
    pub async fn latest_candidate(&self) -> Result<Option<ConnectionId>> {
        let newest = self.store.zrevrange(keys::STEAM_CANDIDATES, 0, 0).await?;
        Ok(newest.first().and_then(|raw| parse_id(raw)))
    }
}

fn parse_id(raw: &str) -> Option<ConnectionId> {
    match ConnectionId::from(raw) {
        Ok(id) => Some(id),
        Err(_) => {
            warn!(raw, "ignoring malformed connection id in store");
            None
        }
    }
}
