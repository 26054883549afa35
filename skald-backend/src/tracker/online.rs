use skald_store::{Result, Store};
use tracing::{debug, info, warn};

use super::TrackerSettings;
use super::keys;
use super::models::{ConnectionId, PlayerRecord};
use super::session::{SessionTracker, encode};

/// Result of admitting a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// The player was not in the index before.
    pub newly_online: bool,
    /// Players pushed out to get back under the cap, oldest first.
    pub evicted: Vec<String>,
}

/// Bounded registry of online players, ordered by last activity.
///
/// The sorted set doubles as the LRU: the lowest score is evicted first.
/// Admission and eviction are separate store steps, so concurrent joins may
/// leave the index briefly above the cap; the next admission trims it again.
pub struct OnlineIndex<'a> {
    store: &'a Store,
    settings: &'a TrackerSettings,
}

impl<'a> OnlineIndex<'a> {
    pub(crate) fn new(store: &'a Store, settings: &'a TrackerSettings) -> Self {
        Self { store, settings }
    }

    fn sessions(&self) -> SessionTracker<'a> {
        SessionTracker::new(self.store, self.settings)
    }

    /// Create or refresh the player's record and index entry, then evict the
    /// least recently active players above the cap.
    pub async fn admit_or_refresh(
        &self,
        player: &str,
        now: i64,
        connection_id: Option<ConnectionId>,
    ) -> Result<Admission> {
        self.sessions().ensure_session(player, now).await?;

        let record = PlayerRecord {
            id: player.to_string(),
            joined_at: now,
            steam_id: connection_id,
            source: PlayerRecord::SOURCE_SPAWNED.to_string(),
            last_death_at: None,
            session_deaths: None,
        };
        self.store
            .set(
                &keys::player(player),
                &encode(&record),
                Some(self.settings.player_ttl),
            )
            .await?;

        let newly_online = self.store.zadd(keys::PLAYERS_ONLINE, player, now).await?;
        let evicted = self.enforce_cap().await?;

        debug!(player, newly_online, evicted = evicted.len(), "player online");
        Ok(Admission {
            newly_online,
            evicted,
        })
    }

    /// Evict the lowest-scored entries until the index is back at the cap.
    async fn enforce_cap(&self) -> Result<Vec<String>> {
        let size = self.store.zcard(keys::PLAYERS_ONLINE).await? as usize;
        if size <= self.settings.max_online {
            return Ok(Vec::new());
        }

        let overflow = size - self.settings.max_online;
        let oldest = self
            .store
            .zrange(keys::PLAYERS_ONLINE, 0, overflow as i64 - 1)
            .await?;

        for player in &oldest {
            self.remove(player).await?;
            info!(player = %player, "evicted player over capacity");
        }

        Ok(oldest)
    }

    /// Drop the player's index entry, record and session. Returns whether
    /// the player was in the index.
    pub async fn remove(&self, player: &str) -> Result<bool> {
        let was_online = self.store.zrem(keys::PLAYERS_ONLINE, player).await?;
        self.store.delete(&keys::player(player)).await?;
        self.sessions().end_session(player).await?;

        debug!(player, was_online, "player offline");
        Ok(was_online)
    }

    /// Online players, least recently active first.
    ///
    /// Index entries whose record has expired are removed on the way.
    pub async fn list(&self) -> Result<Vec<PlayerRecord>> {
        let ids = self.store.zrange(keys::PLAYERS_ONLINE, 0, -1).await?;

        let mut players = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.get(&keys::player(&id)).await? {
                Some(raw) => players.push(decode(&id, &raw)),
                None => {
                    self.store.zrem(keys::PLAYERS_ONLINE, &id).await?;
                    debug!(player = %id, "removed stale index entry");
                }
            }
        }

        Ok(players)
    }

    pub async fn record(&self, player: &str) -> Result<Option<PlayerRecord>> {
        let raw = self.store.get(&keys::player(player)).await?;
        Ok(raw.map(|raw| decode(player, &raw)))
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.store.zcard(keys::PLAYERS_ONLINE).await? as usize)
    }
}

fn decode(player: &str, raw: &str) -> PlayerRecord {
    serde_json::from_str(raw).unwrap_or_else(|err| {
        warn!(player, %err, "unreadable player record");
        PlayerRecord::bare(player)
    })
}
