use serde::Serialize;
use tracing::{debug, info};

use super::classify::{self, Category, Classification, PlayerEvent};
use super::models::{ConnectionId, ServerStatus};
use super::raids::push_bounded;
use super::{IngestError, Tracker, keys};
use crate::helpers::parse_timestamp;
use crate::validation;

/// One ingested line with its effective timestamp and classification.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub line: String,
    /// Effective time in milliseconds.
    pub at: i64,
    /// Whether `at` came from the caller rather than processing time.
    pub explicit_at: bool,
    pub classification: Classification,
}

impl LogEvent {
    pub fn new(line: &str, ts: Option<&str>, processing_time: i64) -> Self {
        let explicit = ts.and_then(parse_timestamp);
        Self {
            line: line.to_string(),
            at: explicit.unwrap_or(processing_time),
            explicit_at: explicit.is_some(),
            classification: classify::classify(line),
        }
    }

    pub fn category(&self) -> Category {
        self.classification.category()
    }
}

/// Best-effort identification of who left on a bare disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackGuess {
    pub connection_id: ConnectionId,
    pub player_id: String,
}

/// What a handled line did, tagged by category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(
    tag = "category",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum EventOutcome {
    SteamCandidate {
        connection_id: ConnectionId,
    },
    Join {
        player_id: String,
        connection_id: Option<ConnectionId>,
    },
    Death {
        player_id: String,
        session_deaths: i64,
    },
    /// Exact resolution through the connection mapping.
    Leave {
        connection_id: ConnectionId,
        resolved: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
    },
    /// Guessed resolution from the newest candidate; never authoritative.
    LeaveFallback {
        guess: Option<FallbackGuess>,
    },
    Raid {
        raid: String,
    },
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub handled: bool,
    #[serde(flatten)]
    pub event: Option<EventOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ServerStatus>,
}

impl IngestOutcome {
    pub fn handled(event: EventOutcome, status: Option<ServerStatus>) -> Self {
        Self {
            handled: true,
            event: Some(event),
            status,
        }
    }

    pub fn ignored() -> Self {
        Self {
            handled: false,
            event: None,
            status: None,
        }
    }
}

#[derive(Serialize)]
struct UnclassifiedLine<'a> {
    at: i64,
    line: &'a str,
}

impl Tracker {
    /// Classify one log line and apply its effects.
    ///
    /// The lifecycle status and raid are applied before the player event, and
    /// independently of it. Each step commits on its own; if a later step fails
    /// the earlier ones stay applied.
    pub async fn ingest(&self, line: &str, ts: Option<&str>) -> Result<IngestOutcome, IngestError> {
        validation::validate_line(line)?;

        let event = LogEvent::new(line, ts, self.clock().now_ms());
        let at = event.at;
        debug!(category = ?event.category(), at, explicit = event.explicit_at, "classified log line");

        let Classification {
            player,
            status,
            raid,
        } = event.classification;

        if let Some(status) = status {
            self.status().set_status(status, line, at).await?;
        }
        if let Some(raid) = &raid {
            self.raids().record(raid, at, line).await?;
        }

        let outcome = match player {
            Some(PlayerEvent::Candidate(connection_id)) => {
                self.correlator().record_candidate(&connection_id, at).await?;
                EventOutcome::SteamCandidate { connection_id }
            }
            Some(PlayerEvent::Join { player }) => {
                let connection_id = self
                    .correlator()
                    .pair_with_recent_candidate(&player, at)
                    .await?;
                let admission = self
                    .online()
                    .admit_or_refresh(&player, at, connection_id)
                    .await?;
                if admission.newly_online {
                    info!(player = %player, connection = ?connection_id, "player joined");
                }
                EventOutcome::Join {
                    player_id: player,
                    connection_id,
                }
            }
            Some(PlayerEvent::Death { player }) => {
                let session_deaths = self.sessions().record_death(&player, at).await?;
                EventOutcome::Death {
                    player_id: player,
                    session_deaths,
                }
            }
            Some(PlayerEvent::Leave(connection_id)) => {
                let player_id = self.correlator().resolve_player(&connection_id).await?;
                if let Some(player) = &player_id {
                    self.online().remove(player).await?;
                    info!(player = %player, %connection_id, "player left");
                } else {
                    debug!(%connection_id, "closed socket has no known player");
                }
                EventOutcome::Leave {
                    connection_id,
                    resolved: player_id.is_some(),
                    player_id,
                }
            }
            Some(PlayerEvent::LeaveFallback) => EventOutcome::LeaveFallback {
                guess: self.guess_departed().await?,
            },
            None => match (raid, status) {
                (Some(raid), _) => EventOutcome::Raid { raid },
                (None, Some(_)) => EventOutcome::Server,
                (None, None) => {
                    push_bounded(
                        self.store(),
                        keys::SERVER_UNCLASSIFIED,
                        &UnclassifiedLine { at, line },
                        self.settings().unclassified_retain,
                    )
                    .await?;
                    return Ok(IngestOutcome::ignored());
                }
            },
        };

        Ok(IngestOutcome::handled(outcome, status))
    }

    /// Remove whoever is mapped to the newest candidate, however old it is.
    async fn guess_departed(&self) -> Result<Option<FallbackGuess>, IngestError> {
        let correlator = self.correlator();
        let Some(connection_id) = correlator.latest_candidate().await? else {
            return Ok(None);
        };
        let Some(player_id) = correlator.resolve_player(&connection_id).await? else {
            return Ok(None);
        };

        self.online().remove(&player_id).await?;
        info!(player = %player_id, %connection_id, "player left (guessed)");
        Ok(Some(FallbackGuess {
            connection_id,
            player_id,
        }))
    }
}
