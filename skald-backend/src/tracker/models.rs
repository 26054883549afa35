use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};

/// Steam connection id as printed by the server (17 digits), stored inline.
pub type ConnectionId = ArrayString<17>;

/// Server lifecycle phase. Any phase may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Updating,
    Updated,
    Starting,
    Online,
    ShuttingDown,
    Offline,
}

impl ServerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServerStatus::Updating => "updating",
            ServerStatus::Updated => "updated",
            ServerStatus::Starting => "starting",
            ServerStatus::Online => "online",
            ServerStatus::ShuttingDown => "shutting_down",
            ServerStatus::Offline => "offline",
        }
    }
}

/// A player currently (or very recently) online.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: String,
    /// Millisecond timestamp of the latest join.
    pub joined_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steam_id: Option<ConnectionId>,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_death_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_deaths: Option<i64>,
}

impl PlayerRecord {
    pub const SOURCE_SPAWNED: &'static str = "spawned";

    /// A record that knows nothing but the player's id.
    pub fn bare(id: &str) -> Self {
        Self {
            id: id.to_string(),
            joined_at: 0,
            steam_id: None,
            source: String::new(),
            last_death_at: None,
            session_deaths: None,
        }
    }
}

/// Counters scoped to the current online stretch of one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSession {
    pub start: i64,
    pub deaths: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: ServerStatus,
    pub at: i64,
    #[serde(default)]
    pub detail: String,
}

/// Current status plus the newest history entries, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub current: Option<StatusRecord>,
    pub history: Vec<StatusRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaidEvent {
    pub raid: String,
    pub time: i64,
    #[serde(default)]
    pub detail: Option<String>,
}
