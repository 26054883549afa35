//! Log line classification.
//!
//! Player rules are evaluated in a fixed priority order and the first match
//! wins. Lifecycle and raid rules are evaluated independently, so one line can
//! carry a player event, a status change and a raid at the same time.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::models::{ConnectionId, ServerStatus};

/// Player-facing event extracted from a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// A connection id was seen during connect or handshake.
    Candidate(ConnectionId),
    /// The named character spawned.
    Join { player: String },
    /// The named character respawned at (0, 0), which the server logs on death.
    Death { player: String },
    /// A socket with a known connection id closed.
    Leave(ConnectionId),
    /// Someone disconnected but the line does not say who.
    LeaveFallback,
}

/// Derived category of a line, in classification priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    SteamCandidate,
    PlayerJoin,
    PlayerDeath,
    PlayerLeaveExplicit,
    PlayerLeaveFallback,
    ServerStatus,
    Unclassified,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub player: Option<PlayerEvent>,
    pub status: Option<ServerStatus>,
    pub raid: Option<String>,
}

impl Classification {
    pub fn category(&self) -> Category {
        match (&self.player, self.status) {
            (Some(PlayerEvent::Candidate(_)), _) => Category::SteamCandidate,
            (Some(PlayerEvent::Join { .. }), _) => Category::PlayerJoin,
            (Some(PlayerEvent::Death { .. }), _) => Category::PlayerDeath,
            (Some(PlayerEvent::Leave(_)), _) => Category::PlayerLeaveExplicit,
            (Some(PlayerEvent::LeaveFallback), _) => Category::PlayerLeaveFallback,
            (None, Some(_)) => Category::ServerStatus,
            (None, None) => Category::Unclassified,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.player.is_none() && self.status.is_none() && self.raid.is_none()
    }
}

struct PlayerRule {
    pattern: Regex,
    extract: fn(&Captures<'_>) -> Option<PlayerEvent>,
}

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("built-in log pattern must compile")
}

fn connection_id(caps: &Captures<'_>) -> Option<ConnectionId> {
    ConnectionId::from(caps.get(1)?.as_str()).ok()
}

fn extract_spawn(caps: &Captures<'_>) -> Option<PlayerEvent> {
    let player = caps.get(1)?.as_str().trim();
    if player.is_empty() {
        return None;
    }
    let x: i64 = caps.get(2)?.as_str().parse().ok()?;
    let y: i64 = caps.get(3)?.as_str().parse().ok()?;

    let player = player.to_string();
    if x == 0 && y == 0 {
        Some(PlayerEvent::Death { player })
    } else {
        Some(PlayerEvent::Join { player })
    }
}

static PLAYER_RULES: LazyLock<Vec<PlayerRule>> = LazyLock::new(|| {
    vec![
        PlayerRule {
            pattern: pattern(r"(?i)(?:Got connection SteamID|Got handshake from client)\s+(\d{17})"),
            extract: |caps| connection_id(caps).map(PlayerEvent::Candidate),
        },
        PlayerRule {
            pattern: pattern(r"(?i)Got character ZDOID from\s+([^:]+?)\s*:\s*(-?\d+)\s*:\s*(-?\d+)"),
            extract: extract_spawn,
        },
        PlayerRule {
            pattern: pattern(r"(?i)Closing socket\s+(\d{17})"),
            extract: |caps| connection_id(caps).map(PlayerEvent::Leave),
        },
        PlayerRule {
            pattern: pattern(r"(?i)\bRPC_Disconnect\b"),
            extract: |_| Some(PlayerEvent::LeaveFallback),
        },
    ]
});

static STATUS_RULES: LazyLock<Vec<(Regex, ServerStatus)>> = LazyLock::new(|| {
    vec![
        (
            pattern(r"(?i)(Checking for updates|Update available|Downloading update|Installing update)"),
            ServerStatus::Updating,
        ),
        (
            pattern(r"(?i)(Updates installed|Update completed|Finished installing update)"),
            ServerStatus::Updated,
        ),
        (
            pattern(r"(?i)(Begin MonoManager ReloadAssembly|Launching Valheim server|Server starting)"),
            ServerStatus::Starting,
        ),
        (
            pattern(r"(?i)(Opened Steam server|Game server connected)"),
            ServerStatus::Online,
        ),
        (
            pattern(r"(?i)(Shutting down|Stopping server|Quit game|Server stopping)"),
            ServerStatus::ShuttingDown,
        ),
        (
            pattern(r"(?i)(Exited cleanly|Server stopped|Valheim server exited)"),
            ServerStatus::Offline,
        ),
    ]
});

static RAID_RULE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)Random event set:\s*([A-Za-z0-9_]+)"));

/// First player rule whose pattern matches and whose fields extract cleanly.
pub fn classify_player(line: &str) -> Option<PlayerEvent> {
    PLAYER_RULES.iter().find_map(|rule| {
        let caps = rule.pattern.captures(line)?;
        (rule.extract)(&caps)
    })
}

pub fn classify_status(line: &str) -> Option<ServerStatus> {
    STATUS_RULES
        .iter()
        .find(|(pattern, _)| pattern.is_match(line))
        .map(|(_, status)| *status)
}

pub fn classify_raid(line: &str) -> Option<String> {
    RAID_RULE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|raid| raid.as_str().to_string())
}

pub fn classify(line: &str) -> Classification {
    Classification {
        player: classify_player(line),
        status: classify_status(line),
        raid: classify_raid(line),
    }
}
