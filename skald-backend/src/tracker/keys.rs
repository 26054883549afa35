//! Store key layout.

pub const STEAM_CANDIDATES: &str = "steam:candidates";
pub const PLAYERS_ONLINE: &str = "players:online";
pub const SERVER_STATUS: &str = "server:status";
pub const SERVER_HISTORY: &str = "server:history";
pub const SERVER_UNCLASSIFIED: &str = "server:unclassified";
pub const RAIDS: &str = "raids:last";

pub fn steam_to_player(steam_id: &str) -> String {
    format!("steam:to-player:{steam_id}")
}

pub fn player_to_steam(player_id: &str) -> String {
    format!("player:to-steam:{player_id}")
}

pub fn player(player_id: &str) -> String {
    format!("player:id:{player_id}")
}

pub fn session(player_id: &str) -> String {
    format!("player:sess:{player_id}")
}
