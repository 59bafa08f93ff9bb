//! Normalized view of the FiveM server for one poll cycle.

use fivewatch_db::ServerStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const UNKNOWN: &str = "Unknown";
const NOT_AVAILABLE: &str = "N/A";

/// A player present in `players.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlinePlayer {
    pub name: String,
    pub ping_ms: i64,
}

/// Server state captured by a single fetch.
///
/// An offline snapshot has no players and every optional field at its fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSnapshot {
    pub online: bool,
    pub name: String,
    pub tags: String,
    pub description: String,
    pub version: String,
    pub player_count: Option<u32>,
    pub max_players: Option<u32>,
    pub resource_count: Option<u32>,
    pub players: Vec<OnlinePlayer>,
    pub latency_ms: Option<u64>,
}

impl ServerSnapshot {
    /// The canonical snapshot for an unreachable server.
    pub fn offline() -> Self {
        Self {
            online: false,
            name: UNKNOWN.to_string(),
            tags: NOT_AVAILABLE.to_string(),
            description: NOT_AVAILABLE.to_string(),
            version: NOT_AVAILABLE.to_string(),
            player_count: None,
            max_players: None,
            resource_count: None,
            players: Vec::new(),
            latency_ms: None,
        }
    }

    /// Combine both telemetry documents into an online snapshot.
    pub fn from_responses(info: InfoResponse, players: Vec<PlayerResponse>, latency_ms: u64) -> Self {
        let players: Vec<OnlinePlayer> = players
            .into_iter()
            .map(|p| OnlinePlayer {
                name: p.name,
                ping_ms: p.ping,
            })
            .collect();

        Self {
            online: true,
            name: non_empty(info.vars.sv_project_name).unwrap_or_else(|| UNKNOWN.to_string()),
            tags: non_empty(info.vars.tags).unwrap_or_else(|| "None".to_string()),
            description: non_empty(info.vars.sv_project_desc)
                .unwrap_or_else(|| "No description".to_string()),
            version: non_empty(info.server).unwrap_or_else(|| UNKNOWN.to_string()),
            player_count: Some(players.len() as u32),
            max_players: info.vars.sv_max_clients.as_ref().and_then(parse_count),
            resource_count: Some(info.resources.map_or(0, |r| r.len() as u32)),
            players,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn status(&self) -> ServerStatus {
        if self.online {
            ServerStatus::Online
        } else {
            ServerStatus::Offline
        }
    }

    /// `current/max`, `0/0` when offline.
    pub fn players_label(&self) -> String {
        if !self.online {
            return "0/0".to_string();
        }
        let max = self
            .max_players
            .map_or_else(|| UNKNOWN.to_string(), |m| m.to_string());
        format!("{}/{}", self.player_count.unwrap_or(0), max)
    }

    pub fn resources_label(&self) -> String {
        self.resource_count
            .map_or_else(|| NOT_AVAILABLE.to_string(), |r| r.to_string())
    }

    pub fn ping_label(&self) -> String {
        self.latency_ms
            .map_or_else(|| NOT_AVAILABLE.to_string(), |ms| format!("{}ms", ms))
    }
}

/// Flat status document served by `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub name: String,
    pub status: ServerStatus,
    pub players: String,
    pub tags: String,
    pub resources: String,
    pub project_description: String,
    pub server_version: String,
    pub ping: String,
}

impl From<&ServerSnapshot> for StatusSummary {
    fn from(snapshot: &ServerSnapshot) -> Self {
        Self {
            name: snapshot.name.clone(),
            status: snapshot.status(),
            players: snapshot.players_label(),
            tags: snapshot.tags.clone(),
            resources: snapshot.resources_label(),
            project_description: snapshot.description.clone(),
            server_version: snapshot.version.clone(),
            ping: snapshot.ping_label(),
        }
    }
}

/// `info.json` as served by FXServer.
#[derive(Debug, Deserialize)]
pub struct InfoResponse {
    pub vars: InfoVars,
    #[serde(default)]
    pub resources: Option<Vec<Value>>,
    #[serde(default)]
    pub server: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InfoVars {
    #[serde(rename = "sv_projectName", default)]
    pub sv_project_name: Option<String>,
    /// FXServer reports this as either a string or a number
    #[serde(rename = "sv_maxClients", default)]
    pub sv_max_clients: Option<Value>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(rename = "sv_projectDesc", default)]
    pub sv_project_desc: Option<String>,
}

/// One entry of `players.json`.
#[derive(Debug, Deserialize)]
pub struct PlayerResponse {
    pub name: String,
    #[serde(default)]
    pub ping: i64,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
