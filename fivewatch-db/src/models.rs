use serde::{Deserialize, Serialize};

/// Discord message snowflake.
pub type MessageId = u64;

/// Cumulative online time for one player identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerRecord {
  /// Milliseconds credited across all observations
  pub total_online_ms: i64,
  /// Unix timestamp (ms) of the most recent observation
  pub last_seen_at: i64,
}

impl PlayerRecord {
  /// Record for an identity seen for the first time.
  pub fn first_seen(now: i64) -> Self {
    Self {
      total_online_ms: 0,
      last_seen_at: now,
    }
  }

  /// Credit the time elapsed since the previous observation.
  ///
  /// A clock that moved backwards credits nothing, so the total never shrinks.
  pub fn observed(self, now: i64) -> Self {
    Self {
      total_online_ms: self.total_online_ms + (now - self.last_seen_at).max(0),
      last_seen_at: now.max(self.last_seen_at),
    }
  }
}

/// A persisted history row, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
  pub name: String,
  pub record: PlayerRecord,
}

/// Reachability of the monitored game server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
  Online,
  Offline,
}

impl ServerStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      ServerStatus::Online => "Online",
      ServerStatus::Offline => "Offline",
    }
  }
}

impl std::fmt::Display for ServerStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Last status the notifier acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
  pub last_status: Option<ServerStatus>,
  /// Unix timestamp (ms) of the last transition
  #[serde(rename = "lastChange", default)]
  pub last_change_at: i64,
}

/// Everything the reconciler and notifier know about the channel.
///
/// Only ever mutated after the matching Discord operation succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessagingState {
  pub status_message_id: Option<MessageId>,
  /// One id per player list page, in page order
  pub player_list_message_ids: Vec<MessageId>,
  pub status: StatusRecord,
}

/// `message_id` document body.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusMessageDoc {
  pub message_id: Option<MessageId>,
}

/// `player_list_message_ids` document body.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerListDoc {
  #[serde(rename = "playerMessageIds", default)]
  pub ids: Vec<MessageId>,
}
