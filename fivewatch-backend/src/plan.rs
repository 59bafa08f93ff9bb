//! Desired channel contents for a snapshot, independent of what is posted.

use crate::helpers::whole_minutes;
use crate::snapshot::{OnlinePlayer, ServerSnapshot};

pub const DEFAULT_PAGE_SIZE: usize = 30;

pub const GREEN: u32 = 0x57F287;
pub const RED: u32 = 0xED4245;
pub const BLUE: u32 = 0x3498DB;

/// Interactive buttons attached to the status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    RefreshStatus,
    TopPlayers,
}

impl Button {
    pub const ALL: [Button; 2] = [Button::RefreshStatus, Button::TopPlayers];

    pub fn custom_id(&self) -> &'static str {
        match self {
            Button::RefreshStatus => "refresh_status",
            Button::TopPlayers => "top_players",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Button::RefreshStatus => "Refresh Status",
            Button::TopPlayers => "Top 5 Players",
        }
    }

    pub fn from_custom_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.custom_id() == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Transport-neutral content of one channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub title: String,
    pub description: Option<String>,
    pub fields: Vec<EmbedField>,
    pub color: u32,
    pub buttons: Vec<Button>,
}

impl MessageContent {
    fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: None,
            fields: Vec::new(),
            color,
            buttons: Vec::new(),
        }
    }

    fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn field(mut self, name: &str, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.to_string(),
            value: value.into(),
            inline,
        });
        self
    }
}

/// One status message plus, when enabled, the player list pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePlan {
    pub status: MessageContent,
    /// `None` leaves existing player list messages alone
    pub player_pages: Option<Vec<MessageContent>>,
}

impl MessagePlan {
    pub fn derive(snapshot: &ServerSnapshot, page_size: usize) -> Self {
        Self {
            status: status_content(snapshot),
            player_pages: Some(player_pages(&snapshot.players, page_size)),
        }
    }

    pub fn without_player_list(self) -> Self {
        Self {
            player_pages: None,
            ..self
        }
    }
}

/// Status embed for a snapshot, with the refresh and top players buttons.
pub fn status_content(snapshot: &ServerSnapshot) -> MessageContent {
    let color = if snapshot.online { GREEN } else { RED };
    let mut content = MessageContent::new("FiveM Server Status", color)
        .field("Server Name", &snapshot.name, true)
        .field("Status", snapshot.status().as_str(), true)
        .field("Players", snapshot.players_label(), true)
        .field("Tags", &snapshot.tags, true)
        .field("Resources", snapshot.resources_label(), true)
        .field("Ping", snapshot.ping_label(), true)
        .field("Description", &snapshot.description, false)
        .field("Server Version", &snapshot.version, true);
    content.buttons = Button::ALL.to_vec();
    content
}

/// Split the player list into pages of at most `page_size` lines.
///
/// Always returns at least one page.
pub fn player_pages(players: &[OnlinePlayer], page_size: usize) -> Vec<MessageContent> {
    if players.is_empty() {
        return vec![
            MessageContent::new("Player List", BLUE).description("No one is online right now"),
        ];
    }

    let page_size = page_size.max(1);
    players
        .chunks(page_size)
        .enumerate()
        .map(|(page, chunk)| {
            let first = page * page_size + 1;
            let last = first + chunk.len() - 1;
            MessageContent::new(format!("Player List ({}-{})", first, last), BLUE)
                .description(player_lines(chunk))
        })
        .collect()
}

/// `name - Ping: Nms`, one per line.
pub fn player_lines(players: &[OnlinePlayer]) -> String {
    players
        .iter()
        .map(|p| format!("{} - Ping: {}ms", p.name, p.ping_ms))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Numbered top players list, or a placeholder when nobody is tracked.
pub fn top_players_text(top: &[(&str, i64)]) -> String {
    if top.is_empty() {
        return "No players have been tracked yet.".to_string();
    }
    top.iter()
        .enumerate()
        .map(|(i, (name, total_ms))| {
            format!("{}. {} - {} minutes", i + 1, name, whole_minutes(*total_ms))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
