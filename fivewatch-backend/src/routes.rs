use crate::AppState;
use crate::error::AppError;
use crate::helpers::{format_timestamp, whole_minutes};
use crate::history::PlayerHistory;
use crate::snapshot::StatusSummary;
use crate::source::StatusSource;

use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use std::sync::Arc;

const TOP_PLAYERS: usize = 5;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HistoryItem {
    name: String,
    last_seen: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerHistoryResponse {
    history: Vec<HistoryItem>,
    top_players: Vec<String>,
}

/// Live status; an unreachable server yields the offline body, not an error.
pub(crate) async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.source.fetch().await;
    Json(StatusSummary::from(&snapshot))
}

pub(crate) async fn player_history(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let table = PlayerHistory::from_entries(state.db.load_player_history().await?);

    let history = table
        .entries()
        .iter()
        .map(|e| HistoryItem {
            name: e.name.clone(),
            last_seen: format_timestamp(e.record.last_seen_at),
        })
        .collect();

    let top_players = table
        .top_n(TOP_PLAYERS)
        .into_iter()
        .map(|(name, total_ms)| format!("{} - {} minutes", name, whole_minutes(total_ms)))
        .collect();

    Ok(Json(PlayerHistoryResponse {
        history,
        top_players,
    }))
}
