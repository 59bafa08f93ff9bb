mod error;
mod models;

pub use error::{DbError, Result};
pub use models::{
  HistoryEntry, MessageId, MessagingState, PlayerRecord, ServerStatus, StatusRecord,
};

use models::{PlayerListDoc, StatusMessageDoc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::{OptionalExtension, params};
use tracing::{debug, info};

const STATUS_MESSAGE_KEY: &str = "message_id";
const PLAYER_LIST_KEY: &str = "player_list_message_ids";
const STATUS_KEY: &str = "status";

/// Durable checkpoint store for the status engine.
#[derive(Clone)]
pub struct Database {
  conn: Connection,
}

impl Database {
  /// Open or create a database at the given path.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path).await.map_err(DbError::Sqlite)?;
    let db = Self { conn };
    db.initialize().await?;
    Ok(db)
  }

  /// Create an in-memory database (useful for testing).
  pub async fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .await
      .map_err(DbError::Sqlite)?;
    let db = Self { conn };
    db.initialize().await?;
    Ok(db)
  }

  async fn initialize(&self) -> Result<()> {
    self.conn
            .call(|conn| {
                conn.pragma_update(None, "journal_mode", "WAL")?;

                conn.execute_batch(
                    r#"
                    -- One JSON document per persisted concern
                    CREATE TABLE IF NOT EXISTS documents (
                        key TEXT PRIMARY KEY,
                        body TEXT NOT NULL
                    );

                    -- Cumulative online time, seq keeps first-seen order
                    CREATE TABLE IF NOT EXISTS player_history (
                        name TEXT PRIMARY KEY,
                        seq INTEGER NOT NULL,
                        total_online_ms INTEGER NOT NULL,
                        last_seen_at INTEGER NOT NULL
                    );
                    "#,
                )?;
                Ok(())
            })
            .await?;

    info!("database initialized");
    Ok(())
  }

  // ========================================================================
  // Messaging state
  // ========================================================================

  /// Load the last committed messaging state. Missing documents load as defaults.
  pub async fn load_messaging_state(&self) -> Result<MessagingState> {
    let (status_message, player_list, status) = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare_cached("SELECT body FROM documents WHERE key = ?1")?;
        let mut get = |key: &str| -> tokio_rusqlite::rusqlite::Result<Option<String>> {
          stmt.query_row(params![key], |row| row.get(0)).optional()
        };
        Ok((
          get(STATUS_MESSAGE_KEY)?,
          get(PLAYER_LIST_KEY)?,
          get(STATUS_KEY)?,
        ))
      })
      .await?;

    let status_message: StatusMessageDoc = decode(STATUS_MESSAGE_KEY, status_message)?;
    let player_list: PlayerListDoc = decode(PLAYER_LIST_KEY, player_list)?;
    let status: StatusRecord = decode(STATUS_KEY, status)?;

    Ok(MessagingState {
      status_message_id: status_message.message_id,
      player_list_message_ids: player_list.ids,
      status,
    })
  }

  /// Commit the message ids produced by a reconcile pass.
  pub async fn save_message_ids(
    &self,
    status_message_id: Option<MessageId>,
    player_list_message_ids: Vec<MessageId>,
  ) -> Result<()> {
    let pages = player_list_message_ids.len();
    let docs = vec![
      (
        STATUS_MESSAGE_KEY,
        encode(STATUS_MESSAGE_KEY, &StatusMessageDoc {
          message_id: status_message_id,
        })?,
      ),
      (
        PLAYER_LIST_KEY,
        encode(PLAYER_LIST_KEY, &PlayerListDoc {
          ids: player_list_message_ids,
        })?,
      ),
    ];
    self.put_documents(docs).await?;

    debug!(?status_message_id, pages, "saved message ids");
    Ok(())
  }

  /// Commit the notifier's last known status.
  pub async fn save_status_record(&self, record: StatusRecord) -> Result<()> {
    let body = encode(STATUS_KEY, &record)?;
    self.put_documents(vec![(STATUS_KEY, body)]).await?;

    debug!(last_status = ?record.last_status, record.last_change_at, "saved status record");
    Ok(())
  }

  async fn put_documents(&self, docs: Vec<(&'static str, String)>) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt =
            tx.prepare_cached("INSERT OR REPLACE INTO documents (key, body) VALUES (?1, ?2)")?;
          for (key, body) in &docs {
            stmt.execute(params![key, body])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ========================================================================
  // Player history
  // ========================================================================

  /// Load every tracked player in first-seen order.
  pub async fn load_player_history(&self) -> Result<Vec<HistoryEntry>> {
    let entries = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT name, total_online_ms, last_seen_at FROM player_history ORDER BY seq",
        )?;

        let entries = stmt
          .query_map([], |row| {
            Ok(HistoryEntry {
              name: row.get(0)?,
              record: PlayerRecord {
                total_online_ms: row.get(1)?,
                last_seen_at: row.get(2)?,
              },
            })
          })?
          .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
      })
      .await?;

    Ok(entries)
  }

  /// Replace the whole history table in one transaction.
  ///
  /// Slice order becomes the persisted first-seen order.
  pub async fn save_player_history(&self, entries: Vec<HistoryEntry>) -> Result<()> {
    let count = entries.len();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        tx.prepare_cached("DELETE FROM player_history")?.execute([])?;

        {
          let mut insert_stmt = tx.prepare_cached(
            "INSERT INTO player_history (name, seq, total_online_ms, last_seen_at) VALUES (?1, ?2, ?3, ?4)",
          )?;
          for (seq, entry) in entries.iter().enumerate() {
            insert_stmt.execute(params![
              &entry.name,
              seq as i64,
              entry.record.total_online_ms,
              entry.record.last_seen_at
            ])?;
          }
        }

        tx.commit()?;
        Ok(())
      })
      .await?;

    debug!(count, "saved player history");
    Ok(())
  }

  /// Look up a single player by exact name.
  pub async fn get_player(&self, name: String) -> Result<Option<PlayerRecord>> {
    let record = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(
            "SELECT total_online_ms, last_seen_at FROM player_history WHERE name = ?1",
          )?
          .query_row(params![&name], |row| {
            Ok(PlayerRecord {
              total_online_ms: row.get(0)?,
              last_seen_at: row.get(1)?,
            })
          })
          .optional()
      })
      .await?;

    Ok(record)
  }
}

fn encode<T: Serialize>(key: &'static str, value: &T) -> Result<String> {
  serde_json::to_string(value).map_err(|source| DbError::CorruptDocument { key, source })
}

fn decode<T: DeserializeOwned + Default>(key: &'static str, body: Option<String>) -> Result<T> {
  match body {
    Some(body) => {
      serde_json::from_str(&body).map_err(|source| DbError::CorruptDocument { key, source })
    }
    None => Ok(T::default()),
  }
}
