//! One poll cycle: fetch, record history, reconcile messages, announce transitions.

use crate::history::HistoryStore;
use crate::notifier::{Notifier, Transition, check_transition};
use crate::plan::MessagePlan;
use crate::reconcile::{MessageChannel, ReconcileReport, reconcile};
use crate::source::StatusSource;
use fivewatch_db::{Database, DbError, MessagingState, ServerStatus};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    /// The cycle's state commit failed; in-memory state was not advanced.
    #[error("failed to persist {what}: {source}")]
    Persistence {
        what: &'static str,
        #[source]
        source: DbError,
    },
}

/// First commit failure of a cycle; later steps still run.
#[derive(Default)]
struct CommitFailure(Option<EngineError>);

impl CommitFailure {
    fn record(&mut self, what: &'static str, source: DbError) {
        warn!(what, error = %source, "state commit failed, keeping last committed state");
        self.0
            .get_or_insert(EngineError::Persistence { what, source });
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub page_size: usize,
    pub show_player_list: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: crate::plan::DEFAULT_PAGE_SIZE,
            show_player_list: false,
        }
    }
}

/// Outcome of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub status: ServerStatus,
    pub players: usize,
    pub messages: ReconcileReport,
    pub transition: Option<Transition>,
}

/// Owns the messaging state and history table; cycles must not overlap.
pub struct PollEngine<S, C, N> {
    source: S,
    channel: C,
    notifier: N,
    db: Database,
    history: HistoryStore,
    state: MessagingState,
    config: EngineConfig,
}

impl<S, C, N> PollEngine<S, C, N>
where
    S: StatusSource,
    C: MessageChannel,
    N: Notifier,
{
    /// Resume from the last committed checkpoint.
    pub async fn load(
        source: S,
        channel: C,
        notifier: N,
        db: Database,
        config: EngineConfig,
    ) -> Result<Self, DbError> {
        let state = db.load_messaging_state().await?;
        let history = HistoryStore::load(db.clone()).await?;
        info!(
            status_message_id = ?state.status_message_id,
            player_pages = state.player_list_message_ids.len(),
            last_status = ?state.status.last_status,
            "restored messaging state"
        );
        Ok(Self {
            source,
            channel,
            notifier,
            db,
            history,
            state,
            config,
        })
    }

    /// Run one cycle. A failed commit leaves only that piece of state at its
    /// last committed value; the cycle still completes and the first failure is
    /// returned afterwards.
    pub async fn run_cycle(&mut self, now: i64) -> Result<CycleReport, EngineError> {
        let snapshot = self.source.fetch().await;
        let mut failure = CommitFailure::default();

        if snapshot.online
            && let Err(err) = self
                .history
                .record_observation(snapshot.players.iter().map(|p| p.name.as_str()), now)
                .await
        {
            failure.record("player history", err);
        }

        let mut plan = MessagePlan::derive(&snapshot, self.config.page_size);
        if !self.config.show_player_list {
            plan = plan.without_player_list();
        }

        let (next, messages) = reconcile(&self.channel, &plan, &self.state).await;
        if next != self.state {
            match self
                .db
                .save_message_ids(next.status_message_id, next.player_list_message_ids.clone())
                .await
            {
                Ok(()) => self.state = next,
                Err(err) => failure.record("message ids", err),
            }
        }

        let status = snapshot.status();
        let (transition, record) = check_transition(status, &self.state.status, now);
        if record != self.state.status {
            if let Some(transition) = transition {
                let text = transition.message();
                if let Err(err) = self.notifier.send(&text).await {
                    warn!(error = %err, "failed to deliver status notification");
                }
            }
            match self.db.save_status_record(record).await {
                Ok(()) => self.state.status = record,
                Err(err) => failure.record("status record", err),
            }
        }

        info!(
            name = %snapshot.name,
            %status,
            players = %snapshot.players_label(),
            "updated status"
        );

        if let Some(err) = failure.0 {
            return Err(err);
        }
        Ok(CycleReport {
            status,
            players: snapshot.players.len(),
            messages,
            transition,
        })
    }

    pub fn state(&self) -> &MessagingState {
        &self.state
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ServerSnapshot;
    use crate::testing::{ChannelOp, FakeChannel, FakeNotifier, FakeSource, online_with};
    use std::path::{Path, PathBuf};

    const T0: i64 = 1_700_000_000_000;
    const MINUTE: i64 = 60_000;

    type TestEngine = PollEngine<FakeSource, FakeChannel, FakeNotifier>;

    async fn engine(
        db: &Database,
        source: &FakeSource,
        channel: &FakeChannel,
        notifier: &FakeNotifier,
    ) -> TestEngine {
        PollEngine::load(
            source.clone(),
            channel.clone(),
            notifier.clone(),
            db.clone(),
            EngineConfig {
                page_size: 30,
                show_player_list: true,
            },
        )
        .await
        .unwrap()
    }

    /// File-backed database plus a second connection used to break writes.
    struct BrokenDb {
        db: Database,
        side: tokio_rusqlite::Connection,
        path: PathBuf,
    }

    impl BrokenDb {
        async fn open(tag: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "fivewatch-engine-{}-{}.db",
                tag,
                std::process::id()
            ));
            remove_db_files(&path);
            let db = Database::open(&path).await.unwrap();
            let side = tokio_rusqlite::Connection::open(&path).await.unwrap();
            Self { db, side, path }
        }

        async fn exec(&self, sql: &'static str) {
            self.side
                .call(move |conn| conn.execute_batch(sql))
                .await
                .unwrap();
        }
    }

    impl Drop for BrokenDb {
        fn drop(&mut self) {
            remove_db_files(&self.path);
        }
    }

    fn remove_db_files(path: &Path) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.as_os_str().to_owned();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }

    #[tokio::test]
    async fn test_first_cycle_posts_status_and_player_list() {
        let db = Database::open_in_memory().await.unwrap();
        let source = FakeSource::new(online_with(&["Alice", "Bob"]));
        let channel = FakeChannel::new();
        let notifier = FakeNotifier::default();
        let mut engine = engine(&db, &source, &channel, &notifier).await;

        let report = engine.run_cycle(T0).await.unwrap();

        assert_eq!(report.status, ServerStatus::Online);
        assert_eq!(report.players, 2);
        assert_eq!(report.messages.created, 2);
        assert!(report.transition.is_none());
        assert!(notifier.sent().is_empty());

        let persisted = db.load_messaging_state().await.unwrap();
        assert_eq!(&persisted, engine.state());
        assert_eq!(persisted.status.last_status, Some(ServerStatus::Online));

        let page = channel
            .content(persisted.player_list_message_ids[0])
            .unwrap();
        assert_eq!(
            page.description.as_deref(),
            Some("Alice - Ping: 20ms\nBob - Ping: 20ms")
        );
    }

    #[tokio::test]
    async fn test_restart_edits_existing_messages() {
        let db = Database::open_in_memory().await.unwrap();
        let source = FakeSource::new(online_with(&["Alice"]));
        let channel = FakeChannel::new();
        let notifier = FakeNotifier::default();

        let mut first = engine(&db, &source, &channel, &notifier).await;
        first.run_cycle(T0).await.unwrap();
        let state = first.state().clone();
        drop(first);
        channel.clear_ops();

        let mut second = engine(&db, &source, &channel, &notifier).await;
        let report = second.run_cycle(T0 + MINUTE).await.unwrap();

        assert_eq!(report.messages.created, 0);
        assert_eq!(channel.count(|op| matches!(op, ChannelOp::Create(_))), 0);
        assert_eq!(channel.live_count(), 2);
        assert_eq!(second.state(), &state);
    }

    #[tokio::test]
    async fn test_history_accumulates_across_cycles() {
        let db = Database::open_in_memory().await.unwrap();
        let source = FakeSource::new(online_with(&["Alice", "Bob"]));
        let channel = FakeChannel::new();
        let notifier = FakeNotifier::default();
        let mut engine = engine(&db, &source, &channel, &notifier).await;

        engine.run_cycle(T0).await.unwrap();
        source.set(online_with(&["Alice"]));
        engine.run_cycle(T0 + MINUTE).await.unwrap();
        source.set(ServerSnapshot::offline());
        engine.run_cycle(T0 + 2 * MINUTE).await.unwrap();

        assert_eq!(
            engine.history().top_n(5),
            vec![("Alice", MINUTE), ("Bob", 0)]
        );
        let persisted = db.get_player("Alice".to_string()).await.unwrap().unwrap();
        assert_eq!(persisted.total_online_ms, MINUTE);
    }

    #[tokio::test]
    async fn test_offline_offline_online_notifies_once() {
        let db = Database::open_in_memory().await.unwrap();
        let source = FakeSource::new(online_with(&[]));
        let channel = FakeChannel::new();
        let notifier = FakeNotifier::default();
        let mut engine = engine(&db, &source, &channel, &notifier).await;

        engine.run_cycle(T0).await.unwrap();
        source.set(ServerSnapshot::offline());
        engine.run_cycle(T0 + MINUTE).await.unwrap();
        engine.run_cycle(T0 + 2 * MINUTE).await.unwrap();
        source.set(online_with(&[]));
        let report = engine.run_cycle(T0 + 5 * MINUTE).await.unwrap();

        assert_eq!(
            report.transition,
            Some(Transition::BackOnline {
                downtime_ms: 4 * MINUTE
            })
        );
        assert_eq!(
            notifier.sent(),
            vec![
                "The server is now offline!".to_string(),
                "The server is back online! Downtime: 240 seconds.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_downtime_survives_restart() {
        let db = Database::open_in_memory().await.unwrap();
        let source = FakeSource::new(online_with(&[]));
        let channel = FakeChannel::new();
        let notifier = FakeNotifier::default();

        let mut first = engine(&db, &source, &channel, &notifier).await;
        first.run_cycle(T0).await.unwrap();
        source.set(ServerSnapshot::offline());
        first.run_cycle(T0 + MINUTE).await.unwrap();
        drop(first);

        source.set(online_with(&[]));
        let mut second = engine(&db, &source, &channel, &notifier).await;
        let report = second.run_cycle(T0 + 11 * MINUTE).await.unwrap();

        assert_eq!(
            report.transition,
            Some(Transition::BackOnline {
                downtime_ms: 10 * MINUTE
            })
        );
    }

    #[tokio::test]
    async fn test_failed_notification_still_records_transition() {
        let db = Database::open_in_memory().await.unwrap();
        let source = FakeSource::new(online_with(&[]));
        let channel = FakeChannel::new();
        let notifier = FakeNotifier::default();
        let mut engine = engine(&db, &source, &channel, &notifier).await;

        engine.run_cycle(T0).await.unwrap();
        notifier.set_failing(true);
        source.set(ServerSnapshot::offline());
        let report = engine.run_cycle(T0 + MINUTE).await.unwrap();

        assert_eq!(report.transition, Some(Transition::WentOffline));
        let persisted = db.load_messaging_state().await.unwrap();
        assert_eq!(persisted.status.last_status, Some(ServerStatus::Offline));
        assert_eq!(persisted.status.last_change_at, T0 + MINUTE);
    }

    #[tokio::test]
    async fn test_player_list_disabled() {
        let db = Database::open_in_memory().await.unwrap();
        let source = FakeSource::new(online_with(&["Alice"]));
        let channel = FakeChannel::new();
        let notifier = FakeNotifier::default();
        let mut engine =
            PollEngine::load(source, channel.clone(), notifier, db, EngineConfig::default())
                .await
                .unwrap();

        engine.run_cycle(T0).await.unwrap();

        assert_eq!(channel.live_count(), 1);
        assert!(engine.state().player_list_message_ids.is_empty());
    }

    #[tokio::test]
    async fn test_history_write_failure_still_updates_messages_and_notifies() {
        let broken = BrokenDb::open("history").await;
        let source = FakeSource::new(online_with(&["Alice"]));
        let channel = FakeChannel::new();
        let notifier = FakeNotifier::default();
        let mut engine = engine(&broken.db, &source, &channel, &notifier).await;

        engine.run_cycle(T0).await.unwrap();
        source.set(ServerSnapshot::offline());
        engine.run_cycle(T0 + MINUTE).await.unwrap();
        let committed = engine.history().table().clone();

        broken
            .exec(
                "CREATE TRIGGER reject_history BEFORE INSERT ON player_history
                 BEGIN SELECT RAISE(ABORT, 'history is read-only'); END;",
            )
            .await;
        source.set(online_with(&["Alice", "Bob"]));
        let err = engine.run_cycle(T0 + 3 * MINUTE).await.unwrap_err();

        assert!(matches!(
            err,
            EngineError::Persistence {
                what: "player history",
                ..
            }
        ));
        // The status message and the notice went out regardless
        let status_id = engine.state().status_message_id.unwrap();
        let status = channel.content(status_id).unwrap();
        assert!(
            status
                .fields
                .iter()
                .any(|f| f.name == "Status" && f.value == "Online")
        );
        assert_eq!(engine.state().status.last_status, Some(ServerStatus::Online));
        assert_eq!(
            notifier.sent().last().map(String::as_str),
            Some("The server is back online! Downtime: 120 seconds.")
        );
        // History stays at its last committed table, in memory and on disk
        assert_eq!(engine.history().table(), &committed);
        let persisted = broken.db.load_player_history().await.unwrap();
        assert_eq!(persisted, committed.entries().to_vec());

        broken.exec("DROP TRIGGER reject_history;").await;
        engine.run_cycle(T0 + 4 * MINUTE).await.unwrap();

        assert_eq!(
            engine.history().top_n(5),
            vec![("Alice", 4 * MINUTE), ("Bob", 0)]
        );
        assert_eq!(broken.db.load_player_history().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_message_id_write_failure_keeps_committed_ids() {
        let broken = BrokenDb::open("message-ids").await;
        let source = FakeSource::new(online_with(&["Alice"]));
        let channel = FakeChannel::new();
        let notifier = FakeNotifier::default();
        let mut engine = engine(&broken.db, &source, &channel, &notifier).await;

        engine.run_cycle(T0).await.unwrap();
        let committed = engine.state().clone();
        let old_status_id = committed.status_message_id.unwrap();

        broken
            .exec(
                "CREATE TRIGGER reject_ids BEFORE INSERT ON documents
                 WHEN NEW.key = 'message_id'
                 BEGIN SELECT RAISE(ABORT, 'ids are read-only'); END;",
            )
            .await;
        channel.remove(old_status_id);
        source.set(ServerSnapshot::offline());
        let err = engine.run_cycle(T0 + MINUTE).await.unwrap_err();

        assert!(matches!(
            err,
            EngineError::Persistence {
                what: "message ids",
                ..
            }
        ));
        // Ids stay at the committed set, in memory and on disk
        assert_eq!(engine.state().status_message_id, Some(old_status_id));
        assert_eq!(
            engine.state().player_list_message_ids,
            committed.player_list_message_ids
        );
        let persisted = broken.db.load_messaging_state().await.unwrap();
        assert_eq!(persisted.status_message_id, Some(old_status_id));
        // The transition is still checked, announced and committed
        assert_eq!(notifier.sent(), vec!["The server is now offline!".to_string()]);
        assert_eq!(persisted.status.last_status, Some(ServerStatus::Offline));
        assert_eq!(engine.state().status.last_status, Some(ServerStatus::Offline));

        broken.exec("DROP TRIGGER reject_ids;").await;
        channel.clear_ops();
        let report = engine.run_cycle(T0 + 2 * MINUTE).await.unwrap();

        // Reconciled from the committed ids: the missing status message is recreated
        assert_eq!(channel.ops()[0], ChannelOp::Edit(old_status_id));
        assert_eq!(report.messages.created, 1);
        assert!(report.transition.is_none());
        assert_eq!(notifier.sent().len(), 1);
        let new_status_id = engine.state().status_message_id.unwrap();
        assert_ne!(new_status_id, old_status_id);
        assert!(channel.exists(new_status_id));
        let persisted = broken.db.load_messaging_state().await.unwrap();
        assert_eq!(&persisted, engine.state());
    }
}
