//! In-memory stand-ins for the Discord and FiveM collaborators.

use crate::notifier::Notifier;
use crate::plan::MessageContent;
use crate::reconcile::{ChannelError, MessageChannel};
use crate::snapshot::{OnlinePlayer, ServerSnapshot};
use crate::source::StatusSource;
use fivewatch_db::MessageId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOp {
    Create(Option<MessageId>),
    Edit(MessageId),
    Delete(MessageId),
}

#[derive(Default)]
struct ChannelInner {
    next_id: MessageId,
    live: HashMap<MessageId, MessageContent>,
    ops: Vec<ChannelOp>,
    fail_creates: bool,
}

/// Channel that keeps posted messages in a map.
#[derive(Clone, Default)]
pub struct FakeChannel {
    inner: Arc<Mutex<ChannelInner>>,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<ChannelOp> {
        self.inner.lock().unwrap().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.inner.lock().unwrap().ops.clear();
    }

    pub fn count(&self, pred: impl Fn(&ChannelOp) -> bool) -> usize {
        self.inner.lock().unwrap().ops.iter().filter(|op| pred(op)).count()
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().unwrap().live.len()
    }

    pub fn exists(&self, id: MessageId) -> bool {
        self.inner.lock().unwrap().live.contains_key(&id)
    }

    pub fn content(&self, id: MessageId) -> Option<MessageContent> {
        self.inner.lock().unwrap().live.get(&id).cloned()
    }

    /// Delete a message out-of-band, as a moderator would.
    pub fn remove(&self, id: MessageId) {
        self.inner.lock().unwrap().live.remove(&id);
    }

    pub fn set_fail_creates(&self, fail: bool) {
        self.inner.lock().unwrap().fail_creates = fail;
    }
}

impl MessageChannel for FakeChannel {
    async fn create(&self, content: &MessageContent) -> Result<MessageId, ChannelError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_creates {
            inner.ops.push(ChannelOp::Create(None));
            return Err(ChannelError::Failed("create rejected".to_string()));
        }
        inner.next_id += 1;
        let id = 1000 + inner.next_id;
        inner.live.insert(id, content.clone());
        inner.ops.push(ChannelOp::Create(Some(id)));
        Ok(id)
    }

    async fn edit(&self, id: MessageId, content: &MessageContent) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().unwrap();
        inner.ops.push(ChannelOp::Edit(id));
        match inner.live.get_mut(&id) {
            Some(existing) => {
                *existing = content.clone();
                Ok(())
            }
            None => Err(ChannelError::NotFound(id)),
        }
    }

    async fn delete(&self, id: MessageId) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().unwrap();
        inner.ops.push(ChannelOp::Delete(id));
        inner
            .live
            .remove(&id)
            .map(|_| ())
            .ok_or(ChannelError::NotFound(id))
    }
}

/// Notifier that records every announcement.
#[derive(Clone, Default)]
pub struct FakeNotifier {
    sent: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<bool>>,
}

impl FakeNotifier {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

impl Notifier for FakeNotifier {
    async fn send(&self, text: &str) -> Result<(), ChannelError> {
        if *self.failing.lock().unwrap() {
            return Err(ChannelError::Failed("admin channel unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Source returning whatever snapshot the test set last.
#[derive(Clone)]
pub struct FakeSource {
    snapshot: Arc<Mutex<ServerSnapshot>>,
}

impl FakeSource {
    pub fn new(snapshot: ServerSnapshot) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(snapshot)),
        }
    }

    pub fn set(&self, snapshot: ServerSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }
}

impl StatusSource for FakeSource {
    async fn fetch(&self) -> ServerSnapshot {
        self.snapshot.lock().unwrap().clone()
    }
}

/// Online snapshot with the given player names.
pub fn online_with(names: &[&str]) -> ServerSnapshot {
    let mut snapshot = ServerSnapshot::offline();
    snapshot.online = true;
    snapshot.name = "Test RP".to_string();
    snapshot.tags = "None".to_string();
    snapshot.description = "No description".to_string();
    snapshot.version = "FXServer".to_string();
    snapshot.player_count = Some(names.len() as u32);
    snapshot.max_players = Some(32);
    snapshot.resource_count = Some(3);
    snapshot.latency_ms = Some(12);
    snapshot.players = names
        .iter()
        .map(|name| OnlinePlayer {
            name: name.to_string(),
            ping_ms: 20,
        })
        .collect();
    snapshot
}
