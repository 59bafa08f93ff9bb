//! Bring the channel in line with a [`MessagePlan`].
//!
//! The persisted message ids are the only record of what is posted; the
//! channel is never re-read. A message that disappeared behind our back shows
//! up as a failed edit and is recreated.

use crate::plan::{MessageContent, MessagePlan};
use fivewatch_db::{MessageId, MessagingState};
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

/// A create, edit or delete against the chat channel failed.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("message {0} does not exist")]
    NotFound(MessageId),

    #[error("message operation failed: {0}")]
    Failed(String),
}

/// The chat channel the status messages live in.
pub trait MessageChannel: Send + Sync {
    fn create(
        &self,
        content: &MessageContent,
    ) -> impl Future<Output = Result<MessageId, ChannelError>> + Send;

    fn edit(
        &self,
        id: MessageId,
        content: &MessageContent,
    ) -> impl Future<Output = Result<(), ChannelError>> + Send;

    fn delete(&self, id: MessageId) -> impl Future<Output = Result<(), ChannelError>> + Send;
}

/// Operation counts for one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub edited: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Apply `plan` to the channel and return the resulting state.
///
/// Every operation is attempted; failures are logged and counted. The caller
/// persists the returned state once this returns.
pub async fn reconcile<C: MessageChannel>(
    channel: &C,
    plan: &MessagePlan,
    state: &MessagingState,
) -> (MessagingState, ReconcileReport) {
    let mut next = state.clone();
    let mut report = ReconcileReport::default();

    next.status_message_id =
        upsert(channel, state.status_message_id, &plan.status, &mut report, "status").await;

    if let Some(pages) = &plan.player_pages {
        next.player_list_message_ids =
            reconcile_pages(channel, pages, &state.player_list_message_ids, &mut report).await;
    }

    debug!(
        created = report.created,
        edited = report.edited,
        deleted = report.deleted,
        failed = report.failed,
        "reconciled channel"
    );
    (next, report)
}

async fn reconcile_pages<C: MessageChannel>(
    channel: &C,
    pages: &[MessageContent],
    existing: &[MessageId],
    report: &mut ReconcileReport,
) -> Vec<MessageId> {
    let mut ids = Vec::with_capacity(pages.len());

    for (slot, page) in pages.iter().enumerate() {
        match existing.get(slot) {
            Some(&id) => {
                let id = upsert(channel, Some(id), page, report, "player list").await;
                // upsert keeps the old id when both edit and create fail
                ids.extend(id);
            }
            None => match create(channel, page, report, "player list").await {
                Some(id) => ids.push(id),
                // Appending later pages would shift them into this slot
                None => break,
            },
        }
    }

    for &surplus in existing.iter().skip(pages.len()).rev() {
        match channel.delete(surplus).await {
            Ok(()) => report.deleted += 1,
            Err(err) => {
                report.failed += 1;
                warn!(message_id = surplus, error = %err, "failed to delete surplus player list message");
            }
        }
    }

    ids
}

/// Edit `current` in place, creating a new message when there is none or the
/// edit fails. Returns the id to remember for this slot.
async fn upsert<C: MessageChannel>(
    channel: &C,
    current: Option<MessageId>,
    content: &MessageContent,
    report: &mut ReconcileReport,
    kind: &'static str,
) -> Option<MessageId> {
    if let Some(id) = current {
        match channel.edit(id, content).await {
            Ok(()) => {
                report.edited += 1;
                return Some(id);
            }
            Err(err) => {
                report.failed += 1;
                warn!(message_id = id, kind, error = %err, "edit failed, posting a new message");
            }
        }
    }

    create(channel, content, report, kind).await.or(current)
}

async fn create<C: MessageChannel>(
    channel: &C,
    content: &MessageContent,
    report: &mut ReconcileReport,
    kind: &'static str,
) -> Option<MessageId> {
    match channel.create(content).await {
        Ok(id) => {
            report.created += 1;
            Some(id)
        }
        Err(err) => {
            report.failed += 1;
            warn!(kind, error = %err, "failed to post message");
            None
        }
    }
}
