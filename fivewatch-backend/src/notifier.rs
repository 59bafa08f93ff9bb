use crate::reconcile::ChannelError;
use fivewatch_db::{ServerStatus, StatusRecord};
use std::future::Future;

/// Destination for one-off status change announcements.
pub trait Notifier: Send + Sync {
    fn send(&self, text: &str) -> impl Future<Output = Result<(), ChannelError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BackOnline { downtime_ms: i64 },
    WentOffline,
}

impl Transition {
    pub fn message(&self) -> String {
        match self {
            Transition::BackOnline { downtime_ms } => format!(
                "The server is back online! Downtime: {} seconds.",
                (*downtime_ms).max(0) / 1000
            ),
            Transition::WentOffline => "The server is now offline!".to_string(),
        }
    }
}

/// Compare `status` with the last recorded one.
///
/// Any change yields a new record stamped `now`; only Online/Offline flips
/// produce a notification. The very first status is recorded silently.
pub fn check_transition(
    status: ServerStatus,
    record: &StatusRecord,
    now: i64,
) -> (Option<Transition>, StatusRecord) {
    if record.last_status == Some(status) {
        return (None, *record);
    }

    let transition = match (record.last_status, status) {
        (Some(ServerStatus::Offline), ServerStatus::Online) => Some(Transition::BackOnline {
            downtime_ms: now - record.last_change_at,
        }),
        (Some(ServerStatus::Online), ServerStatus::Offline) => Some(Transition::WentOffline),
        _ => None,
    };

    let next = StatusRecord {
        last_status: Some(status),
        last_change_at: now,
    };
    (transition, next)
}
