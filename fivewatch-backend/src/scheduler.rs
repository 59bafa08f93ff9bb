//! Serializes every poll cycle through one executor task.
//!
//! Timer ticks and manual refreshes are both queued on a single channel; the
//! executor runs them strictly one after another. A tick arriving while
//! another tick is still queued is dropped.

use crate::engine::{CycleReport, EngineError, PollEngine};
use crate::helpers::now_millis;
use crate::notifier::Notifier;
use crate::reconcile::MessageChannel;
use crate::source::StatusSource;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

const QUEUE_DEPTH: usize = 16;

/// Manual refresh requested too soon after the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cooldown active, retry in {remaining_secs} seconds")]
pub struct CooldownActive {
    pub remaining_secs: u64,
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Cooldown(#[from] CooldownActive),

    #[error("refresh cycle failed: {0}")]
    Cycle(#[from] EngineError),

    #[error("poll executor has stopped")]
    ExecutorStopped,
}

/// Rate limit on manual refreshes. Automatic cycles never consult it.
#[derive(Debug)]
pub struct RefreshCooldown {
    window: Duration,
    last: Option<Instant>,
}

impl RefreshCooldown {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Claim the refresh slot at `now`, or report how long until it frees up.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), CooldownActive> {
        if let Some(last) = self.last {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.window {
                let remaining = self.window - elapsed;
                return Err(CooldownActive {
                    remaining_secs: remaining.as_millis().div_ceil(1000) as u64,
                });
            }
        }
        self.last = Some(now);
        Ok(())
    }
}

/// Anything the executor can drive; implemented by [`PollEngine`].
pub trait CycleRunner: Send + 'static {
    fn run_cycle(&mut self, now: i64)
    -> impl Future<Output = Result<CycleReport, EngineError>> + Send;
}

impl<S, C, N> CycleRunner for PollEngine<S, C, N>
where
    S: StatusSource + 'static,
    C: MessageChannel + 'static,
    N: Notifier + 'static,
{
    fn run_cycle(
        &mut self,
        now: i64,
    ) -> impl Future<Output = Result<CycleReport, EngineError>> + Send {
        PollEngine::run_cycle(self, now)
    }
}

type CycleReply = oneshot::Sender<Result<CycleReport, EngineError>>;

enum CycleRequest {
    Tick,
    Manual(CycleReply),
}

/// Cloneable front door to the executor.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<CycleRequest>,
    cooldown: Arc<Mutex<RefreshCooldown>>,
}

/// A queued manual refresh.
pub struct PendingRefresh {
    rx: oneshot::Receiver<Result<CycleReport, EngineError>>,
}

impl PendingRefresh {
    /// Wait for the queued cycle to finish.
    pub async fn wait(self) -> Result<CycleReport, RefreshError> {
        self.rx
            .await
            .map_err(|_| RefreshError::ExecutorStopped)?
            .map_err(RefreshError::from)
    }
}

impl SchedulerHandle {
    /// Check the cooldown and queue a cycle behind any in-flight one.
    pub async fn request_refresh(&self) -> Result<PendingRefresh, RefreshError> {
        self.cooldown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .try_acquire(Instant::now())?;

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CycleRequest::Manual(reply))
            .await
            .map_err(|_| RefreshError::ExecutorStopped)?;
        Ok(PendingRefresh { rx })
    }

    /// Queue a refresh and wait for it.
    pub async fn refresh(&self) -> Result<CycleReport, RefreshError> {
        self.request_refresh().await?.wait().await
    }
}

/// Start the executor and the interval timer. The first tick fires immediately.
pub fn spawn<R: CycleRunner>(runner: R, interval: Duration, cooldown: Duration) -> SchedulerHandle {
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    let tick_pending = Arc::new(AtomicBool::new(false));

    tokio::spawn(run_executor(runner, rx, tick_pending.clone()));
    tokio::spawn(run_timer(tx.clone(), interval, tick_pending));

    info!(
        interval_secs = interval.as_secs(),
        cooldown_secs = cooldown.as_secs(),
        "poll scheduler started"
    );
    SchedulerHandle {
        tx,
        cooldown: Arc::new(Mutex::new(RefreshCooldown::new(cooldown))),
    }
}

async fn run_executor<R: CycleRunner>(
    mut runner: R,
    mut rx: mpsc::Receiver<CycleRequest>,
    tick_pending: Arc<AtomicBool>,
) {
    while let Some(request) = rx.recv().await {
        match request {
            CycleRequest::Tick => {
                tick_pending.store(false, Ordering::SeqCst);
                if let Err(err) = runner.run_cycle(now_millis()).await {
                    error!(error = %err, "scheduled poll cycle failed");
                }
            }
            CycleRequest::Manual(reply) => {
                let result = runner.run_cycle(now_millis()).await;
                if let Err(err) = &result {
                    error!(error = %err, "manual poll cycle failed");
                }
                // The requester may have given up waiting
                let _ = reply.send(result);
            }
        }
    }
    debug!("poll executor stopped");
}

async fn run_timer(
    tx: mpsc::Sender<CycleRequest>,
    interval: Duration,
    tick_pending: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if tick_pending.swap(true, Ordering::SeqCst) {
            debug!("previous tick still queued, coalescing");
            continue;
        }
        match tx.try_send(CycleRequest::Tick) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tick_pending.store(false, Ordering::SeqCst);
                debug!("cycle queue full, dropping tick");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }
}
