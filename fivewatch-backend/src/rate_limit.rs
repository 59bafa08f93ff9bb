//! Per-client sliding window limiter for the read API.

use crate::error::ErrorResponse;
use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use scc::HashMap;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Rate limiting configuration
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Length of the sliding window
    pub window: Duration,
    /// Requests allowed per client inside one window
    pub max_requests: usize,
    /// Block applied once a client exceeds the window budget
    pub block: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(10),
            max_requests: 40,
            block: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Blocked,
}

#[derive(Debug, Default)]
struct ClientWindow {
    hits: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

impl ClientWindow {
    fn hit(&mut self, now: Instant, config: &RateLimitConfig) -> Verdict {
        if let Some(until) = self.blocked_until {
            if now < until {
                return Verdict::Blocked;
            }
            self.blocked_until = None;
            self.hits.clear();
        }

        while let Some(&oldest) = self.hits.front() {
            if now.saturating_duration_since(oldest) >= config.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }

        if self.hits.len() >= config.max_requests {
            self.blocked_until = Some(now + config.block);
            return Verdict::Blocked;
        }
        self.hits.push_back(now);
        Verdict::Allowed
    }

    /// No hit inside the window and no block in force.
    fn is_idle(&self, now: Instant, config: &RateLimitConfig) -> bool {
        let unblocked = self.blocked_until.is_none_or(|until| now >= until);
        let quiet = self
            .hits
            .back()
            .is_none_or(|&last| now.saturating_duration_since(last) >= config.window);
        unblocked && quiet
    }
}

/// In-memory only; forgotten on restart.
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: HashMap<String, ClientWindow>,
    next_cleanup: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: HashMap::new(),
            next_cleanup: Mutex::new(None),
        }
    }

    pub async fn check(&self, client: &str, now: Instant) -> Verdict {
        self.cleanup_if_due(now).await;

        let config = self.config;
        if let Some(verdict) = self
            .clients
            .update_async(client, |_, window| window.hit(now, &config))
            .await
        {
            return verdict;
        }

        let mut window = ClientWindow::default();
        let verdict = window.hit(now, &config);
        match self.clients.insert_async(client.to_string(), window).await {
            Ok(()) => verdict,
            // Another request from the same client inserted first
            Err(_) => self
                .clients
                .update_async(client, |_, window| window.hit(now, &config))
                .await
                .unwrap_or(verdict),
        }
    }

    /// Drop clients with no hits inside the window and no active block.
    pub async fn cleanup(&self, now: Instant) {
        let config = self.config;
        let before = self.clients.len();
        self.clients
            .retain_async(|_, window| !window.is_idle(now, &config))
            .await;
        let evicted = before.saturating_sub(self.clients.len());
        if evicted > 0 {
            tracing::debug!(evicted, "evicted idle rate limit windows");
        }
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    /// Sweeps at most once per window so a check stays O(1) amortized.
    async fn cleanup_if_due(&self, now: Instant) {
        let due = {
            let Ok(mut next) = self.next_cleanup.lock() else {
                return;
            };
            match *next {
                Some(at) if now < at => false,
                _ => {
                    *next = Some(now + self.config.window);
                    true
                }
            }
        };
        if due {
            self.cleanup(now).await;
        }
    }
}

/// Client identity: the peer address, or the first `X-Forwarded-For` hop when
/// the peer is a local reverse proxy on loopback.
fn client_key(req: &Request) -> String {
    let peer_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|c| c.0.ip());

    if peer_ip.is_some_and(|ip| ip.is_loopback())
        && let Some(forwarded) = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
    {
        let forwarded = forwarded.trim();
        if !forwarded.is_empty() {
            return forwarded.to_string();
        }
    }

    peer_ip
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// axum middleware rejecting limited clients with 429.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_key(&req);
    match limiter.check(&client, Instant::now()).await {
        Verdict::Allowed => next.run(req).await,
        Verdict::Blocked => {
            tracing::warn!(%client, "rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorResponse::new(format!(
                    "Too many requests. You are blocked for {} seconds.",
                    limiter.config.block.as_secs()
                ))),
            )
                .into_response()
        }
    }
}
