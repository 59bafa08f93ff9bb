use crate::snapshot::{InfoResponse, PlayerResponse, ServerSnapshot};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Telemetry fetch failed or timed out.
#[derive(Debug, Error)]
#[error("upstream unavailable: {0}")]
pub struct UpstreamUnavailable(#[from] reqwest::Error);

/// Anything that can report the current state of the game server.
///
/// Implementations never fail: an unreachable server is an offline snapshot.
pub trait StatusSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = ServerSnapshot> + Send;
}

/// Polls `info.json` and `players.json` on a FiveM server.
#[derive(Debug, Clone)]
pub struct HttpStatusSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStatusSource {
    /// `timeout` bounds each of the two requests separately.
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self, UpstreamUnavailable> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: format!("http://{}:{}", host, port),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn try_fetch(&self) -> Result<ServerSnapshot, UpstreamUnavailable> {
        let started = Instant::now();

        let info: InfoResponse = self
            .client
            .get(format!("{}/info.json", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let players: Vec<PlayerResponse> = self
            .client
            .get(format!("{}/players.json", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let latency_ms = started.elapsed().as_millis() as u64;
        Ok(ServerSnapshot::from_responses(info, players, latency_ms))
    }
}

impl StatusSource for HttpStatusSource {
    async fn fetch(&self) -> ServerSnapshot {
        match self.try_fetch().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(base_url = %self.base_url, error = %err, "server status fetch failed, reporting offline");
                ServerSnapshot::offline()
            }
        }
    }
}
