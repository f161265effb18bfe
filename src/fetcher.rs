//! One-shot upstream retrieval for a freshly created cache entry.
//!
//! The fetcher is the only writer of an entry's body. It streams the
//! upstream response into an entry-local buffer, persists it to the entry's
//! backing file, and then flips the entry to `Ready` or `Failed`, waking every
//! request waiting on it. Failures are logged and folded into the entry state;
//! they are never retried here.

use crate::{
    cache::{CacheEntry, EntryState},
    error::FetchError,
    metrics,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Default bound on a single upstream retrieval.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Network collaborator for the fetcher.
///
/// Performs one retrieval of `url`, handing each received chunk to `sink`,
/// and reports the total number of bytes transferred.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn retrieve(
        &self,
        url: &str,
        sink: &mut (dyn for<'b> FnMut(&'b [u8]) + Send),
    ) -> Result<u64, FetchError>;
}

/// [`Upstream`] over a pooled reqwest client.
#[derive(Clone, Debug)]
pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    /// Build a client that identifies itself with `user_agent` on every request.
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn retrieve(
        &self,
        url: &str,
        sink: &mut (dyn for<'b> FnMut(&'b [u8]) + Send),
    ) -> Result<u64, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut total = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            total += chunk.len() as u64;
            sink(&chunk[..]);
        }

        Ok(total)
    }
}

/// Start the fetch for `entry` on its own task.
///
/// The task is detached from the request that created the entry, so a
/// client that disconnects mid-download does not cancel the fetch other
/// requesters are waiting on.
pub fn spawn(
    entry: Arc<CacheEntry>,
    upstream: Arc<dyn Upstream>,
    timeout: Duration,
) -> JoinHandle<EntryState> {
    tokio::spawn(async move { run(&entry, upstream.as_ref(), timeout).await })
}

/// Fetch, persist and publish the terminal state of `entry`.
pub async fn run(entry: &CacheEntry, upstream: &dyn Upstream, timeout: Duration) -> EntryState {
    let started = Instant::now();
    info!("Pulling {} from {}", entry.key(), entry.upstream_url());

    let outcome = match fetch_and_persist(entry, upstream, timeout).await {
        Ok(bytes) => {
            info!(
                "Pulled {} ({} bytes in {}ms)",
                entry.key(),
                bytes,
                started.elapsed().as_millis()
            );
            metrics::record_fetch("ready", bytes);
            EntryState::Ready
        }
        Err(e) => {
            warn!(
                "Fetch failed for {} after {}ms (entry age {}s): {}",
                entry.key(),
                started.elapsed().as_millis(),
                entry.age().as_secs(),
                e
            );
            metrics::record_fetch("failed", entry.size_bytes());
            EntryState::Failed
        }
    };

    entry.finish(outcome);
    outcome
}

async fn fetch_and_persist(
    entry: &CacheEntry,
    upstream: &dyn Upstream,
    timeout: Duration,
) -> Result<u64, FetchError> {
    let mut body = Vec::new();
    let mut sink = |chunk: &[u8]| {
        body.extend_from_slice(chunk);
        entry.add_bytes(chunk.len());
    };

    let total = tokio::time::timeout(timeout, upstream.retrieve(entry.upstream_url(), &mut sink))
        .await
        .map_err(|_| FetchError::Timeout(timeout))??;

    if body.is_empty() {
        return Err(FetchError::EmptyBody);
    }

    tokio::fs::write(entry.local_path(), &body).await?;
    Ok(total)
}
