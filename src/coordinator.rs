//! Per-request entry point into the cache.
//!
//! A request is resolved to an [`ObjectRequest`], which acquires (or
//! creates) the matching entry. The creator spawns the fetch; everyone then
//! suspends on the entry's completion signal. A [`Lease`] ties the
//! registry reference to the request's lifetime, so the reference is
//! released on every exit path: errors, a client that goes away mid-wait,
//! and the end (or abandonment) of the streamed response body.

use crate::{
    cache::{CacheEntry, EntryState, ObjectClass, ObjectRequest, Registry},
    error::{ProxyError, Result},
    fetcher::{self, Upstream},
    metrics,
};
use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// One held reference on a registry entry. Released on drop.
#[derive(Debug)]
pub struct Lease {
    registry: Registry,
    entry: Arc<CacheEntry>,
}

impl Lease {
    pub fn entry(&self) -> &Arc<CacheEntry> {
        &self.entry
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.registry.release(self.entry.key());
    }
}

/// A ready object, opened for streaming.
#[derive(Debug)]
pub struct Delivery {
    pub file: File,
    pub len: u64,
    pub class: ObjectClass,
    lease: Lease,
}

impl Delivery {
    pub fn content_type(&self) -> &'static str {
        self.class.content_type()
    }

    pub fn entry(&self) -> &Arc<CacheEntry> {
        self.lease.entry()
    }

    /// Stream the file contents. The lease travels with the stream and is
    /// released when the stream is exhausted or dropped.
    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
        let Delivery { file, lease, .. } = self;
        ReaderStream::new(file).map(move |chunk| {
            let _held = &lease;
            chunk
        })
    }
}

/// Resolve a request path against `origin_url`.
///
/// Returns `Ok(None)` for paths that are neither manifests nor segments;
/// those bypass the cache. The key is the trailing path segment.
pub fn resolve(path: &str, origin_url: &str) -> Result<Option<ObjectRequest>> {
    let relative = path.trim_start_matches('/');
    if relative.split('/').any(|segment| segment == "..") {
        return Err(ProxyError::InvalidPath(path.to_string()));
    }

    let key = relative.rsplit('/').next().unwrap_or_default();
    let Some(class) = ObjectClass::from_name(key) else {
        return Ok(None);
    };

    Ok(Some(ObjectRequest {
        key: key.to_string(),
        class,
        upstream_url: format!("{}/{}", origin_url.trim_end_matches('/'), relative),
    }))
}

/// Ties the registry to the upstream transport for request handling.
#[derive(Clone)]
pub struct Coordinator {
    registry: Registry,
    upstream: Arc<dyn Upstream>,
    origin_url: Arc<str>,
    fetch_timeout: Duration,
}

impl Coordinator {
    pub fn new(
        registry: Registry,
        upstream: Arc<dyn Upstream>,
        origin_url: &str,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            upstream,
            origin_url: Arc::from(origin_url),
            fetch_timeout,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn resolve(&self, path: &str) -> Result<Option<ObjectRequest>> {
        resolve(path, &self.origin_url)
    }

    /// Acquire the object, fetching it if this is the first request, and
    /// wait for it to become servable.
    ///
    /// # Errors
    /// [`ProxyError::UpstreamFetchFailed`] if the shared fetch failed, or
    /// [`ProxyError::Storage`] if the backing file cannot be opened.
    pub async fn deliver(&self, request: &ObjectRequest) -> Result<Delivery> {
        let (entry, created) = self.registry.acquire_or_create(request);
        let lease = Lease {
            registry: self.registry.clone(),
            entry,
        };

        metrics::record_lookup(request.class.as_str(), !created);
        if created {
            fetcher::spawn(
                lease.entry.clone(),
                self.upstream.clone(),
                self.fetch_timeout,
            );
            metrics::set_cached_objects(self.registry.len());
        } else {
            debug!("Joining existing entry for {}", request.key);
        }

        match lease.entry.wait_terminal().await {
            EntryState::Ready => {}
            EntryState::Failed | EntryState::Fetching => {
                return Err(ProxyError::UpstreamFetchFailed(request.key.clone()));
            }
        }

        let file = File::open(lease.entry.local_path()).await?;
        let len = file.metadata().await?.len();

        Ok(Delivery {
            file,
            len,
            class: request.class,
            lease,
        })
    }
}
