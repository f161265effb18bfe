use super::ObjectClass;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Where an entry is in its one-way lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    /// The upstream fetch is in flight
    Fetching,
    /// Body persisted to `local_path`, servable
    Ready,
    /// Fetch or persist failed; never served, never retried
    Failed,
}

impl EntryState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, EntryState::Fetching)
    }
}

/// One cached object.
///
/// Everything but `state` and `size_bytes` is fixed at creation. The state
/// lives in a `watch` channel so that requesters can await the
/// `Fetching -> Ready | Failed` transition instead of polling for it.
#[derive(Debug)]
pub struct CacheEntry {
    key: String,
    upstream_url: String,
    class: ObjectClass,
    local_path: PathBuf,
    created_at: Instant,
    expires_at: Instant,
    size_bytes: AtomicU64,
    state: watch::Sender<EntryState>,
}

impl CacheEntry {
    pub(crate) fn new(
        key: String,
        upstream_url: String,
        class: ObjectClass,
        local_path: PathBuf,
        created_at: Instant,
        ttl: Duration,
    ) -> Self {
        let (state, _) = watch::channel(EntryState::Fetching);
        Self {
            key,
            upstream_url,
            class,
            local_path,
            created_at,
            expires_at: created_at + ttl,
            size_bytes: AtomicU64::new(0),
            state,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn upstream_url(&self) -> &str {
        &self.upstream_url
    }

    pub fn class(&self) -> ObjectClass {
        self.class
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Acquire)
    }

    pub fn state(&self) -> EntryState {
        *self.state.borrow()
    }

    /// Account for a chunk received from upstream.
    pub(crate) fn add_bytes(&self, n: usize) {
        self.size_bytes.fetch_add(n as u64, Ordering::AcqRel);
    }

    /// Move out of `Fetching` and wake every waiter.
    ///
    /// Returns `false` if the entry had already reached a terminal state;
    /// the first transition wins.
    pub(crate) fn finish(&self, outcome: EntryState) -> bool {
        debug_assert!(outcome.is_terminal());
        self.state.send_if_modified(|state| {
            if *state == EntryState::Fetching {
                *state = outcome;
                true
            } else {
                false
            }
        })
    }

    /// Suspend until the fetch has finished and return the terminal state.
    pub async fn wait_terminal(&self) -> EntryState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            // The sender lives in `self`, so this only happens if the entry
            // is being torn down underneath us.
            Err(_) => EntryState::Failed,
        }
    }
}
