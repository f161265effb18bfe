//! Single-flight object cache for HLS manifests and segments.
//!
//! The [`Registry`] maps a client-visible object name to a [`CacheEntry`].
//! The first request that misses creates the entry and owns the one upstream
//! fetch; every other request for the same key shares that entry and waits on
//! its completion signal. Entries expire a fixed time after creation, with the
//! TTL chosen by [`ObjectClass`].

mod entry;
mod registry;

pub use entry::{CacheEntry, EntryState};
pub use registry::{Evicted, Registry};

use std::time::Duration;

/// Default manifest TTL. Short, so live playlists refresh.
pub const DEFAULT_MANIFEST_TTL: Duration = Duration::from_secs(4);

/// Default segment TTL. Segments are immutable once published.
pub const DEFAULT_SEGMENT_TTL: Duration = Duration::from_secs(60);

/// The two cacheable object kinds. Everything else bypasses the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    /// `.m3u8` playlist
    Manifest,
    /// `.ts` media chunk
    Segment,
}

impl ObjectClass {
    /// Classify an object by its file name. Returns `None` for anything that
    /// is not a manifest or a segment.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.ends_with(".m3u8") {
            Some(ObjectClass::Manifest)
        } else if name.ends_with(".ts") {
            Some(ObjectClass::Segment)
        } else {
            None
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ObjectClass::Manifest => "application/x-mpegURL",
            ObjectClass::Segment => "video/MP2T",
        }
    }

    /// Short label used in metrics, logs and backing-file names.
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectClass::Manifest => "m3u8",
            ObjectClass::Segment => "ts",
        }
    }
}

/// Per-class expiry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TtlPolicy {
    pub manifest: Duration,
    pub segment: Duration,
}

impl TtlPolicy {
    pub fn ttl(&self, class: ObjectClass) -> Duration {
        match class {
            ObjectClass::Manifest => self.manifest,
            ObjectClass::Segment => self.segment,
        }
    }

    /// Sweep cadence derived from the shorter-lived class: one second less
    /// than the manifest TTL, never below one second.
    pub fn default_sweep_interval(&self) -> Duration {
        self.manifest
            .saturating_sub(Duration::from_secs(1))
            .max(Duration::from_secs(1))
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            manifest: DEFAULT_MANIFEST_TTL,
            segment: DEFAULT_SEGMENT_TTL,
        }
    }
}

/// A request resolved to something the registry can key on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRequest {
    pub key: String,
    pub class: ObjectClass,
    pub upstream_url: String,
}
