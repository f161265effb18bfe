//! Background eviction of expired, idle cache entries.
//!
//! The sweeper never decides eligibility itself: it asks the registry for
//! whatever is reclaimable right now and disposes of it. Entries in use or
//! still downloading stay put and are looked at again next cycle.

use crate::{
    cache::{Evicted, Registry},
    metrics,
};
use std::io::ErrorKind;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run [`sweep_once`] every `interval` until `shutdown` is cancelled.
pub fn spawn(
    registry: Registry,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing can have expired yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    sweep_once(&registry, Instant::now()).await;
                }
            }
        }
    })
}

/// One sweep: reclaim everything the registry reports as expired and idle
/// at `now`. Returns how many entries were removed.
pub async fn sweep_once(registry: &Registry, now: Instant) -> usize {
    let cached = registry.len();
    let evicted = registry.sweep_expired_idle(now);
    let count = evicted.len();

    if count > 0 {
        info!("Cache clearance: {} of {} entries expired", count, cached);
    }
    for item in evicted {
        dispose(item).await;
    }

    metrics::record_evictions(count);
    metrics::set_cached_objects(registry.len());
    count
}

/// Force path for shutdown: remove every entry and delete every backing
/// file, whether or not anyone still holds it.
pub async fn drain(registry: &Registry) -> usize {
    let drained = registry.drain_all();
    let count = drained.len();
    for item in drained {
        dispose(item).await;
    }
    info!("Drained {} cache entries", count);
    metrics::set_cached_objects(0);
    count
}

async fn dispose(item: Evicted) {
    let entry = &item.entry;
    info!(
        "Evicting {}: {}s old, {} bytes, peak {} concurrent readers",
        entry.key(),
        entry.age().as_secs(),
        entry.size_bytes(),
        item.peak_ref_count
    );

    match tokio::fs::remove_file(entry.local_path()).await {
        Ok(()) => {}
        // Failed fetches never wrote a file.
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(
            "Could not delete {} for {}: {}",
            entry.local_path().display(),
            entry.key(),
            e
        ),
    }
}
