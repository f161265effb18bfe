use super::{CacheEntry, EntryState, ObjectClass, ObjectRequest, TtlPolicy};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Registry bookkeeping for one entry. Only touched under the map's lock.
#[derive(Debug)]
struct Slot {
    entry: Arc<CacheEntry>,
    ref_count: usize,
    peak_ref_count: usize,
}

impl Slot {
    fn is_reclaimable(&self, now: Instant) -> bool {
        self.ref_count == 0
            && self.entry.is_expired(now)
            && self.entry.state() != EntryState::Fetching
    }

    fn to_evicted(&self) -> Evicted {
        Evicted {
            entry: self.entry.clone(),
            peak_ref_count: self.peak_ref_count,
        }
    }
}

/// An entry removed from the registry, handed back for disposal.
#[derive(Debug)]
pub struct Evicted {
    pub entry: Arc<CacheEntry>,
    pub peak_ref_count: usize,
}

/// Keyed registry of cache entries.
///
/// All key-space and ref-count mutation goes through the four lifecycle
/// operations below. Each one holds the owning map shard's lock for O(1)
/// bookkeeping only, never across I/O or an await point.
#[derive(Clone, Debug)]
pub struct Registry {
    slots: Arc<DashMap<String, Slot>>,
    policy: TtlPolicy,
    cache_dir: Arc<PathBuf>,
}

impl Registry {
    pub fn new(policy: TtlPolicy, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            policy,
            cache_dir: Arc::new(cache_dir.into()),
        }
    }

    /// Look up `request.key`, creating a `Fetching` entry if it is absent.
    ///
    /// Either way the caller now holds one reference and must pair it with
    /// exactly one [`Registry::release`]. The boolean is `true` only for the
    /// caller that created the entry; that caller, and no other, starts the
    /// fetch.
    pub fn acquire_or_create(&self, request: &ObjectRequest) -> (Arc<CacheEntry>, bool) {
        match self.slots.entry(request.key.clone()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.ref_count += 1;
                slot.peak_ref_count = slot.peak_ref_count.max(slot.ref_count);
                debug!("Cache HIT for {} ({} holders)", request.key, slot.ref_count);
                (slot.entry.clone(), false)
            }
            Entry::Vacant(vacant) => {
                let entry = Arc::new(CacheEntry::new(
                    request.key.clone(),
                    request.upstream_url.clone(),
                    request.class,
                    self.backing_path(request.class),
                    Instant::now(),
                    self.policy.ttl(request.class),
                ));
                debug!(
                    "Cache MISS for {}, backing file {}",
                    request.key,
                    entry.local_path().display()
                );
                vacant.insert(Slot {
                    entry: entry.clone(),
                    ref_count: 1,
                    peak_ref_count: 1,
                });
                (entry, true)
            }
        }
    }

    /// Drop one reference to the entry under `key`. A no-op if the entry is
    /// gone.
    pub fn release(&self, key: &str) {
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.ref_count = slot.ref_count.saturating_sub(1);
        }
    }

    /// Remove and return every entry that is idle, expired and no longer
    /// fetching. Everything else stays for the next sweep.
    pub fn sweep_expired_idle(&self, now: Instant) -> Vec<Evicted> {
        let mut evicted = Vec::new();
        self.slots.retain(|_, slot| {
            if slot.is_reclaimable(now) {
                evicted.push(slot.to_evicted());
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Remove and return every entry regardless of holders or expiry.
    /// Shutdown only.
    pub fn drain_all(&self) -> Vec<Evicted> {
        let mut drained = Vec::with_capacity(self.slots.len());
        self.slots.retain(|_, slot| {
            drained.push(slot.to_evicted());
            false
        });
        drained
    }

    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.slots.get(key).map(|slot| slot.entry.clone())
    }

    pub fn ref_count(&self, key: &str) -> Option<usize> {
        self.slots.get(key).map(|slot| slot.ref_count)
    }

    pub fn peak_ref_count(&self, key: &str) -> Option<usize> {
        self.slots.get(key).map(|slot| slot.peak_ref_count)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn backing_path(&self, class: ObjectClass) -> PathBuf {
        let ext = class.as_str();
        self.cache_dir
            .join(format!("{}-{}.{}", ext, Uuid::new_v4().simple(), ext))
    }
}
