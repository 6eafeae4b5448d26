//! Trail store: one timeline per identity.
//!
//! Each identity's state sits behind its own mutex, so appends and merges for
//! one identity are serialized while different identities never contend. The
//! identity map itself is only locked long enough to look up or insert a
//! handle.
//!
//! Timelines are created lazily on the first position for an identity and
//! only ever grow. There is no deletion, expiry or capacity bound.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use log::debug;

use crate::filter::SampleFilter;
use crate::segmentation::Segment;
use crate::timeline::Timeline;
use crate::{Coordinate, Timestamp};

/// Everything the engine keeps for one identity.
#[derive(Debug, Clone)]
pub struct IdentityTrail {
    pub timeline: Timeline,
    /// Segments from the last recompute of `timeline`
    pub segments: Vec<Segment>,
    /// Live-sample gate for this identity
    pub filter: SampleFilter,
    /// Text shown next to the identity's endpoint markers
    pub label: String,
}

impl IdentityTrail {
    fn new(identity: &str, filter: SampleFilter) -> Self {
        Self {
            timeline: Timeline::new(),
            segments: Vec::new(),
            filter,
            label: identity.to_string(),
        }
    }

    /// Record one position. Returns `true` if the timeline changed.
    pub fn append(&mut self, timestamp: Timestamp, coordinate: Coordinate) -> bool {
        self.timeline.insert(timestamp, coordinate)
    }

    /// Insert every entry of a batch.
    ///
    /// Returns the earliest timestamp whose entry changed, or `None` if the
    /// batch left the timeline as it was. Segments from that point on are
    /// stale.
    pub fn merge<I>(&mut self, batch: I) -> Option<Timestamp>
    where
        I: IntoIterator<Item = (Timestamp, Coordinate)>,
    {
        batch
            .into_iter()
            .filter(|(t, c)| self.append(*t, *c))
            .map(|(t, _)| t)
            .min()
    }
}

/// Shared, lockable handle to one identity's trail.
pub type TrailHandle = Arc<Mutex<IdentityTrail>>;

/// Lock an identity's trail.
///
/// A panic while holding the lock cannot leave the trail half-written (every
/// mutation is a single insert or a whole-vector swap), so poisoning is ignored.
pub fn lock_trail(handle: &TrailHandle) -> MutexGuard<'_, IdentityTrail> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Append-only collection of per-identity trails.
#[derive(Debug)]
pub struct TrailStore {
    trails: RwLock<HashMap<String, TrailHandle>>,
    /// Cloned into each new identity
    filter_template: SampleFilter,
}

impl Default for TrailStore {
    fn default() -> Self {
        Self::new(SampleFilter::default())
    }
}

impl TrailStore {
    /// Create a store whose identities start with a copy of `filter_template`.
    pub fn new(filter_template: SampleFilter) -> Self {
        Self {
            trails: RwLock::new(HashMap::new()),
            filter_template,
        }
    }

    /// Handle for an existing identity.
    pub fn trail(&self, identity: &str) -> Option<TrailHandle> {
        self.trails
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
    }

    /// Handle for an identity, creating an empty trail if it is new.
    pub fn trail_or_create(&self, identity: &str) -> TrailHandle {
        if let Some(handle) = self.trail(identity) {
            return handle;
        }
        let mut trails = self.trails.write().unwrap_or_else(PoisonError::into_inner);
        trails
            .entry(identity.to_string())
            .or_insert_with(|| {
                debug!("[TrailStore] New identity {}", identity);
                Arc::new(Mutex::new(IdentityTrail::new(
                    identity,
                    self.filter_template.clone(),
                )))
            })
            .clone()
    }

    /// All handles, sorted by identity.
    pub fn handles(&self) -> Vec<(String, TrailHandle)> {
        let trails = self.trails.read().unwrap_or_else(PoisonError::into_inner);
        let mut handles: Vec<_> = trails
            .iter()
            .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
            .collect();
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        handles
    }

    /// Record a position for an identity, overwriting any entry at the same
    /// timestamp. Returns `true` if the identity's timeline changed.
    pub fn append(&self, identity: &str, timestamp: Timestamp, coordinate: Coordinate) -> bool {
        let handle = self.trail_or_create(identity);
        let changed = lock_trail(&handle).append(timestamp, coordinate);
        changed
    }

    /// Append every entry of a batch. The final timeline does not depend on
    /// the order of the batch. Returns the earliest changed timestamp.
    pub fn merge<I>(&self, identity: &str, batch: I) -> Option<Timestamp>
    where
        I: IntoIterator<Item = (Timestamp, Coordinate)>,
    {
        let handle = self.trail_or_create(identity);
        let mut trail = lock_trail(&handle);
        let changed_from = trail.merge(batch);
        debug!(
            "[TrailStore] Merged batch for {}: changed from {:?}, {} total",
            identity,
            changed_from,
            trail.timeline.len()
        );
        changed_from
    }

    /// Snapshot of an identity's timeline, or `None` if it has never been seen.
    pub fn timeline_of(&self, identity: &str) -> Option<Timeline> {
        let handle = self.trail(identity)?;
        let timeline = lock_trail(&handle).timeline.clone();
        Some(timeline)
    }

    /// All identities with a timeline.
    pub fn known_identities(&self) -> BTreeSet<String> {
        self.trails
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn identity_count(&self) -> usize {
        self.trails
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
