//! # Trail Engine
//!
//! Stateful trail management that keeps every identity's history in Rust.
//! Callers push live samples and historical batches in; segment snapshots
//! and render primitives come out.
//!
//! ## Architecture
//!
//! The engine manages:
//! - One [`IdentityTrail`](crate::store::IdentityTrail) per identity (timeline,
//!   current segments, filter state, label), each behind its own lock
//! - Segmentation, recomputed whenever an identity's timeline changes
//! - A spatial index over each identity's latest position for map queries
//!
//! All methods take `&self`, so one engine can be shared between threads.
//! Work for the same identity is serialized; different identities proceed
//! independently.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, info};
use once_cell::sync::Lazy;
use rstar::{RTree, RTreeObject, AABB};
use serde::Serialize;

use crate::config::TrailConfig;
use crate::error::{OptionExt, Result};
use crate::filter::{FilterDecision, Rejection, SampleFilter};
use crate::geodesy::{angular_radius, distance, Aggregation};
use crate::history::{parse_history_updates, HistoryCutoff};
use crate::segmentation::{Segment, SegmentKind, SegmentationEngine};
use crate::store::{lock_trail, TrailStore};
use crate::timeline::Timeline;
use crate::view::{render_trail, TrailRender};
use crate::{Bounds, Coordinate, Sample, Timestamp, TrailPoint};

// ============================================================================
// Core Types
// ============================================================================

/// Latest position wrapper for R-tree spatial indexing
#[derive(Debug, Clone)]
pub struct IdentityPosition {
    pub identity: String,
    pub position: Coordinate,
}

impl RTreeObject for IdentityPosition {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.position.longitude, self.position.latitude])
    }
}

/// Outcome of pushing a live sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// The sample was recorded; carries the identity's new segments
    Accepted { segments: Vec<Segment> },
    /// The filter dropped the sample; nothing changed
    Rejected(Rejection),
}

impl Observation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Observation::Accepted { .. })
    }
}

/// One identity in a full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentitySnapshot {
    pub label: String,
    pub segments: Vec<Segment>,
}

/// Engine statistics for monitoring.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct EngineStats {
    pub identity_count: u32,
    pub point_count: u32,
    pub segment_count: u32,
    /// Identities whose last segment is live
    pub live_count: u32,
}

// ============================================================================
// Trail Engine
// ============================================================================

/// The main stateful trail engine.
pub struct TrailEngine {
    config: TrailConfig,
    store: TrailStore,
    segmentation: SegmentationEngine,

    // Spatial index for viewport queries, rebuilt lazily
    spatial_index: RwLock<RTree<IdentityPosition>>,
    spatial_dirty: AtomicBool,
}

impl Default for TrailEngine {
    fn default() -> Self {
        Self::from_parts(
            TrailConfig::default(),
            SampleFilter::default(),
            SegmentationEngine::default(),
        )
    }
}

impl TrailEngine {
    /// Create an engine. The configuration is validated here and nowhere
    /// else; an invalid one prevents construction.
    pub fn new(config: TrailConfig) -> Result<Self> {
        config.validate()?;
        let filter = SampleFilter::new(&config)?;
        let segmentation = SegmentationEngine::new(&config)?;
        info!("[TrailEngine] Created with {:?}", config);
        Ok(Self::from_parts(config, filter, segmentation))
    }

    fn from_parts(
        config: TrailConfig,
        filter: SampleFilter,
        segmentation: SegmentationEngine,
    ) -> Self {
        Self {
            config,
            store: TrailStore::new(filter),
            segmentation,
            spatial_index: RwLock::new(RTree::new()),
            spatial_dirty: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &TrailConfig {
        &self.config
    }

    /// Age cutoff for historical batches from the configuration.
    pub fn history_cutoff(&self) -> HistoryCutoff {
        HistoryCutoff::from_hours(self.config.history_cutoff_hours)
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Push a live sample through the identity's filter. On acceptance the
    /// position is recorded and the identity's segments are recomputed.
    pub fn observe(&self, identity: &str, sample: Sample, now: Timestamp) -> Observation {
        let handle = self.store.trail_or_create(identity);
        let mut trail = lock_trail(&handle);

        match trail.filter.consider(&sample) {
            FilterDecision::Reject(reason) => {
                debug!("[TrailEngine] Rejected sample for {}: {:?}", identity, reason);
                Observation::Rejected(reason)
            }
            FilterDecision::Accept => {
                trail.append(sample.timestamp, sample.coordinate);
                let segments = self.segmentation.recompute_from(
                    &trail.segments,
                    &trail.timeline,
                    sample.timestamp,
                    now,
                );
                trail.segments = segments.clone();
                drop(trail);

                self.spatial_dirty.store(true, Ordering::Release);
                debug!(
                    "[TrailEngine] Accepted sample for {}: {} segments",
                    identity,
                    segments.len()
                );
                Observation::Accepted { segments }
            }
        }
    }

    /// Merge a historical batch for one identity, bypassing the filter.
    ///
    /// Returns the new segments if the timeline changed, or `None` if every
    /// entry was already present (no recompute happens in that case).
    pub fn merge_history(
        &self,
        identity: &str,
        batch: Vec<(Timestamp, Coordinate)>,
        now: Timestamp,
    ) -> Option<Vec<Segment>> {
        if batch.is_empty() {
            return None;
        }

        let handle = self.store.trail_or_create(identity);
        let mut trail = lock_trail(&handle);

        let Some(changed_from) = trail.merge(batch) else {
            debug!("[TrailEngine] History for {} unchanged, skipping recompute", identity);
            return None;
        };

        let segments =
            self.segmentation
                .recompute_from(&trail.segments, &trail.timeline, changed_from, now);
        trail.segments = segments.clone();
        let points = trail.timeline.len();
        drop(trail);

        self.spatial_dirty.store(true, Ordering::Release);
        debug!(
            "[TrailEngine] Merged history for {}: {} points, {} segments",
            identity,
            points,
            segments.len()
        );
        Some(segments)
    }

    /// Merge historical batches for many identities.
    ///
    /// Returns the identities whose segments changed, sorted.
    pub fn merge_histories<I>(&self, batches: I, now: Timestamp) -> Vec<String>
    where
        I: IntoIterator<Item = (String, Vec<(Timestamp, Coordinate)>)>,
    {
        let batches: Vec<(String, Vec<(Timestamp, Coordinate)>)> = batches.into_iter().collect();
        info!("[TrailEngine] Merging history for {} identities", batches.len());

        #[cfg(feature = "parallel")]
        let mut changed: Vec<String> = {
            use rayon::prelude::*;
            batches
                .into_par_iter()
                .filter_map(|(identity, batch)| {
                    self.merge_history(&identity, batch, now).map(|_| identity)
                })
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let mut changed: Vec<String> = batches
            .into_iter()
            .filter_map(|(identity, batch)| {
                self.merge_history(&identity, batch, now).map(|_| identity)
            })
            .collect();

        changed.sort();
        changed.dedup();
        changed
    }

    /// Parse a history download, apply the configured cutoff and merge it.
    ///
    /// Returns the identities whose segments changed.
    pub fn load_history_json(&self, json: &str, now: Timestamp) -> Result<Vec<String>> {
        let batches = parse_history_updates(json, self.history_cutoff(), now)?;
        Ok(self.merge_histories(batches, now))
    }

    /// Reclassify every identity against `now`, so live trails age into
    /// halted ones without new samples.
    ///
    /// Returns the identities whose final segment changed kind.
    pub fn refresh(&self, now: Timestamp) -> Vec<String> {
        let mut changed = Vec::new();

        for (identity, handle) in self.store.handles() {
            let mut trail = lock_trail(&handle);
            let Some(resume_at) = trail
                .segments
                .last()
                .and_then(|s| s.first())
                .map(|p| p.timestamp)
            else {
                continue;
            };

            let before = trail.segments.last().map(|s| s.kind);
            let segments =
                self.segmentation
                    .recompute_from(&trail.segments, &trail.timeline, resume_at, now);
            let after = segments.last().map(|s| s.kind);
            trail.segments = segments;

            if before != after {
                debug!("[TrailEngine] {} is now {:?}", identity, after);
                changed.push(identity);
            }
        }

        if !changed.is_empty() {
            info!("[TrailEngine] Refresh changed {} identities", changed.len());
        }
        changed
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current segments for an identity.
    pub fn segments_of(&self, identity: &str) -> Option<Vec<Segment>> {
        let handle = self.store.trail(identity)?;
        let segments = lock_trail(&handle).segments.clone();
        Some(segments)
    }

    /// Snapshot of an identity's timeline.
    pub fn timeline_of(&self, identity: &str) -> Option<Timeline> {
        self.store.timeline_of(identity)
    }

    pub fn known_identities(&self) -> BTreeSet<String> {
        self.store.known_identities()
    }

    /// Most recent recorded position of an identity.
    pub fn latest_position(&self, identity: &str) -> Option<TrailPoint> {
        let handle = self.store.trail(identity)?;
        let latest = lock_trail(&handle).timeline.latest();
        latest
    }

    /// Set the display label for an identity.
    /// Pass an empty string to go back to the identity itself.
    /// Returns `false` if the identity has never been seen.
    pub fn set_label(&self, identity: &str, label: &str) -> bool {
        let Some(handle) = self.store.trail(identity) else {
            return false;
        };
        lock_trail(&handle).label = if label.is_empty() {
            identity.to_string()
        } else {
            label.to_string()
        };
        true
    }

    pub fn label_of(&self, identity: &str) -> Option<String> {
        let handle = self.store.trail(identity)?;
        let label = lock_trail(&handle).label.clone();
        Some(label)
    }

    /// Render primitives for an identity's current segments.
    pub fn render(&self, identity: &str) -> Option<TrailRender> {
        let handle = self.store.trail(identity)?;
        let trail = lock_trail(&handle);
        Some(render_trail(identity, &trail.label, &trail.segments))
    }

    /// Current segments for an identity as JSON.
    pub fn segments_json(&self, identity: &str) -> Result<String> {
        let segments = self.segments_of(identity).ok_or_unknown_identity(identity)?;
        Ok(serde_json::to_string(&segments).unwrap_or_else(|_| "[]".to_string()))
    }

    /// Label and segments of every identity as a JSON object keyed by identity.
    pub fn snapshot_json(&self) -> String {
        let snapshot: BTreeMap<String, IdentitySnapshot> = self
            .store
            .handles()
            .into_iter()
            .map(|(identity, handle)| {
                let trail = lock_trail(&handle);
                let entry = IdentitySnapshot {
                    label: trail.label.clone(),
                    segments: trail.segments.clone(),
                };
                (identity, entry)
            })
            .collect();
        serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string())
    }

    // ========================================================================
    // Spatial Queries
    // ========================================================================

    /// Ensure spatial index is built.
    ///
    /// The dirty flag is only cleared while the index write lock is held, so a
    /// concurrent query either rebuilds itself or waits for this rebuild.
    fn ensure_spatial_index(&self) {
        if !self.spatial_dirty.load(Ordering::Acquire) {
            return;
        }

        let mut index = self
            .spatial_index
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !self.spatial_dirty.swap(false, Ordering::AcqRel) {
            // Rebuilt by another query while we waited for the lock
            return;
        }

        let positions: Vec<IdentityPosition> = self
            .store
            .handles()
            .into_iter()
            .filter_map(|(identity, handle)| {
                let latest = lock_trail(&handle).timeline.latest();
                latest.map(|p| IdentityPosition {
                    identity,
                    position: p.coordinate,
                })
            })
            .collect();

        debug!("[TrailEngine] Rebuilt spatial index: {} identities", positions.len());
        *index = RTree::bulk_load(positions);
    }

    /// Positions inside a latitude/longitude box. `min_lng > max_lng` means
    /// the box crosses the antimeridian.
    fn locate_in_box(
        &self,
        min_lat: f64,
        max_lat: f64,
        min_lng: f64,
        max_lng: f64,
    ) -> Vec<IdentityPosition> {
        self.ensure_spatial_index();

        let envelopes = longitude_spans(min_lng, max_lng)
            .into_iter()
            .map(|(lo, hi)| AABB::from_corners([lo, min_lat], [hi, max_lat]));

        let index = self
            .spatial_index
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<IdentityPosition> = envelopes
            .flat_map(|envelope| {
                index
                    .locate_in_envelope_intersecting(&envelope)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        found.sort_by(|a, b| a.identity.cmp(&b.identity));
        found.dedup_by(|a, b| a.identity == b.identity);
        found
    }

    /// Identities whose latest position lies inside `bounds`, sorted.
    ///
    /// Bounds with `min_lng > max_lng` wrap across the antimeridian.
    pub fn query_viewport(&self, bounds: &Bounds) -> Vec<String> {
        self.locate_in_box(bounds.min_lat, bounds.max_lat, bounds.min_lng, bounds.max_lng)
            .into_iter()
            .map(|p| p.identity)
            .collect()
    }

    /// Identities whose latest position is within `radius_m` of `point`,
    /// nearest first.
    pub fn find_nearby(&self, point: Coordinate, radius_m: f64) -> Vec<String> {
        // Box that certainly contains the circle, then exact distance
        let radius_deg = angular_radius(point, radius_m, Aggregation::Max);
        let (min_lng, max_lng) = if radius_deg >= 180.0 {
            (-180.0, 180.0)
        } else {
            (
                wrap_longitude(point.longitude - radius_deg),
                wrap_longitude(point.longitude + radius_deg),
            )
        };

        let mut nearby: Vec<(f64, String)> = self
            .locate_in_box(
                point.latitude - radius_deg,
                point.latitude + radius_deg,
                min_lng,
                max_lng,
            )
            .into_iter()
            .map(|p| (distance(point, p.position), p.identity))
            .filter(|(d, _)| *d <= radius_m)
            .collect();
        nearby.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        nearby.into_iter().map(|(_, identity)| identity).collect()
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Get engine statistics.
    pub fn stats(&self) -> EngineStats {
        let mut stats = EngineStats {
            identity_count: 0,
            point_count: 0,
            segment_count: 0,
            live_count: 0,
        };
        for (_, handle) in self.store.handles() {
            let trail = lock_trail(&handle);
            stats.identity_count = stats.identity_count.saturating_add(1);
            stats.point_count = stats
                .point_count
                .saturating_add(saturating_u32(trail.timeline.len()));
            stats.segment_count = stats
                .segment_count
                .saturating_add(saturating_u32(trail.segments.len()));
            if trail.segments.last().map(|s| s.kind) == Some(SegmentKind::Live) {
                stats.live_count = stats.live_count.saturating_add(1);
            }
        }
        stats
    }
}

/// Map a longitude onto [-180, 180].
fn wrap_longitude(lng: f64) -> f64 {
    if (-180.0..=180.0).contains(&lng) {
        lng
    } else {
        (lng + 180.0).rem_euclid(360.0) - 180.0
    }
}

/// Longitude intervals covered by `min_lng..=max_lng`, split in two when the
/// range crosses the antimeridian (`min_lng > max_lng`).
fn longitude_spans(min_lng: f64, max_lng: f64) -> Vec<(f64, f64)> {
    if min_lng <= max_lng {
        vec![(min_lng, max_lng)]
    } else {
        vec![(min_lng, 180.0), (-180.0, max_lng)]
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

// ============================================================================
// Global Singleton
// ============================================================================

/// Global engine instance.
///
/// This singleton allows FFI calls to access a shared engine without
/// passing state back and forth across the FFI boundary. It starts with the
/// default configuration until [`install_trail_engine`] replaces it.
pub static TRAIL_ENGINE: Lazy<RwLock<Arc<TrailEngine>>> =
    Lazy::new(|| RwLock::new(Arc::new(TrailEngine::default())));

/// Replace the global engine with a fresh one built from `config`.
///
/// On error the current engine is left in place.
pub fn install_trail_engine(config: TrailConfig) -> Result<()> {
    let engine = Arc::new(TrailEngine::new(config)?);
    *TRAIL_ENGINE.write().unwrap_or_else(PoisonError::into_inner) = engine;
    info!("[TrailEngine] Installed global engine");
    Ok(())
}

/// Run `f` against the global engine.
pub fn with_trail_engine<F, R>(f: F) -> R
where
    F: FnOnce(&TrailEngine) -> R,
{
    // Clone the handle so the lock is not held while `f` runs
    let engine = TRAIL_ENGINE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    f(&engine)
}

// ============================================================================
// Tests
// ============================================================================
