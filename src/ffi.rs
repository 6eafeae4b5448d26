//! FFI bindings for mobile platforms (iOS/Android).
//!
//! This module provides the UniFFI bindings that expose the global trail
//! engine to Kotlin and Swift. Timestamps cross the boundary as Unix epoch
//! milliseconds; segment snapshots are available both as records and as JSON.

use log::{debug, info};

use crate::engine::{install_trail_engine, with_trail_engine, EngineStats, Observation};
use crate::error::{OptionExt, Result, TrailError};
use crate::geodesy::{angular_radius_for, distance};
use crate::segmentation::{Segment, SegmentKind};
use crate::{init_logging, Bounds, Coordinate, Sample, Timestamp, TrailConfig};

/// Convert epoch milliseconds into a timestamp.
fn timestamp_from_millis(millis: i64) -> Result<Timestamp> {
    Timestamp::from_timestamp_millis(millis).ok_or(TrailError::InvalidTimestamp { millis })
}

/// Pair epoch-millisecond timestamps with a flat `[lat, lng, ...]` buffer.
fn history_batch_from_flat(
    timestamps_ms: &[i64],
    coords: &[f64],
) -> Result<Vec<(Timestamp, Coordinate)>> {
    if coords.len() != timestamps_ms.len() * 2 {
        return Err(TrailError::InvalidHistory {
            message: format!(
                "{} timestamps need {} coordinate values, got {}",
                timestamps_ms.len(),
                timestamps_ms.len() * 2,
                coords.len()
            ),
        });
    }
    timestamps_ms
        .iter()
        .zip(coords.chunks_exact(2))
        .map(|(&ms, pair)| Ok((timestamp_from_millis(ms)?, Coordinate::new(pair[0], pair[1]))))
        .collect()
}

// ============================================================================
// FFI Types
// ============================================================================

/// A timeline entry with an epoch-millisecond timestamp.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiTrailPoint {
    pub timestamp_ms: i64,
    pub latitude: f64,
    pub longitude: f64,
}

/// A segment with epoch-millisecond timestamps.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiSegment {
    pub kind: SegmentKind,
    pub points: Vec<FfiTrailPoint>,
}

impl From<&Segment> for FfiSegment {
    fn from(segment: &Segment) -> Self {
        Self {
            kind: segment.kind,
            points: segment
                .locations
                .iter()
                .map(|p| FfiTrailPoint {
                    timestamp_ms: p.timestamp.timestamp_millis(),
                    latitude: p.coordinate.latitude,
                    longitude: p.coordinate.longitude,
                })
                .collect(),
        }
    }
}

/// Result of pushing a live sample.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiObservation {
    pub accepted: bool,
    /// Why the sample was dropped, if it was
    pub rejection: Option<String>,
    /// New segments when accepted, empty otherwise
    pub segments: Vec<FfiSegment>,
}

impl From<Observation> for FfiObservation {
    fn from(observation: Observation) -> Self {
        match observation {
            Observation::Accepted { segments } => Self {
                accepted: true,
                rejection: None,
                segments: segments.iter().map(FfiSegment::from).collect(),
            },
            Observation::Rejected(reason) => Self {
                accepted: false,
                rejection: Some(format!("{:?}", reason)),
                segments: Vec::new(),
            },
        }
    }
}

// ============================================================================
// Engine Lifecycle
// ============================================================================

/// Default engine configuration.
#[uniffi::export]
pub fn default_trail_config() -> TrailConfig {
    TrailConfig::default()
}

/// Initialize the engine (call once at app startup).
/// Replaces any existing engine and all its trails.
#[uniffi::export]
pub fn trail_engine_init(config: TrailConfig) -> Result<()> {
    init_logging();
    install_trail_engine(config)?;
    info!("[TrailEngine] Initialized");
    Ok(())
}

/// Parse a JSON configuration and initialize the engine with it.
#[uniffi::export]
pub fn trail_engine_init_json(config_json: String) -> Result<()> {
    trail_engine_init(TrailConfig::from_json(&config_json)?)
}

// ============================================================================
// Ingestion
// ============================================================================

/// Push a live sample. Pass 0 for `accuracy` when the source gave none.
#[uniffi::export]
pub fn trail_observe(
    identity: String,
    timestamp_ms: i64,
    latitude: f64,
    longitude: f64,
    accuracy: f64,
    now_ms: i64,
) -> Result<FfiObservation> {
    let sample = Sample::new(
        timestamp_from_millis(timestamp_ms)?,
        Coordinate::new(latitude, longitude),
    )
    .with_accuracy(accuracy);
    let now = timestamp_from_millis(now_ms)?;

    let observation = with_trail_engine(|e| e.observe(&identity, sample, now));
    debug!(
        "[TrailEngine] observe {} -> accepted={}",
        identity,
        observation.is_accepted()
    );
    Ok(observation.into())
}

/// Merge a historical batch from flat buffers.
///
/// `coords` holds `[lat, lng, lat, lng, ...]`, exactly one pair per
/// timestamp; any other length is rejected. Returns `true` if the identity's segments changed.
#[uniffi::export]
pub fn trail_merge_history(
    identity: String,
    timestamps_ms: Vec<i64>,
    coords: Vec<f64>,
    now_ms: i64,
) -> Result<bool> {
    let now = timestamp_from_millis(now_ms)?;
    let batch = history_batch_from_flat(&timestamps_ms, &coords)?;

    info!(
        "[TrailEngine] Merging {} historical points for {}",
        batch.len(),
        identity
    );
    Ok(with_trail_engine(|e| e.merge_history(&identity, batch, now)).is_some())
}

/// Load a history download (JSON array of update records), applying the
/// configured age cutoff. Returns the identities whose segments changed.
#[uniffi::export]
pub fn trail_load_history_json(json: String, now_ms: i64) -> Result<Vec<String>> {
    let now = timestamp_from_millis(now_ms)?;
    let changed = with_trail_engine(|e| e.load_history_json(&json, now))?;
    info!("[TrailEngine] History changed {} identities", changed.len());
    Ok(changed)
}

/// Reclassify every identity against `now_ms`.
/// Returns the identities whose final segment changed kind.
#[uniffi::export]
pub fn trail_refresh(now_ms: i64) -> Result<Vec<String>> {
    let now = timestamp_from_millis(now_ms)?;
    Ok(with_trail_engine(|e| e.refresh(now)))
}

// ============================================================================
// Queries
// ============================================================================

/// Get all known identities.
#[uniffi::export]
pub fn trail_get_identities() -> Vec<String> {
    with_trail_engine(|e| e.known_identities().into_iter().collect())
}

/// Get the current segments of an identity.
#[uniffi::export]
pub fn trail_get_segments(identity: String) -> Result<Vec<FfiSegment>> {
    let segments =
        with_trail_engine(|e| e.segments_of(&identity)).ok_or_unknown_identity(&identity)?;
    Ok(segments.iter().map(FfiSegment::from).collect())
}

/// Get the current segments of an identity as JSON.
#[uniffi::export]
pub fn trail_get_segments_json(identity: String) -> Result<String> {
    with_trail_engine(|e| e.segments_json(&identity))
}

/// Get labels and segments of all identities as JSON.
#[uniffi::export]
pub fn trail_get_snapshot_json() -> String {
    with_trail_engine(|e| e.snapshot_json())
}

/// Get render primitives (paths, encoded polylines, markers, labels) for an
/// identity as JSON.
#[uniffi::export]
pub fn trail_get_render_json(identity: String) -> Result<String> {
    let render = with_trail_engine(|e| e.render(&identity)).ok_or_unknown_identity(&identity)?;
    Ok(serde_json::to_string(&render).unwrap_or_else(|_| "{}".to_string()))
}

/// Set the display label for an identity.
/// Pass empty string to go back to the identity itself.
#[uniffi::export]
pub fn trail_set_label(identity: String, label: String) -> bool {
    with_trail_engine(|e| e.set_label(&identity, &label))
}

/// Get the display label for an identity.
/// Returns empty string for an unknown identity.
#[uniffi::export]
pub fn trail_get_label(identity: String) -> String {
    with_trail_engine(|e| e.label_of(&identity)).unwrap_or_default()
}

/// Query identities whose latest position is in the viewport.
#[uniffi::export]
pub fn trail_query_viewport(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Vec<String> {
    let bounds = Bounds {
        min_lat,
        max_lat,
        min_lng,
        max_lng,
    };
    with_trail_engine(|e| e.query_viewport(&bounds))
}

/// Find identities whose latest position is within `radius_m` of a point.
#[uniffi::export]
pub fn trail_find_nearby(latitude: f64, longitude: f64, radius_m: f64) -> Vec<String> {
    with_trail_engine(|e| e.find_nearby(Coordinate::new(latitude, longitude), radius_m))
}

/// Get engine statistics.
#[uniffi::export]
pub fn trail_get_stats() -> EngineStats {
    with_trail_engine(|e| e.stats())
}

// ============================================================================
// Geodesy
// ============================================================================

/// Great-circle distance in meters.
#[uniffi::export]
pub fn ffi_distance(from: Coordinate, to: Coordinate) -> f64 {
    distance(from, to)
}

/// Degrees spanned by `distance_m` around `origin` ("MIN", "MAX" or "AVERAGE").
#[uniffi::export]
pub fn ffi_angular_radius(origin: Coordinate, distance_m: f64, method: String) -> Result<f64> {
    angular_radius_for(origin, distance_m, &method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Rejection;
    use crate::TrailPoint;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_timestamp_from_millis() {
        let t = timestamp_from_millis(1_709_283_600_000).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
        assert!(matches!(
            timestamp_from_millis(i64::MAX),
            Err(TrailError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_history_batch_from_flat() {
        let batch = history_batch_from_flat(
            &[1_709_283_600_000, 1_709_283_660_000],
            &[51.5, -0.12, 51.6, -0.13],
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].1, Coordinate::new(51.6, -0.13));
        assert!(history_batch_from_flat(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_history_batch_length_mismatch() {
        // Trailing coordinate pair without a timestamp
        let result = history_batch_from_flat(&[1_709_283_600_000], &[51.5, -0.12, 51.6, -0.13]);
        assert!(matches!(result, Err(TrailError::InvalidHistory { .. })));
        // Half a pair
        let result = history_batch_from_flat(&[1_709_283_600_000], &[51.5]);
        assert!(matches!(result, Err(TrailError::InvalidHistory { .. })));
        // Timestamp without coordinates
        let result =
            history_batch_from_flat(&[1_709_283_600_000, 1_709_283_660_000], &[51.5, -0.12]);
        assert!(matches!(result, Err(TrailError::InvalidHistory { .. })));
    }

    #[test]
    fn test_segment_conversion() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let segment = Segment {
            locations: vec![TrailPoint::new(t, Coordinate::new(1.0, 2.0))],
            kind: SegmentKind::Jumped,
        };
        let ffi = FfiSegment::from(&segment);
        assert_eq!(ffi.kind, SegmentKind::Jumped);
        assert_eq!(ffi.points[0].timestamp_ms, 1_709_283_600_000);
        assert_eq!(ffi.points[0].longitude, 2.0);
    }

    #[test]
    fn test_rejection_conversion() {
        let ffi = FfiObservation::from(Observation::Rejected(Rejection::Noise { distance_m: 3.0 }));
        assert!(!ffi.accepted);
        assert!(ffi.rejection.unwrap().starts_with("Noise"));
        assert!(ffi.segments.is_empty());
    }
}
