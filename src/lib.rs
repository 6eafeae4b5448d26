//! # Trail Engine
//!
//! Location trails for a set of tracked identities.
//!
//! This library provides:
//! - A sample filter that drops GPS jitter and over-frequent readings
//! - Per-identity timelines of accepted positions
//! - Segmentation of a timeline into live, halted and jumped path segments
//! - Render primitives (polylines, endpoint markers, labels) for a map layer
//!
//! ## Features
//!
//! - **`parallel`** - Merge historical batches for many identities with rayon
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use trail_engine::{Coordinate, Sample, SegmentKind, TrailConfig, TrailEngine};
//!
//! let engine = TrailEngine::new(TrailConfig::default()).unwrap();
//! let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
//!
//! engine.observe("alice", Sample::new(t0, Coordinate::new(51.5074, -0.1278)), t0);
//! engine.observe(
//!     "alice",
//!     Sample::new(t0 + Duration::seconds(60), Coordinate::new(51.5084, -0.1278)),
//!     t0 + Duration::seconds(60),
//! );
//!
//! let segments = engine.segments_of("alice").unwrap();
//! assert_eq!(segments.len(), 1);
//! assert_eq!(segments[0].kind, SegmentKind::Live);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrailError};

// Great-circle distance and projection primitives
pub mod geodesy;
pub use geodesy::{angular_radius, angular_radius_for, distance, project, Aggregation};

// Engine configuration
pub mod config;
pub use config::TrailConfig;

// Accept/reject gate for raw samples
pub mod filter;
pub use filter::{FilterDecision, Rejection, SampleFilter};

// Per-identity ordered position history
pub mod timeline;
pub use timeline::Timeline;

pub mod store;
pub use store::TrailStore;

// Timeline partitioning into live/halted/jumped segments
pub mod segmentation;
pub use segmentation::{Segment, SegmentKind, SegmentationEngine};

// Segments to render primitives
pub mod view;
pub use view::{EndpointLabel, SegmentRender, StrokeStyle, TrailRender};

// Historical batch helpers (age cutoff, wire format)
pub mod history;
pub use history::{parse_history_updates, HistoryCutoff, HistoryUpdate};

// Stateful per-identity engine
pub mod engine;
pub use engine::{
    install_trail_engine, with_trail_engine, EngineStats, Observation, TrailEngine, TRAIL_ENGINE,
};

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("TrailEngineRust"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// Instant at which a position was observed.
pub type Timestamp = DateTime<Utc>;

/// Seconds from `earlier` to `later`, millisecond resolution. Negative when
/// `later` is actually before `earlier`.
pub(crate) fn seconds_between(earlier: Timestamp, later: Timestamp) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}

/// A position on the globe in degrees.
///
/// # Example
/// ```
/// use trail_engine::Coordinate;
/// let point = Coordinate::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the coordinate is finite and within the usual ranges.
    ///
    /// The engine never enforces this; out-of-range input is the caller's problem.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// One raw position observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub coordinate: Coordinate,
    /// Reported uncertainty radius in meters (0 when the source gave none)
    #[serde(default)]
    pub accuracy: f64,
}

impl Sample {
    /// Create a sample with no accuracy information.
    pub fn new(timestamp: Timestamp, coordinate: Coordinate) -> Self {
        Self {
            timestamp,
            coordinate,
            accuracy: 0.0,
        }
    }

    /// Attach a reported accuracy radius in meters.
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = accuracy;
        self
    }
}

/// A timeline entry: where an identity was at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailPoint {
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub coordinate: Coordinate,
}

impl TrailPoint {
    pub fn new(timestamp: Timestamp, coordinate: Coordinate) -> Self {
        Self {
            timestamp,
            coordinate,
        }
    }
}

/// Bounding box over a set of coordinates.
///
/// `min_lng > max_lng` describes a box that crosses the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from coordinates.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Coordinate>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Self {
            min_lat: first.latitude,
            max_lat: first.latitude,
            min_lng: first.longitude,
            max_lng: first.longitude,
        };
        for p in iter {
            bounds.min_lat = bounds.min_lat.min(p.latitude);
            bounds.max_lat = bounds.max_lat.max(p.latitude);
            bounds.min_lng = bounds.min_lng.min(p.longitude);
            bounds.max_lng = bounds.max_lng.max(p.longitude);
        }
        Some(bounds)
    }

    /// Check whether a coordinate lies inside (edges included).
    pub fn contains(&self, point: &Coordinate) -> bool {
        let in_lng = if self.min_lng <= self.max_lng {
            point.longitude >= self.min_lng && point.longitude <= self.max_lng
        } else {
            point.longitude >= self.min_lng || point.longitude <= self.max_lng
        };
        in_lng && point.latitude >= self.min_lat && point.latitude <= self.max_lat
    }
}

// ============================================================================
// Tests
// ============================================================================
