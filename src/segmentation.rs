//! # Segmentation
//!
//! Splits a timeline into path segments and classifies how each one ends.
//!
//! ## Algorithm
//!
//! Walk the timeline in ascending timestamp order, comparing each point with
//! the previous one:
//!
//! 1. Gap longer than `max_segment_time_gap_s`: close the open segment as
//!    [`SegmentKind::Halted`] and start a new one.
//! 2. Otherwise, hop longer than `max_segment_distance_m`: close the open
//!    segment as [`SegmentKind::Jumped`] and start a new one.
//! 3. Otherwise extend the open segment.
//!
//! The time test always runs first, so a point that is both late and far
//! away ends its predecessor as halted, never jumped.
//!
//! The last segment is classified against a caller-supplied `now`: if its
//! final point is older than `max_segment_time_gap_s` it is halted, otherwise
//! it is live. Only the last segment can be live.
//!
//! Every timeline point lands in exactly one segment, in order.

use serde::{Deserialize, Serialize};

use crate::config::{ensure_threshold, TrailConfig};
use crate::error::Result;
use crate::geodesy::{distance, path_length};
use crate::timeline::Timeline;
use crate::{seconds_between, Coordinate, Timestamp, TrailPoint};

/// How a segment ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// Ends at the most recent sample, and that sample is recent
    Live,
    /// The identity stopped reporting for longer than the time gap
    Halted,
    /// The next sample was too far away to be the same path
    Jumped,
}

/// A contiguous, ascending run of timeline points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub locations: Vec<TrailPoint>,
    pub kind: SegmentKind,
}

impl Segment {
    pub fn first(&self) -> Option<&TrailPoint> {
        self.locations.first()
    }

    pub fn last(&self) -> Option<&TrailPoint> {
        self.locations.last()
    }

    /// Coordinates in segment order.
    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.locations.iter().map(|p| p.coordinate).collect()
    }

    /// Seconds between the first and last point.
    pub fn duration_s(&self) -> f64 {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => seconds_between(first.timestamp, last.timestamp),
            _ => 0.0,
        }
    }

    /// Path length in meters.
    pub fn length_m(&self) -> f64 {
        path_length(&self.coordinates())
    }
}

/// Stateless segmentation with validated thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentationEngine {
    max_time_gap_s: f64,
    max_distance_m: f64,
}

impl Default for SegmentationEngine {
    fn default() -> Self {
        let config = TrailConfig::default();
        Self {
            max_time_gap_s: config.max_segment_time_gap_s,
            max_distance_m: config.max_segment_distance_m,
        }
    }
}

impl SegmentationEngine {
    /// Create an engine from a configuration.
    pub fn new(config: &TrailConfig) -> Result<Self> {
        Self::with_thresholds(config.max_segment_time_gap_s, config.max_segment_distance_m)
    }

    /// Create an engine with explicit thresholds.
    pub fn with_thresholds(max_time_gap_s: f64, max_distance_m: f64) -> Result<Self> {
        ensure_threshold("max_segment_time_gap_s", max_time_gap_s)?;
        ensure_threshold("max_segment_distance_m", max_distance_m)?;
        Ok(Self {
            max_time_gap_s,
            max_distance_m,
        })
    }

    /// Partition a whole timeline into segments.
    pub fn recompute(&self, timeline: &Timeline, now: Timestamp) -> Vec<Segment> {
        self.segment_points(timeline.iter(), now)
    }

    /// Partition a timeline, reusing closed segments from a previous result.
    ///
    /// `changed_from` must be the earliest timestamp inserted or overwritten
    /// since `previous` was computed from the same timeline. A previous
    /// segment is kept only when the point that closed it is also older than
    /// `changed_from`, so the boundary after it cannot have moved; everything
    /// from the first dropped segment onwards is segmented again. The result
    /// is identical to [`SegmentationEngine::recompute`].
    pub fn recompute_from(
        &self,
        previous: &[Segment],
        timeline: &Timeline,
        changed_from: Timestamp,
        now: Timestamp,
    ) -> Vec<Segment> {
        let kept = previous
            .windows(2)
            .take_while(|pair| {
                pair[1]
                    .first()
                    .is_some_and(|next| next.timestamp < changed_from)
            })
            .count();

        let Some(resume_at) = previous.get(kept).and_then(|s| s.first()).map(|p| p.timestamp)
        else {
            return self.recompute(timeline, now);
        };
        if kept == 0 {
            return self.recompute(timeline, now);
        }

        let mut segments = previous[..kept].to_vec();
        segments.extend(self.segment_points(timeline.iter_from(resume_at), now));
        segments
    }

    /// Partition an ascending sequence of points.
    pub fn segment_points<I>(&self, points: I, now: Timestamp) -> Vec<Segment>
    where
        I: IntoIterator<Item = TrailPoint>,
    {
        let mut segments = Vec::new();
        let mut current: Vec<TrailPoint> = Vec::new();

        for point in points {
            if let Some(previous) = current.last() {
                if let Some(kind) = self.boundary(previous, &point) {
                    segments.push(Segment {
                        locations: std::mem::take(&mut current),
                        kind,
                    });
                }
            }
            current.push(point);
        }

        if let Some(last) = current.last() {
            let kind = self.terminal_kind(last, now);
            segments.push(Segment {
                locations: current,
                kind,
            });
        }

        segments
    }

    /// How the run ending at `previous` closes if `next` follows it, or
    /// `None` if `next` continues the run.
    fn boundary(&self, previous: &TrailPoint, next: &TrailPoint) -> Option<SegmentKind> {
        if seconds_between(previous.timestamp, next.timestamp) > self.max_time_gap_s {
            Some(SegmentKind::Halted)
        } else if distance(previous.coordinate, next.coordinate) > self.max_distance_m {
            Some(SegmentKind::Jumped)
        } else {
            None
        }
    }

    /// Classification of the final segment given its last point.
    fn terminal_kind(&self, last: &TrailPoint, now: Timestamp) -> SegmentKind {
        if seconds_between(last.timestamp, now) > self.max_time_gap_s {
            SegmentKind::Halted
        } else {
            SegmentKind::Live
        }
    }
}
