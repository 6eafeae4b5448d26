//! Trail view adapter: segments to render primitives.
//!
//! Pure mapping, no filtering or classification. Each segment becomes a
//! path (ordered vertices plus the same path as a Google encoded polyline),
//! an endpoint marker at its last point and a text label anchored on that
//! marker. The map layer that draws these is an external collaborator.

use geo::LineString;
use serde::Serialize;

use crate::segmentation::{Segment, SegmentKind};
use crate::{Bounds, Coordinate};

/// Encoded polyline precision (5 decimal places, the GPS standard)
const POLYLINE_PRECISION: u32 = 5;

const LABEL_FONT_SIZE: u32 = 16;
const LABEL_Z_INDEX: i32 = 1000;

/// Line style for a segment path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrokeStyle {
    pub color: String,
    pub opacity: f64,
    pub weight: u32,
}

impl StrokeStyle {
    /// Style for a segment kind. Live paths are drawn solid and heavier;
    /// paths that ended are faded so the current position stands out.
    pub fn for_kind(kind: SegmentKind) -> Self {
        let (opacity, weight) = match kind {
            SegmentKind::Live => (1.0, 2),
            SegmentKind::Halted => (0.6, 1),
            SegmentKind::Jumped => (0.4, 1),
        };
        Self {
            color: "#000000".to_string(),
            opacity,
            weight,
        }
    }
}

/// Text label anchored at a segment endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointLabel {
    pub text: String,
    pub position: Coordinate,
    pub font_size: u32,
    pub z_index: i32,
}

/// Render primitives for one segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRender {
    pub kind: SegmentKind,
    /// Path vertices in segment order
    pub vertices: Vec<Coordinate>,
    /// `vertices` as a Google encoded polyline
    pub encoded_polyline: String,
    /// Marker at the last vertex (absent only for an empty segment)
    pub marker: Option<Coordinate>,
    pub label: Option<EndpointLabel>,
    pub style: StrokeStyle,
}

/// Render primitives for one identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrailRender {
    pub identity: String,
    pub segments: Vec<SegmentRender>,
    /// Box around every vertex of every segment
    pub bounds: Option<Bounds>,
    /// Most recent position, where the map should zoom on first display
    pub focus: Option<Coordinate>,
}

/// Encode coordinates as a Google polyline string.
pub fn encode_polyline(coords: &[Coordinate]) -> String {
    // geo expects (x, y) = (lng, lat)
    let line: LineString<f64> = coords.iter().map(|c| (c.longitude, c.latitude)).collect();
    polyline::encode_coordinates(line, POLYLINE_PRECISION).unwrap_or_default()
}

/// Build the render primitives for a single segment.
pub fn render_segment(segment: &Segment, label: &str) -> SegmentRender {
    let vertices = segment.coordinates();
    let marker = vertices.last().copied();

    SegmentRender {
        kind: segment.kind,
        encoded_polyline: encode_polyline(&vertices),
        label: marker.map(|position| EndpointLabel {
            text: label.to_string(),
            position,
            font_size: LABEL_FONT_SIZE,
            z_index: LABEL_Z_INDEX,
        }),
        marker,
        vertices,
        style: StrokeStyle::for_kind(segment.kind),
    }
}

/// Build the render primitives for an identity's segments, in order.
pub fn render_trail(identity: &str, label: &str, segments: &[Segment]) -> TrailRender {
    let rendered: Vec<SegmentRender> = segments
        .iter()
        .map(|segment| render_segment(segment, label))
        .collect();

    let bounds = Bounds::from_points(rendered.iter().flat_map(|s| s.vertices.iter()));
    let focus = segments
        .last()
        .and_then(|s| s.last())
        .map(|p| p.coordinate);

    TrailRender {
        identity: identity.to_string(),
        segments: rendered,
        bounds,
        focus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrailPoint;
    use chrono::{Duration, TimeZone, Utc};

    fn segment(kind: SegmentKind, coords: &[(f64, f64)]) -> Segment {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        Segment {
            locations: coords
                .iter()
                .enumerate()
                .map(|(i, &(lat, lng))| {
                    TrailPoint::new(t0 + Duration::seconds(i as i64 * 60), Coordinate::new(lat, lng))
                })
                .collect(),
            kind,
        }
    }

    #[test]
    fn test_encode_polyline_reference() {
        // Reference example from the encoded polyline algorithm documentation
        let coords = [
            Coordinate::new(38.5, -120.2),
            Coordinate::new(40.7, -120.95),
            Coordinate::new(43.252, -126.453),
        ];
        assert_eq!(encode_polyline(&coords), "_p~iF~ps|U_ulLnnqC_mqNvxq`@");
    }

    #[test]
    fn test_render_segment() {
        let seg = segment(SegmentKind::Halted, &[(51.50, -0.12), (51.51, -0.13)]);
        let render = render_segment(&seg, "Alice");

        assert_eq!(render.kind, SegmentKind::Halted);
        assert_eq!(
            render.vertices,
            vec![Coordinate::new(51.50, -0.12), Coordinate::new(51.51, -0.13)]
        );
        assert_eq!(render.marker, Some(Coordinate::new(51.51, -0.13)));

        let label = render.label.unwrap();
        assert_eq!(label.text, "Alice");
        assert_eq!(label.position, Coordinate::new(51.51, -0.13));
        assert_eq!(label.font_size, 16);
        assert_eq!(label.z_index, 1000);
        assert!(!render.encoded_polyline.is_empty());
    }

    #[test]
    fn test_empty_segment_has_no_marker() {
        let seg = Segment {
            locations: vec![],
            kind: SegmentKind::Live,
        };
        let render = render_segment(&seg, "x");
        assert!(render.marker.is_none());
        assert!(render.label.is_none());
        assert!(render.vertices.is_empty());
    }

    #[test]
    fn test_styles_distinguish_kinds() {
        let live = StrokeStyle::for_kind(SegmentKind::Live);
        let halted = StrokeStyle::for_kind(SegmentKind::Halted);
        let jumped = StrokeStyle::for_kind(SegmentKind::Jumped);
        assert!(live.opacity > halted.opacity);
        assert!(halted.opacity > jumped.opacity);
        assert!(live.weight > halted.weight);
    }

    #[test]
    fn test_render_trail_bounds_and_focus() {
        let segments = vec![
            segment(SegmentKind::Jumped, &[(51.50, -0.12), (51.52, -0.10)]),
            segment(SegmentKind::Live, &[(48.85, 2.35), (48.86, 2.36)]),
        ];
        let render = render_trail("alice", "Alice", &segments);

        assert_eq!(render.identity, "alice");
        assert_eq!(render.segments.len(), 2);
        assert_eq!(render.focus, Some(Coordinate::new(48.86, 2.36)));

        let bounds = render.bounds.unwrap();
        assert_eq!(bounds.min_lat, 48.85);
        assert_eq!(bounds.max_lat, 51.52);
        assert_eq!(bounds.min_lng, -0.12);
        assert_eq!(bounds.max_lng, 2.36);
    }

    #[test]
    fn test_render_trail_empty() {
        let render = render_trail("nobody", "nobody", &[]);
        assert!(render.segments.is_empty());
        assert!(render.bounds.is_none());
        assert!(render.focus.is_none());
    }
}
