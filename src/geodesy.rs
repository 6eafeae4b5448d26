//! Great-circle geometry on a spherical Earth.
//!
//! Stateless primitives shared by the filter, the segmentation engine and the
//! spatial queries:
//! - **Haversine distance** between two coordinates
//! - **Destination point** a given distance and bearing from an origin
//! - **Angular radius**: a distance in meters expressed in degrees around a point
//!
//! # Example
//!
//! ```rust
//! use trail_engine::geodesy::{distance, project};
//! use trail_engine::Coordinate;
//!
//! let london = Coordinate::new(51.5074, -0.1278);
//! let paris = Coordinate::new(48.8566, 2.3522);
//! println!("London to Paris: {:.0} km", distance(london, paris) / 1000.0);
//!
//! let north = project(london, 1000.0, 0.0);
//! assert!(north.latitude > london.latitude);
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TrailError};
use crate::Coordinate;

/// Mean Earth radius used for distances, in meters.
pub const DISTANCE_EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Equatorial Earth radius used for projections, in meters.
///
/// Deliberately distinct from [`DISTANCE_EARTH_RADIUS_M`]; thresholds tuned
/// against existing trails depend on both values.
pub const PROJECTION_EARTH_RADIUS_M: f64 = 6_378_100.0;

/// Great-circle distance between two coordinates in meters (haversine).
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1 for antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    DISTANCE_EARTH_RADIUS_M * c
}

/// Total length of a path in meters.
pub fn path_length(points: &[Coordinate]) -> f64 {
    points.windows(2).map(|w| distance(w[0], w[1])).sum()
}

/// Point reached by travelling `distance_m` meters from `origin` on the given bearing.
///
/// `bearing_deg` is measured clockwise from true north: 0, 90, 180 and 270 are
/// north, east, south and west.
pub fn project(origin: Coordinate, distance_m: f64, bearing_deg: f64) -> Coordinate {
    let bearing = bearing_deg.to_radians();
    let lat1 = origin.latitude.to_radians();
    let lng1 = origin.longitude.to_radians();
    let angular = distance_m / PROJECTION_EARTH_RADIUS_M;

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lng2 = lng1
        + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    Coordinate::new(lat2.to_degrees(), lng2.to_degrees())
}

/// How the four cardinal deltas of [`angular_radius`] are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Min,
    Max,
    Average,
}

impl FromStr for Aggregation {
    type Err = TrailError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MIN" => Ok(Aggregation::Min),
            "MAX" => Ok(Aggregation::Max),
            "AVERAGE" => Ok(Aggregation::Average),
            _ => Err(TrailError::InvalidAggregationMethod {
                method: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Min => write!(f, "MIN"),
            Aggregation::Max => write!(f, "MAX"),
            Aggregation::Average => write!(f, "AVERAGE"),
        }
    }
}

/// Express a distance in meters as an angular distance in degrees around `origin`.
///
/// Four points are projected at `distance_m` towards north, west, east and
/// south. Each point's offset from the origin is taken along its own axis
/// (latitude for north/south, longitude for east/west) and the four offsets
/// are combined with `aggregation`.
pub fn angular_radius(origin: Coordinate, distance_m: f64, aggregation: Aggregation) -> f64 {
    let north = project(origin, distance_m, 0.0);
    let west = project(origin, distance_m, 270.0);
    let east = project(origin, distance_m, 90.0);
    let south = project(origin, distance_m, 180.0);

    let deltas = [
        north.latitude - origin.latitude,
        origin.longitude - west.longitude,
        origin.latitude - south.latitude,
        east.longitude - origin.longitude,
    ];

    match aggregation {
        Aggregation::Max => deltas.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Aggregation::Min => deltas.iter().copied().fold(f64::INFINITY, f64::min),
        Aggregation::Average => deltas.iter().sum::<f64>() / deltas.len() as f64,
    }
}

/// [`angular_radius`] driven by a textual aggregation tag (`MIN`, `MAX`, `AVERAGE`).
pub fn angular_radius_for(origin: Coordinate, distance_m: f64, method: &str) -> Result<f64> {
    let aggregation = method.parse::<Aggregation>()?;
    Ok(angular_radius(origin, distance_m, aggregation))
}
