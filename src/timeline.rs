//! Per-identity ordered history of accepted positions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Coordinate, Timestamp, TrailPoint};

/// Ordered mapping from timestamp to position.
///
/// Keys are unique: inserting at an existing timestamp replaces the old
/// position. Iteration is always in ascending timestamp order, whatever the
/// insertion order was.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    points: BTreeMap<Timestamp, Coordinate>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a position. Returns `true` if the timeline changed, i.e. the
    /// timestamp was new or previously held a different position.
    pub fn insert(&mut self, timestamp: Timestamp, coordinate: Coordinate) -> bool {
        match self.points.insert(timestamp, coordinate) {
            Some(previous) => previous != coordinate,
            None => true,
        }
    }

    pub fn get(&self, timestamp: &Timestamp) -> Option<&Coordinate> {
        self.points.get(timestamp)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Entries in ascending timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = TrailPoint> + '_ {
        self.points.iter().map(|(t, c)| TrailPoint::new(*t, *c))
    }

    /// Entries at or after `from`, in ascending order.
    pub fn iter_from(&self, from: Timestamp) -> impl Iterator<Item = TrailPoint> + '_ {
        self.points.range(from..).map(|(t, c)| TrailPoint::new(*t, *c))
    }

    pub fn first(&self) -> Option<TrailPoint> {
        self.points
            .first_key_value()
            .map(|(t, c)| TrailPoint::new(*t, *c))
    }

    /// The most recent entry.
    pub fn latest(&self) -> Option<TrailPoint> {
        self.points
            .last_key_value()
            .map(|(t, c)| TrailPoint::new(*t, *c))
    }
}

impl FromIterator<(Timestamp, Coordinate)> for Timeline {
    fn from_iter<I: IntoIterator<Item = (Timestamp, Coordinate)>>(iter: I) -> Self {
        let mut timeline = Timeline::new();
        for (t, c) in iter {
            timeline.insert(t, c);
        }
        timeline
    }
}
