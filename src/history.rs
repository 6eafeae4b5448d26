//! Historical batch helpers.
//!
//! Past positions are downloaded by an outside collaborator as a list of
//! update records. These helpers apply the configured age cutoff and turn
//! the records into per-identity batches that the engine can merge.

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrailError};
use crate::{Coordinate, Timestamp};

const SECONDS_PER_HOUR: i64 = 3600;

/// Maximum age of historical entries worth loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryCutoff {
    /// `None` when history loading is disabled
    max_age_s: Option<i64>,
}

impl HistoryCutoff {
    /// Cutoff from a number of hours. Zero (or less) disables history.
    pub fn from_hours(hours: f64) -> Self {
        let max_age_s = if hours.is_finite() && hours > 0.0 {
            Some((hours * SECONDS_PER_HOUR as f64) as i64)
        } else {
            None
        };
        Self { max_age_s }
    }

    pub fn is_disabled(&self) -> bool {
        self.max_age_s.is_none()
    }

    /// Whether an entry observed at `timestamp` is young enough.
    ///
    /// Age is counted in whole seconds and must be strictly below the cutoff.
    pub fn admits(&self, timestamp: Timestamp, now: Timestamp) -> bool {
        match self.max_age_s {
            Some(max_age) => (now - timestamp).num_seconds() < max_age,
            None => false,
        }
    }

    /// Keep only the entries of a batch young enough to load.
    pub fn retain(
        &self,
        batch: Vec<(Timestamp, Coordinate)>,
        now: Timestamp,
    ) -> Vec<(Timestamp, Coordinate)> {
        batch
            .into_iter()
            .filter(|(t, _)| self.admits(*t, now))
            .collect()
    }
}

/// One record of a history download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryUpdate {
    pub global_id: String,
    pub timestamp: Timestamp,
    /// JSON object with `latitude` and `longitude`
    pub contents: String,
}

impl HistoryUpdate {
    /// Decode the embedded position.
    pub fn coordinate(&self) -> Result<Coordinate> {
        serde_json::from_str(&self.contents).map_err(|e| TrailError::InvalidHistory {
            message: format!("contents of {} update: {}", self.global_id, e),
        })
    }
}

/// Parse a history download into per-identity batches.
///
/// The outer document must be a JSON array; anything else is an error.
/// Individual records that do not decode are skipped with a warning, and
/// records outside `cutoff` are dropped. A disabled cutoff yields no batches.
pub fn parse_history_updates(
    json: &str,
    cutoff: HistoryCutoff,
    now: Timestamp,
) -> Result<BTreeMap<String, Vec<(Timestamp, Coordinate)>>> {
    let records: Vec<serde_json::Value> =
        serde_json::from_str(json).map_err(|e| TrailError::InvalidHistory {
            message: e.to_string(),
        })?;

    let mut batches: BTreeMap<String, Vec<(Timestamp, Coordinate)>> = BTreeMap::new();
    if cutoff.is_disabled() {
        debug!("[History] Cutoff disabled, ignoring {} records", records.len());
        return Ok(batches);
    }

    let total = records.len();
    let mut skipped = 0;
    for (index, record) in records.into_iter().enumerate() {
        let update: HistoryUpdate = match serde_json::from_value(record) {
            Ok(update) => update,
            Err(e) => {
                warn!("[History] Skipping record {}: {}", index, e);
                skipped += 1;
                continue;
            }
        };
        let coordinate = match update.coordinate() {
            Ok(coordinate) => coordinate,
            Err(e) => {
                warn!("[History] Skipping record {}: {}", index, e);
                skipped += 1;
                continue;
            }
        };
        if cutoff.admits(update.timestamp, now) {
            batches
                .entry(update.global_id)
                .or_default()
                .push((update.timestamp, coordinate));
        }
    }

    debug!(
        "[History] Parsed {} records into {} batches ({} skipped)",
        total,
        batches.len(),
        skipped
    );
    Ok(batches)
}
