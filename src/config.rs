//! Engine configuration.
//!
//! All thresholds are fixed per deployment and injected at construction.
//! Validation happens once, eagerly: a configuration with a non-finite or
//! negative threshold never reaches the filter or the segmentation engine.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrailError};

/// Configuration for sample filtering and trail segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(default)]
pub struct TrailConfig {
    /// Movement below this is treated as GPS noise.
    /// Default: 10.0 meters
    pub min_distance_m: f64,

    /// Minimum time between two recorded samples.
    /// Default: 30.0 seconds
    pub min_interval_s: f64,

    /// A pause longer than this ends a segment as halted. Also the staleness
    /// threshold for deciding whether the final segment is still live.
    /// Default: 600.0 seconds (10 minutes)
    pub max_segment_time_gap_s: f64,

    /// A hop longer than this ends a segment as jumped.
    /// Default: 1000.0 meters
    pub max_segment_distance_m: f64,

    /// Historical updates older than this are dropped before merging.
    /// 0 disables the cutoff. Default: 0.0 hours
    pub history_cutoff_hours: f64,
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            min_distance_m: 10.0,
            min_interval_s: 30.0,
            max_segment_time_gap_s: 600.0,
            max_segment_distance_m: 1000.0,
            history_cutoff_hours: 0.0,
        }
    }
}

impl TrailConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    ///
    /// The result is validated before it is returned.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TrailConfig =
            serde_json::from_str(json).map_err(|e| TrailError::ConfigDecode {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every threshold is finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("min_distance_m", self.min_distance_m),
            ("min_interval_s", self.min_interval_s),
            ("max_segment_time_gap_s", self.max_segment_time_gap_s),
            ("max_segment_distance_m", self.max_segment_distance_m),
            ("history_cutoff_hours", self.history_cutoff_hours),
        ];
        for (field, value) in fields {
            ensure_threshold(field, value)?;
        }
        Ok(())
    }
}

/// Reject non-finite and negative thresholds.
pub(crate) fn ensure_threshold(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(TrailError::InvalidConfiguration { field, value })
    }
}
