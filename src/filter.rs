//! Sample filter: decides whether a raw position is worth recording.
//!
//! The filter is a pure gate. It never touches a timeline; it only remembers
//! the last sample it accepted and when. Checks run in a fixed order and the
//! first one that fires rejects the sample:
//!
//! 1. No previously accepted sample: accept.
//! 2. Moved less than the reported accuracy or less than `min_distance_m`:
//!    reject as noise.
//! 3. Less than `min_interval_s` since the last acceptance: reject as rate
//!    limited, even though the movement was real.
//! 4. Otherwise accept and remember the sample.

use crate::config::{ensure_threshold, TrailConfig};
use crate::error::Result;
use crate::geodesy::distance;
use crate::{seconds_between, Sample, Timestamp};

/// Why a sample was not recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    /// Movement within the accuracy radius or the noise floor
    Noise { distance_m: f64 },
    /// Moved far enough but too soon after the last accepted sample
    RateLimited { elapsed_s: f64 },
}

/// Outcome of running a sample through the filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterDecision {
    Accept,
    Reject(Rejection),
}

impl FilterDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FilterDecision::Accept)
    }
}

/// Evaluate a sample against the previous acceptance without keeping state.
pub fn evaluate(
    min_distance_m: f64,
    min_interval_s: f64,
    last_accepted: Option<&Sample>,
    last_accepted_at: Option<Timestamp>,
    sample: &Sample,
) -> FilterDecision {
    let Some(prior) = last_accepted else {
        return FilterDecision::Accept;
    };

    let moved = distance(prior.coordinate, sample.coordinate);
    if moved < sample.accuracy || moved < min_distance_m {
        return FilterDecision::Reject(Rejection::Noise { distance_m: moved });
    }

    if let Some(at) = last_accepted_at {
        // Out-of-order samples give a negative interval and are rate limited
        let elapsed = seconds_between(at, sample.timestamp);
        if elapsed < min_interval_s {
            return FilterDecision::Reject(Rejection::RateLimited { elapsed_s: elapsed });
        }
    }

    FilterDecision::Accept
}

/// Stateful per-identity sample filter.
#[derive(Debug, Clone)]
pub struct SampleFilter {
    min_distance_m: f64,
    min_interval_s: f64,
    last_accepted: Option<Sample>,
    last_accepted_at: Option<Timestamp>,
}

impl Default for SampleFilter {
    fn default() -> Self {
        let config = TrailConfig::default();
        Self {
            min_distance_m: config.min_distance_m,
            min_interval_s: config.min_interval_s,
            last_accepted: None,
            last_accepted_at: None,
        }
    }
}

impl SampleFilter {
    /// Create a filter from a configuration.
    pub fn new(config: &TrailConfig) -> Result<Self> {
        Self::with_thresholds(config.min_distance_m, config.min_interval_s)
    }

    /// Create a filter with explicit thresholds.
    pub fn with_thresholds(min_distance_m: f64, min_interval_s: f64) -> Result<Self> {
        ensure_threshold("min_distance_m", min_distance_m)?;
        ensure_threshold("min_interval_s", min_interval_s)?;
        Ok(Self {
            min_distance_m,
            min_interval_s,
            last_accepted: None,
            last_accepted_at: None,
        })
    }

    /// Run a sample through the filter, remembering it if accepted.
    pub fn consider(&mut self, sample: &Sample) -> FilterDecision {
        let decision = evaluate(
            self.min_distance_m,
            self.min_interval_s,
            self.last_accepted.as_ref(),
            self.last_accepted_at,
            sample,
        );
        if decision.is_accepted() {
            self.last_accepted = Some(*sample);
            self.last_accepted_at = Some(sample.timestamp);
        }
        decision
    }

    /// The most recently accepted sample, if any.
    pub fn last_accepted(&self) -> Option<&Sample> {
        self.last_accepted.as_ref()
    }

    /// Forget the last acceptance; the next sample is accepted unconditionally.
    pub fn reset(&mut self) {
        self.last_accepted = None;
        self.last_accepted_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::project;
    use crate::Coordinate;
    use chrono::{Duration, TimeZone, Utc};

    fn t(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    const ORIGIN: Coordinate = Coordinate {
        latitude: 51.5074,
        longitude: -0.1278,
    };

    fn filter() -> SampleFilter {
        SampleFilter::new(&TrailConfig::default()).unwrap()
    }

    #[test]
    fn test_first_sample_always_accepted() {
        let mut f = filter();
        let sample = Sample::new(t(0), ORIGIN).with_accuracy(1_000.0);
        assert_eq!(f.consider(&sample), FilterDecision::Accept);
        assert_eq!(f.last_accepted(), Some(&sample));
    }

    #[test]
    fn test_noise_within_min_distance_accepts_once() {
        let mut f = filter();
        let mut accepted = 0;
        for i in 0..20 {
            // Up to 9m away from the first sample, minutes apart
            let coord = project(ORIGIN, (i % 10) as f64, (i * 37) as f64);
            if f.consider(&Sample::new(t(i * 120), coord)).is_accepted() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }

    #[test]
    fn test_movement_within_accuracy_is_noise() {
        let mut f = filter();
        f.consider(&Sample::new(t(0), ORIGIN));

        let moved = project(ORIGIN, 40.0, 90.0);
        let decision = f.consider(&Sample::new(t(300), moved).with_accuracy(65.0));
        assert!(matches!(
            decision,
            FilterDecision::Reject(Rejection::Noise { .. })
        ));

        let decision = f.consider(&Sample::new(t(300), moved).with_accuracy(5.0));
        assert_eq!(decision, FilterDecision::Accept);
    }

    #[test]
    fn test_rate_limiting() {
        let mut f = filter();
        let first = Sample::new(t(0), ORIGIN);
        let second = Sample::new(t(10), project(ORIGIN, 200.0, 0.0));

        assert!(f.consider(&first).is_accepted());
        assert!(matches!(
            f.consider(&second),
            FilterDecision::Reject(Rejection::RateLimited { elapsed_s }) if elapsed_s == 10.0
        ));
        // Rate-limited samples do not move the reference point
        assert_eq!(f.last_accepted(), Some(&first));
    }

    #[test]
    fn test_noise_checked_before_rate_limit() {
        let mut f = filter();
        f.consider(&Sample::new(t(0), ORIGIN));
        let decision = f.consider(&Sample::new(t(1), project(ORIGIN, 2.0, 0.0)));
        assert!(matches!(
            decision,
            FilterDecision::Reject(Rejection::Noise { .. })
        ));
    }

    #[test]
    fn test_interval_boundary_is_accepted() {
        let mut f = filter();
        f.consider(&Sample::new(t(0), ORIGIN));
        let decision = f.consider(&Sample::new(t(30), project(ORIGIN, 50.0, 0.0)));
        assert_eq!(decision, FilterDecision::Accept);
    }

    #[test]
    fn test_out_of_order_sample_rate_limited() {
        let mut f = filter();
        f.consider(&Sample::new(t(600), ORIGIN));
        let decision = f.consider(&Sample::new(t(0), project(ORIGIN, 500.0, 0.0)));
        assert!(matches!(
            decision,
            FilterDecision::Reject(Rejection::RateLimited { .. })
        ));
    }

    #[test]
    fn test_reset() {
        let mut f = filter();
        f.consider(&Sample::new(t(0), ORIGIN));
        f.reset();
        assert!(f.last_accepted().is_none());
        assert!(f.consider(&Sample::new(t(1), ORIGIN)).is_accepted());
    }

    #[test]
    fn test_invalid_thresholds() {
        assert!(SampleFilter::with_thresholds(f64::NAN, 30.0).is_err());
        assert!(SampleFilter::with_thresholds(10.0, -1.0).is_err());
    }
}
