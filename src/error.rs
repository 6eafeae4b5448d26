//! Unified error handling for the trail engine.
//!
//! Almost every engine operation is total over well-typed input. The few
//! failure paths are configuration problems caught at construction, an
//! unsupported aggregation tag, and accessors that must return a `Result`
//! for an identity that has never been seen.

use thiserror::Error;

/// Unified error type for trail engine operations.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum TrailError {
    /// `angular_radius` was asked for an aggregation it does not know
    #[error("Unknown aggregation method: {method}")]
    InvalidAggregationMethod { method: String },

    /// A threshold was non-finite or negative
    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfiguration { field: &'static str, value: f64 },

    /// Configuration could not be decoded at all
    #[error("Invalid configuration: {message}")]
    ConfigDecode { message: String },

    /// No timeline exists for the identity
    #[error("Unknown identity '{identity}'")]
    UnknownIdentity { identity: String },

    /// A historical batch could not be decoded
    #[error("Invalid history batch: {message}")]
    InvalidHistory { message: String },

    /// A millisecond timestamp was outside the representable range
    #[error("Invalid timestamp: {millis}ms")]
    InvalidTimestamp { millis: i64 },
}

/// Result type alias for trail engine operations.
pub type Result<T> = std::result::Result<T, TrailError>;

/// Extension trait for converting Option lookups into TrailError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an unknown identity error.
    fn ok_or_unknown_identity(self, identity: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_unknown_identity(self, identity: &str) -> Result<T> {
        self.ok_or_else(|| TrailError::UnknownIdentity {
            identity: identity.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrailError::InvalidConfiguration {
            field: "min_distance_m",
            value: -1.0,
        };
        assert!(err.to_string().contains("min_distance_m"));
        assert!(err.to_string().contains("-1"));

        let err = TrailError::InvalidAggregationMethod {
            method: "MEDIAN".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown aggregation method: MEDIAN");
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_unknown_identity("bob");
        assert!(matches!(
            result,
            Err(TrailError::UnknownIdentity { ref identity }) if identity == "bob"
        ));
        assert_eq!(Some(3).ok_or_unknown_identity("bob"), Ok(3));
    }
}
