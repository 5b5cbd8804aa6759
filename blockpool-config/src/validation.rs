//! Custom validation functions for configuration.
//!
//! Provides shared validation logic used across multiple configuration modules.

use validator::ValidationError;

use crate::simulator::OperationWeights;

/// Validate a tracing filter directive such as `info` or
/// `blockpool_core=debug,warn`.
pub fn validate_log_filter(filter: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new(r"^[A-Za-z0-9_:\-]+(=[A-Za-z]+)?(,[A-Za-z0-9_:\-]+(=[A-Za-z]+)?)*$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if re.is_match(filter.trim()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_filter"))
    }
}

/// Validate that at least one simulated operation can be chosen.
pub fn validate_weights(weights: &OperationWeights) -> Result<(), ValidationError> {
    if weights.total() == 0 {
        return Err(ValidationError::new("all_weights_zero"));
    }
    if weights.alloc == 0 {
        // Without allocations free and resize never have a target.
        return Err(ValidationError::new("alloc_weight_zero"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_filters() {
        assert!(validate_log_filter("info").is_ok());
        assert!(validate_log_filter("blockpool_core=debug,warn").is_ok());
        assert!(validate_log_filter("").is_err());
        assert!(validate_log_filter("info;drop").is_err());
    }

    #[test]
    fn weights() {
        let weights = OperationWeights {
            alloc: 0,
            free: 0,
            resize: 0,
        };
        assert!(validate_weights(&weights).is_err());
        assert!(validate_weights(&OperationWeights::default()).is_ok());
    }

    #[test]
    fn saturated_weights_do_not_overflow() {
        let weights = OperationWeights {
            alloc: u32::MAX,
            free: 1,
            resize: u32::MAX,
        };
        assert_eq!(weights.total(), 2 * u64::from(u32::MAX) + 1);
        assert!(validate_weights(&weights).is_ok());
    }
}
