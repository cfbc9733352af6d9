//! Error types for the landmark particle filter

use thiserror::Error;

/// Errors raised by the filter and its data/configuration loaders.
#[derive(Error, Debug)]
pub enum FilterError {
    /// An operation other than `init` was called on an empty filter.
    #[error("particle filter used before initialization")]
    Uninitialized,

    /// Every particle weight is zero (or the total is not finite) going into a resample.
    #[error("degenerate weights: total particle weight is {total}")]
    DegenerateWeights { total: f64 },

    /// Invalid parameters: slice lengths, standard deviations, particle counts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Particle index outside of the population.
    #[error("particle index {index} out of range for population of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed record or configuration text.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for FilterError {
    fn from(e: serde_json::Error) -> Self {
        FilterError::Parse(e.to_string())
    }
}

impl From<serde_yaml::Error> for FilterError {
    fn from(e: serde_yaml::Error) -> Self {
        FilterError::Parse(e.to_string())
    }
}

impl From<toml::de::Error> for FilterError {
    fn from(e: toml::de::Error) -> Self {
        FilterError::Parse(e.to_string())
    }
}

impl From<toml::ser::Error> for FilterError {
    fn from(e: toml::ser::Error) -> Self {
        FilterError::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;

/// Check that `values` holds exactly `expected` finite, non-negative standard deviations.
pub(crate) fn check_std_devs(name: &str, values: &[f64], expected: usize) -> Result<()> {
    if values.len() != expected {
        return Err(FilterError::Configuration(format!(
            "{name} must contain {expected} standard deviations, got {}",
            values.len()
        )));
    }
    if let Some(bad) = values.iter().find(|s| !s.is_finite() || **s < 0.0) {
        return Err(FilterError::Configuration(format!(
            "{name} contains an invalid standard deviation: {bad}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_devs_length_is_checked() {
        assert!(check_std_devs("std", &[1.0, 1.0, 1.0], 3).is_ok());
        let err = check_std_devs("std", &[1.0, 1.0], 3).unwrap_err();
        assert!(matches!(err, FilterError::Configuration(_)));
        assert!(err.to_string().contains("3 standard deviations"));
    }

    #[test]
    fn std_devs_must_be_non_negative_and_finite() {
        assert!(check_std_devs("std", &[0.0, 0.0], 2).is_ok());
        assert!(check_std_devs("std", &[-0.1, 1.0], 2).is_err());
        assert!(check_std_devs("std", &[f64::NAN, 1.0], 2).is_err());
        assert!(check_std_devs("std", &[f64::INFINITY, 1.0], 2).is_err());
    }

    #[test]
    fn error_messages_are_readable() {
        let err = FilterError::IndexOutOfRange { index: 4, len: 2 };
        assert_eq!(
            err.to_string(),
            "particle index 4 out of range for population of 2"
        );
        assert_eq!(
            FilterError::Uninitialized.to_string(),
            "particle filter used before initialization"
        );
    }
}
