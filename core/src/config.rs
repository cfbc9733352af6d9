//! Filter configuration and policy switches.
//!
//! Configuration structs are plain serde types. Every field has a default so partial files are
//! accepted, and the whole struct can be written to or read from JSON, YAML or TOML; the format is
//! chosen from the file extension.
//!
//! ```
//! use landmark_pf::config::{FilterConfig, ResamplingStrategy};
//!
//! let cfg = FilterConfig {
//!     num_particles: 500,
//!     resampling_strategy: ResamplingStrategy::Systematic,
//!     ..FilterConfig::default()
//! };
//! assert!(cfg.validate().is_ok());
//! ```
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{FilterError, Result};

/// How the next generation is drawn from the weighted population.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplingStrategy {
    /// N independent draws from the discrete weight distribution.
    #[default]
    Multinomial,
    /// One uniform offset, N evenly spaced pointers.
    Systematic,
    /// One uniform draw inside each of N strata.
    Stratified,
    /// Deterministic floor(N·w) copies, remainder drawn systematically from the residuals.
    Residual,
}

/// Weight given to a particle that has no matched observations, either because no landmark is
/// within sensor range or because the observation set is empty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyEvidencePolicy {
    /// Empty product: weight 1. A particle that sees nothing is never penalized, which can let
    /// particles wander off a sparse map and survive.
    #[default]
    Neutral,
    /// Weight 0: particles without evidence are dropped at the next resample.
    Reject,
}

/// What `resample` does when no particle carries positive weight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateWeightPolicy {
    /// Return [`FilterError::DegenerateWeights`] and leave the population untouched.
    #[default]
    Fail,
    /// Resample as if every weight were equal.
    Uniform,
}

/// How a single pose is extracted from the population.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateStrategy {
    #[default]
    WeightedAverage,
    HighestWeight,
}

fn default_num_particles() -> usize {
    100
}
fn default_seed() -> u64 {
    42
}

/// Particle filter configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Population size, fixed for the filter's lifetime.
    #[serde(default = "default_num_particles")]
    pub num_particles: usize,
    /// Seed of the filter's random number generator.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub resampling_strategy: ResamplingStrategy,
    #[serde(default)]
    pub empty_evidence_policy: EmptyEvidencePolicy,
    #[serde(default)]
    pub degenerate_weight_policy: DegenerateWeightPolicy,
    /// Fill each particle's diagnostic associations during the weight update.
    #[serde(default)]
    pub record_associations: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: default_num_particles(),
            seed: default_seed(),
            resampling_strategy: ResamplingStrategy::default(),
            empty_evidence_policy: EmptyEvidencePolicy::default(),
            degenerate_weight_policy: DegenerateWeightPolicy::default(),
            record_associations: false,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(FilterError::Configuration(
                "num_particles must be positive".to_string(),
            ));
        }
        Ok(())
    }
    /// Write the configuration, format chosen by extension (.json/.yaml/.yml/.toml).
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_config(self, path)
    }
    /// Read the configuration, format chosen by extension (.json/.yaml/.yml/.toml).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: FilterConfig = read_config(path)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

fn config_format(path: &Path) -> Result<ConfigFormat> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    match ext.as_deref() {
        Some("json") => Ok(ConfigFormat::Json),
        Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
        Some("toml") => Ok(ConfigFormat::Toml),
        _ => Err(FilterError::Configuration(format!(
            "unsupported config file extension: {}",
            path.display()
        ))),
    }
}

/// Serialize `value` to `path` as JSON (pretty), YAML or TOML.
pub fn write_config<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> Result<()> {
    let path = path.as_ref();
    let format = config_format(path)?;
    let mut file = File::create(path)?;
    match format {
        ConfigFormat::Json => serde_json::to_writer_pretty(file, value)?,
        ConfigFormat::Yaml => {
            let s = serde_yaml::to_string(value)?;
            file.write_all(s.as_bytes())?;
        }
        ConfigFormat::Toml => {
            let s = toml::to_string(value)?;
            file.write_all(s.as_bytes())?;
        }
    }
    Ok(())
}

/// Deserialize a JSON, YAML or TOML file at `path`.
pub fn read_config<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let format = config_format(path)?;
    let mut file = File::open(path)?;
    let value = match format {
        ConfigFormat::Json => serde_json::from_reader(file)?,
        ConfigFormat::Yaml => serde_yaml::from_reader(file)?,
        ConfigFormat::Toml => {
            let mut s = String::new();
            file.read_to_string(&mut s)?;
            toml::from_str(&s)?
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("landmark_pf_config_{}_{name}", std::process::id()))
    }

    fn custom_config() -> FilterConfig {
        FilterConfig {
            num_particles: 250,
            seed: 7,
            resampling_strategy: ResamplingStrategy::Residual,
            empty_evidence_policy: EmptyEvidencePolicy::Reject,
            degenerate_weight_policy: DegenerateWeightPolicy::Uniform,
            record_associations: true,
        }
    }

    #[test]
    fn defaults() {
        let cfg = FilterConfig::default();
        assert_eq!(cfg.num_particles, 100);
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.resampling_strategy, ResamplingStrategy::Multinomial);
        assert_eq!(cfg.empty_evidence_policy, EmptyEvidencePolicy::Neutral);
        assert_eq!(cfg.degenerate_weight_policy, DegenerateWeightPolicy::Fail);
        assert!(!cfg.record_associations);
    }

    #[test]
    fn zero_particles_rejected() {
        let cfg = FilterConfig {
            num_particles: 0,
            ..FilterConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(FilterError::Configuration(_))
        ));
    }

    #[test]
    fn file_round_trip_all_formats() {
        let cfg = custom_config();
        for ext in ["json", "yaml", "yml", "toml"] {
            let path = temp_path(&format!("round_trip.{ext}"));
            cfg.to_file(&path).unwrap();
            let loaded = FilterConfig::from_file(&path).unwrap();
            assert_eq!(loaded, cfg, "round trip through .{ext}");
            let _ = std::fs::remove_file(&path);
        }
    }

    #[test]
    fn partial_file_uses_defaults() {
        let path = temp_path("partial.toml");
        std::fs::write(&path, "num_particles = 12\nresampling_strategy = \"systematic\"\n").unwrap();
        let loaded = FilterConfig::from_file(&path).unwrap();
        assert_eq!(loaded.num_particles, 12);
        assert_eq!(loaded.resampling_strategy, ResamplingStrategy::Systematic);
        assert_eq!(loaded.seed, 42);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unsupported_extension_rejected() {
        let path = temp_path("cfg.ini");
        assert!(matches!(
            FilterConfig::default().to_file(&path),
            Err(FilterError::Configuration(_))
        ));
        assert!(FilterConfig::from_file(&path).is_err());
    }

    #[test]
    fn invalid_file_content_is_a_parse_error() {
        let path = temp_path("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            FilterConfig::from_file(&path),
            Err(FilterError::Parse(_))
        ));
        let _ = std::fs::remove_file(&path);
    }
}
