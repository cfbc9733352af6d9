//! Synthetic scenarios and the closed-loop driver.
//!
//! This module provides:
//! - [`SimulationConfig`], the noise parameters and filter settings of a run, readable from JSON, YAML
//!   or TOML
//! - [`generate_scenario`], which drives the noiseless motion model through a control sequence and
//!   produces noisy vehicle-frame observations of every landmark in sensor range
//! - [`run_filter`], the init/predict/update/resample loop over a [`Scenario`]
//! - [`evaluate`] and [`summarize`] for scoring the filter against ground truth
use log::{debug, info};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{EstimateStrategy, FilterConfig, read_config, write_config};
use crate::data::{ControlRecord, GroundTruthRecord, Map, Scenario};
use crate::error::{FilterError, Result, check_std_devs};
use crate::motion::predict_pose;
use crate::particle::{Particle, ParticleFilter};
use crate::{Landmark, LandmarkObs, Pose, transform_to_vehicle, wrap_to_pi};

fn default_delta_t() -> f64 {
    0.1
}
fn default_sensor_range() -> f64 {
    50.0
}
fn default_sigma_pos() -> [f64; 3] {
    [0.3, 0.3, 0.01]
}
fn default_sigma_landmark() -> [f64; 2] {
    [0.3, 0.3]
}
fn default_max_translation_error() -> f64 {
    1.0
}
fn default_max_yaw_error() -> f64 {
    0.05
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Logging options for the simulation binary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log to this file instead of stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}
impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Parameters of a simulated run.
///
/// Plain values come before the nested tables so the struct serializes cleanly to TOML.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Time between steps (s)
    #[serde(default = "default_delta_t")]
    pub delta_t: f64,
    /// Landmarks strictly closer than this are observed (m)
    #[serde(default = "default_sensor_range")]
    pub sensor_range: f64,
    /// Initialization and process noise: [x (m), y (m), theta (rad)]
    #[serde(default = "default_sigma_pos")]
    pub sigma_pos: [f64; 3],
    /// Observation noise: [x (m), y (m)]
    #[serde(default = "default_sigma_landmark")]
    pub sigma_landmark: [f64; 2],
    /// Mean translation error above which a run counts as failed (m)
    #[serde(default = "default_max_translation_error")]
    pub max_translation_error: f64,
    /// Mean yaw error above which a run counts as failed (rad)
    #[serde(default = "default_max_yaw_error")]
    pub max_yaw_error: f64,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}
impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            delta_t: default_delta_t(),
            sensor_range: default_sensor_range(),
            sigma_pos: default_sigma_pos(),
            sigma_landmark: default_sigma_landmark(),
            max_translation_error: default_max_translation_error(),
            max_yaw_error: default_max_yaw_error(),
            filter: FilterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        self.filter.validate()?;
        if !(self.delta_t.is_finite() && self.delta_t >= 0.0) {
            return Err(FilterError::Configuration(format!(
                "delta_t must be finite and non-negative, got {}",
                self.delta_t
            )));
        }
        if !(self.sensor_range > 0.0) {
            return Err(FilterError::Configuration(format!(
                "sensor_range must be positive, got {}",
                self.sensor_range
            )));
        }
        check_std_devs("sigma_pos", &self.sigma_pos, 3)?;
        check_std_devs("sigma_landmark", &self.sigma_landmark, 2)?;
        if self.sigma_landmark.iter().any(|s| *s <= 0.0) {
            return Err(FilterError::Configuration(
                "sigma_landmark must be strictly positive".to_string(),
            ));
        }
        Ok(())
    }
    /// Write the configuration, format chosen by extension (.json/.yaml/.yml/.toml).
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_config(self, path)
    }
    /// Read and validate a configuration, format chosen by extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: SimulationConfig = read_config(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Build a scenario by driving `controls` from `initial_pose` without process noise.
///
/// Step 0 sits at `initial_pose`; step `t` is reached by applying `controls[t - 1]` for
/// `params.delta_t`. There is one step per control, so the last control is never applied. Each step
/// observes every landmark strictly within `params.sensor_range` of the true pose, expressed in the
/// vehicle frame with Gaussian noise of `params.sigma_landmark`.
pub fn generate_scenario<R: Rng + ?Sized>(
    map: &Map,
    initial_pose: Pose,
    controls: &[ControlRecord],
    params: &SimulationConfig,
    rng: &mut R,
) -> Result<Scenario> {
    params.validate()?;
    let noise_x = Normal::new(0.0, params.sigma_landmark[0])
        .map_err(|e| FilterError::Configuration(e.to_string()))?;
    let noise_y = Normal::new(0.0, params.sigma_landmark[1])
        .map_err(|e| FilterError::Configuration(e.to_string()))?;

    let mut ground_truth = Vec::with_capacity(controls.len());
    let mut observations = Vec::with_capacity(controls.len());
    let mut pose = initial_pose;
    for step in 0..controls.len() {
        if step > 0 {
            let control = &controls[step - 1];
            pose = predict_pose(&pose, params.delta_t, control.velocity, control.yaw_rate);
        }
        ground_truth.push(GroundTruthRecord::from(pose));
        let seen: Vec<LandmarkObs> = map
            .landmarks_within(pose.x, pose.y, params.sensor_range)
            .map(|lm| {
                let mut obs = transform_to_vehicle(&pose, lm.x, lm.y);
                obs.x += noise_x.sample(rng);
                obs.y += noise_y.sample(rng);
                obs
            })
            .collect();
        observations.push(seen);
    }
    debug!(
        "Generated scenario with {} steps over {} landmarks",
        ground_truth.len(),
        map.len()
    );
    Ok(Scenario {
        map: map.clone(),
        controls: controls.to_vec(),
        ground_truth,
        observations,
    })
}

/// Scatter `count` landmarks uniformly over the square `[-half_extent, half_extent]²`, ids from 1.
pub fn random_map<R: Rng + ?Sized>(count: usize, half_extent: f64, rng: &mut R) -> Result<Map> {
    let coord = Uniform::new_inclusive(-half_extent, half_extent)
        .map_err(|e| FilterError::Configuration(e.to_string()))?;
    let landmarks = (1..=count)
        .map(|id| Landmark::new(id as u32, coord.sample(rng), coord.sample(rng)))
        .collect();
    Ok(Map::new(landmarks))
}

/// A gentle weaving drive: constant speed, sinusoidal yaw rate.
pub fn weaving_controls(steps: usize, velocity: f64, delta_t: f64) -> Vec<ControlRecord> {
    (0..steps)
        .map(|k| {
            let t = k as f64 * delta_t;
            ControlRecord::new(velocity, 0.3 * (0.2 * t).sin())
        })
        .collect()
}

/// Absolute pose error, heading error folded into [0, π].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseError {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}
impl PoseError {
    pub fn translation(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// Error of `estimate` against `truth`.
pub fn evaluate(truth: &Pose, estimate: &Pose) -> PoseError {
    PoseError {
        x: (estimate.x - truth.x).abs(),
        y: (estimate.y - truth.y).abs(),
        yaw: wrap_to_pi(estimate.theta - truth.theta).abs(),
    }
}

/// One row of a filter run. Flat so it maps directly onto a CSV row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: usize,
    pub gt_x: f64,
    pub gt_y: f64,
    pub gt_theta: f64,
    pub best_x: f64,
    pub best_y: f64,
    pub best_theta: f64,
    pub best_weight: f64,
    pub mean_x: f64,
    pub mean_y: f64,
    pub mean_theta: f64,
    pub error_x: f64,
    pub error_y: f64,
    pub error_yaw: f64,
    pub effective_sample_size: f64,
}
impl StepResult {
    pub fn new(
        step: usize,
        truth: Pose,
        best: &Particle,
        mean: Pose,
        effective_sample_size: f64,
    ) -> Self {
        let error = evaluate(&truth, &best.pose());
        StepResult {
            step,
            gt_x: truth.x,
            gt_y: truth.y,
            gt_theta: truth.theta,
            best_x: best.x,
            best_y: best.y,
            best_theta: best.theta,
            best_weight: best.weight,
            mean_x: mean.x,
            mean_y: mean.y,
            mean_theta: mean.theta,
            error_x: error.x,
            error_y: error.y,
            error_yaw: error.yaw,
            effective_sample_size,
        }
    }
    pub fn truth(&self) -> Pose {
        Pose::new(self.gt_x, self.gt_y, self.gt_theta)
    }
    pub fn best(&self) -> Pose {
        Pose::new(self.best_x, self.best_y, self.best_theta)
    }
    pub fn mean(&self) -> Pose {
        Pose::new(self.mean_x, self.mean_y, self.mean_theta)
    }
    pub fn error(&self) -> PoseError {
        PoseError {
            x: self.error_x,
            y: self.error_y,
            yaw: self.error_yaw,
        }
    }
    pub fn to_csv<P: AsRef<Path>>(results: &[Self], path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for result in results {
            writer.serialize(result)?;
        }
        writer.flush()?;
        Ok(())
    }
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut results = Vec::new();
        for result in rdr.deserialize() {
            let record: Self = result?;
            results.push(record);
        }
        Ok(results)
    }
}

/// Mean and worst-case error over a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub steps: usize,
    pub mean: PoseError,
    pub max: PoseError,
}
impl ErrorSummary {
    /// Whether the mean errors are inside the run's tolerances.
    pub fn within(&self, max_translation_error: f64, max_yaw_error: f64) -> bool {
        self.mean.x <= max_translation_error
            && self.mean.y <= max_translation_error
            && self.mean.yaw <= max_yaw_error
    }
}

/// Cumulative mean and maximum of the best-particle errors; `None` for an empty run.
pub fn summarize(results: &[StepResult]) -> Option<ErrorSummary> {
    if results.is_empty() {
        return None;
    }
    let mut summary = ErrorSummary {
        steps: results.len(),
        ..ErrorSummary::default()
    };
    for r in results {
        summary.mean.x += r.error_x;
        summary.mean.y += r.error_y;
        summary.mean.yaw += r.error_yaw;
        summary.max.x = summary.max.x.max(r.error_x);
        summary.max.y = summary.max.y.max(r.error_y);
        summary.max.yaw = summary.max.yaw.max(r.error_yaw);
    }
    let n = results.len() as f64;
    summary.mean.x /= n;
    summary.mean.y /= n;
    summary.mean.yaw /= n;
    Some(summary)
}

/// Run the filter over every step of `scenario`.
///
/// Step 0 initializes the population around the first ground truth pose with `sigma_pos`; later
/// steps predict with the previous control. Every step then weighs the particles against that step's
/// observations, records the best particle and the weighted mean, and resamples.
pub fn run_filter(scenario: &Scenario, config: &SimulationConfig) -> Result<Vec<StepResult>> {
    config.validate()?;
    scenario.validate()?;
    let mut pf = ParticleFilter::new(config.filter.clone())?;
    let mut results = Vec::with_capacity(scenario.num_steps());
    let mut cumulative = PoseError::default();

    for (step, truth) in scenario.ground_truth.iter().enumerate() {
        let truth = truth.pose();
        if step == 0 {
            pf.init(truth.x, truth.y, truth.theta, &config.sigma_pos)?;
        } else {
            let control = &scenario.controls[step - 1];
            pf.prediction(
                config.delta_t,
                &config.sigma_pos,
                control.velocity,
                control.yaw_rate,
            )?;
        }
        pf.update_weights(
            config.sensor_range,
            &config.sigma_landmark,
            &scenario.observations[step],
            &scenario.map,
        )?;

        let best = pf.best_particle().cloned().ok_or(FilterError::Uninitialized)?;
        let mean = pf.estimate(EstimateStrategy::WeightedAverage)?;
        let result = StepResult::new(step, truth, &best, mean, pf.effective_sample_size());
        pf.resample()?;

        cumulative.x += result.error_x;
        cumulative.y += result.error_y;
        cumulative.yaw += result.error_yaw;
        let n = (step + 1) as f64;
        debug!(
            "Step {}: best ({:.3}, {:.3}, {:.3}), cumulative mean error ({:.3}, {:.3}, {:.3})",
            step,
            best.x,
            best.y,
            best.theta,
            cumulative.x / n,
            cumulative.y / n,
            cumulative.yaw / n
        );
        results.push(result);
    }
    if let Some(summary) = summarize(&results) {
        info!(
            "Finished {} steps: mean error x {:.3} m, y {:.3} m, yaw {:.4} rad",
            summary.steps, summary.mean.x, summary.mean.y, summary.mean.yaw
        );
    }
    Ok(results)
}
