//! Particles and the sequential importance resampling filter.
//!
//! [`ParticleFilter`] owns its population exclusively. `prediction` and `update_weights` mutate the
//! particles in place; `resample` builds a brand new vector and swaps it in. Callers only ever get
//! shared borrows of the particles, so nothing outside the filter can hold on to a particle across a
//! resample.
use std::f64::consts::PI;
use std::fmt::{self, Debug, Display};
use std::str::FromStr;

use log::{debug, warn};
use nalgebra::{Matrix3, Vector3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::association::data_association;
use crate::config::{DegenerateWeightPolicy, EmptyEvidencePolicy, EstimateStrategy, FilterConfig};
use crate::data::Map;
use crate::error::{FilterError, Result, check_std_devs};
use crate::motion::predict_pose;
use crate::resampling::resample_indices;
use crate::{LandmarkObs, Pose, transform_to_map, wrap_to_pi};

/// Per-particle diagnostic associations: landmark ids and the map-frame coordinates that were
/// matched to them. Only used for reporting.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Associations {
    pub ids: Vec<u32>,
    pub sense_x: Vec<f64>,
    pub sense_y: Vec<f64>,
}

/// Selects which sensed coordinate list to render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coordinate {
    X,
    Y,
}
impl FromStr for Coordinate {
    type Err = FilterError;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "X" | "x" => Ok(Coordinate::X),
            "Y" | "y" => Ok(Coordinate::Y),
            other => Err(FilterError::Parse(format!(
                "unknown coordinate '{other}', expected X or Y"
            ))),
        }
    }
}

/// A single pose hypothesis.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Particle {
    /// Index at initialization; copies made by resampling share it.
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    /// Non-negative importance weight, not necessarily normalized.
    pub weight: f64,
    pub associations: Option<Associations>,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("id", &self.id)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("theta", &self.theta)
            .field("weight", &self.weight)
            .finish()
    }
}
impl Particle {
    pub fn new(id: usize, x: f64, y: f64, theta: f64, weight: f64) -> Particle {
        Particle {
            id,
            x,
            y,
            theta,
            weight,
            associations: None,
        }
    }
    pub fn pose(&self) -> Pose {
        Pose::new(self.x, self.y, self.theta)
    }
    /// Attach diagnostic associations. The three lists are stored as given.
    pub fn set_associations(&mut self, ids: Vec<u32>, sense_x: Vec<f64>, sense_y: Vec<f64>) {
        self.associations = Some(Associations {
            ids,
            sense_x,
            sense_y,
        });
    }
    pub fn clear_associations(&mut self) {
        self.associations = None;
    }
    /// Associated landmark ids as space separated text, e.g. `"1 4 7"`.
    pub fn get_associations(&self) -> String {
        match &self.associations {
            Some(a) => join_spaced(&a.ids),
            None => String::new(),
        }
    }
    /// Sensed x or y coordinates as space separated text.
    pub fn get_sense_coord(&self, coord: Coordinate) -> String {
        match (&self.associations, coord) {
            (Some(a), Coordinate::X) => join_spaced(&a.sense_x),
            (Some(a), Coordinate::Y) => join_spaced(&a.sense_y),
            (None, _) => String::new(),
        }
    }
}

fn join_spaced<T: Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sequential importance resampling filter over planar poses.
#[derive(Clone)]
pub struct ParticleFilter {
    config: FilterConfig,
    particles: Vec<Particle>,
    is_initialized: bool,
    rng: StdRng,
}
impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_weight = self
            .particles
            .iter()
            .map(|p| p.weight)
            .fold(f64::INFINITY, f64::min);
        let max_weight = self.particles.iter().map(|p| p.weight).fold(0.0, f64::max);
        let mut s = f.debug_struct("ParticleFilter");
        s.field("num_particles", &self.config.num_particles)
            .field("is_initialized", &self.is_initialized)
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            );
        if let Ok(mean) = self.estimate(EstimateStrategy::WeightedAverage) {
            s.field(
                "mean_pose",
                &format_args!("({:.3}, {:.3}, {:.3} rad)", mean.x, mean.y, mean.theta),
            );
        }
        s.finish()
    }
}
impl ParticleFilter {
    /// Create an uninitialized filter whose generator is seeded from `config.seed`.
    pub fn new(config: FilterConfig) -> Result<Self> {
        let rng = StdRng::seed_from_u64(config.seed);
        Self::with_rng(config, rng)
    }
    /// Create an uninitialized filter drawing from a caller-supplied generator.
    pub fn with_rng(config: FilterConfig, rng: StdRng) -> Result<Self> {
        config.validate()?;
        Ok(ParticleFilter {
            particles: Vec::with_capacity(config.num_particles),
            config,
            is_initialized: false,
            rng,
        })
    }
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
    pub fn num_particles(&self) -> usize {
        self.config.num_particles
    }
    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
    pub fn weights(&self) -> Vec<f64> {
        self.particles.iter().map(|p| p.weight).collect()
    }
    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized {
            Ok(())
        } else {
            Err(FilterError::Uninitialized)
        }
    }

    /// Seed the population around `(x, y, theta)`.
    ///
    /// `std` holds the standard deviations `[std_x, std_y, std_theta]` of the Gaussian prior. Every
    /// particle starts with weight 1. Calling `init` again replaces the population.
    pub fn init(&mut self, x: f64, y: f64, theta: f64, std: &[f64]) -> Result<()> {
        check_std_devs("std", std, 3)?;
        if self.is_initialized {
            warn!("Re-initializing particle filter; discarding current population");
        }
        let dist_x = Normal::new(x, std[0]).map_err(config_error)?;
        let dist_y = Normal::new(y, std[1]).map_err(config_error)?;
        let dist_theta = Normal::new(theta, std[2]).map_err(config_error)?;

        let n = self.config.num_particles;
        let mut particles = Vec::with_capacity(n);
        for id in 0..n {
            particles.push(Particle::new(
                id,
                dist_x.sample(&mut self.rng),
                dist_y.sample(&mut self.rng),
                dist_theta.sample(&mut self.rng),
                1.0,
            ));
        }
        self.particles = particles;
        self.is_initialized = true;
        debug!(
            "Initialized {} particles around ({:.3}, {:.3}, {:.3})",
            n, x, y, theta
        );
        Ok(())
    }

    /// Advance every particle by the motion command and add process noise.
    ///
    /// `std_pos` holds `[std_x, std_y, std_theta]`. Weights are left untouched.
    pub fn prediction(
        &mut self,
        delta_t: f64,
        std_pos: &[f64],
        velocity: f64,
        yaw_rate: f64,
    ) -> Result<()> {
        self.ensure_initialized()?;
        check_std_devs("std_pos", std_pos, 3)?;
        let noise_x = Normal::new(0.0, std_pos[0]).map_err(config_error)?;
        let noise_y = Normal::new(0.0, std_pos[1]).map_err(config_error)?;
        let noise_theta = Normal::new(0.0, std_pos[2]).map_err(config_error)?;

        for particle in self.particles.iter_mut() {
            let predicted = predict_pose(&particle.pose(), delta_t, velocity, yaw_rate);
            particle.x = predicted.x + noise_x.sample(&mut self.rng);
            particle.y = predicted.y + noise_y.sample(&mut self.rng);
            particle.theta = predicted.theta + noise_theta.sample(&mut self.rng);
        }
        debug!(
            "Predicted {} particles: dt={}, v={}, yaw_rate={}",
            self.particles.len(),
            delta_t,
            velocity,
            yaw_rate
        );
        Ok(())
    }

    /// Recompute every particle's weight from the current observation set.
    ///
    /// For each particle the landmarks closer than `sensor_range` are matched against the
    /// observations, transformed into the map frame from that particle's pose, and the weight becomes
    /// the product of the bivariate Gaussian densities of the matched pairs, with the axis standard
    /// deviations in `std_landmark = [std_x, std_y]`:
    ///
    /// $$
    /// w = \prod_i \frac{1}{2\pi\sigma_x\sigma_y}
    ///     \exp\left(-\frac{\Delta x_i^2}{2\sigma_x^2} - \frac{\Delta y_i^2}{2\sigma_y^2}\right)
    /// $$
    ///
    /// A particle with nothing to match gets the weight dictated by
    /// [`EmptyEvidencePolicy`].
    pub fn update_weights(
        &mut self,
        sensor_range: f64,
        std_landmark: &[f64],
        observations: &[LandmarkObs],
        map: &Map,
    ) -> Result<()> {
        self.ensure_initialized()?;
        check_std_devs("std_landmark", std_landmark, 2)?;
        if std_landmark.iter().any(|s| *s <= 0.0) {
            return Err(FilterError::Configuration(
                "std_landmark must be strictly positive".to_string(),
            ));
        }
        if sensor_range.is_nan() {
            return Err(FilterError::Configuration(
                "sensor_range must be a number".to_string(),
            ));
        }
        let (std_x, std_y) = (std_landmark[0], std_landmark[1]);
        let log_norm = -(2.0 * PI * std_x * std_y).ln();
        let empty_weight = match self.config.empty_evidence_policy {
            EmptyEvidencePolicy::Neutral => 1.0,
            EmptyEvidencePolicy::Reject => 0.0,
        };
        let record = self.config.record_associations;

        for particle in self.particles.iter_mut() {
            let pose = particle.pose();
            let in_range: Vec<LandmarkObs> = map
                .landmarks_within(particle.x, particle.y, sensor_range)
                .map(LandmarkObs::from)
                .collect();
            let mut matched: Vec<LandmarkObs> = observations
                .iter()
                .map(|obs| transform_to_map(&pose, obs))
                .collect();
            data_association(&in_range, &mut matched);

            // Summed in log space so mixed underflow and overflow cannot produce NaN.
            particle.weight = if matched.is_empty() {
                empty_weight
            } else {
                let log_weight: f64 = matched
                    .iter()
                    .zip(in_range.iter())
                    .map(|(obs, landmark)| {
                        let exponent = (obs.x - landmark.x).powi(2) / (2.0 * std_x.powi(2))
                            + (obs.y - landmark.y).powi(2) / (2.0 * std_y.powi(2));
                        log_norm - exponent
                    })
                    .sum();
                log_weight.exp()
            };

            if record {
                particle.set_associations(
                    in_range.iter().filter_map(|lm| lm.id).take(matched.len()).collect(),
                    matched.iter().map(|obs| obs.x).collect(),
                    matched.iter().map(|obs| obs.y).collect(),
                );
            }
        }
        debug!(
            "Updated weights from {} observations, effective sample size {:.1}",
            observations.len(),
            self.effective_sample_size()
        );
        Ok(())
    }

    /// Draw a new population with replacement, proportional to weight.
    ///
    /// Selected particles are copied whole, weight included; the weights are not renormalized.
    pub fn resample(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        let n = self.particles.len();
        let weights = finite_scaled(&self.weights());
        let total: f64 = weights.iter().sum();
        let degenerate =
            !(total > 0.0 && total.is_finite()) || weights.iter().any(|w| !(*w >= 0.0));

        let indices = if degenerate {
            match self.config.degenerate_weight_policy {
                DegenerateWeightPolicy::Fail => {
                    return Err(FilterError::DegenerateWeights { total });
                }
                DegenerateWeightPolicy::Uniform => {
                    warn!(
                        "Degenerate particle weights (total {}); resampling uniformly",
                        total
                    );
                    resample_indices(
                        self.config.resampling_strategy,
                        &vec![1.0; n],
                        n,
                        &mut self.rng,
                    )
                }
            }
        } else {
            resample_indices(self.config.resampling_strategy, &weights, n, &mut self.rng)
        };

        let resampled: Vec<Particle> = indices
            .into_iter()
            .map(|i| self.particles[i].clone())
            .collect();
        self.particles = resampled;
        debug!("Resampled {} particles", n);
        Ok(())
    }

    /// Attach diagnostic associations to the particle at `index`.
    pub fn set_associations(
        &mut self,
        index: usize,
        ids: Vec<u32>,
        sense_x: Vec<f64>,
        sense_y: Vec<f64>,
    ) -> Result<()> {
        let len = self.particles.len();
        let particle = self
            .particles
            .get_mut(index)
            .ok_or(FilterError::IndexOutOfRange { index, len })?;
        particle.set_associations(ids, sense_x, sense_y);
        Ok(())
    }

    /// Overwrite all weights. Weights must be finite and non-negative.
    pub fn set_weights(&mut self, weights: &[f64]) -> Result<()> {
        self.ensure_initialized()?;
        if weights.len() != self.particles.len() {
            return Err(FilterError::Configuration(format!(
                "expected {} weights, got {}",
                self.particles.len(),
                weights.len()
            )));
        }
        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(FilterError::Configuration(format!("invalid weight: {bad}")));
        }
        for (particle, &w) in self.particles.iter_mut().zip(weights.iter()) {
            particle.weight = w;
        }
        Ok(())
    }

    /// Weights scaled to sum to one; uniform when the total is zero or not finite.
    pub fn normalized_weights(&self) -> Vec<f64> {
        let weights = finite_scaled(&self.weights());
        let sum: f64 = weights.iter().sum();
        if sum > 0.0 && sum.is_finite() {
            weights.iter().map(|w| w / sum).collect()
        } else {
            let uniform = 1.0 / self.particles.len() as f64;
            vec![uniform; self.particles.len()]
        }
    }

    /// `1 / Σ ŵ²` over the normalized weights; zero for an empty population.
    pub fn effective_sample_size(&self) -> f64 {
        if self.particles.is_empty() {
            return 0.0;
        }
        let sum_of_squares: f64 = self.normalized_weights().iter().map(|w| w * w).sum();
        if sum_of_squares > 0.0 {
            1.0 / sum_of_squares
        } else {
            0.0
        }
    }

    /// The particle with the largest weight (first one on ties).
    pub fn best_particle(&self) -> Option<&Particle> {
        self.particles.iter().fold(None, |best: Option<&Particle>, p| match best {
            Some(b) if b.weight >= p.weight => Some(b),
            _ => Some(p),
        })
    }

    /// Single pose estimate of the population.
    ///
    /// The weighted average uses a circular mean for heading.
    pub fn estimate(&self, strategy: EstimateStrategy) -> Result<Pose> {
        self.ensure_initialized()?;
        match strategy {
            EstimateStrategy::HighestWeight => self
                .best_particle()
                .map(Particle::pose)
                .ok_or(FilterError::Uninitialized),
            EstimateStrategy::WeightedAverage => {
                let weights = self.normalized_weights();
                let mut mean = Pose::default();
                let (mut sin_sum, mut cos_sum) = (0.0, 0.0);
                for (particle, w) in self.particles.iter().zip(weights.iter()) {
                    mean.x += w * particle.x;
                    mean.y += w * particle.y;
                    sin_sum += w * particle.theta.sin();
                    cos_sum += w * particle.theta.cos();
                }
                mean.theta = sin_sum.atan2(cos_sum);
                Ok(mean)
            }
        }
    }

    /// Weighted covariance of `[x, y, theta]` about the weighted mean.
    pub fn covariance(&self) -> Result<Matrix3<f64>> {
        let mean = self.estimate(EstimateStrategy::WeightedAverage)?;
        let weights = self.normalized_weights();
        let mut cov = Matrix3::<f64>::zeros();
        for (particle, w) in self.particles.iter().zip(weights.iter()) {
            let diff = Vector3::new(
                particle.x - mean.x,
                particle.y - mean.y,
                wrap_to_pi(particle.theta - mean.theta),
            );
            cov += *w * diff * diff.transpose();
        }
        Ok(cov)
    }
}

/// Rescale weights whose total is not representable.
///
/// Particles at `+inf` share the mass equally and every finite weight drops to zero. A total that
/// overflows from finite weights is divided by the largest weight. Anything else is returned as is.
fn finite_scaled(weights: &[f64]) -> Vec<f64> {
    let max = weights.iter().copied().fold(0.0, f64::max);
    if max == f64::INFINITY {
        weights
            .iter()
            .map(|w| if *w == f64::INFINITY { 1.0 } else { 0.0 })
            .collect()
    } else if weights.iter().sum::<f64>().is_infinite() {
        weights.iter().map(|w| w / max).collect()
    } else {
        weights.to_vec()
    }
}

fn config_error(e: rand_distr::NormalError) -> FilterError {
    FilterError::Configuration(e.to_string())
}
