//! Landmark particle filter toolbox
//!
//! This crate implements a Sequential Importance Resampling (SIR) particle filter that localizes a
//! planar agent against a known, static map of point landmarks. The agent is driven by noisy motion
//! commands (elapsed time, linear velocity, yaw rate) and observes landmarks as noisy (x, y) points
//! in its own vehicle frame. The observations carry no landmark identity; association to the map is
//! part of the filter.
//!
//! The filter is organized as a fixed cycle that an external driver runs once per time step:
//!
//! 1. [`ParticleFilter::init`] seeds the population from a Gaussian prior (runs once).
//! 2. [`ParticleFilter::prediction`] advances every particle with the constant-turn-rate motion model
//!    in [`motion`] plus Gaussian process noise.
//! 3. [`ParticleFilter::update_weights`] transforms the observations into the map frame using each
//!    particle's pose, associates them to the in-range landmarks with [`association::data_association`]
//!    and multiplies together the bivariate Gaussian likelihood of every matched pair.
//! 4. [`ParticleFilter::resample`] draws a new population with replacement, proportional to weight.
//!
//! ## Coordinate conventions
//!
//! Poses are $x = [p_x, p_y, \theta]$ in the map frame with $\theta$ in radians, measured counter
//! clockwise from the map x-axis. Heading is not wrapped by the filter; it is only consumed through
//! $\sin$ and $\cos$. A vehicle-frame observation $(x_o, y_o)$ seen from a particle at
//! $(p_x, p_y, \theta)$ maps to
//!
//! $$
//! x_m = p_x + \cos\theta \, x_o - \sin\theta \, y_o, \qquad
//! y_m = p_y + \sin\theta \, x_o + \cos\theta \, y_o
//! $$
//!
//! ## Randomness
//!
//! The filter owns a seeded [`rand::rngs::StdRng`]. The same seed and inputs reproduce a run exactly,
//! which is what the tests rely on.
//!
//! Loading maps and logs from disk lives in [`data`]; a synthetic scenario generator and the
//! end-to-end driver loop live in [`sim`]. Neither is needed to use the filter itself.

pub mod association;
pub mod config;
pub mod data;
pub mod error;
pub mod motion;
pub mod particle;
pub mod resampling;
pub mod sim;

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

pub use config::{
    DegenerateWeightPolicy, EmptyEvidencePolicy, EstimateStrategy, FilterConfig,
    ResamplingStrategy,
};
pub use data::Map;
pub use error::{FilterError, Result};
pub use particle::{Associations, Coordinate, Particle, ParticleFilter};

/// Planar pose in the map frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// x position (m)
    pub x: f64,
    /// y position (m)
    pub y: f64,
    /// heading (rad)
    pub theta: f64,
}
impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose { x, y, theta }
    }
}
impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose {{ x: {:.4}, y: {:.4}, theta: {:.4} rad }}",
            self.x, self.y, self.theta
        )
    }
}

/// A landmark observation.
///
/// Before [`transform_to_map`] the coordinates are relative to the vehicle; afterwards they are in the
/// map frame. `id` is `None` until something assigns one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkObs {
    pub id: Option<u32>,
    pub x: f64,
    pub y: f64,
}
impl LandmarkObs {
    /// Unassociated observation at `(x, y)`.
    pub fn new(x: f64, y: f64) -> Self {
        LandmarkObs { id: None, x, y }
    }
    pub fn with_id(id: u32, x: f64, y: f64) -> Self {
        LandmarkObs { id: Some(id), x, y }
    }
}

/// A fixed map landmark.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: u32,
    pub x: f64,
    pub y: f64,
}
impl Landmark {
    pub fn new(id: u32, x: f64, y: f64) -> Self {
        Landmark { id, x, y }
    }
}
impl From<&Landmark> for LandmarkObs {
    fn from(landmark: &Landmark) -> Self {
        LandmarkObs::with_id(landmark.id, landmark.x, landmark.y)
    }
}

/// Euclidean distance between two points.
pub fn dist(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt()
}

/// Rotate then translate a vehicle-frame observation into the map frame as seen from `pose`.
///
/// The observation keeps its `id`.
pub fn transform_to_map(pose: &Pose, observation: &LandmarkObs) -> LandmarkObs {
    let (sin_theta, cos_theta) = pose.theta.sin_cos();
    LandmarkObs {
        id: observation.id,
        x: pose.x + (cos_theta * observation.x) - (sin_theta * observation.y),
        y: pose.y + (sin_theta * observation.x) + (cos_theta * observation.y),
    }
}

/// Inverse of [`transform_to_map`]: express a map-frame point in the vehicle frame of `pose`.
pub fn transform_to_vehicle(pose: &Pose, x: f64, y: f64) -> LandmarkObs {
    let (sin_theta, cos_theta) = pose.theta.sin_cos();
    let dx = x - pose.x;
    let dy = y - pose.y;
    LandmarkObs::new(cos_theta * dx + sin_theta * dy, -sin_theta * dx + cos_theta * dy)
}

/// Wrap an angle in radians to the range (-π, π].
pub fn wrap_to_pi(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(2.0 * std::f64::consts::PI);
    if wrapped > std::f64::consts::PI {
        wrapped - 2.0 * std::f64::consts::PI
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_dist() {
        assert_eq!(dist(0.0, 0.0, 3.0, 4.0), 5.0);
        assert_eq!(dist(1.0, 1.0, 1.0, 1.0), 0.0);
        assert_eq!(dist(-1.0, 0.0, 2.0, 4.0), 5.0);
    }
    #[test]
    fn test_transform_identity_pose() {
        let obs = LandmarkObs::new(2.0, -1.0);
        let mapped = transform_to_map(&Pose::default(), &obs);
        assert_eq!(mapped.x, 2.0);
        assert_eq!(mapped.y, -1.0);
        assert_eq!(mapped.id, None);
    }
    #[test]
    fn test_transform_rotation_and_translation() {
        // Particle at (4, 5) facing -90 degrees sees a landmark 2 m ahead and 2 m to the left.
        let pose = Pose::new(4.0, 5.0, -FRAC_PI_2);
        let mapped = transform_to_map(&pose, &LandmarkObs::with_id(7, 2.0, 2.0));
        assert_approx_eq!(mapped.x, 6.0, 1e-12);
        assert_approx_eq!(mapped.y, 3.0, 1e-12);
        assert_eq!(mapped.id, Some(7));
    }
    #[test]
    fn test_transform_to_vehicle_inverts_transform_to_map() {
        let pose = Pose::new(-3.0, 8.5, 0.7);
        let local = transform_to_vehicle(&pose, 10.0, -2.0);
        let back = transform_to_map(&pose, &local);
        assert_approx_eq!(back.x, 10.0, 1e-12);
        assert_approx_eq!(back.y, -2.0, 1e-12);
    }
    #[test]
    fn test_wrap_to_pi() {
        assert_eq!(wrap_to_pi(0.0), 0.0);
        assert_approx_eq!(wrap_to_pi(1.5 * PI), -FRAC_PI_2, 1e-12);
        assert_approx_eq!(wrap_to_pi(-1.5 * PI), FRAC_PI_2, 1e-12);
        assert_approx_eq!(wrap_to_pi(FRAC_PI_2 + 2.0 * PI), FRAC_PI_2, 1e-12);
        assert_approx_eq!(wrap_to_pi(-0.25), -0.25, 1e-12);
    }
    #[test]
    fn test_landmark_to_observation() {
        let lm = Landmark::new(3, 1.5, -2.5);
        let obs = LandmarkObs::from(&lm);
        assert_eq!(obs, LandmarkObs::with_id(3, 1.5, -2.5));
    }
}
