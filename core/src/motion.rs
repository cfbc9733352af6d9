//! Constant-turn-rate motion model
//!
//! Given a pose $(x, y, \theta)$, a commanded speed $v$ and yaw rate $\omega$ held for $\Delta t$:
//!
//! $$
//! \theta' = \theta + \omega \Delta t, \quad
//! x' = x + \frac{v}{\omega}\left(\sin\theta' - \sin\theta\right), \quad
//! y' = y + \frac{v}{\omega}\left(\cos\theta - \cos\theta'\right)
//! $$
//!
//! The model has a single formula path. Yaw rates with magnitude below [`MIN_YAW_RATE`] are replaced
//! by `MIN_YAW_RATE` itself (a slight arc instead of a straight line), so $\omega = 0$ and
//! $\omega = 10^{-5}$ give identical results. The error against the exact straight-line model is
//! bounded by $v \Delta t \cdot \omega_{min} \Delta t / 2$.
use crate::Pose;

/// Yaw rates smaller than this in magnitude are clamped to it.
pub const MIN_YAW_RATE: f64 = 1e-5;

/// Apply the yaw-rate clamp.
///
/// The clamp yields the positive threshold regardless of the sign of `yaw_rate`.
pub fn clamp_yaw_rate(yaw_rate: f64) -> f64 {
    if yaw_rate.abs() < MIN_YAW_RATE {
        MIN_YAW_RATE
    } else {
        yaw_rate
    }
}

/// Noiseless pose after holding `velocity` and `yaw_rate` for `delta_t` seconds.
pub fn predict_pose(pose: &Pose, delta_t: f64, velocity: f64, yaw_rate: f64) -> Pose {
    let yaw_rate = clamp_yaw_rate(yaw_rate);
    let theta_f = pose.theta + yaw_rate * delta_t;
    let x_f = pose.x + (velocity / yaw_rate) * (theta_f.sin() - pose.theta.sin());
    let y_f = pose.y + (velocity / yaw_rate) * (pose.theta.cos() - theta_f.cos());
    Pose::new(x_f, y_f, theta_f)
}
