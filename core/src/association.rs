//! Nearest-neighbour data association.
//!
//! Association runs from the landmark side: every predicted landmark is paired with its closest
//! observation. The result therefore has one entry per predicted landmark; observations can be
//! reused by several landmarks or dropped entirely, and there is no gating distance.
use crate::{LandmarkObs, dist};

/// Index of the observation closest to `target`, first one wins on ties.
///
/// Returns `None` when `observations` is empty.
pub fn nearest_observation(target: &LandmarkObs, observations: &[LandmarkObs]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (j, obs) in observations.iter().enumerate() {
        let distance = dist(target.x, target.y, obs.x, obs.y);
        match best {
            None => best = Some((j, distance)),
            Some((_, nearest_distance)) if distance < nearest_distance => {
                best = Some((j, distance))
            }
            _ => {}
        }
    }
    best.map(|(j, _)| j)
}

/// Replace `observations` with the nearest observation of each entry of `predicted`, in order.
///
/// After the call `observations[i]` is the observation closest to `predicted[i]`. When there are no
/// observations to choose from the result is empty.
pub fn data_association(predicted: &[LandmarkObs], observations: &mut Vec<LandmarkObs>) {
    let candidates: &[LandmarkObs] = observations;
    let matched: Vec<LandmarkObs> = predicted
        .iter()
        .filter_map(|landmark| nearest_observation(landmark, candidates))
        .map(|j| candidates[j])
        .collect();
    *observations = matched;
}
