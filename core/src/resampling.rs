//! Index-drawing algorithms for resampling.
//!
//! Each function takes a slice of non-negative weights (not necessarily normalized, but with a
//! positive finite total) and returns `n` indices into it, drawn with replacement so that index `i`
//! is expected to appear `n · w_i / Σw` times. The caller builds the new population from them.
use rand::Rng;

use crate::config::ResamplingStrategy;

/// Draw `n` indices with the given strategy.
pub fn resample_indices<R: Rng + ?Sized>(
    strategy: ResamplingStrategy,
    weights: &[f64],
    n: usize,
    rng: &mut R,
) -> Vec<usize> {
    match strategy {
        ResamplingStrategy::Multinomial => multinomial_resample(weights, n, rng),
        ResamplingStrategy::Systematic => systematic_resample(weights, n, rng),
        ResamplingStrategy::Stratified => stratified_resample(weights, n, rng),
        ResamplingStrategy::Residual => residual_resample(weights, n, rng),
    }
}

fn cumulative_sum(weights: &[f64]) -> Vec<f64> {
    let mut acc = 0.0;
    weights
        .iter()
        .map(|w| {
            acc += w;
            acc
        })
        .collect()
}

/// Index of the last positive weight: the first index where the cumulative sum reaches its total.
fn last_positive(cdf: &[f64]) -> usize {
    let total = cdf[cdf.len() - 1];
    cdf.partition_point(|c| *c < total)
}

/// For ascending `positions`, pick the first index whose cumulative weight exceeds each position.
///
/// Positions at or past the total (float rounding) land on the last positive weight.
fn walk_cdf(cdf: &[f64], positions: impl Iterator<Item = f64>) -> Vec<usize> {
    let mut indices = Vec::new();
    if cdf.is_empty() {
        return indices;
    }
    let limit = last_positive(cdf);
    let mut i = 0;
    for u in positions {
        while i < limit && cdf[i] <= u {
            i += 1;
        }
        indices.push(i);
    }
    indices
}

/// Independent draws from the discrete distribution defined by `weights`.
pub fn multinomial_resample<R: Rng + ?Sized>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    if weights.is_empty() {
        return Vec::new();
    }
    let cdf = cumulative_sum(weights);
    let total = cdf[cdf.len() - 1];
    let limit = last_positive(&cdf);
    (0..n)
        .map(|_| {
            let u = rng.random::<f64>() * total;
            cdf.partition_point(|c| *c <= u).min(limit)
        })
        .collect()
}

/// A single random offset followed by `n` equally spaced pointers.
pub fn systematic_resample<R: Rng + ?Sized>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    if weights.is_empty() || n == 0 {
        return Vec::new();
    }
    let cdf = cumulative_sum(weights);
    let step = cdf[cdf.len() - 1] / n as f64;
    let u0 = rng.random::<f64>() * step;
    walk_cdf(&cdf, (0..n).map(|i| u0 + i as f64 * step))
}

/// One uniform draw inside each of `n` equal strata.
pub fn stratified_resample<R: Rng + ?Sized>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    if weights.is_empty() || n == 0 {
        return Vec::new();
    }
    let cdf = cumulative_sum(weights);
    let step = cdf[cdf.len() - 1] / n as f64;
    let positions: Vec<f64> = (0..n)
        .map(|i| (i as f64 + rng.random::<f64>()) * step)
        .collect();
    walk_cdf(&cdf, positions.into_iter())
}

/// Deterministic `floor(n · w_i)` copies, remaining slots filled systematically from the residuals.
pub fn residual_resample<R: Rng + ?Sized>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    if weights.is_empty() || n == 0 {
        return Vec::new();
    }
    let total: f64 = weights.iter().sum();
    let mut indices = Vec::with_capacity(n);
    let mut residual = Vec::with_capacity(weights.len());
    for (i, w) in weights.iter().enumerate() {
        let expected = w / total * n as f64;
        let copies = expected.floor() as usize;
        for _ in 0..copies.min(n - indices.len()) {
            indices.push(i);
        }
        residual.push(expected - copies as f64);
    }
    let remaining = n - indices.len();
    if remaining > 0 {
        let residual_total: f64 = residual.iter().sum();
        if residual_total > 0.0 {
            indices.extend(systematic_resample(&residual, remaining, rng));
        } else {
            indices.extend(systematic_resample(weights, remaining, rng));
        }
    }
    indices
}
