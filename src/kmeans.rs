//! Iterative relocation clustering for palette training.
//!
//! Standard k-means with k-means++ style seeding: the first center is drawn
//! uniformly, later ones proportionally to their squared distance from the
//! centers chosen so far, then a bounded number of relocation passes refine
//! the result. Zero-variance sample sets are legal and simply converge to
//! duplicated centers.

use crate::color::distance_sq;
use rand::Rng;

/// Relocation passes stop once no center moves further than this (squared).
const CONVERGENCE_SQ: f32 = 1e-4;

/// Cluster `samples` into exactly `k` centers.
///
/// Returns fewer than `k` centers only when `samples` is empty. Callers are
/// expected to filter empty sample sets out beforehand; duplicated centers
/// (from degenerate input) are returned as-is.
pub fn cluster<R: Rng>(
    samples: &[[f32; 3]],
    k: usize,
    max_iterations: usize,
    rng: &mut R,
) -> Vec<[f32; 3]> {
    if samples.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut centers = seed_centers(samples, k, rng);
    let mut assignment = vec![0usize; samples.len()];

    for _ in 0..max_iterations {
        for (i, sample) in samples.iter().enumerate() {
            assignment[i] = nearest_center(sample, &centers);
        }

        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (i, sample) in samples.iter().enumerate() {
            let c = assignment[i];
            counts[c] += 1;
            for ch in 0..3 {
                sums[c][ch] += sample[ch] as f64;
            }
        }

        let mut moved_sq = 0.0f32;
        for c in 0..k {
            // an empty cluster keeps its previous center
            if counts[c] == 0 {
                continue;
            }
            let next = [
                (sums[c][0] / counts[c] as f64) as f32,
                (sums[c][1] / counts[c] as f64) as f32,
                (sums[c][2] / counts[c] as f64) as f32,
            ];
            moved_sq = moved_sq.max(distance_sq(&centers[c], &next));
            centers[c] = next;
        }

        if moved_sq < CONVERGENCE_SQ {
            break;
        }
    }

    centers
}

fn nearest_center(sample: &[f32; 3], centers: &[[f32; 3]]) -> usize {
    let mut best = 0;
    let mut best_d = f32::INFINITY;
    for (c, center) in centers.iter().enumerate() {
        let d = distance_sq(sample, center);
        if d < best_d {
            best_d = d;
            best = c;
        }
    }
    best
}

fn seed_centers<R: Rng>(samples: &[[f32; 3]], k: usize, rng: &mut R) -> Vec<[f32; 3]> {
    let mut centers = Vec::with_capacity(k);
    centers.push(samples[rng.gen_range(0..samples.len())]);

    let mut weights = vec![0.0f64; samples.len()];
    while centers.len() < k {
        let mut total = 0.0f64;
        for (i, sample) in samples.iter().enumerate() {
            let d = centers
                .iter()
                .map(|c| distance_sq(sample, c))
                .fold(f32::INFINITY, f32::min) as f64;
            weights[i] = d;
            total += d;
        }

        if total <= f64::EPSILON {
            // all samples coincide with a chosen center; duplicate one
            centers.push(samples[rng.gen_range(0..samples.len())]);
            continue;
        }

        let mut r = rng.gen_range(0.0..total);
        let mut chosen = samples.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            r -= w;
            if r <= 0.0 {
                chosen = i;
                break;
            }
        }
        centers.push(samples[chosen]);
    }

    centers
}
