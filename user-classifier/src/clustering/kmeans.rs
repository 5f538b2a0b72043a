//! Lloyd's k-means with greedy k-means++ seeding.
//!
//! Seeding draws `2 + ln(k)` candidates per centre, each with probability proportional
//! to its squared distance from the closest centre chosen so far, and keeps the one that
//! lowers the total potential the most. The generator is re-seeded on every fit, so equal
//! inputs in equal order always give equal labels.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, PartialEq)]
pub struct KMeans {
    pub n_clusters: usize,
    pub max_iterations: usize,
    /// Relative to the mean per-feature variance of the input.
    pub tolerance: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    /// Index of the centroid each row was assigned to.
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub iterations: usize,
    /// Sum of squared distances from each row to its centroid.
    pub inertia: f64,
}

impl KMeansFit {
    /// Number of groups that ended up with at least one member.
    pub fn realized_groups(&self) -> usize {
        let mut seen = vec![false; self.centroids.len()];
        for &label in &self.labels {
            if let Some(seen) = seen.get_mut(label) {
                *seen = true;
            }
        }
        seen.into_iter().filter(|s| *s).count()
    }
}

impl KMeans {
    pub fn new(n_clusters: usize, seed: u64) -> Self {
        Self {
            n_clusters,
            max_iterations: 300,
            tolerance: 1e-4,
            seed,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Partition `rows` into at most `n_clusters` groups. Never fails: with fewer rows
    /// than clusters, or rows that collapse onto each other, fewer centroids are used.
    pub fn fit_predict(&self, rows: &[Vec<f64>]) -> KMeansFit {
        if rows.is_empty() || self.n_clusters == 0 {
            return KMeansFit {
                labels: vec![0; rows.len()],
                centroids: Vec::new(),
                iterations: 0,
                inertia: 0.0,
            };
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let k = self.n_clusters.min(rows.len());
        let mut centroids = init_centroids(rows, k, &mut rng);

        let threshold = self.tolerance * mean_variance(rows);
        let mut labels = assign(rows, &centroids);
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;

            let updated = recompute_centroids(rows, &labels, &centroids);
            let shift: f64 = centroids
                .iter()
                .zip(&updated)
                .map(|(old, new)| squared_distance(old, new))
                .sum();
            centroids = updated;
            labels = assign(rows, &centroids);

            if shift <= threshold {
                break;
            }
        }

        let inertia = rows
            .iter()
            .zip(&labels)
            .map(|(row, &label)| squared_distance(row, &centroids[label]))
            .sum();

        KMeansFit {
            labels,
            centroids,
            iterations,
            inertia,
        }
    }
}

fn init_centroids(rows: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n_local_trials = 2 + (k as f64).ln().floor() as usize;

    let first = rng.gen_range(0..rows.len());
    let mut centroids = vec![rows[first].clone()];

    let mut closest: Vec<f64> = rows
        .iter()
        .map(|row| squared_distance(row, &rows[first]))
        .collect();
    let mut potential: f64 = closest.iter().sum();

    while centroids.len() < k {
        if potential <= 0.0 {
            // Every row already sits on a centroid.
            break;
        }

        let cumulative: Vec<f64> = closest
            .iter()
            .scan(0.0, |acc, d| {
                *acc += d;
                Some(*acc)
            })
            .collect();

        let mut best: Option<(usize, f64, Vec<f64>)> = None;
        for _ in 0..n_local_trials {
            let target = rng.gen::<f64>() * potential;
            let candidate = cumulative
                .partition_point(|&c| c < target)
                .min(rows.len() - 1);

            let distances: Vec<f64> = rows
                .iter()
                .zip(&closest)
                .map(|(row, &current)| current.min(squared_distance(row, &rows[candidate])))
                .collect();
            let candidate_potential: f64 = distances.iter().sum();

            if best
                .as_ref()
                .map_or(true, |(_, best_potential, _)| candidate_potential < *best_potential)
            {
                best = Some((candidate, candidate_potential, distances));
            }
        }

        let Some((chosen, chosen_potential, distances)) = best else {
            break;
        };
        centroids.push(rows[chosen].clone());
        closest = distances;
        potential = chosen_potential;
    }

    centroids
}

/// Nearest centroid per row, ties going to the lowest index.
fn assign(rows: &[Vec<f64>], centroids: &[Vec<f64>]) -> Vec<usize> {
    rows.iter()
        .map(|row| {
            let mut nearest = 0;
            let mut nearest_distance = f64::INFINITY;
            for (i, centroid) in centroids.iter().enumerate() {
                let distance = squared_distance(row, centroid);
                if distance < nearest_distance {
                    nearest = i;
                    nearest_distance = distance;
                }
            }
            nearest
        })
        .collect()
}

/// Mean of the rows assigned to each centroid; a centroid left without rows stays put.
fn recompute_centroids(
    rows: &[Vec<f64>],
    labels: &[usize],
    previous: &[Vec<f64>],
) -> Vec<Vec<f64>> {
    let width = previous.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0; width]; previous.len()];
    let mut counts = vec![0usize; previous.len()];

    for (row, &label) in rows.iter().zip(labels) {
        counts[label] += 1;
        for (sum, value) in sums[label].iter_mut().zip(row) {
            *sum += value;
        }
    }

    sums.into_iter()
        .zip(counts)
        .zip(previous)
        .map(|((mut sum, count), old)| {
            if count == 0 {
                return old.clone();
            }
            for value in sum.iter_mut() {
                *value /= count as f64;
            }
            sum
        })
        .collect()
}

fn mean_variance(rows: &[Vec<f64>]) -> f64 {
    let n = rows.len() as f64;
    let width = rows[0].len();
    if width == 0 {
        return 0.0;
    }

    let total: f64 = (0..width)
        .map(|column| {
            let mean = rows.iter().map(|row| row[column]).sum::<f64>() / n;
            rows.iter().map(|row| (row[column] - mean).powi(2)).sum::<f64>() / n
        })
        .sum();
    total / width as f64
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}
