//! Lloyd's k-means with seeded k-means++ initialisation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::DomainError;

/// Narrow clustering seam: partition `data` into `k` groups and return one cluster id in
/// `0..k` per row.
pub trait Clusterer {
    fn fit(&self, data: &[Vec<f64>], k: usize) -> Result<Vec<usize>, DomainError>;
}

/// Lloyd's k-means with k-means++ seeding
#[derive(Clone, Debug, PartialEq)]
pub struct KMeans {
    /// Seeds the one RNG shared by every restart
    pub seed: u64,
    pub max_iterations: usize,
    /// Independent k-means++ seedings; the lowest-inertia run wins.
    pub restarts: usize,
    /// Convergence threshold on the largest centroid movement.
    pub tolerance: f64,
}

impl Default for KMeans {
    fn default() -> Self {
        Self { seed: 42, max_iterations: 300, restarts: 10, tolerance: 1e-4 }
    }
}

/// Best run of a fit
#[derive(Clone, Debug, PartialEq)]
pub struct KMeansFit {
    /// Cluster id per input row
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// Sum of squared distances to assigned centroids
    pub inertia: f64,
    pub iterations: usize,
}

impl KMeans {
    pub fn fit_detailed(&self, data: &[Vec<f64>], k: usize) -> Result<KMeansFit, DomainError> {
        if data.is_empty() {
            return Err(DomainError::InsufficientData { operation: "kmeans", rows: 0 });
        }
        if k == 0 || k > data.len() {
            return Err(DomainError::InvalidParameter {
                operation: "kmeans",
                parameter: "k",
                value: k.to_string(),
                reason: format!("must be in 1..={}", data.len()),
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<KMeansFit> = None;
        for _ in 0..self.restarts.max(1) {
            let centroids = seed_centroids(data, k, &mut rng);
            let fit = self.lloyd(data, centroids);
            if best.as_ref().map_or(true, |current| fit.inertia < current.inertia) {
                best = Some(fit);
            }
        }

        best.ok_or(DomainError::InsufficientData { operation: "kmeans", rows: data.len() })
    }

    fn lloyd(&self, data: &[Vec<f64>], mut centroids: Vec<Vec<f64>>) -> KMeansFit {
        let k = centroids.len();
        let mut assignments = vec![usize::MAX; data.len()];
        let mut iterations = 0;

        for iteration in 0..self.max_iterations.max(1) {
            iterations = iteration + 1;
            let changed = assign(data, &centroids, &mut assignments);
            let relocated = fill_empty_clusters(data, &centroids, &mut assignments, k);
            if !changed && !relocated {
                break;
            }

            let shift = update_centroids(data, &assignments, &mut centroids);
            if shift <= self.tolerance * self.tolerance {
                assign(data, &centroids, &mut assignments);
                fill_empty_clusters(data, &centroids, &mut assignments, k);
                break;
            }
        }

        let inertia = data
            .iter()
            .zip(&assignments)
            .map(|(point, &cluster)| distance_sq(point, &centroids[cluster]))
            .sum();

        KMeansFit { assignments, centroids, inertia, iterations }
    }
}

impl Clusterer for KMeans {
    fn fit(&self, data: &[Vec<f64>], k: usize) -> Result<Vec<usize>, DomainError> {
        self.fit_detailed(data, k).map(|fit| fit.assignments)
    }
}

/// k-means++: first centroid uniform, each next one drawn proportionally to the squared
/// distance from the nearest centroid chosen so far.
fn seed_centroids(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.gen_range(0..data.len())].clone());
    let mut closest: Vec<f64> = data.iter().map(|point| distance_sq(point, &centroids[0])).collect();

    while centroids.len() < k {
        let total: f64 = closest.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = None;
            for (index, &weight) in closest.iter().enumerate() {
                if weight <= 0.0 {
                    continue;
                }
                chosen = Some(index);
                if target < weight {
                    break;
                }
                target -= weight;
            }
            chosen.unwrap_or(0)
        } else {
            // every point already coincides with a centroid
            rng.gen_range(0..data.len())
        };

        centroids.push(data[next].clone());
        if let Some(latest) = centroids.last() {
            for (slot, point) in closest.iter_mut().zip(data) {
                *slot = slot.min(distance_sq(point, latest));
            }
        }
    }

    centroids
}

/// Nearest-centroid assignment; ties go to the lowest cluster id.
fn assign(data: &[Vec<f64>], centroids: &[Vec<f64>], assignments: &mut [usize]) -> bool {
    let mut changed = false;
    for (point, slot) in data.iter().zip(assignments.iter_mut()) {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (cluster, centroid) in centroids.iter().enumerate() {
            let distance = distance_sq(point, centroid);
            if distance < best_distance {
                best = cluster;
                best_distance = distance;
            }
        }
        if *slot != best {
            *slot = best;
            changed = true;
        }
    }
    changed
}

/// Moves the point farthest from its centroid into each empty cluster. Points that are
/// the only member of their own cluster are never taken.
fn fill_empty_clusters(
    data: &[Vec<f64>],
    centroids: &[Vec<f64>],
    assignments: &mut [usize],
    k: usize,
) -> bool {
    let mut counts = vec![0usize; k];
    for &cluster in assignments.iter() {
        counts[cluster] += 1;
    }

    let mut relocated = false;
    for empty in 0..k {
        if counts[empty] > 0 {
            continue;
        }
        let candidate = data
            .iter()
            .enumerate()
            .filter(|(index, _)| counts[assignments[*index]] > 1)
            .map(|(index, point)| (index, distance_sq(point, &centroids[assignments[index]])))
            .filter(|(_, distance)| *distance > 0.0)
            .fold(None, |best: Option<(usize, f64)>, current| match best {
                Some(best) if best.1 >= current.1 => Some(best),
                _ => Some(current),
            });

        if let Some((index, _)) = candidate {
            counts[assignments[index]] -= 1;
            assignments[index] = empty;
            counts[empty] = 1;
            relocated = true;
        }
    }
    relocated
}

/// Recomputes centroids as member means and returns the largest squared movement.
fn update_centroids(data: &[Vec<f64>], assignments: &[usize], centroids: &mut [Vec<f64>]) -> f64 {
    let dim = centroids.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0; dim]; centroids.len()];
    let mut counts = vec![0usize; centroids.len()];
    for (point, &cluster) in data.iter().zip(assignments) {
        counts[cluster] += 1;
        for (sum, value) in sums[cluster].iter_mut().zip(point) {
            *sum += value;
        }
    }

    let mut max_shift = 0.0_f64;
    for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
        if count == 0 {
            continue;
        }
        let updated: Vec<f64> = sum.into_iter().map(|value| value / count as f64).collect();
        max_shift = max_shift.max(distance_sq(centroid, &updated));
        *centroid = updated;
    }
    max_shift
}

pub(crate) fn distance_sq(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::{Clusterer, KMeans};
    use crate::errors::DomainError;

    fn blobs() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 0.1],
            vec![0.2, 0.0],
            vec![0.1, 0.2],
            vec![10.0, 10.1],
            vec![10.2, 9.9],
            vec![9.9, 10.0],
        ]
    }

    #[test]
    fn separates_well_spaced_groups() {
        let assignments = KMeans::default().fit(&blobs(), 2).expect("fit");

        assert_eq!(assignments[0], assignments[1]);
        assert_eq!(assignments[1], assignments[2]);
        assert_eq!(assignments[3], assignments[4]);
        assert_eq!(assignments[4], assignments[5]);
        assert_ne!(assignments[0], assignments[3]);
    }

    #[test]
    fn identical_seed_gives_identical_fit() {
        let kmeans = KMeans { restarts: 3, ..KMeans::default() };

        let first = kmeans.fit_detailed(&blobs(), 3).expect("fit");
        let second = kmeans.fit_detailed(&blobs(), 3).expect("fit");

        assert_eq!(first, second);
    }

    #[test]
    fn k_equal_to_rows_puts_each_point_alone() {
        let data = vec![vec![1.0], vec![2.0], vec![4.0], vec![8.0]];

        let mut assignments = KMeans::default().fit(&data, 4).expect("fit");
        assignments.sort_unstable();

        assert_eq!(assignments, vec![0, 1, 2, 3]);
    }

    #[test]
    fn every_cluster_is_used_when_points_are_distinct() {
        let data: Vec<Vec<f64>> = (0..12).map(|i| vec![f64::from(i), 0.0]).collect();

        let fit = KMeans::default().fit_detailed(&data, 5).expect("fit");

        for cluster in 0..5 {
            assert!(fit.assignments.contains(&cluster), "cluster {cluster} is empty");
        }
        assert!(fit.inertia.is_finite());
    }

    #[test]
    fn rejects_invalid_k_and_empty_data() {
        let kmeans = KMeans::default();

        assert!(matches!(
            kmeans.fit(&blobs(), 7),
            Err(DomainError::InvalidParameter { parameter: "k", .. })
        ));
        assert!(matches!(kmeans.fit(&blobs(), 0), Err(DomainError::InvalidParameter { .. })));
        assert!(matches!(kmeans.fit(&[], 1), Err(DomainError::InsufficientData { .. })));
    }
}
