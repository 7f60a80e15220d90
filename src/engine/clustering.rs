//! Gaussian-mixture clustering of detection locations.
//!
//! The offline variant has no per-event association. Instead, every
//! detection location is clustered at once with an
//! expectation-maximization fit of a Gaussian mixture, and the fitted
//! clusters are matched to the surveyed buoys afterwards. When two
//! fitted means land closer than a merge threshold the component count
//! is reduced by one and the fit repeats, down to a single component.

use log::{debug, warn};
use nalgebra::{Matrix2, Vector2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::association::gaussian;
use crate::core::types::{Covariance2D, Point2D};
use crate::error::{Error, Result};

/// Ridge added to every fitted covariance diagonal.
const REG_COVAR: f64 = 1e-6;
/// Cap on expectation-maximization sweeps per fit.
const MAX_ITERATIONS: usize = 100;
/// Convergence threshold on the mean per-point log-likelihood change.
const TOLERANCE: f64 = 1e-3;

/// A fitted two-dimensional Gaussian mixture.
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    pub means: Vec<Point2D>,
    pub covariances: Vec<Covariance2D>,
    pub weights: Vec<f64>,
}

impl GaussianMixture {
    pub fn components(&self) -> usize {
        self.means.len()
    }

    /// Component with the highest weighted density at a point.
    pub fn classify(&self, point: &Point2D) -> Result<usize> {
        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (index, ((mean, covariance), weight)) in self
            .means
            .iter()
            .zip(&self.covariances)
            .zip(&self.weights)
            .enumerate()
        {
            let score = weight * gaussian::pdf(point, mean, covariance)?;
            if score > best_score {
                best_score = score;
                best = index;
            }
        }
        Ok(best)
    }

    /// Component label for every point in turn.
    pub fn classify_all(&self, points: &[Point2D]) -> Result<Vec<usize>> {
        points.iter().map(|p| self.classify(p)).collect()
    }

    /// Smallest squared distance between any two component means.
    fn closest_pair_squared(&self) -> Option<f64> {
        let mut closest: Option<f64> = None;
        for i in 0..self.means.len() {
            for j in i + 1..self.means.len() {
                let d = self.means[i].distance_squared(&self.means[j]);
                closest = Some(closest.map_or(d, |c: f64| c.min(d)));
            }
        }
        closest
    }
}

/// Fit a mixture with a fixed component count.
///
/// Means are seeded by farthest-point selection from a seeded RNG, so
/// repeat runs over the same data produce the same model.
pub fn fit(points: &[Point2D], components: usize, seed: u64) -> Result<GaussianMixture> {
    if points.is_empty() || components == 0 {
        return Err(Error::SolverFailure(
            "mixture fit needs at least one point and one component".to_string(),
        ));
    }
    let k = components.min(points.len());
    if k < components {
        warn!(
            "only {} detection location(s) for {} components, fitting {}",
            points.len(),
            components,
            k
        );
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut means = Vec::with_capacity(k);
    means.push(points[rng.random_range(0..points.len())]);
    while means.len() < k {
        let mut pick = points[0];
        let mut pick_distance = f64::NEG_INFINITY;
        for point in points {
            let nearest = means
                .iter()
                .map(|m: &Point2D| m.distance_squared(point))
                .fold(f64::INFINITY, f64::min);
            if nearest > pick_distance {
                pick_distance = nearest;
                pick = *point;
            }
        }
        means.push(pick);
    }

    let spread = sample_covariance(points);
    let mut model = GaussianMixture {
        means,
        covariances: vec![spread; k],
        weights: vec![1.0 / k as f64; k],
    };

    let mut previous = f64::NEG_INFINITY;
    for iteration in 0..MAX_ITERATIONS {
        let (responsibilities, log_likelihood) = expectation(points, &model)?;
        maximization(points, &responsibilities, &mut model);
        let mean_ll = log_likelihood / points.len() as f64;
        if (mean_ll - previous).abs() < TOLERANCE {
            debug!("mixture fit converged after {} sweep(s)", iteration + 1);
            break;
        }
        previous = mean_ll;
    }
    Ok(model)
}

/// Fit a mixture, reducing the component count while any two fitted
/// means sit within `merge_threshold` of each other. Never reduces
/// below one component.
pub fn fit_with_reduction(
    points: &[Point2D],
    components: usize,
    merge_threshold: f64,
    seed: u64,
) -> Result<GaussianMixture> {
    let mut k = components.min(points.len()).max(1);
    loop {
        let model = fit(points, k, seed)?;
        let too_close = model
            .closest_pair_squared()
            .is_some_and(|d| d < merge_threshold * merge_threshold);
        if k <= 1 || !too_close {
            return Ok(model);
        }
        debug!(
            "two cluster means within {merge_threshold} m, refitting with {} component(s)",
            k - 1
        );
        k -= 1;
    }
}

/// Weighted component memberships per point, plus the total
/// log-likelihood of the data under the model.
fn expectation(points: &[Point2D], model: &GaussianMixture) -> Result<(Vec<Vec<f64>>, f64)> {
    let k = model.components();
    let mut responsibilities = vec![vec![0.0; k]; points.len()];
    let mut log_likelihood = 0.0;
    for (row, point) in responsibilities.iter_mut().zip(points) {
        let mut total = 0.0;
        for (slot, ((mean, covariance), weight)) in row
            .iter_mut()
            .zip(model.means.iter().zip(&model.covariances).zip(&model.weights))
        {
            *slot = weight * gaussian::pdf(point, mean, covariance)?;
            total += *slot;
        }
        if total > 0.0 {
            for slot in row.iter_mut() {
                *slot /= total;
            }
            log_likelihood += total.ln();
        } else {
            // Numerically impossible point; share it evenly.
            for slot in row.iter_mut() {
                *slot = 1.0 / k as f64;
            }
        }
    }
    Ok((responsibilities, log_likelihood))
}

fn maximization(points: &[Point2D], responsibilities: &[Vec<f64>], model: &mut GaussianMixture) {
    let n = points.len() as f64;
    for component in 0..model.components() {
        let mass: f64 = responsibilities
            .iter()
            .map(|row| row[component])
            .sum::<f64>()
            .max(1e-12);
        let mut mean = Vector2::zeros();
        for (row, point) in responsibilities.iter().zip(points) {
            mean += Vector2::new(point.x, point.y) * row[component];
        }
        mean /= mass;
        let mut scatter = Matrix2::zeros();
        for (row, point) in responsibilities.iter().zip(points) {
            let d = Vector2::new(point.x - mean.x, point.y - mean.y);
            scatter += d * d.transpose() * row[component];
        }
        scatter = scatter / mass + Matrix2::identity() * REG_COVAR;
        model.means[component] = Point2D::new(mean.x, mean.y);
        model.covariances[component] = Covariance2D::from_matrix(&scatter);
        model.weights[component] = mass / n;
    }
}

fn sample_covariance(points: &[Point2D]) -> Covariance2D {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mut m = Matrix2::zeros();
    for point in points {
        let d = Vector2::new(point.x - mean_x, point.y - mean_y);
        m += d * d.transpose();
    }
    Covariance2D::from_matrix(&(m / n + Matrix2::identity() * REG_COVAR))
}

/// Buoy-to-cluster correspondence, `-1` where unassigned.
#[derive(Debug, Clone, Default)]
pub struct ClusterAssignment {
    /// Cluster index per buoy.
    pub buoy_to_cluster: Vec<i64>,
    /// Buoy index per cluster.
    pub cluster_to_buoy: Vec<i64>,
}

/// Match fitted clusters to surveyed buoys.
///
/// Scores every ordered choice of buoys against the cluster means on
/// summed squared distance and keeps the best. Landmark counts are
/// small, so brute force over the permutations is fine. Buoys left
/// over when there are fewer clusters than buoys stay at `-1`.
pub fn assign_clusters(buoy_priors: &[Point2D], cluster_means: &[Point2D]) -> ClusterAssignment {
    let mut assignment = ClusterAssignment {
        buoy_to_cluster: vec![-1; buoy_priors.len()],
        cluster_to_buoy: vec![-1; cluster_means.len()],
    };
    let mut best: Option<(f64, Vec<usize>)> = None;
    for candidate in permutations(buoy_priors.len(), cluster_means.len()) {
        let score = candidate
            .iter()
            .zip(cluster_means)
            .map(|(&buoy, mean)| buoy_priors[buoy].distance_squared(mean))
            .sum::<f64>();
        if best.as_ref().is_none_or(|(s, _)| score < *s) {
            best = Some((score, candidate));
        }
    }
    if let Some((_, choice)) = best {
        for (cluster, &buoy) in choice.iter().enumerate() {
            assignment.buoy_to_cluster[buoy] = cluster as i64;
            assignment.cluster_to_buoy[cluster] = buoy as i64;
        }
    }
    assignment
}

/// All ways to pick and order `take` items out of `0..n`.
fn permutations(n: usize, take: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    let mut used = vec![false; n];
    let mut current = Vec::with_capacity(take);
    permute_into(n, take, &mut used, &mut current, &mut out);
    out
}

fn permute_into(
    n: usize,
    take: usize,
    used: &mut Vec<bool>,
    current: &mut Vec<usize>,
    out: &mut Vec<Vec<usize>>,
) {
    if current.len() == take {
        out.push(current.clone());
        return;
    }
    for candidate in 0..n {
        if used[candidate] {
            continue;
        }
        used[candidate] = true;
        current.push(candidate);
        permute_into(n, take, used, current, out);
        current.pop();
        used[candidate] = false;
    }
}
