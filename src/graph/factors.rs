//! Factor types and their measurement models.
//!
//! Four factor types cover the whole estimation problem:
//!
//! - [`Factor::PosePrior`] anchors the first pose and fixes the gauge
//! - [`Factor::PointPrior`] constrains a landmark, with full 2x2
//!   covariance so rope priors can be anisotropic
//! - [`Factor::Between`] chains consecutive poses with dead-reckoning
//!   increments
//! - [`Factor::BearingRange`] ties a pose to a point landmark through a
//!   sonar observation
//!
//! Residuals and Jacobians are whitened: each factor folds its noise
//! model in, so the solver accumulates plain `JᵀJ` and `Jᵀr` blocks.

use nalgebra::{Cholesky, DMatrix, DVector, Matrix2, Vector2};

use crate::core::math::normalize_angle;
use crate::core::types::{Covariance2D, Point2D, Pose2D};
use crate::error::{Error, Result};
use crate::graph::values::{Values, VarKey};

/// Guard against division by zero when a pose coincides with a landmark.
const MIN_RANGE_SQ: f64 = 1e-12;

/// Diagonal noise model for SE(2) residuals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseNoise {
    /// Standard deviation along x, in meters
    pub sigma_x: f64,
    /// Standard deviation along y, in meters
    pub sigma_y: f64,
    /// Standard deviation of heading, in radians
    pub sigma_theta: f64,
}

impl PoseNoise {
    /// Create from per-axis sigmas.
    pub fn new(sigma_x: f64, sigma_y: f64, sigma_theta: f64) -> Self {
        Self {
            sigma_x,
            sigma_y,
            sigma_theta,
        }
    }

    /// Same sigma for both translation axes.
    pub fn planar(sigma_xy: f64, sigma_theta: f64) -> Self {
        Self::new(sigma_xy, sigma_xy, sigma_theta)
    }

    /// Whitening weights, one per residual row.
    #[inline]
    fn weights(&self) -> [f64; 3] {
        [
            1.0 / self.sigma_x,
            1.0 / self.sigma_y,
            1.0 / self.sigma_theta,
        ]
    }
}

/// Diagonal noise model for bearing-range residuals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BearingRangeNoise {
    /// Standard deviation of bearing, in radians
    pub sigma_bearing: f64,
    /// Standard deviation of range, in meters
    pub sigma_range: f64,
}

impl BearingRangeNoise {
    /// Create from bearing and range sigmas.
    pub fn new(sigma_bearing: f64, sigma_range: f64) -> Self {
        Self {
            sigma_bearing,
            sigma_range,
        }
    }

    /// Whitening weights, one per residual row.
    #[inline]
    fn weights(&self) -> [f64; 2] {
        [1.0 / self.sigma_bearing, 1.0 / self.sigma_range]
    }
}

/// Whitened linearization of a factor at the current estimate.
#[derive(Debug, Clone)]
pub struct Linearized {
    /// Whitened Jacobian blocks, one per involved variable
    pub blocks: Vec<(VarKey, DMatrix<f64>)>,
    /// Whitened residual
    pub residual: DVector<f64>,
}

/// A measurement constraint between graph variables.
#[derive(Debug, Clone)]
pub enum Factor {
    /// Unary prior on an SE(2) pose
    PosePrior {
        /// Constrained pose variable
        key: VarKey,
        /// Prior pose value
        prior: Pose2D,
        /// Diagonal noise model
        noise: PoseNoise,
    },

    /// Unary prior on a planar point with full covariance
    PointPrior {
        /// Constrained point variable
        key: VarKey,
        /// Prior point value
        prior: Point2D,
        /// Square-root information matrix `W` with `WᵀW = Σ⁻¹`
        sqrt_information: Matrix2<f64>,
    },

    /// Relative SE(2) constraint between two poses
    Between {
        /// Earlier pose
        from: VarKey,
        /// Later pose
        to: VarKey,
        /// Measured relative transform `from⁻¹ ∘ to`
        delta: Pose2D,
        /// Diagonal noise model
        noise: PoseNoise,
    },

    /// Bearing-range observation of a point landmark from a pose
    BearingRange {
        /// Observing pose
        pose: VarKey,
        /// Observed point landmark
        target: VarKey,
        /// Measured bearing in the pose frame, radians
        bearing: f64,
        /// Measured range in meters
        range: f64,
        /// Diagonal noise model
        noise: BearingRangeNoise,
    },
}

impl Factor {
    /// Prior factor anchoring a pose.
    pub fn pose_prior(key: VarKey, prior: Pose2D, noise: PoseNoise) -> Self {
        Factor::PosePrior { key, prior, noise }
    }

    /// Prior factor constraining a point with full positional covariance.
    ///
    /// The covariance is factored into a whitening matrix up front.
    /// Errors when it is not positive definite, which happens for
    /// degenerate rope geometry (coincident endpoints with scaled
    /// sigmas).
    pub fn point_prior(key: VarKey, prior: Point2D, covariance: Covariance2D) -> Result<Self> {
        let chol = Cholesky::new(covariance.to_matrix()).ok_or_else(|| {
            Error::SolverFailure(format!(
                "prior covariance on {} is not positive definite",
                key
            ))
        })?;
        let sqrt_information = chol.l().try_inverse().ok_or_else(|| {
            Error::SolverFailure(format!("prior covariance on {} is singular", key))
        })?;
        Ok(Factor::PointPrior {
            key,
            prior,
            sqrt_information,
        })
    }

    /// Odometry factor between two consecutive poses.
    pub fn between(from: VarKey, to: VarKey, delta: Pose2D, noise: PoseNoise) -> Self {
        Factor::Between {
            from,
            to,
            delta,
            noise,
        }
    }

    /// Observation factor from a pose to a point landmark.
    pub fn bearing_range(
        pose: VarKey,
        target: VarKey,
        bearing: f64,
        range: f64,
        noise: BearingRangeNoise,
    ) -> Self {
        Factor::BearingRange {
            pose,
            target,
            bearing,
            range,
            noise,
        }
    }

    /// Variables this factor constrains.
    pub fn keys(&self) -> Vec<VarKey> {
        match self {
            Factor::PosePrior { key, .. } | Factor::PointPrior { key, .. } => vec![*key],
            Factor::Between { from, to, .. } => vec![*from, *to],
            Factor::BearingRange { pose, target, .. } => vec![*pose, *target],
        }
    }

    /// Residual dimension.
    pub fn dim(&self) -> usize {
        match self {
            Factor::PosePrior { .. } | Factor::Between { .. } => 3,
            Factor::PointPrior { .. } | Factor::BearingRange { .. } => 2,
        }
    }

    /// Whitened residual at the given estimate.
    pub fn whitened_error(&self, values: &Values) -> Result<DVector<f64>> {
        match self {
            Factor::PosePrior { key, prior, noise } => {
                let pose = values.pose(*key).ok_or_else(|| missing(*key))?;
                let w = noise.weights();
                Ok(DVector::from_vec(vec![
                    w[0] * (pose.x - prior.x),
                    w[1] * (pose.y - prior.y),
                    w[2] * normalize_angle(pose.theta - prior.theta),
                ]))
            }

            Factor::PointPrior {
                key,
                prior,
                sqrt_information,
            } => {
                let point = values.point(*key).ok_or_else(|| missing(*key))?;
                let r = sqrt_information * Vector2::new(point.x - prior.x, point.y - prior.y);
                Ok(DVector::from_vec(vec![r.x, r.y]))
            }

            Factor::Between {
                from,
                to,
                delta,
                noise,
            } => {
                let xi = values.pose(*from).ok_or_else(|| missing(*from))?;
                let xj = values.pose(*to).ok_or_else(|| missing(*to))?;
                let predicted = xi.between(&xj);
                let w = noise.weights();
                Ok(DVector::from_vec(vec![
                    w[0] * (predicted.x - delta.x),
                    w[1] * (predicted.y - delta.y),
                    w[2] * normalize_angle(predicted.theta - delta.theta),
                ]))
            }

            Factor::BearingRange {
                pose,
                target,
                bearing,
                range,
                noise,
            } => {
                let x = values.pose(*pose).ok_or_else(|| missing(*pose))?;
                let l = values.point(*target).ok_or_else(|| missing(*target))?;
                let dx = l.x - x.x;
                let dy = l.y - x.y;
                let rho = (dx * dx + dy * dy).max(MIN_RANGE_SQ).sqrt();
                let predicted_bearing = normalize_angle(dy.atan2(dx) - x.theta);
                let w = noise.weights();
                Ok(DVector::from_vec(vec![
                    w[0] * normalize_angle(predicted_bearing - bearing),
                    w[1] * (rho - range),
                ]))
            }
        }
    }

    /// Whitened residual and Jacobian blocks at the given estimate.
    pub fn linearize(&self, values: &Values) -> Result<Linearized> {
        let residual = self.whitened_error(values)?;
        match self {
            Factor::PosePrior { key, noise, .. } => {
                let w = noise.weights();
                let jac = DMatrix::from_row_slice(
                    3,
                    3,
                    &[w[0], 0.0, 0.0, 0.0, w[1], 0.0, 0.0, 0.0, w[2]],
                );
                Ok(Linearized {
                    blocks: vec![(*key, jac)],
                    residual,
                })
            }

            Factor::PointPrior {
                key,
                sqrt_information,
                ..
            } => {
                let w = sqrt_information;
                let jac = DMatrix::from_row_slice(
                    2,
                    2,
                    &[w[(0, 0)], w[(0, 1)], w[(1, 0)], w[(1, 1)]],
                );
                Ok(Linearized {
                    blocks: vec![(*key, jac)],
                    residual,
                })
            }

            Factor::Between {
                from, to, noise, ..
            } => {
                let xi = values.pose(*from).ok_or_else(|| missing(*from))?;
                let xj = values.pose(*to).ok_or_else(|| missing(*to))?;
                let (sin_i, cos_i) = xi.theta.sin_cos();
                let dx = xj.x - xi.x;
                let dy = xj.y - xi.y;
                let w = noise.weights();

                // d(xi⁻¹ ∘ xj)/dxi and /dxj, rows whitened
                let jac_i = DMatrix::from_row_slice(
                    3,
                    3,
                    &[
                        w[0] * -cos_i,
                        w[0] * -sin_i,
                        w[0] * (-sin_i * dx + cos_i * dy),
                        w[1] * sin_i,
                        w[1] * -cos_i,
                        w[1] * (-cos_i * dx - sin_i * dy),
                        0.0,
                        0.0,
                        w[2] * -1.0,
                    ],
                );
                let jac_j = DMatrix::from_row_slice(
                    3,
                    3,
                    &[
                        w[0] * cos_i,
                        w[0] * sin_i,
                        0.0,
                        w[1] * -sin_i,
                        w[1] * cos_i,
                        0.0,
                        0.0,
                        0.0,
                        w[2],
                    ],
                );
                Ok(Linearized {
                    blocks: vec![(*from, jac_i), (*to, jac_j)],
                    residual,
                })
            }

            Factor::BearingRange {
                pose,
                target,
                noise,
                ..
            } => {
                let x = values.pose(*pose).ok_or_else(|| missing(*pose))?;
                let l = values.point(*target).ok_or_else(|| missing(*target))?;
                let dx = l.x - x.x;
                let dy = l.y - x.y;
                let q = (dx * dx + dy * dy).max(MIN_RANGE_SQ);
                let rho = q.sqrt();
                let w = noise.weights();

                let jac_pose = DMatrix::from_row_slice(
                    2,
                    3,
                    &[
                        w[0] * (dy / q),
                        w[0] * (-dx / q),
                        w[0] * -1.0,
                        w[1] * (-dx / rho),
                        w[1] * (-dy / rho),
                        0.0,
                    ],
                );
                let jac_point = DMatrix::from_row_slice(
                    2,
                    2,
                    &[
                        w[0] * (-dy / q),
                        w[0] * (dx / q),
                        w[1] * (dx / rho),
                        w[1] * (dy / rho),
                    ],
                );
                Ok(Linearized {
                    blocks: vec![(*pose, jac_pose), (*target, jac_point)],
                    residual,
                })
            }
        }
    }
}

fn missing(key: VarKey) -> Error {
    Error::SolverFailure(format!("factor references unknown variable {}", key))
}

/// Nonlinear factor graph over poses and landmarks.
///
/// A flat, append-only list of factors. The online engine never removes
/// factors; rope prior refreshes swap [`Factor::PointPrior`] entries in
/// place so the factor count stays stable.
#[derive(Debug, Clone, Default)]
pub struct FactorGraph {
    factors: Vec<Factor>,
}

impl FactorGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a factor.
    pub fn add(&mut self, factor: Factor) {
        self.factors.push(factor);
    }

    /// All committed factors, in commit order.
    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    /// Number of committed factors.
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    /// Whether the graph holds no factors.
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Total chi-squared error at the given estimate.
    pub fn chi_squared(&self, values: &Values) -> Result<f64> {
        let mut chi2 = 0.0;
        for factor in &self.factors {
            chi2 += factor.whitened_error(values)?.norm_squared();
        }
        Ok(chi2)
    }

    /// Replace every point prior on `key` with a fresh prior.
    ///
    /// Returns the number of priors replaced; zero means no prior on
    /// that variable was ever committed.
    pub fn replace_point_priors(
        &mut self,
        key: VarKey,
        prior: Point2D,
        covariance: Covariance2D,
    ) -> Result<usize> {
        let replacement = Factor::point_prior(key, prior, covariance)?;
        let mut replaced = 0;
        for factor in &mut self.factors {
            if matches!(factor, Factor::PointPrior { key: k, .. } if *k == key) {
                *factor = replacement.clone();
                replaced += 1;
            }
        }
        Ok(replaced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::values::VarValue;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn values_with(entries: &[(VarKey, VarValue)]) -> Values {
        let mut values = Values::new();
        for (key, value) in entries {
            values.insert(*key, *value);
        }
        values
    }

    /// Central-difference Jacobian of the whitened error.
    fn numeric_jacobian(factor: &Factor, values: &Values, key: VarKey) -> DMatrix<f64> {
        let step = 1e-6;
        let rows = factor.dim();
        let cols = key.dim();
        let mut jac = DMatrix::zeros(rows, cols);
        for c in 0..cols {
            let plus = perturbed(values, key, c, step);
            let minus = perturbed(values, key, c, -step);
            let column = (factor.whitened_error(&plus).unwrap()
                - factor.whitened_error(&minus).unwrap())
                / (2.0 * step);
            jac.set_column(c, &column);
        }
        jac
    }

    fn perturbed(values: &Values, key: VarKey, coord: usize, delta: f64) -> Values {
        let mut out = values.clone();
        match values.get(key).unwrap() {
            VarValue::Pose(p) => {
                let mut coords = [p.x, p.y, p.theta];
                coords[coord] += delta;
                out.set(key, VarValue::Pose(Pose2D::new(coords[0], coords[1], coords[2])));
            }
            VarValue::Point(p) => {
                let mut coords = [p.x, p.y];
                coords[coord] += delta;
                out.set(key, VarValue::Point(Point2D::new(coords[0], coords[1])));
            }
        }
        out
    }

    fn assert_matrix_eq(analytic: &DMatrix<f64>, numeric: &DMatrix<f64>) {
        assert_eq!(analytic.shape(), numeric.shape());
        for r in 0..analytic.nrows() {
            for c in 0..analytic.ncols() {
                assert_relative_eq!(
                    analytic[(r, c)],
                    numeric[(r, c)],
                    epsilon = 1e-5,
                    max_relative = 1e-5
                );
            }
        }
    }

    #[test]
    fn test_pose_prior_residual() {
        let key = VarKey::Pose(0);
        let prior = Pose2D::new(1.0, 2.0, 0.1);
        let factor = Factor::pose_prior(key, prior, PoseNoise::planar(0.5, 0.1));

        let at_prior = values_with(&[(key, VarValue::Pose(prior))]);
        let r = factor.whitened_error(&at_prior).unwrap();
        assert_relative_eq!(r.norm(), 0.0, epsilon = 1e-12);

        let off = values_with(&[(key, VarValue::Pose(Pose2D::new(2.0, 2.0, 0.1)))]);
        let r = factor.whitened_error(&off).unwrap();
        // 1 m error whitened by sigma 0.5
        assert_relative_eq!(r[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(r[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_point_prior_whitening_matches_covariance() {
        let key = VarKey::Buoy(0);
        let factor = Factor::point_prior(
            key,
            Point2D::new(0.0, 0.0),
            Covariance2D::diagonal(4.0, 1.0),
        )
        .unwrap();

        let values = values_with(&[(key, VarValue::Point(Point2D::new(2.0, 0.0)))]);
        let r = factor.whitened_error(&values).unwrap();
        // chi2 = rᵀ Σ⁻¹ r = 4 / 4 = 1
        assert_relative_eq!(r.norm_squared(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_point_prior_rejects_singular_covariance() {
        let result = Factor::point_prior(VarKey::Buoy(0), Point2D::new(0.0, 0.0), Covariance2D::zero());
        assert!(result.is_err());
    }

    #[test]
    fn test_between_zero_residual_on_consistent_chain() {
        let a = Pose2D::new(1.0, 1.0, 0.3);
        let b = Pose2D::new(2.5, 1.2, 0.8);
        let factor = Factor::between(
            VarKey::Pose(0),
            VarKey::Pose(1),
            a.between(&b),
            PoseNoise::planar(0.1, 0.01),
        );
        let values = values_with(&[
            (VarKey::Pose(0), VarValue::Pose(a)),
            (VarKey::Pose(1), VarValue::Pose(b)),
        ]);
        let r = factor.whitened_error(&values).unwrap();
        assert_relative_eq!(r.norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_between_jacobians_match_numeric() {
        let factor = Factor::between(
            VarKey::Pose(0),
            VarKey::Pose(1),
            Pose2D::new(1.0, 0.2, 0.1),
            PoseNoise::planar(0.1, 0.02),
        );
        let values = values_with(&[
            (VarKey::Pose(0), VarValue::Pose(Pose2D::new(0.5, -0.3, 0.4))),
            (VarKey::Pose(1), VarValue::Pose(Pose2D::new(1.7, 0.1, 0.6))),
        ]);

        let lin = factor.linearize(&values).unwrap();
        assert_matrix_eq(&lin.blocks[0].1, &numeric_jacobian(&factor, &values, VarKey::Pose(0)));
        assert_matrix_eq(&lin.blocks[1].1, &numeric_jacobian(&factor, &values, VarKey::Pose(1)));
    }

    #[test]
    fn test_bearing_range_residual_at_exact_observation() {
        // Vehicle at origin facing +x, buoy straight left at 3 m
        let factor = Factor::bearing_range(
            VarKey::Pose(0),
            VarKey::Buoy(0),
            FRAC_PI_2,
            3.0,
            BearingRangeNoise::new(0.02, 0.1),
        );
        let values = values_with(&[
            (VarKey::Pose(0), VarValue::Pose(Pose2D::identity())),
            (VarKey::Buoy(0), VarValue::Point(Point2D::new(0.0, 3.0))),
        ]);
        let r = factor.whitened_error(&values).unwrap();
        assert_relative_eq!(r.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bearing_range_jacobians_match_numeric() {
        let factor = Factor::bearing_range(
            VarKey::Pose(2),
            VarKey::Buoy(1),
            0.4,
            2.5,
            BearingRangeNoise::new(0.02, 0.1),
        );
        let values = values_with(&[
            (VarKey::Pose(2), VarValue::Pose(Pose2D::new(1.0, -0.5, 0.7))),
            (VarKey::Buoy(1), VarValue::Point(Point2D::new(3.0, 1.5))),
        ]);

        let lin = factor.linearize(&values).unwrap();
        assert_matrix_eq(&lin.blocks[0].1, &numeric_jacobian(&factor, &values, VarKey::Pose(2)));
        assert_matrix_eq(&lin.blocks[1].1, &numeric_jacobian(&factor, &values, VarKey::Buoy(1)));
    }

    #[test]
    fn test_missing_variable_is_an_error() {
        let factor = Factor::pose_prior(
            VarKey::Pose(3),
            Pose2D::identity(),
            PoseNoise::planar(1.0, 1.0),
        );
        let empty = Values::new();
        assert!(factor.whitened_error(&empty).is_err());
        assert!(factor.linearize(&empty).is_err());
    }

    #[test]
    fn test_chi_squared_sums_over_factors() {
        let mut graph = FactorGraph::new();
        let key = VarKey::Buoy(0);
        graph.add(
            Factor::point_prior(key, Point2D::new(0.0, 0.0), Covariance2D::isotropic(1.0))
                .unwrap(),
        );
        graph.add(
            Factor::point_prior(key, Point2D::new(0.0, 0.0), Covariance2D::isotropic(2.0))
                .unwrap(),
        );

        let values = values_with(&[(key, VarValue::Point(Point2D::new(2.0, 0.0)))]);
        // 4/1 + 4/4
        assert_relative_eq!(graph.chi_squared(&values).unwrap(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_replace_point_priors_swaps_all_matching() {
        let mut graph = FactorGraph::new();
        let key = VarKey::Detection(3);
        let other = VarKey::Detection(4);
        for k in [key, key, other] {
            graph.add(
                Factor::point_prior(k, Point2D::new(0.0, 0.0), Covariance2D::isotropic(1.0))
                    .unwrap(),
            );
        }

        let replaced = graph
            .replace_point_priors(key, Point2D::new(5.0, 5.0), Covariance2D::isotropic(0.5))
            .unwrap();
        assert_eq!(replaced, 2);
        assert_eq!(graph.len(), 3);

        // The untouched prior still anchors at the origin
        let values = values_with(&[
            (key, VarValue::Point(Point2D::new(5.0, 5.0))),
            (other, VarValue::Point(Point2D::new(0.0, 0.0))),
        ]);
        assert_relative_eq!(graph.chi_squared(&values).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_anisotropic_prior_chi2() {
        // Rotated covariance: loose along the diagonal, tight across it
        let cov = Covariance2D::rotated(std::f64::consts::FRAC_PI_4, 3.0, 0.5);
        let key = VarKey::Detection(0);
        let factor = Factor::point_prior(key, Point2D::new(0.0, 0.0), cov).unwrap();

        // Offset along the loose axis scores a smaller chi2 than the
        // same offset across it
        let along = values_with(&[(key, VarValue::Point(Point2D::new(1.0, 1.0)))]);
        let across = values_with(&[(key, VarValue::Point(Point2D::new(1.0, -1.0)))]);
        let chi2_along = factor.whitened_error(&along).unwrap().norm_squared();
        let chi2_across = factor.whitened_error(&across).unwrap().norm_squared();
        assert!(chi2_along < chi2_across);
        assert_relative_eq!(chi2_along, 2.0 / 9.0, epsilon = 1e-9);
        assert_relative_eq!(chi2_across, 2.0 / 0.25, epsilon = 1e-9);
    }
}
