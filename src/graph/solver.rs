//! Nonlinear least-squares solvers for the factor graph.
//!
//! Minimizes the whitened squared error over all active variables:
//!
//! ```text
//! F(x) = Σ ||W_k (h_k(x) - z_k)||²
//! ```
//!
//! Each iteration linearizes every factor, assembles the normal
//! equations `H Δx = -b` over the active variable blocks, and solves by
//! dense Cholesky. Levenberg-Marquardt damping scales the diagonal and
//! adapts to step quality. Variables touched by no factor stay at their
//! initial values.
//!
//! The same linear system yields marginal covariances: a variable's
//! posterior block is the corresponding block of `H⁻¹` at the final
//! linearization point.

use std::collections::{HashMap, HashSet};

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

use crate::core::types::{Covariance2D, Point2D, Pose2D};
use crate::error::{Error, Result};
use crate::graph::factors::Factor;
use crate::graph::values::{Values, VarKey, VarValue};
use crate::graph::FactorGraph;

/// Configuration for the nonlinear optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Maximum number of iterations
    pub max_iterations: u32,

    /// Convergence threshold for relative error change
    pub convergence_threshold: f64,

    /// Initial Levenberg-Marquardt damping factor
    pub damping_factor: f64,

    /// Whether to use Levenberg-Marquardt (vs pure Gauss-Newton)
    pub use_levenberg_marquardt: bool,

    /// Absolute error improvement below which iteration stops
    pub min_improvement: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            convergence_threshold: 1e-6,
            damping_factor: 1e-3,
            use_levenberg_marquardt: true,
            min_improvement: 1e-9,
        }
    }
}

/// Reason for optimization termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Converged (error change below threshold)
    Converged,

    /// Maximum iterations reached
    MaxIterations,

    /// Error kept increasing under maximum damping
    Diverged,

    /// Linear system solve failed
    SolveFailed,

    /// Nothing to optimize
    NoFactors,
}

/// Result of one optimization run.
#[derive(Debug, Clone)]
pub struct OptimizationSummary {
    /// Number of iterations performed
    pub iterations: u32,

    /// Initial chi-squared error
    pub initial_error: f64,

    /// Final chi-squared error
    pub final_error: f64,

    /// Whether the optimization converged
    pub converged: bool,

    /// Reason for termination
    pub termination_reason: TerminationReason,
}

impl OptimizationSummary {
    /// Summary of a no-op run on an empty factor set.
    pub fn empty() -> Self {
        Self {
            iterations: 0,
            initial_error: 0.0,
            final_error: 0.0,
            converged: true,
            termination_reason: TerminationReason::NoFactors,
        }
    }
}

/// Column layout of the linear system over active variables.
///
/// A variable is active when at least one factor references it. Offsets
/// follow the insertion order of the estimate container, so the layout
/// is deterministic across iterations.
struct Layout {
    offsets: HashMap<VarKey, usize>,
    dim: usize,
}

impl Layout {
    fn build(graph: &FactorGraph, values: &Values) -> Result<Self> {
        let mut active: HashSet<VarKey> = HashSet::new();
        for factor in graph.factors() {
            for key in factor.keys() {
                if !values.contains(key) {
                    return Err(Error::SolverFailure(format!(
                        "factor references unknown variable {}",
                        key
                    )));
                }
                active.insert(key);
            }
        }

        let mut offsets = HashMap::with_capacity(active.len());
        let mut dim = 0;
        for (key, _) in values.iter() {
            if active.contains(&key) {
                offsets.insert(key, dim);
                dim += key.dim();
            }
        }
        Ok(Self { offsets, dim })
    }

    #[inline]
    fn offset(&self, key: VarKey) -> usize {
        self.offsets[&key]
    }
}

/// Assemble the normal equations `H` and gradient `b = Jᵀr`.
fn build_linear_system(
    graph: &FactorGraph,
    values: &Values,
    layout: &Layout,
) -> Result<(DMatrix<f64>, DVector<f64>)> {
    let mut h = DMatrix::zeros(layout.dim, layout.dim);
    let mut b = DVector::zeros(layout.dim);

    for factor in graph.factors() {
        let lin = factor.linearize(values)?;
        for (key_a, jac_a) in &lin.blocks {
            let off_a = layout.offset(*key_a);
            let jac_a_t = jac_a.transpose();

            let grad = &jac_a_t * &lin.residual;
            let mut b_block = b.rows_mut(off_a, key_a.dim());
            b_block += grad;

            for (key_b, jac_b) in &lin.blocks {
                let off_b = layout.offset(*key_b);
                let contribution = &jac_a_t * jac_b;
                let mut h_block = h.view_mut((off_a, off_b), (key_a.dim(), key_b.dim()));
                h_block += contribution;
            }
        }
    }

    Ok((h, b))
}

/// Scale the diagonal by the damping factor.
fn apply_damping(h: &DMatrix<f64>, lambda: f64) -> DMatrix<f64> {
    let mut damped = h.clone();
    for i in 0..damped.nrows() {
        damped[(i, i)] += lambda * damped[(i, i)].max(1.0);
    }
    damped
}

/// Add a solved step to the active variables.
fn apply_step(values: &mut Values, layout: &Layout, dx: &DVector<f64>) {
    for (&key, &off) in &layout.offsets {
        match values.get(key) {
            Some(VarValue::Pose(p)) => {
                let updated = Pose2D::new(p.x + dx[off], p.y + dx[off + 1], p.theta + dx[off + 2]);
                values.set(key, VarValue::Pose(updated));
            }
            Some(VarValue::Point(p)) => {
                let updated = Point2D::new(p.x + dx[off], p.y + dx[off + 1]);
                values.set(key, VarValue::Point(updated));
            }
            None => {}
        }
    }
}

/// Batch nonlinear solver over a fixed graph.
pub trait BatchSolver {
    /// Optimize all active variables starting from `initial`.
    ///
    /// Returns the optimized estimate together with a run summary.
    /// Inactive variables pass through unchanged.
    fn solve(&self, graph: &FactorGraph, initial: &Values)
    -> Result<(Values, OptimizationSummary)>;
}

/// Levenberg-Marquardt batch optimizer.
pub struct LmOptimizer {
    config: OptimizerConfig,
}

impl LmOptimizer {
    /// Create a new optimizer.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }
}

impl BatchSolver for LmOptimizer {
    fn solve(
        &self,
        graph: &FactorGraph,
        initial: &Values,
    ) -> Result<(Values, OptimizationSummary)> {
        if graph.is_empty() {
            return Ok((initial.clone(), OptimizationSummary::empty()));
        }

        let layout = Layout::build(graph, initial)?;
        let mut current = initial.clone();
        let initial_error = graph.chi_squared(&current)?;
        let mut current_error = initial_error;

        let mut lambda = self.config.damping_factor;
        let mut iterations = 0;

        for iter in 0..self.config.max_iterations {
            iterations = iter + 1;

            let (h, b) = build_linear_system(graph, &current, &layout)?;
            let h_damped = if self.config.use_levenberg_marquardt {
                apply_damping(&h, lambda)
            } else {
                h
            };

            let dx = match Cholesky::new(h_damped) {
                Some(chol) => chol.solve(&(-&b)),
                None => {
                    return Ok((
                        current,
                        OptimizationSummary {
                            iterations,
                            initial_error,
                            final_error: current_error,
                            converged: false,
                            termination_reason: TerminationReason::SolveFailed,
                        },
                    ));
                }
            };

            let mut candidate = current.clone();
            apply_step(&mut candidate, &layout, &dx);
            let new_error = graph.chi_squared(&candidate)?;

            // Reject steps that increase the error; retry with a more
            // gradient-descent-like system
            if new_error > current_error * 1.1 {
                if self.config.use_levenberg_marquardt {
                    lambda *= 10.0;
                    if lambda > 1e10 {
                        return Ok((
                            current,
                            OptimizationSummary {
                                iterations,
                                initial_error,
                                final_error: current_error,
                                converged: false,
                                termination_reason: TerminationReason::Diverged,
                            },
                        ));
                    }
                    continue;
                }
                return Ok((
                    current,
                    OptimizationSummary {
                        iterations,
                        initial_error,
                        final_error: current_error,
                        converged: false,
                        termination_reason: TerminationReason::Diverged,
                    },
                ));
            }

            if self.config.use_levenberg_marquardt {
                lambda = (lambda * 0.1).max(1e-10);
            }

            let improvement = current_error - new_error;
            let relative_change = improvement.abs() / current_error.max(1e-10);
            current = candidate;
            current_error = new_error;

            if relative_change < self.config.convergence_threshold
                || improvement.abs() < self.config.min_improvement
            {
                return Ok((
                    current,
                    OptimizationSummary {
                        iterations,
                        initial_error,
                        final_error: current_error,
                        converged: true,
                        termination_reason: TerminationReason::Converged,
                    },
                ));
            }
        }

        Ok((
            current,
            OptimizationSummary {
                iterations,
                initial_error,
                final_error: current_error,
                converged: false,
                termination_reason: TerminationReason::MaxIterations,
            },
        ))
    }
}

/// Batched graph additions applied to the smoother in one step.
#[derive(Debug, Default)]
pub struct GraphDelta {
    /// New factors to commit
    pub factors: Vec<Factor>,
    /// Initial estimates for new variables
    pub values: Values,
}

impl GraphDelta {
    /// An empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a factor.
    pub fn add_factor(&mut self, factor: Factor) {
        self.factors.push(factor);
    }

    /// Queue an initial estimate for a new variable.
    pub fn insert(&mut self, key: VarKey, value: VarValue) -> bool {
        self.values.insert(key, value)
    }

    /// Whether the delta carries neither factors nor values.
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty() && self.values.is_empty()
    }
}

/// Incremental smoother interface used by the online engine.
pub trait IncrementalSolver {
    /// Commit a delta and re-optimize the whole graph.
    fn update(&mut self, delta: GraphDelta) -> Result<OptimizationSummary>;

    /// Current estimate of every known variable.
    fn estimate(&self) -> &Values;

    /// Posterior 2x2 positional covariance of a variable.
    ///
    /// For poses this is the translational block of the full marginal.
    /// Errors for variables no committed factor constrains.
    fn marginal_covariance(&mut self, key: VarKey) -> Result<Covariance2D>;

    /// Number of committed factors.
    fn factor_count(&self) -> usize;

    /// Replace every point prior on `key` with a new prior in place.
    ///
    /// Returns the number of priors replaced.
    fn replace_point_priors(
        &mut self,
        key: VarKey,
        prior: Point2D,
        covariance: Covariance2D,
    ) -> Result<usize>;
}

/// Full-relinearization smoother: every update re-solves the complete
/// graph with [`LmOptimizer`].
///
/// Marginals are computed lazily from the final linearization point and
/// cached until the next update.
pub struct IncrementalLm {
    graph: FactorGraph,
    values: Values,
    optimizer: LmOptimizer,
    marginals: Option<Marginals>,
}

impl IncrementalLm {
    /// Create an empty smoother.
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            graph: FactorGraph::new(),
            values: Values::new(),
            optimizer: LmOptimizer::new(config),
            marginals: None,
        }
    }

    /// The committed factor graph.
    pub fn graph(&self) -> &FactorGraph {
        &self.graph
    }
}

impl IncrementalSolver for IncrementalLm {
    fn update(&mut self, delta: GraphDelta) -> Result<OptimizationSummary> {
        self.marginals = None;
        self.values.merge(&delta.values);
        for factor in delta.factors {
            self.graph.add(factor);
        }

        let (solved, summary) = self.optimizer.solve(&self.graph, &self.values)?;
        self.values = solved;
        Ok(summary)
    }

    fn estimate(&self) -> &Values {
        &self.values
    }

    fn marginal_covariance(&mut self, key: VarKey) -> Result<Covariance2D> {
        if self.marginals.is_none() {
            self.marginals = Some(Marginals::build(&self.graph, &self.values)?);
        }
        let Some(marginals) = self.marginals.as_ref() else {
            return Err(Error::SolverFailure("marginal cache missing".to_string()));
        };
        marginals.covariance(key)
    }

    fn factor_count(&self) -> usize {
        self.graph.len()
    }

    fn replace_point_priors(
        &mut self,
        key: VarKey,
        prior: Point2D,
        covariance: Covariance2D,
    ) -> Result<usize> {
        self.marginals = None;
        self.graph.replace_point_priors(key, prior, covariance)
    }
}

/// Posterior covariance extractor.
///
/// Factors the undamped information matrix once; each query solves for
/// the two translational columns of the requested variable.
pub struct Marginals {
    chol: Cholesky<f64, Dyn>,
    layout: Layout,
}

impl Marginals {
    /// Factor the information matrix at the given linearization point.
    pub fn build(graph: &FactorGraph, values: &Values) -> Result<Self> {
        let layout = Layout::build(graph, values)?;
        if layout.dim == 0 {
            return Err(Error::SolverFailure(
                "no active variables to marginalize".to_string(),
            ));
        }
        let (h, _) = build_linear_system(graph, values, &layout)?;
        let chol = Cholesky::new(h).ok_or_else(|| {
            Error::SolverFailure("information matrix is not positive definite".to_string())
        })?;
        Ok(Self { chol, layout })
    }

    /// Positional covariance block of a variable.
    pub fn covariance(&self, key: VarKey) -> Result<Covariance2D> {
        let off = self.layout.offsets.get(&key).copied().ok_or_else(|| {
            Error::SolverFailure(format!("no marginal for unconstrained variable {}", key))
        })?;

        let mut rhs = DMatrix::zeros(self.layout.dim, 2);
        rhs[(off, 0)] = 1.0;
        rhs[(off + 1, 1)] = 1.0;
        let cols = self.chol.solve(&rhs);

        Ok(Covariance2D::from_matrix(&nalgebra::Matrix2::new(
            cols[(off, 0)],
            cols[(off, 1)],
            cols[(off + 1, 0)],
            cols[(off + 1, 1)],
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::factors::{BearingRangeNoise, PoseNoise};
    use approx::assert_relative_eq;

    fn tight_pose_noise() -> PoseNoise {
        PoseNoise::planar(0.1, 0.01)
    }

    #[test]
    fn test_config_defaults() {
        let config = OptimizerConfig::default();
        assert!(config.max_iterations > 0);
        assert!(config.convergence_threshold > 0.0);
        assert!(config.use_levenberg_marquardt);
    }

    #[test]
    fn test_empty_graph_is_a_no_op() {
        let optimizer = LmOptimizer::new(OptimizerConfig::default());
        let graph = FactorGraph::new();
        let mut initial = Values::new();
        initial.insert(VarKey::Pose(0), VarValue::Pose(Pose2D::new(1.0, 2.0, 0.3)));

        let (solved, summary) = optimizer.solve(&graph, &initial).unwrap();
        assert_eq!(summary.termination_reason, TerminationReason::NoFactors);
        assert!(summary.converged);
        assert_relative_eq!(solved.pose(VarKey::Pose(0)).unwrap().x, 1.0);
    }

    #[test]
    fn test_prior_pulls_pose_to_anchor() {
        let optimizer = LmOptimizer::new(OptimizerConfig::default());
        let mut graph = FactorGraph::new();
        graph.add(Factor::pose_prior(
            VarKey::Pose(0),
            Pose2D::new(2.0, -1.0, 0.5),
            tight_pose_noise(),
        ));

        let mut initial = Values::new();
        initial.insert(VarKey::Pose(0), VarValue::Pose(Pose2D::identity()));

        let (solved, summary) = optimizer.solve(&graph, &initial).unwrap();
        assert!(summary.converged);
        let pose = solved.pose(VarKey::Pose(0)).unwrap();
        assert_relative_eq!(pose.x, 2.0, epsilon = 1e-6);
        assert_relative_eq!(pose.y, -1.0, epsilon = 1e-6);
        assert_relative_eq!(pose.theta, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_odometry_chain_converges() {
        let optimizer = LmOptimizer::new(OptimizerConfig::default());
        let mut graph = FactorGraph::new();
        graph.add(Factor::pose_prior(
            VarKey::Pose(0),
            Pose2D::identity(),
            tight_pose_noise(),
        ));
        graph.add(Factor::between(
            VarKey::Pose(0),
            VarKey::Pose(1),
            Pose2D::new(1.0, 0.0, 0.0),
            tight_pose_noise(),
        ));
        graph.add(Factor::between(
            VarKey::Pose(1),
            VarKey::Pose(2),
            Pose2D::new(1.0, 0.0, 0.0),
            tight_pose_noise(),
        ));

        // Deliberately bad initial guesses
        let mut initial = Values::new();
        initial.insert(VarKey::Pose(0), VarValue::Pose(Pose2D::new(0.2, 0.1, 0.05)));
        initial.insert(VarKey::Pose(1), VarValue::Pose(Pose2D::new(1.4, -0.2, 0.1)));
        initial.insert(VarKey::Pose(2), VarValue::Pose(Pose2D::new(1.6, 0.3, -0.1)));

        let (solved, summary) = optimizer.solve(&graph, &initial).unwrap();
        assert!(summary.converged);
        assert!(summary.final_error < summary.initial_error);

        let p1 = solved.pose(VarKey::Pose(1)).unwrap();
        let p2 = solved.pose(VarKey::Pose(2)).unwrap();
        assert_relative_eq!(p1.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(p1.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(p2.x, 2.0, epsilon = 1e-5);
        assert_relative_eq!(p2.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_bearing_range_triangulates_landmark() {
        let optimizer = LmOptimizer::new(OptimizerConfig::default());
        let mut graph = FactorGraph::new();
        graph.add(Factor::pose_prior(
            VarKey::Pose(0),
            Pose2D::identity(),
            tight_pose_noise(),
        ));
        graph.add(Factor::between(
            VarKey::Pose(0),
            VarKey::Pose(1),
            Pose2D::new(2.0, 0.0, 0.0),
            tight_pose_noise(),
        ));

        // Buoy at (1, 2): seen from both poses
        let noise = BearingRangeNoise::new(0.01, 0.05);
        let truth = Point2D::new(1.0, 2.0);
        let from_p0 = Pose2D::identity();
        let from_p1 = Pose2D::new(2.0, 0.0, 0.0);
        graph.add(Factor::bearing_range(
            VarKey::Pose(0),
            VarKey::Buoy(0),
            from_p0.bearing_to(&truth),
            from_p0.range_to(&truth),
            noise,
        ));
        graph.add(Factor::bearing_range(
            VarKey::Pose(1),
            VarKey::Buoy(0),
            from_p1.bearing_to(&truth),
            from_p1.range_to(&truth),
            noise,
        ));

        let mut initial = Values::new();
        initial.insert(VarKey::Pose(0), VarValue::Pose(Pose2D::identity()));
        initial.insert(VarKey::Pose(1), VarValue::Pose(Pose2D::new(1.9, 0.1, 0.0)));
        initial.insert(VarKey::Buoy(0), VarValue::Point(Point2D::new(0.5, 1.0)));

        let (solved, summary) = optimizer.solve(&graph, &initial).unwrap();
        assert!(summary.converged);
        let buoy = solved.point(VarKey::Buoy(0)).unwrap();
        assert_relative_eq!(buoy.x, 1.0, epsilon = 1e-4);
        assert_relative_eq!(buoy.y, 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_inactive_variable_passes_through() {
        let optimizer = LmOptimizer::new(OptimizerConfig::default());
        let mut graph = FactorGraph::new();
        graph.add(Factor::pose_prior(
            VarKey::Pose(0),
            Pose2D::identity(),
            tight_pose_noise(),
        ));

        let mut initial = Values::new();
        initial.insert(VarKey::Pose(0), VarValue::Pose(Pose2D::new(0.1, 0.0, 0.0)));
        initial.insert(VarKey::Buoy(5), VarValue::Point(Point2D::new(7.0, 8.0)));

        let (solved, _) = optimizer.solve(&graph, &initial).unwrap();
        let buoy = solved.point(VarKey::Buoy(5)).unwrap();
        assert_relative_eq!(buoy.x, 7.0);
        assert_relative_eq!(buoy.y, 8.0);
    }

    #[test]
    fn test_marginal_of_single_prior_is_its_covariance() {
        let mut graph = FactorGraph::new();
        graph.add(Factor::pose_prior(
            VarKey::Pose(0),
            Pose2D::identity(),
            PoseNoise::planar(0.5, 0.1),
        ));
        let mut values = Values::new();
        values.insert(VarKey::Pose(0), VarValue::Pose(Pose2D::identity()));

        let marginals = Marginals::build(&graph, &values).unwrap();
        let cov = marginals.covariance(VarKey::Pose(0)).unwrap();
        assert_relative_eq!(cov.xx(), 0.25, epsilon = 1e-9);
        assert_relative_eq!(cov.yy(), 0.25, epsilon = 1e-9);
        assert_relative_eq!(cov.xy(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_independent_priors_combine_information() {
        let mut graph = FactorGraph::new();
        let prior = Point2D::new(3.0, 3.0);
        graph.add(Factor::point_prior(VarKey::Buoy(0), prior, Covariance2D::isotropic(1.0)).unwrap());
        graph.add(Factor::point_prior(VarKey::Buoy(0), prior, Covariance2D::isotropic(1.0)).unwrap());

        let mut values = Values::new();
        values.insert(VarKey::Buoy(0), VarValue::Point(prior));

        let marginals = Marginals::build(&graph, &values).unwrap();
        let cov = marginals.covariance(VarKey::Buoy(0)).unwrap();
        assert_relative_eq!(cov.xx(), 0.5, epsilon = 1e-9);
        assert_relative_eq!(cov.yy(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_marginal_for_unconstrained_variable_is_an_error() {
        let mut graph = FactorGraph::new();
        graph.add(Factor::pose_prior(
            VarKey::Pose(0),
            Pose2D::identity(),
            tight_pose_noise(),
        ));
        let mut values = Values::new();
        values.insert(VarKey::Pose(0), VarValue::Pose(Pose2D::identity()));
        values.insert(VarKey::Buoy(0), VarValue::Point(Point2D::new(1.0, 1.0)));

        let marginals = Marginals::build(&graph, &values).unwrap();
        assert!(marginals.covariance(VarKey::Buoy(0)).is_err());
    }

    #[test]
    fn test_incremental_updates_extend_the_chain() {
        let mut solver = IncrementalLm::new(OptimizerConfig::default());

        let mut seed = GraphDelta::new();
        seed.insert(VarKey::Pose(0), VarValue::Pose(Pose2D::identity()));
        seed.add_factor(Factor::pose_prior(
            VarKey::Pose(0),
            Pose2D::identity(),
            tight_pose_noise(),
        ));
        let summary = solver.update(seed).unwrap();
        assert!(summary.converged);
        assert_eq!(solver.factor_count(), 1);

        let mut step = GraphDelta::new();
        step.insert(VarKey::Pose(1), VarValue::Pose(Pose2D::new(1.1, 0.0, 0.0)));
        step.add_factor(Factor::between(
            VarKey::Pose(0),
            VarKey::Pose(1),
            Pose2D::new(1.0, 0.0, 0.0),
            tight_pose_noise(),
        ));
        let summary = solver.update(step).unwrap();
        assert!(summary.converged);
        assert_eq!(solver.factor_count(), 2);

        let p1 = solver.estimate().pose(VarKey::Pose(1)).unwrap();
        assert_relative_eq!(p1.x, 1.0, epsilon = 1e-6);

        // Pose 1 carries the prior uncertainty plus the odometry noise
        let cov = solver.marginal_covariance(VarKey::Pose(1)).unwrap();
        assert!(cov.xx() > 0.0);
        let cov0 = solver.marginal_covariance(VarKey::Pose(0)).unwrap();
        assert!(cov.xx() > cov0.xx());
    }

    #[test]
    fn test_replace_point_priors_moves_the_estimate() {
        let mut solver = IncrementalLm::new(OptimizerConfig::default());

        let mut seed = GraphDelta::new();
        seed.insert(VarKey::Detection(0), VarValue::Point(Point2D::new(0.0, 0.0)));
        seed.add_factor(
            Factor::point_prior(
                VarKey::Detection(0),
                Point2D::new(0.0, 0.0),
                Covariance2D::isotropic(1.0),
            )
            .unwrap(),
        );
        solver.update(seed).unwrap();

        let replaced = solver
            .replace_point_priors(
                VarKey::Detection(0),
                Point2D::new(4.0, 4.0),
                Covariance2D::isotropic(1.0),
            )
            .unwrap();
        assert_eq!(replaced, 1);

        // Next update re-solves against the new prior
        let summary = solver.update(GraphDelta::new()).unwrap();
        assert!(summary.converged);
        let p = solver.estimate().point(VarKey::Detection(0)).unwrap();
        assert_relative_eq!(p.x, 4.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_graph_delta_emptiness() {
        let mut delta = GraphDelta::new();
        assert!(delta.is_empty());
        delta.insert(VarKey::Pose(0), VarValue::Pose(Pose2D::identity()));
        assert!(!delta.is_empty());
    }
}
