//! Factor graph estimation backend.
//!
//! The landmark SLAM problem is a nonlinear factor graph:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     FACTOR GRAPH                          │
//! │                                                           │
//! │  prior                                                    │
//! │   │                                                       │
//! │  [x0] ──between──▶ [x1] ──between──▶ [x2] ──▶ ...         │
//! │            │                 │                            │
//! │       bearing-range     bearing-range                     │
//! │            ▼                 ▼                            │
//! │          (b0)              (r3) ◀── point prior           │
//! │         buoys        rope detections                      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Poses are SE(2) variables; buoys, ropes, and rope detections are
//! planar points. Every update re-linearizes the full graph and solves
//! the normal equations by Levenberg-Marquardt.
//!
//! # Components
//!
//! - [`FactorGraph`]: append-only factor container
//! - [`Values`]: typed variable estimates, keyed by [`VarKey`]
//! - [`IncrementalLm`]: full-relinearization smoother behind the
//!   [`IncrementalSolver`] seam
//! - [`LmOptimizer`]: batch solver behind the [`BatchSolver`] seam
//! - [`Marginals`]: posterior covariance extraction

mod factors;
mod solver;
mod values;

pub use factors::{BearingRangeNoise, Factor, FactorGraph, Linearized, PoseNoise};
pub use solver::{
    BatchSolver, GraphDelta, IncrementalLm, IncrementalSolver, LmOptimizer, Marginals,
    OptimizationSummary, OptimizerConfig, TerminationReason,
};
pub use values::{Values, VarKey, VarValue};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_compiles() {
        let _ = FactorGraph::new();
        let _ = Values::new();
        let _ = OptimizerConfig::default();
    }
}
