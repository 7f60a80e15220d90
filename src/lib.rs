//! sagar-slam - Landmark SLAM for underwater vehicles
//!
//! Online and offline 2D estimation over a sparse landmark map of
//! buoys and ropes. The core is an incremental factor-graph smoother
//! with integrated, covariance-aware data association; around it sit
//! competing batching policies for landmark-prior commitment and an
//! offline replay that swaps per-event association for mixture-model
//! clustering.
//!
//! # Architecture
//!
//! The crate is organized into logical layers, leaves first:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   io/ + main                        │  ← Replay + persistence
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │     (online stream, batching, clustering, offline)  │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │          association/  landmarks/  metrics/         │  ← Domain logic
//! │      (gating, likelihood, priors, diagnostics)      │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     graph/                          │  ← Estimation backend
//! │        (factors, values, LM solvers, marginals)     │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                  (types, math)                      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```
//! use sagar_slam::core::types::{DetectionKind, Point2D, Pose2D, PoseEvent, RelativeDetection};
//! use sagar_slam::{OnlineSlam, SlamConfig};
//!
//! let engine = OnlineSlam::new(SlamConfig::default());
//! engine.set_buoys(vec![Point2D::new(2.0, 3.0)]).unwrap();
//!
//! // First event seeds the graph, later ones are solved incrementally.
//! engine
//!     .add_pose(PoseEvent::odometry(
//!         Pose2D::new(0.0, 0.0, 0.0),
//!         Pose2D::new(0.0, 0.0, 0.0),
//!     ))
//!     .unwrap();
//! engine
//!     .add_pose(PoseEvent::with_detection(
//!         Pose2D::new(1.0, 0.0, 0.0),
//!         Pose2D::new(1.0, 0.0, 0.0),
//!         RelativeDetection::new(1.0, 3.0, DetectionKind::Buoy),
//!     ))
//!     .unwrap();
//!
//! assert_eq!(engine.pose_count(), 2);
//! ```

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

pub mod error;

// ============================================================================
// Layer 2: Factor-graph backend (depends on core)
// ============================================================================
pub mod graph;

// ============================================================================
// Layer 3: Domain logic (depends on core, graph)
// ============================================================================
pub mod association;
pub mod landmarks;
pub mod metrics;

pub mod config;

// ============================================================================
// Layer 4: Estimation engines (depends on all lower layers)
// ============================================================================
pub mod engine;

// ============================================================================
// Layer 5: Dataset I/O (depends on core)
// ============================================================================
pub mod io;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use core::math;
pub use core::types::{
    Attitude, Covariance2D, DetectionKind, Point2D, Pose2D, PoseEvent, RelativeDetection,
};

// Errors
pub use error::{Error, Result};

// Configuration
pub use config::{AssociationConfig, BatchingConfig, NoiseConfig, RopeConfig, SlamConfig};

// Graph backend
pub use graph::{
    BatchSolver, BearingRangeNoise, Factor, FactorGraph, GraphDelta, IncrementalLm,
    IncrementalSolver, LmOptimizer, Marginals, OptimizationSummary, OptimizerConfig, PoseNoise,
    TerminationReason, Values, VarKey, VarValue,
};

// Landmarks
pub use landmarks::{BuoyMap, Rope, RopeMap, RopeSpec};

// Association
pub use association::{AssociationOutcome, CandidateDistribution};

// Diagnostics
pub use metrics::{
    BuoyAssociationRecord, DaAuditRecord, DetectionState, UpdateLog, UpdateRecord, match_rate,
};

// Engines
pub use engine::{OfflineResult, OfflineSlam, OnlineSlam, ProjectedDetection};

// Dataset I/O
pub use io::{Dataset, DetectionRow};
