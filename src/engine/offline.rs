//! Offline batch variant.
//!
//! Replays a recorded dataset in one pass: project every detection
//! into the map frame with the dead-reckoning poses, cluster the
//! projections, match clusters to the surveyed buoys, then solve a
//! single batch least-squares problem over the whole trajectory. No
//! per-event association happens here; the clustering stands in for
//! it.

use log::{info, warn};

use crate::core::types::{Covariance2D, Point2D, Pose2D};
use crate::engine::clustering::{self, ClusterAssignment};
use crate::error::{Error, Result};
use crate::graph::{
    BatchSolver, BearingRangeNoise, Factor, FactorGraph, LmOptimizer, OptimizationSummary,
    OptimizerConfig, PoseNoise, Values, VarKey, VarValue,
};
use crate::io::Dataset;

// Fixed noise model for replayed data, in meters and degrees.
const PRIOR_POSITION_SIGMA: f64 = 1.0;
const PRIOR_HEADING_SIGMA_DEG: f64 = 5.0;
const BUOY_PRIOR_SIGMA: f64 = 2.5;
const ODOMETRY_POSITION_SIGMA: f64 = 0.25;
const ODOMETRY_HEADING_SIGMA_DEG: f64 = 5.0;
const DETECTION_BEARING_SIGMA_DEG: f64 = 5.0;
const DETECTION_RANGE_SIGMA: f64 = 1.0;

/// Two cluster means closer than this merge into one component.
const CLUSTER_MERGE_THRESHOLD: f64 = 2.0;
/// RNG seed for the mixture fit, so replays are repeatable.
const CLUSTER_SEED: u64 = 0;

/// One detection projected into the map frame, kept for post-run
/// analysis alongside its ground-truth projection.
#[derive(Debug, Clone, Copy)]
pub struct ProjectedDetection {
    /// Projection through the dead-reckoning pose.
    pub estimated: Point2D,
    /// Projection through the ground-truth pose.
    pub truth: Point2D,
    /// Index of the pose the detection was made from.
    pub dr_index: usize,
}

/// Output of an offline run.
#[derive(Debug, Clone)]
pub struct OfflineResult {
    /// Posterior trajectory, one pose per dead-reckoning input.
    pub poses: Vec<Pose2D>,
    /// Posterior buoy positions, one per surveyed buoy.
    pub buoys: Vec<Point2D>,
    /// Map-frame detection projections in input order.
    pub projections: Vec<ProjectedDetection>,
    /// Cluster label per projection, `-1` when clustering was skipped.
    pub labels: Vec<i64>,
    /// Fitted cluster centers.
    pub cluster_means: Vec<Point2D>,
    /// Cluster-to-buoy correspondence.
    pub assignment: ClusterAssignment,
    pub summary: OptimizationSummary,
}

/// Batch estimator over a recorded dataset.
pub struct OfflineSlam {
    dataset: Dataset,
    optimizer: OptimizerConfig,
}

impl OfflineSlam {
    pub fn new(dataset: Dataset) -> Self {
        Self::with_optimizer(dataset, OptimizerConfig::default())
    }

    pub fn with_optimizer(dataset: Dataset, optimizer: OptimizerConfig) -> Self {
        Self { dataset, optimizer }
    }

    /// Run the full pipeline: project, cluster, assign, solve.
    pub fn run(&self) -> Result<OfflineResult> {
        let dr = &self.dataset.dr_poses;
        if dr.is_empty() {
            return Err(Error::EmptyGraph);
        }
        info!(
            "offline run over {} pose(s), {} detection(s), {} buoy(s)",
            dr.len(),
            self.dataset.detections.len(),
            self.dataset.buoys.len()
        );

        let projections = self.project_detections();
        let (labels, cluster_means, assignment) = self.cluster_and_assign(&projections)?;

        let (graph, initial) = self.build_graph(&projections, &labels, &assignment)?;
        let (values, summary) = LmOptimizer::new(self.optimizer.clone()).solve(&graph, &initial)?;
        info!(
            "offline solve finished after {} iteration(s), error {:.3e} -> {:.3e}",
            summary.iterations, summary.initial_error, summary.final_error
        );

        let poses = dr
            .iter()
            .enumerate()
            .map(|(i, pose)| values.pose(VarKey::Pose(i as u32)).unwrap_or(*pose))
            .collect();
        let buoys = self
            .dataset
            .buoys
            .iter()
            .enumerate()
            .map(|(j, prior)| values.point(VarKey::Buoy(j as u32)).unwrap_or(*prior))
            .collect();

        Ok(OfflineResult {
            poses,
            buoys,
            projections,
            labels,
            cluster_means,
            assignment,
            summary,
        })
    }

    /// Project relative detections into the map frame through both the
    /// dead-reckoning and the ground-truth pose at their index.
    fn project_detections(&self) -> Vec<ProjectedDetection> {
        let mut projections = Vec::with_capacity(self.dataset.detections.len());
        for detection in &self.dataset.detections {
            let (Some(dr), Some(gt)) = (
                self.dataset.dr_poses.get(detection.dr_index),
                self.dataset.gt_poses.get(detection.dr_index),
            ) else {
                warn!(
                    "detection references pose {} outside the trajectory, skipping",
                    detection.dr_index
                );
                continue;
            };
            projections.push(ProjectedDetection {
                estimated: dr.transform_point(&detection.relative),
                truth: gt.transform_point(&detection.relative),
                dr_index: detection.dr_index,
            });
        }
        projections
    }

    fn cluster_and_assign(
        &self,
        projections: &[ProjectedDetection],
    ) -> Result<(Vec<i64>, Vec<Point2D>, ClusterAssignment)> {
        let buoys = &self.dataset.buoys;
        if projections.is_empty() || buoys.is_empty() {
            if !projections.is_empty() {
                warn!("no surveyed buoys, detections will not constrain the solve");
            }
            let assignment = ClusterAssignment {
                buoy_to_cluster: vec![-1; buoys.len()],
                cluster_to_buoy: Vec::new(),
            };
            return Ok((vec![-1; projections.len()], Vec::new(), assignment));
        }

        let locations: Vec<Point2D> = projections.iter().map(|p| p.estimated).collect();
        let model = clustering::fit_with_reduction(
            &locations,
            buoys.len(),
            CLUSTER_MERGE_THRESHOLD,
            CLUSTER_SEED,
        )?;
        let labels = model
            .classify_all(&locations)?
            .into_iter()
            .map(|label| label as i64)
            .collect();
        let assignment = clustering::assign_clusters(buoys, &model.means);
        info!(
            "clustered {} detection(s) into {} group(s)",
            locations.len(),
            model.components()
        );
        Ok((labels, model.means, assignment))
    }

    /// Static graph over the whole trajectory: a prior on the first
    /// pose, odometry between consecutive poses, a prior per buoy, and
    /// a bearing-range observation per detection whose cluster matched
    /// a buoy.
    fn build_graph(
        &self,
        projections: &[ProjectedDetection],
        labels: &[i64],
        assignment: &ClusterAssignment,
    ) -> Result<(FactorGraph, Values)> {
        let dr = &self.dataset.dr_poses;
        let mut graph = FactorGraph::new();
        let mut initial = Values::new();

        graph.add(Factor::pose_prior(
            VarKey::Pose(0),
            dr[0],
            PoseNoise::new(
                PRIOR_POSITION_SIGMA,
                PRIOR_POSITION_SIGMA,
                PRIOR_HEADING_SIGMA_DEG.to_radians(),
            ),
        ));
        for (i, pose) in dr.iter().enumerate() {
            initial.insert(VarKey::Pose(i as u32), VarValue::Pose(*pose));
        }
        let odometry_noise = PoseNoise::new(
            ODOMETRY_POSITION_SIGMA,
            ODOMETRY_POSITION_SIGMA,
            ODOMETRY_HEADING_SIGMA_DEG.to_radians(),
        );
        for i in 1..dr.len() {
            graph.add(Factor::between(
                VarKey::Pose((i - 1) as u32),
                VarKey::Pose(i as u32),
                dr[i - 1].between(&dr[i]),
                odometry_noise,
            ));
        }

        for (j, prior) in self.dataset.buoys.iter().enumerate() {
            let key = VarKey::Buoy(j as u32);
            graph.add(Factor::point_prior(
                key,
                *prior,
                Covariance2D::isotropic(BUOY_PRIOR_SIGMA),
            )?);
            initial.insert(key, VarValue::Point(*prior));
        }

        let detection_noise = BearingRangeNoise::new(
            DETECTION_BEARING_SIGMA_DEG.to_radians(),
            DETECTION_RANGE_SIGMA,
        );
        let mut constrained = 0usize;
        for (projection, &label) in projections.iter().zip(labels) {
            if label < 0 {
                continue;
            }
            let Some(&buoy) = assignment.cluster_to_buoy.get(label as usize) else {
                continue;
            };
            if buoy < 0 {
                continue;
            }
            let pose = dr[projection.dr_index];
            graph.add(Factor::bearing_range(
                VarKey::Pose(projection.dr_index as u32),
                VarKey::Buoy(buoy as u32),
                pose.bearing_to(&projection.estimated),
                pose.range_to(&projection.estimated),
                detection_noise,
            ));
            constrained += 1;
        }
        if constrained < projections.len() {
            info!(
                "{} of {} detection(s) matched a buoy",
                constrained,
                projections.len()
            );
        }

        Ok((graph, initial))
    }
}
