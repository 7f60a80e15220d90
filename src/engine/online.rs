//! Online incremental SLAM engine.
//!
//! Consumes a stream of odometry ticks, each carrying a dead-reckoning
//! pose, a ground-truth pose, and at most one sonar detection. Every
//! drained tick grows the factor graph by one pose node and re-solves
//! it incrementally:
//!
//! ```text
//!   add_pose ──► FIFO queue ──► drain (single flight)
//!                                 │ odometry between-factor
//!                                 │ buoy / rope association
//!                                 │ batching policy stage + release
//!                                 ▼
//!                        incremental solver ──► fresh estimate
//! ```
//!
//! Producers may enqueue from any thread without blocking; exactly one
//! drain runs at a time and owns every piece of mutable state while it
//! does. A drain keeps going until it observes the queue empty, so
//! events enqueued mid-drain are handled in the same pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::association::{self, AssociationOutcome, CandidateDistribution};
use crate::config::SlamConfig;
use crate::core::types::{Attitude, Covariance2D, Point2D, Pose2D, PoseEvent};
use crate::engine::batching::{self, BatchingPolicy, FlushContext, PriorItem, StageContext};
use crate::error::{Error, Result};
use crate::graph::{
    BearingRangeNoise, Factor, GraphDelta, IncrementalLm, IncrementalSolver, OptimizationSummary,
    PoseNoise, VarKey, VarValue,
};
use crate::landmarks::{BuoyMap, Rope, RopeMap, RopeSpec};
use crate::metrics::{
    BuoyAssociationRecord, DaAuditRecord, DetectionState, UpdateLog, UpdateRecord,
};

/// Positional variance assumed for a landmark the solver has not
/// estimated yet.
const UNSOLVED_LANDMARK_VARIANCE: f64 = 0.001;

/// Online landmark SLAM over a live event stream.
///
/// The engine is created idle; [`OnlineSlam::set_buoys`] and
/// [`OnlineSlam::set_ropes`] register the landmark field, the first
/// [`OnlineSlam::add_pose`] seeds the graph, and every later call
/// enqueues and drains. All methods take `&self`; the engine is safe
/// to share across producer threads.
pub struct OnlineSlam {
    config: SlamConfig,
    queue_tx: Sender<PoseEvent>,
    queue_rx: Receiver<PoseEvent>,
    state: Mutex<EngineState>,
    seeded: AtomicBool,
}

impl OnlineSlam {
    /// Create an engine backed by the default incremental smoother.
    pub fn new(config: SlamConfig) -> Self {
        let solver = Box::new(IncrementalLm::new(config.optimizer.clone()));
        Self::with_solver(solver, config)
    }

    /// Create an engine around a caller-supplied smoother.
    pub fn with_solver(solver: Box<dyn IncrementalSolver + Send>, config: SlamConfig) -> Self {
        let config = config.validated();
        let policy = batching::build_policy(&config.batching);
        info!("online engine using {} batching", policy.name());
        let (queue_tx, queue_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            queue_tx,
            queue_rx,
            state: Mutex::new(EngineState::new(solver, policy)),
            seeded: AtomicBool::new(false),
        }
    }

    /// Register the buoy field.
    ///
    /// Stages one prior and one initial estimate per buoy; both commit
    /// with the next update. Buoy identity is immutable, calling twice
    /// is an error.
    pub fn set_buoys(&self, priors: Vec<Point2D>) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(existing) = &state.buoys {
            return Err(Error::BuoysAlreadySet(existing.len()));
        }

        let map = BuoyMap::new(priors)?;
        let sigma = self.config.noise.buoy_prior_sigma;
        for (index, prior) in map.priors().iter().enumerate() {
            let key = VarKey::Buoy(index as u32);
            state
                .staged
                .add_factor(Factor::point_prior(key, *prior, Covariance2D::isotropic(sigma))?);
            state.staged.insert(key, VarValue::Point(*prior));
        }

        info!("buoy field set: {} buoys", map.len());
        state.buoys = Some(map);
        Ok(())
    }

    /// Register rope geometry.
    ///
    /// Index-form specs resolve against the buoy field, so buoys must
    /// be set first. In aggregate mode (individual detections off)
    /// every rope also gets a shared point variable anchored at its
    /// center.
    pub fn set_ropes(&self, specs: Vec<RopeSpec>) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(existing) = &state.ropes {
            return Err(Error::RopesAlreadySet(existing.len()));
        }

        let map = RopeMap::new(
            specs,
            self.config.noise.rope_along_sigma,
            self.config.noise.rope_cross_sigma,
            state.buoys.as_ref(),
        )?;

        if !self.config.ropes.individual_detections {
            for (index, rope) in map.ropes().iter().enumerate() {
                let key = VarKey::Rope(index as u32);
                state
                    .staged
                    .add_factor(Factor::point_prior(key, rope.center, rope.covariance)?);
                state.staged.insert(key, VarValue::Point(rope.center));
            }
        }

        info!("rope geometry set: {} ropes", map.len());
        state.ropes = Some(map);
        Ok(())
    }

    /// Feed one odometry tick.
    ///
    /// The first call seeds the graph with a prior on the
    /// dead-reckoning pose and returns without solving. Every later
    /// call enqueues the tick and drains the queue; when another drain
    /// is already running the tick is left for it to pick up.
    pub fn add_pose(&self, event: PoseEvent) -> Result<()> {
        if self
            .seeded
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let mut state = self.state.lock();
            state.seed(event, &self.config);
            return Ok(());
        }

        // The receiver lives inside self, the send cannot fail while
        // the engine is alive.
        self.queue_tx.send(event).ok();
        self.drain()
    }

    /// Commit everything the batching policy still holds and re-solve.
    ///
    /// End-of-mission call: deferred rope constraints land in the
    /// final estimate even when their flush trigger never fired. Any
    /// still-queued events are drained first.
    pub fn flush_pending(&self) -> Result<OptimizationSummary> {
        let mut state = self.state.lock();
        while let Ok(event) = self.queue_rx.try_recv() {
            state.process(event, &self.config)?;
        }
        state.commit_pending()
    }

    /// Solved pose for a pose index, if it is in the current estimate.
    pub fn pose_estimate(&self, index: u32) -> Option<Pose2D> {
        self.state.lock().solver.estimate().pose(VarKey::Pose(index))
    }

    /// Solved position of a buoy, if it is in the current estimate.
    pub fn buoy_estimate(&self, index: u32) -> Option<Point2D> {
        self.state.lock().solver.estimate().point(VarKey::Buoy(index))
    }

    /// Solved position of a shared rope variable (aggregate mode).
    pub fn rope_estimate(&self, index: u32) -> Option<Point2D> {
        self.state.lock().solver.estimate().point(VarKey::Rope(index))
    }

    /// Mean of the buoy prior positions, the naive rope-prior center.
    /// `None` until buoys are registered.
    pub fn buoy_average(&self) -> Option<Point2D> {
        self.state.lock().buoys.as_ref().map(BuoyMap::average)
    }

    /// Solved position of an ephemeral detection variable.
    pub fn detection_estimate(&self, index: u32) -> Option<Point2D> {
        self.state
            .lock()
            .solver
            .estimate()
            .point(VarKey::Detection(index))
    }

    /// Estimate of the newest pose after each update, in event order.
    pub fn online_poses(&self) -> Vec<Pose2D> {
        self.state.lock().online_poses.clone()
    }

    /// Raw dead-reckoning poses, one per ingested event.
    pub fn dead_reckoning_poses(&self) -> Vec<Pose2D> {
        self.state.lock().dr_poses.clone()
    }

    /// Raw ground-truth poses, one per ingested event.
    pub fn ground_truth_poses(&self) -> Vec<Pose2D> {
        self.state.lock().gt_poses.clone()
    }

    /// Sensor tag per ingested event.
    pub fn sensor_tags(&self) -> Vec<String> {
        self.state.lock().tags.clone()
    }

    /// Roll/pitch/depth side channel per ingested event.
    ///
    /// Carried through unmodified; the estimated state stays planar.
    pub fn attitudes(&self) -> Vec<Option<Attitude>> {
        self.state.lock().attitudes.clone()
    }

    /// Gated association outcome per buoy detection.
    pub fn buoy_associations(&self) -> Vec<BuoyAssociationRecord> {
        self.state.lock().buoy_records.clone()
    }

    /// Ground-truth audit per automatic buoy association.
    pub fn association_audits(&self) -> Vec<DaAuditRecord> {
        self.state.lock().audits.clone()
    }

    /// Rope index per detection variable, `-1` for naive detections.
    pub fn rope_associations(&self) -> Vec<(u32, i64)> {
        self.state.lock().rope_associations.clone()
    }

    /// Per-update performance counters.
    pub fn update_log(&self) -> UpdateLog {
        self.state.lock().updates.clone()
    }

    /// Rope center and covariance rows for export.
    pub fn rope_infos(&self) -> Vec<[f64; 6]> {
        self.state
            .lock()
            .ropes
            .as_ref()
            .map(RopeMap::info_rows)
            .unwrap_or_default()
    }

    /// Number of pose nodes created so far (including the seed).
    pub fn pose_count(&self) -> u32 {
        self.state.lock().next_pose
    }

    /// Number of detection variables created so far.
    pub fn detection_count(&self) -> u32 {
        self.state.lock().next_detection
    }

    /// Number of committed factors.
    pub fn factor_count(&self) -> usize {
        self.state.lock().solver.factor_count()
    }

    /// The validated configuration the engine runs with.
    pub fn config(&self) -> &SlamConfig {
        &self.config
    }

    /// Drain the queue exhaustively.
    ///
    /// Single flight: whoever holds the state lock finishes the whole
    /// queue; concurrent callers leave their events queued and return.
    /// An error aborts the drain mid-queue, the remaining events stay
    /// queued for the next drain.
    fn drain(&self) -> Result<()> {
        let Some(mut state) = self.state.try_lock() else {
            return Ok(());
        };
        while let Ok(event) = self.queue_rx.try_recv() {
            state.process(event, &self.config)?;
        }
        Ok(())
    }
}

/// Everything a drain mutates, owned by one lock.
struct EngineState {
    solver: Box<dyn IncrementalSolver + Send>,
    policy: Box<dyn BatchingPolicy + Send>,
    buoys: Option<BuoyMap>,
    ropes: Option<RopeMap>,
    /// Factors and initial values accumulated between updates. Setup
    /// priors and the seed land here before the first event commits
    /// them.
    staged: GraphDelta,
    next_pose: u32,
    next_detection: u32,
    dr_poses: Vec<Pose2D>,
    gt_poses: Vec<Pose2D>,
    tags: Vec<String>,
    attitudes: Vec<Option<Attitude>>,
    online_poses: Vec<Pose2D>,
    rope_associations: Vec<(u32, i64)>,
    buoy_records: Vec<BuoyAssociationRecord>,
    audits: Vec<DaAuditRecord>,
    updates: UpdateLog,
}

/// Per-detection working set shared by the buoy and rope branches.
struct DetectionFrame<'a> {
    config: &'a SlamConfig,
    pose_index: u32,
    /// Detection location implied by the predicted pose
    estimated_location: Point2D,
    /// Detection location implied by the ground-truth pose
    true_location: Point2D,
    bearing: f64,
    range: f64,
    seq_id: Option<i64>,
    /// Positional marginal of the previous pose, from the last solve
    pose_covariance: Option<Covariance2D>,
    stage: StageContext,
}

impl EngineState {
    fn new(
        solver: Box<dyn IncrementalSolver + Send>,
        policy: Box<dyn BatchingPolicy + Send>,
    ) -> Self {
        Self {
            solver,
            policy,
            buoys: None,
            ropes: None,
            staged: GraphDelta::new(),
            next_pose: 0,
            next_detection: 0,
            dr_poses: Vec::new(),
            gt_poses: Vec::new(),
            tags: Vec::new(),
            attitudes: Vec::new(),
            online_poses: Vec::new(),
            rope_associations: Vec::new(),
            buoy_records: Vec::new(),
            audits: Vec::new(),
            updates: UpdateLog::new(),
        }
    }

    /// Seed the graph at the first dead-reckoning pose. No solve runs;
    /// the prior and initial commit with the first drained event.
    fn seed(&mut self, event: PoseEvent, config: &SlamConfig) {
        info!(
            "seeding graph at dead-reckoning pose ({:.2}, {:.2}, {:.3})",
            event.dr.x, event.dr.y, event.dr.theta
        );
        self.staged.add_factor(Factor::pose_prior(
            VarKey::Pose(0),
            event.dr,
            PoseNoise::planar(
                config.noise.prior_position_sigma,
                config.noise.prior_heading_sigma(),
            ),
        ));
        self.staged.insert(VarKey::Pose(0), VarValue::Pose(event.dr));
        self.online_poses.push(event.dr);
        self.record_pose(&event);
        self.next_pose = 1;
    }

    /// Handle one drained event end to end.
    fn process(&mut self, event: PoseEvent, config: &SlamConfig) -> Result<()> {
        let arrived = Instant::now();
        let pose_index = self.next_pose;
        let prev_index = pose_index - 1;

        // Relative odometry from the raw dead-reckoning chain; the
        // initial estimate composes it onto the solved previous pose.
        let prev_dr = self.dr_poses[self.dr_poses.len() - 1];
        let odometry = prev_dr.between(&event.dr);
        let predicted = self.resolved_pose(prev_index).compose(&odometry);

        self.record_pose(&event);

        let mut delta = std::mem::take(&mut self.staged);
        delta.insert(VarKey::Pose(pose_index), VarValue::Pose(predicted));
        delta.add_factor(Factor::between(
            VarKey::Pose(prev_index),
            VarKey::Pose(pose_index),
            odometry,
            PoseNoise::planar(
                config.noise.odometry_position_sigma,
                config.noise.odometry_heading_sigma(),
            ),
        ));
        self.next_pose += 1;

        // Marginal of the previous pose from the last solve; None
        // until something constrains it. Association degrades from
        // likelihood to plain Euclidean without it.
        let pose_covariance = self.solver.marginal_covariance(VarKey::Pose(prev_index)).ok();

        let swath = event
            .seq_id
            .and_then(|seq| config.batching.swath_containing(seq));
        let completed_swath = event
            .seq_id
            .and_then(|seq| config.batching.swath_completed_by(seq));

        let mut detection_state = DetectionState::None;
        let mut rope_line = None;

        if let Some(detection) = event.detection {
            let relative = Point2D::new(detection.dx, detection.dy);
            let estimated_location = predicted.transform_point(&relative);
            let frame = DetectionFrame {
                config,
                pose_index,
                estimated_location,
                true_location: event.gt.transform_point(&relative),
                bearing: predicted.bearing_to(&estimated_location),
                range: predicted.range_to(&estimated_location),
                seq_id: event.seq_id,
                pose_covariance,
                stage: StageContext { swath },
            };

            if detection.kind.is_line_feature() {
                detection_state = DetectionState::Rope;
                rope_line = Some(self.process_rope(&frame, &mut delta)?);
            } else {
                detection_state = DetectionState::Buoy;
                self.process_buoy(&frame, &mut delta)?;
            }
        }

        // Release whatever the batching policy decides is due now that
        // the event's own items are staged.
        let flushed = self.policy.drain_due(&FlushContext {
            completed_swath,
            rope_line,
            now: arrived,
        });
        for prior in flushed.priors {
            delta.add_factor(Factor::point_prior(prior.key, prior.center, prior.covariance)?);
        }
        for factor in flushed.factors {
            delta.add_factor(factor);
        }

        let priors_added = delta
            .factors
            .iter()
            .filter(|f| matches!(f, Factor::PointPrior { .. }))
            .count();
        let factors_added = delta.factors.len() - priors_added;

        let solve_started = Instant::now();
        let summary = self.solver.update(delta)?;
        let solve_seconds = solve_started.elapsed().as_secs_f64();
        if !summary.converged {
            warn!(
                "update x{} stopped without convergence: {:?} after {} iterations",
                pose_index, summary.termination_reason, summary.iterations
            );
        }

        let solved = self
            .solver
            .estimate()
            .pose(VarKey::Pose(pose_index))
            .unwrap_or(predicted);
        self.online_poses.push(solved);

        self.updates.record(UpdateRecord {
            solve_seconds,
            factor_count: self.solver.factor_count(),
            detection: detection_state,
            factors_added,
            priors_added,
        });

        if config.ropes.update_priors {
            self.refresh_rope_priors()?;
        }

        debug!(
            "update x{} done in {:.1} ms ({} factors total)",
            pose_index,
            solve_seconds * 1e3,
            self.solver.factor_count()
        );
        Ok(())
    }

    /// Associate a buoy detection and attach its constraint.
    fn process_buoy(&mut self, frame: &DetectionFrame<'_>, delta: &mut GraphDelta) -> Result<()> {
        let Some(priors) = self.buoys.as_ref().map(|b| b.priors().to_vec()) else {
            warn!(
                "buoy detection at x{} before buoy setup, ignoring",
                frame.pose_index
            );
            return Ok(());
        };

        let association = &frame.config.association;
        let target = if association.manual_associations {
            let target = frame
                .seq_id
                .and_then(|seq| {
                    association::manual_lookup(
                        &association.manual_buoy_seq_ids,
                        &association.manual_buoy_indices,
                        seq,
                    )
                })
                .filter(|&t| t >= 0 && (t as usize) < priors.len())
                .unwrap_or(-1);

            self.buoy_records.push(BuoyAssociationRecord {
                pose: frame.pose_index,
                target,
                euclidean: 0.0,
                mahalanobis: 0.0,
            });
            target
        } else {
            let prior_candidates: Vec<CandidateDistribution> = priors
                .iter()
                .map(|p| {
                    CandidateDistribution::point(
                        *p,
                        Covariance2D::diagonal(UNSOLVED_LANDMARK_VARIANCE, UNSOLVED_LANDMARK_VARIANCE),
                    )
                })
                .collect();

            let outcome = match frame.pose_covariance {
                Some(covariance) => {
                    let candidates = self.buoy_candidates(&priors);
                    association::associate_most_likely(
                        &frame.estimated_location,
                        &covariance,
                        &candidates,
                    )?
                }
                None => association::associate_nearest(&frame.estimated_location, &prior_candidates)?,
            };
            let Some(outcome) = outcome else {
                return Ok(());
            };

            let raw = outcome.index as i64;
            let valid = association::passes_gate(association, &outcome);
            let target = if valid { raw } else { -1 };
            self.buoy_records.push(BuoyAssociationRecord {
                pose: frame.pose_index,
                target,
                euclidean: outcome.euclidean,
                mahalanobis: outcome.mahalanobis,
            });

            // Audit the raw winner against the association the
            // ground-truth pose would have produced.
            if let Some(truth) =
                association::associate_nearest(&frame.true_location, &prior_candidates)?
            {
                self.audits.push(DaAuditRecord {
                    pose: frame.pose_index,
                    matched: raw == truth.index as i64,
                    estimated: raw,
                    truth: truth.index as i64,
                    euclidean: outcome.euclidean,
                    true_euclidean: truth.euclidean,
                    estimated_location: frame.estimated_location,
                    true_location: frame.true_location,
                });
            }
            target
        };

        if target < 0 {
            debug!("buoy detection at x{} rejected", frame.pose_index);
            return Ok(());
        }

        let factor = Factor::bearing_range(
            VarKey::Pose(frame.pose_index),
            VarKey::Buoy(target as u32),
            frame.bearing,
            frame.range,
            BearingRangeNoise::new(
                frame.config.noise.buoy_detection_bearing_sigma(),
                frame.config.noise.buoy_detection_range_sigma,
            ),
        );
        if self.policy.defers_buoy_factors() {
            self.policy.stage_factor(factor, &frame.stage);
        } else {
            delta.add_factor(factor);
        }
        Ok(())
    }

    /// Create a detection variable for a rope return, associate it,
    /// and stage its constraints with the batching policy.
    ///
    /// Returns the associated rope index, `-1` when no rope geometry
    /// exists yet (naive mode).
    fn process_rope(&mut self, frame: &DetectionFrame<'_>, delta: &mut GraphDelta) -> Result<i64> {
        self.policy.note_rope_detection();

        let detection_index = self.next_detection;
        self.next_detection += 1;
        let key = VarKey::Detection(detection_index);

        // The variable and its initial estimate always commit with
        // this update; only its constraints are subject to batching.
        delta.insert(key, VarValue::Point(frame.estimated_location));

        let ropes: Vec<Rope> = self
            .ropes
            .as_ref()
            .map(|r| r.ropes().to_vec())
            .unwrap_or_default();

        let line = if ropes.is_empty() {
            // Naive mode: no rope identity, anchor the detection near
            // the buoy field.
            let center = self
                .buoys
                .as_ref()
                .map(BuoyMap::average)
                .unwrap_or(frame.estimated_location);
            self.policy.stage_prior(
                PriorItem {
                    key,
                    center,
                    covariance: Covariance2D::isotropic(frame.config.noise.rope_naive_prior_sigma),
                },
                &frame.stage,
            );
            -1
        } else {
            let assoc = self.associate_rope(frame, &ropes)?;
            if let Some(rope) = usize::try_from(assoc).ok().and_then(|i| ropes.get(i)) {
                if frame.config.ropes.individual_detections {
                    self.policy.stage_prior(
                        PriorItem {
                            key,
                            center: rope.center,
                            covariance: rope.covariance,
                        },
                        &frame.stage,
                    );
                } else {
                    // Aggregate mode constrains the shared rope
                    // variable instead of a per-detection prior.
                    self.policy.stage_factor(
                        Factor::bearing_range(
                            VarKey::Pose(frame.pose_index),
                            VarKey::Rope(assoc as u32),
                            frame.bearing,
                            frame.range,
                            BearingRangeNoise::new(
                                frame.config.noise.rope_detection_bearing_sigma(),
                                frame.config.noise.rope_detection_range_sigma,
                            ),
                        ),
                        &frame.stage,
                    );
                }
            }
            assoc
        };
        self.rope_associations.push((detection_index, line));

        if frame.config.ropes.use_rope_detections {
            self.policy.stage_factor(
                Factor::bearing_range(
                    VarKey::Pose(frame.pose_index),
                    key,
                    frame.bearing,
                    frame.range,
                    BearingRangeNoise::new(
                        frame.config.noise.rope_detection_bearing_sigma(),
                        frame.config.noise.rope_detection_range_sigma,
                    ),
                ),
                &frame.stage,
            );
        }

        Ok(line)
    }

    /// Rope association in priority order: manual-by-swath, then
    /// likelihood when a pose marginal exists, then Euclidean
    /// point-to-segment.
    fn associate_rope(&self, frame: &DetectionFrame<'_>, ropes: &[Rope]) -> Result<i64> {
        if frame.config.batching.manual_swath_rope_association {
            if let Some(line) = frame
                .stage
                .swath
                .and_then(|s| frame.config.batching.swath_line(s))
            {
                return Ok(line);
            }
        }

        let candidates: Vec<CandidateDistribution> = ropes
            .iter()
            .map(|r| CandidateDistribution::line(r.center, r.covariance, r.start, r.end))
            .collect();

        let outcome: Option<AssociationOutcome> = match frame.pose_covariance {
            Some(covariance) => association::associate_most_likely(
                &frame.estimated_location,
                &covariance,
                &candidates,
            )?,
            None => association::associate_nearest(&frame.estimated_location, &candidates)?,
        };
        Ok(outcome.map(|o| o.index as i64).unwrap_or(-1))
    }

    /// One distribution per buoy: the current estimate with its
    /// marginal when the solver has one, the prior with a tight
    /// fallback covariance otherwise.
    fn buoy_candidates(&mut self, priors: &[Point2D]) -> Vec<CandidateDistribution> {
        let mut candidates = Vec::with_capacity(priors.len());
        for (index, prior) in priors.iter().enumerate() {
            let key = VarKey::Buoy(index as u32);
            let fallback = Covariance2D::diagonal(UNSOLVED_LANDMARK_VARIANCE, UNSOLVED_LANDMARK_VARIANCE);
            let candidate = match self.solver.estimate().point(key) {
                Some(mean) => {
                    let covariance = self.solver.marginal_covariance(key).unwrap_or(fallback);
                    CandidateDistribution::point(mean, covariance)
                }
                None => CandidateDistribution::point(*prior, fallback),
            };
            candidates.push(candidate);
        }
        candidates
    }

    /// Recompute rope geometry from the current buoy estimates and
    /// replace committed detection priors in place.
    fn refresh_rope_priors(&mut self) -> Result<()> {
        if self.ropes.as_ref().is_none_or(RopeMap::is_empty) {
            return Ok(());
        }

        let buoy_count = self.buoys.as_ref().map(BuoyMap::len).unwrap_or(0);
        let mut positions = Vec::with_capacity(buoy_count);
        for index in 0..buoy_count {
            let key = VarKey::Buoy(index as u32);
            let position = self
                .solver
                .estimate()
                .point(key)
                .or_else(|| self.buoys.as_ref().and_then(|b| b.prior(index)))
                .unwrap_or(Point2D::new(0.0, 0.0));
            positions.push(position);
        }

        let ropes: Vec<Rope> = match self.ropes.as_mut() {
            Some(map) => {
                map.refresh(&positions);
                map.ropes().to_vec()
            }
            None => return Ok(()),
        };

        let mut replaced = 0;
        for &(detection, line) in &self.rope_associations {
            let Some(rope) = usize::try_from(line).ok().and_then(|i| ropes.get(i)) else {
                continue;
            };
            replaced += self.solver.replace_point_priors(
                VarKey::Detection(detection),
                rope.center,
                rope.covariance,
            )?;
        }
        if replaced > 0 {
            debug!("refreshed {} rope detection priors", replaced);
        }
        Ok(())
    }

    /// Commit staged setup items plus everything the policy holds.
    fn commit_pending(&mut self) -> Result<OptimizationSummary> {
        let mut delta = std::mem::take(&mut self.staged);
        let flushed = self.policy.flush_all();
        for prior in flushed.priors {
            delta.add_factor(Factor::point_prior(prior.key, prior.center, prior.covariance)?);
        }
        for factor in flushed.factors {
            delta.add_factor(factor);
        }

        if delta.is_empty() {
            debug!("nothing pending to commit");
            return Ok(OptimizationSummary::empty());
        }

        let priors_added = delta
            .factors
            .iter()
            .filter(|f| matches!(f, Factor::PointPrior { .. }))
            .count();
        let factors_added = delta.factors.len() - priors_added;
        info!(
            "final commit: {} factors, {} priors",
            factors_added, priors_added
        );

        let solve_started = Instant::now();
        let summary = self.solver.update(delta)?;
        self.updates.record(UpdateRecord {
            solve_seconds: solve_started.elapsed().as_secs_f64(),
            factor_count: self.solver.factor_count(),
            detection: DetectionState::None,
            factors_added,
            priors_added,
        });
        Ok(summary)
    }

    /// Best available pose for an index: the solved estimate, then a
    /// staged initial not yet committed, then raw dead reckoning.
    fn resolved_pose(&self, index: u32) -> Pose2D {
        let key = VarKey::Pose(index);
        self.solver
            .estimate()
            .pose(key)
            .or_else(|| self.staged.values.pose(key))
            .or_else(|| self.dr_poses.get(index as usize).copied())
            .unwrap_or_else(Pose2D::identity)
    }

    fn record_pose(&mut self, event: &PoseEvent) {
        self.dr_poses.push(event.dr);
        self.gt_poses.push(event.gt);
        self.tags.push(tag_for(event));
        self.attitudes.push(event.attitude);
    }
}

/// Sensor tag recorded per event; untagged events are labeled by
/// whether they carried a detection.
fn tag_for(event: &PoseEvent) -> String {
    match (&event.sensor_tag, event.detection) {
        (Some(tag), _) => tag.clone(),
        (None, Some(_)) => "detection".to_string(),
        (None, None) => "odometry".to_string(),
    }
}
