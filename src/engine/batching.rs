//! Rope-factor batching policies.
//!
//! Rope detections produce priors and bearing-range factors that are
//! not always committed in the update that created them. A batching
//! policy buffers staged items and decides, once per drained event,
//! which of them are released into the graph. Exactly one policy is
//! active per engine, resolved from [`BatchingConfig`] by precedence:
//! swath over line-change over fixed-count over immediate.
//!
//! Every policy keeps the same invariant: an item staged once is
//! released at most once and never duplicated. The swath policy is
//! the only one that drops items (see [`SwathPolicy`]).

use std::time::{Duration, Instant};

use log::debug;

use crate::config::{BatchPolicyKind, BatchingConfig};
use crate::core::types::{Covariance2D, Point2D};
use crate::graph::{Factor, VarKey};

/// A staged point prior, kept in raw form until it is released.
#[derive(Debug, Clone, Copy)]
pub struct PriorItem {
    /// Variable the prior attaches to
    pub key: VarKey,
    /// Prior mean
    pub center: Point2D,
    /// Prior covariance
    pub covariance: Covariance2D,
}

/// Items a policy released for commitment, in stage order.
#[derive(Debug, Clone, Default)]
pub struct Flushed {
    /// Priors to turn into prior factors
    pub priors: Vec<PriorItem>,
    /// Measurement factors
    pub factors: Vec<Factor>,
}

impl Flushed {
    /// Whether nothing was released.
    pub fn is_empty(&self) -> bool {
        self.priors.is_empty() && self.factors.is_empty()
    }
}

/// Where in the mission an item is being staged.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageContext {
    /// Swath containing the event's sequence id, if any
    pub swath: Option<usize>,
}

/// Per-event state the flush decision sees.
///
/// Built once per drained event, after the event's own items were
/// staged.
#[derive(Debug, Clone, Copy)]
pub struct FlushContext {
    /// Swath whose maximum sequence id the event carried, if any
    pub completed_swath: Option<usize>,
    /// Rope index associated with this event's rope detection: `-1`
    /// for a naive detection with no rope identity, `None` when the
    /// event carried no rope detection
    pub rope_line: Option<i64>,
    /// Event arrival time, drives the line-change timeout
    pub now: Instant,
}

impl FlushContext {
    /// Context for an event with no rope detection and no swath
    /// boundary.
    pub fn quiet(now: Instant) -> Self {
        Self {
            completed_swath: None,
            rope_line: None,
            now,
        }
    }
}

/// One batching strategy, selected once at engine construction.
pub trait BatchingPolicy {
    /// Short policy name for logs.
    fn name(&self) -> &'static str;

    /// Whether buoy bearing-range factors are staged too.
    ///
    /// Only the swath policy defers buoy factors; the others commit
    /// them in the update that produced them.
    fn defers_buoy_factors(&self) -> bool {
        false
    }

    /// Count one rope detection toward count-based triggers.
    fn note_rope_detection(&mut self) {}

    /// Buffer a measurement factor.
    fn stage_factor(&mut self, factor: Factor, ctx: &StageContext);

    /// Buffer a point prior.
    fn stage_prior(&mut self, prior: PriorItem, ctx: &StageContext);

    /// Decide what is released after the current event staged its
    /// items.
    fn drain_due(&mut self, ctx: &FlushContext) -> Flushed;

    /// Unconditionally release everything still buffered.
    fn flush_all(&mut self) -> Flushed;

    /// Number of items currently buffered.
    fn pending(&self) -> usize;
}

/// Build the active policy for a batching configuration.
pub fn build_policy(config: &BatchingConfig) -> Box<dyn BatchingPolicy + Send> {
    match config.policy() {
        BatchPolicyKind::Swath => Box::new(SwathPolicy::new(config.swath_seq_ids.len())),
        BatchPolicyKind::LineChange => Box::new(LineChangePolicy::new(Duration::from_secs_f64(
            config.line_timeout_secs.max(0.0),
        ))),
        BatchPolicyKind::FixedCount => {
            Box::new(FixedCountPolicy::new(config.rope_batch_size as usize))
        }
        BatchPolicyKind::Immediate => Box::new(ImmediatePolicy::new()),
    }
}

/// Commit everything in the step that produced it.
#[derive(Debug, Default)]
pub struct ImmediatePolicy {
    factors: Vec<Factor>,
    priors: Vec<PriorItem>,
}

impl ImmediatePolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchingPolicy for ImmediatePolicy {
    fn name(&self) -> &'static str {
        "immediate"
    }

    fn stage_factor(&mut self, factor: Factor, _ctx: &StageContext) {
        self.factors.push(factor);
    }

    fn stage_prior(&mut self, prior: PriorItem, _ctx: &StageContext) {
        self.priors.push(prior);
    }

    fn drain_due(&mut self, _ctx: &FlushContext) -> Flushed {
        self.flush_all()
    }

    fn flush_all(&mut self) -> Flushed {
        Flushed {
            priors: std::mem::take(&mut self.priors),
            factors: std::mem::take(&mut self.factors),
        }
    }

    fn pending(&self) -> usize {
        self.factors.len() + self.priors.len()
    }
}

/// Buffer until a configured number of rope detections accumulate,
/// then release the whole batch.
#[derive(Debug)]
pub struct FixedCountPolicy {
    batch_size: usize,
    detections: usize,
    factors: Vec<Factor>,
    priors: Vec<PriorItem>,
}

impl FixedCountPolicy {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            detections: 0,
            factors: Vec::new(),
            priors: Vec::new(),
        }
    }
}

impl BatchingPolicy for FixedCountPolicy {
    fn name(&self) -> &'static str {
        "fixed-count"
    }

    fn note_rope_detection(&mut self) {
        self.detections += 1;
    }

    fn stage_factor(&mut self, factor: Factor, _ctx: &StageContext) {
        self.factors.push(factor);
    }

    fn stage_prior(&mut self, prior: PriorItem, _ctx: &StageContext) {
        self.priors.push(prior);
    }

    fn drain_due(&mut self, _ctx: &FlushContext) -> Flushed {
        if self.detections < self.batch_size {
            return Flushed::default();
        }
        debug!(
            "rope batch full after {} detections, releasing {} staged items",
            self.detections,
            self.pending()
        );
        self.flush_all()
    }

    fn flush_all(&mut self) -> Flushed {
        self.detections = 0;
        Flushed {
            priors: std::mem::take(&mut self.priors),
            factors: std::mem::take(&mut self.factors),
        }
    }

    fn pending(&self) -> usize {
        self.factors.len() + self.priors.len()
    }
}

/// Buffer while consecutive detections stay on the same rope.
///
/// Two triggers release the buffer, checked in order:
/// - the associated rope changed since the previous rope detection:
///   everything but the newest staged item of each kind is released,
///   the newest is held back for the next batch;
/// - the configured timeout elapsed since the previous rope
///   detection: everything is released, nothing held back.
///
/// A naive detection (rope index `-1`) counts as a line change every
/// time, since it carries no rope identity to stay on.
#[derive(Debug)]
pub struct LineChangePolicy {
    timeout: Duration,
    factors: Vec<Factor>,
    priors: Vec<PriorItem>,
    last_line: Option<i64>,
    last_seen: Option<Instant>,
}

impl LineChangePolicy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            factors: Vec::new(),
            priors: Vec::new(),
            last_line: None,
            last_seen: None,
        }
    }
}

impl BatchingPolicy for LineChangePolicy {
    fn name(&self) -> &'static str {
        "line-change"
    }

    fn stage_factor(&mut self, factor: Factor, _ctx: &StageContext) {
        self.factors.push(factor);
    }

    fn stage_prior(&mut self, prior: PriorItem, _ctx: &StageContext) {
        self.priors.push(prior);
    }

    fn drain_due(&mut self, ctx: &FlushContext) -> Flushed {
        let Some(line) = ctx.rope_line else {
            return Flushed::default();
        };

        // Both conditions look at the previous rope detection, so
        // they are evaluated before the tracking state is advanced.
        let changed = self.last_seen.is_some() && (line == -1 || self.last_line != Some(line));
        let timed_out = self
            .last_seen
            .is_some_and(|seen| ctx.now.duration_since(seen) >= self.timeout);

        self.last_line = Some(line);
        self.last_seen = Some(ctx.now);

        if changed {
            let flushed = Flushed {
                priors: all_but_newest(&mut self.priors),
                factors: all_but_newest(&mut self.factors),
            };
            debug!(
                "rope line changed to {}, releasing {} staged factors",
                line,
                flushed.factors.len()
            );
            flushed
        } else if timed_out {
            debug!(
                "rope batch timeout, releasing {} staged items",
                self.pending()
            );
            self.flush_all()
        } else {
            Flushed::default()
        }
    }

    fn flush_all(&mut self) -> Flushed {
        Flushed {
            priors: std::mem::take(&mut self.priors),
            factors: std::mem::take(&mut self.factors),
        }
    }

    fn pending(&self) -> usize {
        self.factors.len() + self.priors.len()
    }
}

/// Drain every item except the most recently staged one.
fn all_but_newest<T>(items: &mut Vec<T>) -> Vec<T> {
    if items.len() <= 1 {
        return Vec::new();
    }
    let keep_from = items.len() - 1;
    items.drain(..keep_from).collect()
}

/// Buffer per configured swath, release a swath's buffer when its
/// maximum sequence id arrives.
///
/// Two deliberate policy decisions:
/// - items staged while the vehicle is outside every swath have no
///   buffer to land in and are dropped (logged, never committed);
/// - on release only the most recently staged prior of the swath is
///   committed, earlier priors of the same swath are dropped.
#[derive(Debug)]
pub struct SwathPolicy {
    factors: Vec<Vec<Factor>>,
    priors: Vec<Vec<PriorItem>>,
}

impl SwathPolicy {
    pub fn new(swaths: usize) -> Self {
        Self {
            factors: (0..swaths).map(|_| Vec::new()).collect(),
            priors: (0..swaths).map(|_| Vec::new()).collect(),
        }
    }
}

impl BatchingPolicy for SwathPolicy {
    fn name(&self) -> &'static str {
        "swath"
    }

    fn defers_buoy_factors(&self) -> bool {
        true
    }

    fn stage_factor(&mut self, factor: Factor, ctx: &StageContext) {
        match ctx.swath {
            Some(swath) if swath < self.factors.len() => self.factors[swath].push(factor),
            _ => debug!("dropping factor staged outside any swath"),
        }
    }

    fn stage_prior(&mut self, prior: PriorItem, ctx: &StageContext) {
        match ctx.swath {
            Some(swath) if swath < self.priors.len() => self.priors[swath].push(prior),
            _ => debug!("dropping prior staged outside any swath"),
        }
    }

    fn drain_due(&mut self, ctx: &FlushContext) -> Flushed {
        let Some(swath) = ctx.completed_swath else {
            return Flushed::default();
        };
        if swath >= self.factors.len() {
            return Flushed::default();
        }

        let factors = std::mem::take(&mut self.factors[swath]);
        let mut staged = std::mem::take(&mut self.priors[swath]);
        let priors: Vec<PriorItem> = staged.pop().into_iter().collect();
        debug!(
            "swath {} complete, releasing {} factors and {} of {} priors",
            swath,
            factors.len(),
            priors.len(),
            staged.len() + priors.len()
        );
        Flushed { priors, factors }
    }

    fn flush_all(&mut self) -> Flushed {
        let mut flushed = Flushed::default();
        for factors in &mut self.factors {
            flushed.factors.append(factors);
        }
        for staged in &mut self.priors {
            if let Some(last) = staged.pop() {
                flushed.priors.push(last);
            }
            staged.clear();
        }
        flushed
    }

    fn pending(&self) -> usize {
        let factors: usize = self.factors.iter().map(Vec::len).sum();
        let priors: usize = self.priors.iter().map(Vec::len).sum();
        factors + priors
    }
}
