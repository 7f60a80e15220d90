//! Per-update diagnostics for the online estimator.
//!
//! Two kinds of records accumulate while events stream in:
//! - update records: one per drained event (solve time, graph size,
//!   how many factors and priors the event committed)
//! - association records: one per buoy detection, capturing what data
//!   association decided and how it compares against ground truth
//!
//! Everything here is plain data. The engine appends during a drain;
//! consumers read after the run (or between drains) and export rows.

use crate::core::types::Point2D;

/// What kind of detection an update carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionState {
    /// Odometry only
    None,
    /// Buoy detection
    Buoy,
    /// Rope or pipe detection
    Rope,
}

impl DetectionState {
    /// Numeric code used in exported rows: 0 none, 1 buoy, 2 rope.
    pub fn code(&self) -> f64 {
        match self {
            DetectionState::None => 0.0,
            DetectionState::Buoy => 1.0,
            DetectionState::Rope => 2.0,
        }
    }
}

/// Performance counters for one drained event.
#[derive(Debug, Clone, Copy)]
pub struct UpdateRecord {
    /// Wall-clock time of the incremental solve in seconds
    pub solve_seconds: f64,
    /// Total factors in the graph after the update
    pub factor_count: usize,
    /// Detection carried by the event
    pub detection: DetectionState,
    /// Non-prior factors committed by this event
    pub factors_added: usize,
    /// Point priors committed by this event
    pub priors_added: usize,
}

/// Append-only log of per-update performance counters.
#[derive(Debug, Clone, Default)]
pub struct UpdateLog {
    records: Vec<UpdateRecord>,
}

impl UpdateLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one update's counters.
    pub fn record(&mut self, record: UpdateRecord) {
        self.records.push(record);
    }

    /// All records in drain order.
    pub fn records(&self) -> &[UpdateRecord] {
        &self.records
    }

    /// Number of recorded updates.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows as `[time, factor count, detection code, factors added,
    /// priors added]`, one per update.
    pub fn rows(&self) -> Vec<[f64; 5]> {
        self.records
            .iter()
            .map(|r| {
                [
                    r.solve_seconds,
                    r.factor_count as f64,
                    r.detection.code(),
                    r.factors_added as f64,
                    r.priors_added as f64,
                ]
            })
            .collect()
    }

    /// Mean solve time in seconds, NaN when empty.
    pub fn mean_solve_seconds(&self) -> f64 {
        if self.records.is_empty() {
            f64::NAN
        } else {
            self.records.iter().map(|r| r.solve_seconds).sum::<f64>() / self.records.len() as f64
        }
    }

    /// Slowest solve in seconds, NaN when empty.
    pub fn max_solve_seconds(&self) -> f64 {
        self.records
            .iter()
            .map(|r| r.solve_seconds)
            .fold(f64::NAN, f64::max)
    }
}

/// Outcome of data association for one buoy detection.
///
/// `target` is the gated association: the matched buoy index, or -1
/// when the detection failed the outlier gate and added no factor.
#[derive(Debug, Clone, Copy)]
pub struct BuoyAssociationRecord {
    /// Pose index the detection arrived with
    pub pose: u32,
    /// Matched buoy index, -1 when rejected
    pub target: i64,
    /// Euclidean distance to the winning buoy
    pub euclidean: f64,
    /// Mahalanobis distance to the winner under the combined
    /// covariance, zero for Euclidean-only association
    pub mahalanobis: f64,
}

/// Ground-truth check of one automatic buoy association.
///
/// The estimated side projects the relative detection through the
/// predicted pose, the truth side through the ground-truth pose; both
/// are associated against the buoy priors and compared. `estimated`
/// keeps the raw winner before outlier gating so gating failures are
/// still auditable.
#[derive(Debug, Clone, Copy)]
pub struct DaAuditRecord {
    /// Pose index of the detection
    pub pose: u32,
    /// Whether both sides picked the same buoy
    pub matched: bool,
    /// Winner using the estimated pose, before gating
    pub estimated: i64,
    /// Winner using the ground-truth pose
    pub truth: i64,
    /// Distance from the estimated detection location to its winner
    pub euclidean: f64,
    /// Distance from the true detection location to its winner
    pub true_euclidean: f64,
    /// Detection location implied by the estimated pose
    pub estimated_location: Point2D,
    /// Detection location implied by the ground-truth pose
    pub true_location: Point2D,
}

/// Share of audited associations that agree with ground truth, as a
/// percentage. NaN when no associations were audited.
pub fn match_rate(records: &[DaAuditRecord]) -> f64 {
    if records.is_empty() {
        return f64::NAN;
    }
    let matched = records.iter().filter(|r| r.matched).count();
    100.0 * matched as f64 / records.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_detection_state_codes() {
        assert_relative_eq!(DetectionState::None.code(), 0.0);
        assert_relative_eq!(DetectionState::Buoy.code(), 1.0);
        assert_relative_eq!(DetectionState::Rope.code(), 2.0);
    }

    #[test]
    fn test_update_log_rows_preserve_order() {
        let mut log = UpdateLog::new();
        log.record(UpdateRecord {
            solve_seconds: 0.01,
            factor_count: 3,
            detection: DetectionState::Buoy,
            factors_added: 2,
            priors_added: 0,
        });
        log.record(UpdateRecord {
            solve_seconds: 0.02,
            factor_count: 5,
            detection: DetectionState::Rope,
            factors_added: 1,
            priors_added: 1,
        });

        let rows = log.rows();
        assert_eq!(rows.len(), 2);
        assert_relative_eq!(rows[0][1], 3.0);
        assert_relative_eq!(rows[0][2], 1.0);
        assert_relative_eq!(rows[1][2], 2.0);
        assert_relative_eq!(rows[1][4], 1.0);
    }

    #[test]
    fn test_update_log_solve_time_stats() {
        let mut log = UpdateLog::new();
        assert!(log.mean_solve_seconds().is_nan());
        assert!(log.max_solve_seconds().is_nan());

        for secs in [0.01, 0.03, 0.02] {
            log.record(UpdateRecord {
                solve_seconds: secs,
                factor_count: 1,
                detection: DetectionState::None,
                factors_added: 1,
                priors_added: 0,
            });
        }
        assert_relative_eq!(log.mean_solve_seconds(), 0.02, epsilon = 1e-12);
        assert_relative_eq!(log.max_solve_seconds(), 0.03, epsilon = 1e-12);
    }

    #[test]
    fn test_match_rate() {
        assert!(match_rate(&[]).is_nan());

        let record = |matched| DaAuditRecord {
            pose: 1,
            matched,
            estimated: 0,
            truth: 0,
            euclidean: 0.5,
            true_euclidean: 0.4,
            estimated_location: Point2D::new(0.0, 0.0),
            true_location: Point2D::new(0.1, 0.0),
        };
        let records = [record(true), record(true), record(false), record(true)];
        assert_relative_eq!(match_rate(&records), 75.0);
    }
}
