//! Engine configuration.
//!
//! One immutable [`SlamConfig`] is built before the engine and injected
//! at construction. [`SlamConfig::validated`] applies the degradation
//! rules: inconsistent optional features are switched off with a
//! warning instead of aborting.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::graph::OptimizerConfig;

/// Standard deviations for every factor and prior type.
///
/// Angular sigmas are configured in degrees and converted on access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// First-pose prior position sigma in meters
    pub prior_position_sigma: f64,
    /// First-pose prior heading sigma in degrees
    pub prior_heading_sigma_deg: f64,
    /// Buoy prior position sigma in meters
    pub buoy_prior_sigma: f64,
    /// Naive rope prior sigma in meters, used when no ropes are defined
    pub rope_naive_prior_sigma: f64,
    /// Rope prior sigma along the segment, in meters.
    ///
    /// Zero or negative selects scaled mode: the along sigma becomes
    /// `length / (2 * N)` with `N = 3` for zero, `N = |value|` otherwise.
    pub rope_along_sigma: f64,
    /// Rope prior sigma across the segment, in meters
    pub rope_cross_sigma: f64,
    /// Odometry position sigma in meters
    pub odometry_position_sigma: f64,
    /// Odometry heading sigma in degrees
    pub odometry_heading_sigma_deg: f64,
    /// Buoy detection bearing sigma in degrees
    pub buoy_detection_bearing_sigma_deg: f64,
    /// Buoy detection range sigma in meters
    pub buoy_detection_range_sigma: f64,
    /// Rope detection bearing sigma in degrees
    pub rope_detection_bearing_sigma_deg: f64,
    /// Rope detection range sigma in meters
    pub rope_detection_range_sigma: f64,
}

impl NoiseConfig {
    /// First-pose prior heading sigma in radians.
    #[inline]
    pub fn prior_heading_sigma(&self) -> f64 {
        self.prior_heading_sigma_deg.to_radians()
    }

    /// Odometry heading sigma in radians.
    #[inline]
    pub fn odometry_heading_sigma(&self) -> f64 {
        self.odometry_heading_sigma_deg.to_radians()
    }

    /// Buoy detection bearing sigma in radians.
    #[inline]
    pub fn buoy_detection_bearing_sigma(&self) -> f64 {
        self.buoy_detection_bearing_sigma_deg.to_radians()
    }

    /// Rope detection bearing sigma in radians.
    #[inline]
    pub fn rope_detection_bearing_sigma(&self) -> f64 {
        self.rope_detection_bearing_sigma_deg.to_radians()
    }
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            prior_position_sigma: 1.0,
            prior_heading_sigma_deg: 1.0,
            buoy_prior_sigma: 1.0,
            rope_naive_prior_sigma: 15.0,
            rope_along_sigma: 15.0,
            rope_cross_sigma: 2.0,
            odometry_position_sigma: 0.1,
            odometry_heading_sigma_deg: 0.1,
            buoy_detection_bearing_sigma_deg: 1.0,
            buoy_detection_range_sigma: 0.1,
            rope_detection_bearing_sigma_deg: 1.0,
            rope_detection_range_sigma: 0.1,
        }
    }
}

/// Data-association strategy selection and outlier gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    /// Use the manual buoy association table instead of numeric DA
    pub manual_associations: bool,
    /// Sonar sequence ids of the manual buoy table
    pub manual_buoy_seq_ids: Vec<i64>,
    /// Buoy index per manual table entry, -1 marks an ignored detection
    pub manual_buoy_indices: Vec<i64>,
    /// Euclidean outlier gate in meters; non-positive disables the check
    pub euclidean_threshold: f64,
    /// Mahalanobis outlier gate; non-positive disables the check.
    ///
    /// A positive value disables the Euclidean gate.
    pub mahalanobis_threshold: f64,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            manual_associations: false,
            manual_buoy_seq_ids: Vec::new(),
            manual_buoy_indices: Vec::new(),
            euclidean_threshold: -1.0,
            mahalanobis_threshold: -1.0,
        }
    }
}

/// Rope detection handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RopeConfig {
    /// Give each rope detection its own landmark variable.
    ///
    /// When false, detections constrain one aggregate point landmark
    /// per rope instead of receiving individual priors.
    pub individual_detections: bool,
    /// Attach factors and priors for rope detections at all.
    ///
    /// When false, detections are recorded and associated but never
    /// constrain the graph.
    pub use_rope_detections: bool,
    /// Re-derive rope priors from current buoy estimates after each
    /// update, replacing committed prior values in place
    pub update_priors: bool,
}

impl Default for RopeConfig {
    fn default() -> Self {
        Self {
            individual_detections: true,
            use_rope_detections: true,
            update_priors: false,
        }
    }
}

/// The active batching policy, resolved by precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPolicyKind {
    /// Buffer per configured swath, flush when a swath's last sequence
    /// id arrives
    Swath,
    /// Buffer until the associated rope changes or a timeout elapses
    LineChange,
    /// Buffer a fixed number of rope detections, then flush
    FixedCount,
    /// Commit factors and priors in the same step they are produced
    Immediate,
}

/// Batching policy configuration.
///
/// Exactly one policy is active. Precedence when several are enabled:
/// swath over line-change over fixed-count over immediate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// Enable the swath policy
    pub batch_by_swath: bool,
    /// Per swath, a list of inclusive [start, end] sequence-id ranges
    pub swath_seq_ids: Vec<Vec<[i64; 2]>>,
    /// Rope index per swath, for manual rope association by swath
    pub swath_line_indices: Vec<i64>,
    /// Take rope associations from `swath_line_indices` while inside a
    /// swath
    pub manual_swath_rope_association: bool,
    /// Enable the line-change policy
    pub batch_by_line: bool,
    /// Line-change flush timeout in seconds
    pub line_timeout_secs: f64,
    /// Fixed-count batch size; values above zero enable the policy
    pub rope_batch_size: i64,
}

impl BatchingConfig {
    /// Resolve the single active policy by precedence.
    pub fn policy(&self) -> BatchPolicyKind {
        if self.batch_by_swath {
            BatchPolicyKind::Swath
        } else if self.batch_by_line {
            BatchPolicyKind::LineChange
        } else if self.rope_batch_size > 0 {
            BatchPolicyKind::FixedCount
        } else {
            BatchPolicyKind::Immediate
        }
    }

    /// Index of the swath whose ranges contain `seq`, if any.
    pub fn swath_containing(&self, seq: i64) -> Option<usize> {
        self.swath_seq_ids
            .iter()
            .position(|ranges| ranges.iter().any(|r| r[0] <= seq && seq <= r[1]))
    }

    /// Index of the swath completed by `seq`: `seq` lies inside the
    /// swath and equals its maximum sequence id.
    pub fn swath_completed_by(&self, seq: i64) -> Option<usize> {
        let swath = self.swath_containing(seq)?;
        let max = self.swath_seq_ids[swath].iter().map(|r| r[1]).max()?;
        (seq == max).then_some(swath)
    }

    /// Manual rope index for a swath, when the line table covers it.
    pub fn swath_line(&self, swath: usize) -> Option<i64> {
        self.swath_line_indices.get(swath).copied()
    }
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_by_swath: false,
            swath_seq_ids: Vec::new(),
            swath_line_indices: Vec::new(),
            manual_swath_rope_association: false,
            batch_by_line: false,
            line_timeout_secs: 100.0,
            rope_batch_size: 0,
        }
    }
}

/// Complete configuration of the online engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlamConfig {
    /// Factor and prior sigmas
    pub noise: NoiseConfig,
    /// Data association strategy and gating
    pub association: AssociationConfig,
    /// Rope detection handling
    pub ropes: RopeConfig,
    /// Batching policy selection
    pub batching: BatchingConfig,
    /// Nonlinear optimizer settings
    pub optimizer: OptimizerConfig,
}

impl SlamConfig {
    /// Apply the degradation rules and return a consistent config.
    ///
    /// Inconsistent optional features are disabled with a warning:
    ///
    /// - a positive Mahalanobis gate disables the Euclidean gate;
    /// - manual buoy association with empty or length-mismatched
    ///   tables is switched off;
    /// - manual rope association by swath with a swath/line table
    ///   length mismatch is switched off.
    pub fn validated(mut self) -> Self {
        if self.association.mahalanobis_threshold > 0.0 {
            if self.association.euclidean_threshold > 0.0 {
                warn!(
                    "Mahalanobis gate ({}) active, disabling Euclidean gate ({})",
                    self.association.mahalanobis_threshold, self.association.euclidean_threshold
                );
            }
            self.association.euclidean_threshold = -1.0;
        }

        if self.association.manual_associations {
            let seqs = self.association.manual_buoy_seq_ids.len();
            let targets = self.association.manual_buoy_indices.len();
            if seqs == 0 || seqs != targets {
                warn!(
                    "Manual buoy association disabled: table sizes {} and {} unusable",
                    seqs, targets
                );
                self.association.manual_associations = false;
            }
        }

        if self.batching.manual_swath_rope_association
            && self.batching.swath_seq_ids.len() != self.batching.swath_line_indices.len()
        {
            warn!(
                "Manual rope association by swath disabled: {} swaths but {} line indices",
                self.batching.swath_seq_ids.len(),
                self.batching.swath_line_indices.len()
            );
            self.batching.manual_swath_rope_association = false;
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_select_immediate_policy() {
        let config = SlamConfig::default();
        assert_eq!(config.batching.policy(), BatchPolicyKind::Immediate);
        assert!(config.ropes.individual_detections);
        assert!(!config.ropes.update_priors);
    }

    #[test]
    fn test_policy_precedence() {
        let mut batching = BatchingConfig {
            batch_by_swath: true,
            batch_by_line: true,
            rope_batch_size: 5,
            ..Default::default()
        };
        assert_eq!(batching.policy(), BatchPolicyKind::Swath);

        batching.batch_by_swath = false;
        assert_eq!(batching.policy(), BatchPolicyKind::LineChange);

        batching.batch_by_line = false;
        assert_eq!(batching.policy(), BatchPolicyKind::FixedCount);

        batching.rope_batch_size = 0;
        assert_eq!(batching.policy(), BatchPolicyKind::Immediate);
    }

    #[test]
    fn test_mahalanobis_gate_disables_euclidean() {
        let mut config = SlamConfig::default();
        config.association.euclidean_threshold = 2.0;
        config.association.mahalanobis_threshold = 3.0;

        let config = config.validated();
        assert!(config.association.euclidean_threshold < 0.0);
        assert_eq!(config.association.mahalanobis_threshold, 3.0);
    }

    #[test]
    fn test_manual_table_mismatch_disables_manual() {
        let mut config = SlamConfig::default();
        config.association.manual_associations = true;
        config.association.manual_buoy_seq_ids = vec![1, 2, 3];
        config.association.manual_buoy_indices = vec![0, 1];

        let config = config.validated();
        assert!(!config.association.manual_associations);
    }

    #[test]
    fn test_manual_empty_table_disables_manual() {
        let mut config = SlamConfig::default();
        config.association.manual_associations = true;

        let config = config.validated();
        assert!(!config.association.manual_associations);
    }

    #[test]
    fn test_swath_table_mismatch_disables_manual_rope_da() {
        let mut config = SlamConfig::default();
        config.batching.manual_swath_rope_association = true;
        config.batching.swath_seq_ids = vec![vec![[0, 10]], vec![[11, 20]]];
        config.batching.swath_line_indices = vec![0];

        let config = config.validated();
        assert!(!config.batching.manual_swath_rope_association);
    }

    #[test]
    fn test_swath_lookup() {
        let batching = BatchingConfig {
            swath_seq_ids: vec![vec![[0, 10], [15, 20]], vec![[30, 40]]],
            ..Default::default()
        };

        assert_eq!(batching.swath_containing(5), Some(0));
        assert_eq!(batching.swath_containing(17), Some(0));
        assert_eq!(batching.swath_containing(35), Some(1));
        assert_eq!(batching.swath_containing(25), None);

        // Only the overall maximum of a swath completes it, not the
        // end of an interior range.
        assert_eq!(batching.swath_completed_by(10), None);
        assert_eq!(batching.swath_completed_by(20), Some(0));
        assert_eq!(batching.swath_completed_by(40), Some(1));
    }

    #[test]
    fn test_angular_sigmas_convert_to_radians() {
        let noise = NoiseConfig::default();
        approx::assert_relative_eq!(
            noise.prior_heading_sigma(),
            1.0_f64.to_radians(),
            epsilon = 1e-12
        );
        approx::assert_relative_eq!(
            noise.odometry_heading_sigma(),
            0.1_f64.to_radians(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = SlamConfig::default();
        let serialized = basic_toml::to_string(&config).unwrap();
        let parsed: SlamConfig = basic_toml::from_str(&serialized).unwrap();
        assert_eq!(
            parsed.noise.rope_cross_sigma,
            config.noise.rope_cross_sigma
        );
        assert_eq!(parsed.batching.policy(), BatchPolicyKind::Immediate);
    }
}
