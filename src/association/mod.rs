//! Covariance-aware data association.
//!
//! Detections arrive with no identity. Association names the landmark
//! a detection belongs to, choosing between:
//!
//! - Euclidean nearest: smallest distance wins. For line candidates
//!   the distance is point-to-segment, so a detection anywhere along a
//!   rope scores by its offset from the line, not from the center.
//! - Maximum likelihood: each candidate is a Gaussian; the detection's
//!   own positional uncertainty is added to the candidate's and the
//!   highest density wins. A confident detection near a loose landmark
//!   can then out-score a closer but tighter one.
//!
//! Both return the winner plus its Euclidean and Mahalanobis distances
//! so the caller can apply an outlier gate afterwards.

pub mod gaussian;

use crate::config::AssociationConfig;
use crate::core::math::point_to_segment_distance;
use crate::core::types::{Covariance2D, Point2D};
use crate::error::Result;

/// One landmark distribution a detection may associate to.
#[derive(Debug, Clone, Copy)]
pub struct CandidateDistribution {
    /// Distribution mean in the map frame
    pub mean: Point2D,
    /// Candidate covariance, combined with the detection's for
    /// likelihood scoring
    pub covariance: Covariance2D,
    /// Segment endpoints for line candidates.
    ///
    /// When present, the Euclidean distance is point-to-segment
    /// instead of point-to-mean.
    pub segment: Option<(Point2D, Point2D)>,
}

impl CandidateDistribution {
    /// A point landmark candidate.
    pub fn point(mean: Point2D, covariance: Covariance2D) -> Self {
        Self {
            mean,
            covariance,
            segment: None,
        }
    }

    /// A line landmark candidate.
    pub fn line(mean: Point2D, covariance: Covariance2D, start: Point2D, end: Point2D) -> Self {
        Self {
            mean,
            covariance,
            segment: Some((start, end)),
        }
    }

    fn euclidean_to(&self, detection: &Point2D) -> Result<f64> {
        match self.segment {
            Some((start, end)) => point_to_segment_distance(
                start.x,
                start.y,
                end.x,
                end.y,
                detection.x,
                detection.y,
            ),
            None => Ok(self.mean.distance(detection)),
        }
    }
}

/// A resolved association with its distance statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssociationOutcome {
    /// Winning candidate index
    pub index: usize,
    /// Euclidean distance to the winner
    pub euclidean: f64,
    /// Mahalanobis distance to the winner under the combined
    /// covariance; zero for Euclidean-only association
    pub mahalanobis: f64,
}

/// Associate by Euclidean distance: the closest candidate wins.
///
/// Returns `None` when there are no candidates. The Mahalanobis
/// distance of the outcome is zero; no covariance is consulted.
pub fn associate_nearest(
    detection: &Point2D,
    candidates: &[CandidateDistribution],
) -> Result<Option<AssociationOutcome>> {
    let mut best: Option<AssociationOutcome> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let euclidean = candidate.euclidean_to(detection)?;
        if best.is_none_or(|b| euclidean < b.euclidean) {
            best = Some(AssociationOutcome {
                index,
                euclidean,
                mahalanobis: 0.0,
            });
        }
    }
    Ok(best)
}

/// Associate by maximum likelihood under combined covariance.
///
/// Each candidate is scored with the density of a Gaussian whose
/// covariance is `detection_covariance + candidate.covariance`, the
/// two sources taken as independent. The reported distances are those
/// of the likelihood winner, which need not be the Euclidean nearest.
pub fn associate_most_likely(
    detection: &Point2D,
    detection_covariance: &Covariance2D,
    candidates: &[CandidateDistribution],
) -> Result<Option<AssociationOutcome>> {
    let mut best: Option<(f64, usize)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let combined = *detection_covariance + candidate.covariance;
        let likelihood = gaussian::pdf(detection, &candidate.mean, &combined)?;
        if best.is_none_or(|(l, _)| likelihood > l) {
            best = Some((likelihood, index));
        }
    }

    let Some((_, index)) = best else {
        return Ok(None);
    };
    let winner = &candidates[index];
    let combined = *detection_covariance + winner.covariance;
    Ok(Some(AssociationOutcome {
        index,
        euclidean: winner.euclidean_to(detection)?,
        mahalanobis: gaussian::mahalanobis(detection, &winner.mean, &combined)?,
    }))
}

/// Apply the configured outlier gate to an association outcome.
///
/// With a positive Mahalanobis threshold, the Mahalanobis distance
/// decides; otherwise a positive Euclidean threshold decides; with
/// neither, everything passes. Distances strictly above the threshold
/// are rejected.
pub fn passes_gate(config: &AssociationConfig, outcome: &AssociationOutcome) -> bool {
    if config.mahalanobis_threshold > 0.0 {
        return outcome.mahalanobis <= config.mahalanobis_threshold;
    }
    if config.euclidean_threshold > 0.0 {
        return outcome.euclidean <= config.euclidean_threshold;
    }
    true
}

/// Look up a manual association table by sonar sequence id.
///
/// Returns the table's target index for `seq`, `None` when the id is
/// not listed.
pub fn manual_lookup(seq_ids: &[i64], targets: &[i64], seq: i64) -> Option<i64> {
    seq_ids
        .iter()
        .position(|&s| s == seq)
        .and_then(|pos| targets.get(pos).copied())
}
