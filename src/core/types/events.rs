//! Event types delivered to the online engine.

use super::Pose2D;
use serde::{Deserialize, Serialize};

/// Classification of a sonar detection.
///
/// Pipes share the rope processing path: both are line features
/// observed as individual point returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionKind {
    /// Point landmark with a known prior position
    Buoy,
    /// Line landmark observed as individual point detections
    Rope,
    /// Treated identically to [`DetectionKind::Rope`]
    Pipe,
}

impl DetectionKind {
    /// Whether this detection follows the rope processing path.
    #[inline]
    pub fn is_line_feature(&self) -> bool {
        matches!(self, DetectionKind::Rope | DetectionKind::Pipe)
    }
}

/// A relative detection in the vehicle frame.
///
/// The offset is the detected target's position relative to the
/// vehicle at the moment of the tick, in the vehicle's local frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeDetection {
    /// Forward offset in meters
    pub dx: f64,
    /// Lateral offset in meters (positive left)
    pub dy: f64,
    /// Buoy or rope/pipe classification
    pub kind: DetectionKind,
}

impl RelativeDetection {
    /// Create a new relative detection.
    pub fn new(dx: f64, dy: f64, kind: DetectionKind) -> Self {
        Self { dx, dy, kind }
    }
}

/// Attitude and depth side channel.
///
/// Carried through per pose node for downstream analysis, never
/// estimated: the state is planar.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Attitude {
    /// Roll in radians
    pub roll: f64,
    /// Pitch in radians
    pub pitch: f64,
    /// Depth in meters (positive down)
    pub depth: f64,
}

/// One odometry tick delivered to the online engine.
///
/// Every tick carries a dead-reckoning pose and the matching
/// ground-truth pose; a detection, sensor tag, and sonar sequence id
/// are optional.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseEvent {
    /// Dead-reckoning pose at the tick
    pub dr: Pose2D,
    /// Ground-truth pose at the tick, kept for association audits
    pub gt: Pose2D,
    /// Roll/pitch/depth side channel, if the source provides one
    pub attitude: Option<Attitude>,
    /// Relative detection observed at the tick
    pub detection: Option<RelativeDetection>,
    /// Tag of the sensor that produced the tick
    pub sensor_tag: Option<String>,
    /// Sonar sequence id, used by swath batching and manual association
    pub seq_id: Option<i64>,
}

impl PoseEvent {
    /// A plain odometry tick with no detection.
    pub fn odometry(dr: Pose2D, gt: Pose2D) -> Self {
        Self {
            dr,
            gt,
            attitude: None,
            detection: None,
            sensor_tag: None,
            seq_id: None,
        }
    }

    /// An odometry tick carrying a detection.
    pub fn with_detection(dr: Pose2D, gt: Pose2D, detection: RelativeDetection) -> Self {
        Self {
            dr,
            gt,
            attitude: None,
            detection: Some(detection),
            sensor_tag: None,
            seq_id: None,
        }
    }

    /// Attach a sonar sequence id.
    pub fn seq(mut self, seq_id: i64) -> Self {
        self.seq_id = Some(seq_id);
        self
    }

    /// Attach the roll/pitch/depth side channel.
    pub fn with_attitude(mut self, attitude: Attitude) -> Self {
        self.attitude = Some(attitude);
        self
    }

    /// Attach a sensor tag.
    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.sensor_tag = Some(tag.into());
        self
    }
}
