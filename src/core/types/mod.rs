//! Core data types for the SLAM engines.
//!
//! - [`Point2D`]: 2D point in meters
//! - [`Pose2D`]: Vehicle pose (x, y, theta) in meters and radians
//! - [`Covariance2D`]: 2x2 positional covariance
//! - [`PoseEvent`], [`RelativeDetection`], [`DetectionKind`],
//!   [`Attitude`]: the online engine's input tuple

mod covariance;
mod events;
mod pose;

pub use covariance::Covariance2D;
pub use events::{Attitude, DetectionKind, PoseEvent, RelativeDetection};
pub use pose::{Point2D, Pose2D};
