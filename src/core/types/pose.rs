//! Pose and point types for 2D landmark SLAM.

use serde::{Deserialize, Serialize};

/// A 2D point in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    /// X coordinate in meters
    pub x: f64,
    /// Y coordinate in meters
    pub y: f64,
}

impl Point2D {
    /// Create a new point.
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared distance to another point (avoids sqrt).
    #[inline]
    pub fn distance_squared(&self, other: &Point2D) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(&self, other: &Point2D) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

impl Default for Point2D {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0 }
    }
}

/// Vehicle pose in 2D space.
///
/// Represents position (x, y) in meters and heading (theta) in radians.
/// Theta is normalized to [-π, π].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose2D {
    /// X position in meters
    pub x: f64,
    /// Y position in meters
    pub y: f64,
    /// Heading in radians, normalized to [-π, π]
    pub theta: f64,
}

impl Pose2D {
    /// Create a new pose with theta normalized to [-π, π].
    #[inline]
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self {
            x,
            y,
            theta: crate::core::math::normalize_angle(theta),
        }
    }

    /// Identity pose at origin with zero heading.
    #[inline]
    pub fn identity() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            theta: 0.0,
        }
    }

    /// Compose two poses: self ⊕ other
    ///
    /// Applies `other` transform relative to `self` frame.
    /// ```text
    /// C = A ⊕ B:
    ///   C.x = A.x + B.x * cos(A.θ) - B.y * sin(A.θ)
    ///   C.y = A.y + B.x * sin(A.θ) + B.y * cos(A.θ)
    ///   C.θ = normalize(A.θ + B.θ)
    /// ```
    #[inline]
    pub fn compose(&self, other: &Pose2D) -> Pose2D {
        let (sin_t, cos_t) = self.theta.sin_cos();
        Pose2D::new(
            self.x + other.x * cos_t - other.y * sin_t,
            self.y + other.x * sin_t + other.y * cos_t,
            self.theta + other.theta,
        )
    }

    /// Inverse of this pose.
    ///
    /// Returns the transform that undoes this pose.
    #[inline]
    pub fn inverse(&self) -> Pose2D {
        let (sin_t, cos_t) = self.theta.sin_cos();
        Pose2D::new(
            -self.x * cos_t - self.y * sin_t,
            self.x * sin_t - self.y * cos_t,
            -self.theta,
        )
    }

    /// Relative transform from `self` to `other`: self⁻¹ ⊕ other.
    ///
    /// The returned pose, composed onto `self`, reproduces `other`.
    /// This is the odometry increment between two consecutive
    /// dead-reckoning poses.
    #[inline]
    pub fn between(&self, other: &Pose2D) -> Pose2D {
        self.inverse().compose(other)
    }

    /// Transform a point from local frame to global frame.
    #[inline]
    pub fn transform_point(&self, point: &Point2D) -> Point2D {
        let (sin_t, cos_t) = self.theta.sin_cos();
        Point2D::new(
            self.x + point.x * cos_t - point.y * sin_t,
            self.y + point.x * sin_t + point.y * cos_t,
        )
    }

    /// Transform a point from global frame to local frame.
    #[inline]
    pub fn inverse_transform_point(&self, point: &Point2D) -> Point2D {
        let (sin_t, cos_t) = self.theta.sin_cos();
        let dx = point.x - self.x;
        let dy = point.y - self.y;
        Point2D::new(dx * cos_t + dy * sin_t, -dx * sin_t + dy * cos_t)
    }

    /// Bearing of a global point measured in this pose's frame, [-π, π].
    ///
    /// Zero bearing means the point lies straight ahead.
    #[inline]
    pub fn bearing_to(&self, point: &Point2D) -> f64 {
        let local = self.inverse_transform_point(point);
        local.y.atan2(local.x)
    }

    /// Euclidean distance from this pose's position to a global point.
    #[inline]
    pub fn range_to(&self, point: &Point2D) -> f64 {
        let dx = point.x - self.x;
        let dy = point.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Position of this pose as a point.
    #[inline]
    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }
}

impl Default for Pose2D {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    #[test]
    fn test_point2d_distance() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(3.0, 4.0);
        assert_relative_eq!(a.distance(&b), 5.0);
        assert_relative_eq!(a.distance_squared(&b), 25.0);
    }

    #[test]
    fn test_pose_compose_identity() {
        let p = Pose2D::new(1.0, 2.0, 0.5);
        let identity = Pose2D::identity();
        let result = p.compose(&identity);
        assert_relative_eq!(result.x, p.x);
        assert_relative_eq!(result.y, p.y);
        assert_relative_eq!(result.theta, p.theta);
    }

    #[test]
    fn test_pose_inverse_roundtrip() {
        let p = Pose2D::new(1.0, 2.0, 0.5);
        let inv = p.inverse();
        let result = p.compose(&inv);
        assert_relative_eq!(result.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(result.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(result.theta, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_between_recovers_other() {
        let a = Pose2D::new(1.0, 2.0, FRAC_PI_4);
        let b = Pose2D::new(-0.5, 3.0, -0.8);
        let delta = a.between(&b);
        let recovered = a.compose(&delta);
        assert_relative_eq!(recovered.x, b.x, epsilon = 1e-12);
        assert_relative_eq!(recovered.y, b.y, epsilon = 1e-12);
        assert_relative_eq!(recovered.theta, b.theta, epsilon = 1e-12);
    }

    #[test]
    fn test_transform_point() {
        let pose = Pose2D::new(1.0, 0.0, FRAC_PI_2);
        let point = Point2D::new(1.0, 0.0);
        let result = pose.transform_point(&point);
        assert_relative_eq!(result.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(result.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_transform_point() {
        let pose = Pose2D::new(1.0, 0.0, FRAC_PI_2);
        let global_point = Point2D::new(1.0, 1.0);
        let local = pose.inverse_transform_point(&global_point);
        assert_relative_eq!(local.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(local.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bearing_to_ahead_and_left() {
        let pose = Pose2D::new(0.0, 0.0, 0.0);
        assert_relative_eq!(pose.bearing_to(&Point2D::new(5.0, 0.0)), 0.0);
        assert_relative_eq!(pose.bearing_to(&Point2D::new(0.0, 5.0)), FRAC_PI_2);

        // Heading along +y: a point at +y is straight ahead
        let pose = Pose2D::new(0.0, 0.0, FRAC_PI_2);
        assert_relative_eq!(
            pose.bearing_to(&Point2D::new(0.0, 5.0)),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_range_to() {
        let pose = Pose2D::new(1.0, 1.0, PI);
        assert_relative_eq!(pose.range_to(&Point2D::new(4.0, 5.0)), 5.0);
    }

    #[test]
    fn test_pose_composition_order() {
        let move_forward = Pose2D::new(1.0, 0.0, 0.0);
        let rotate = Pose2D::new(0.0, 0.0, FRAC_PI_2);
        let result = move_forward.compose(&rotate);
        assert_relative_eq!(result.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(result.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(result.theta, FRAC_PI_2, epsilon = 1e-12);

        let result2 = rotate.compose(&move_forward);
        assert_relative_eq!(result2.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(result2.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(result2.theta, FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_new_normalizes_theta() {
        let p = Pose2D::new(0.0, 0.0, 3.0 * PI);
        assert_relative_eq!(p.theta, PI, epsilon = 1e-12);
    }
}
