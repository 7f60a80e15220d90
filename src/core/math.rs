//! Planar geometry primitives for 2D landmark SLAM.
//!
//! Functions for angle normalization, bearings, and point-to-segment
//! distances used by rope association.

use crate::error::{Error, Result};
use std::f64::consts::PI;

/// Normalize angle to [-π, π].
///
/// # Example
/// ```
/// use sagar_slam::core::math::normalize_angle;
/// use std::f64::consts::PI;
///
/// assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-12);
/// assert!((normalize_angle(-3.0 * PI) - (-PI)).abs() < 1e-12);
/// ```
#[inline]
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Shortest angular difference from angle `a` to angle `b`.
///
/// Returns the signed angle you need to add to `a` to reach `b`,
/// taking the shortest path around the circle.
#[inline]
pub fn angle_diff(a: f64, b: f64) -> f64 {
    normalize_angle(b - a)
}

/// Bearing of the segment from (x1, y1) to (x2, y2), in (-π, π].
///
/// # Example
/// ```
/// use sagar_slam::core::math::bearing;
/// use std::f64::consts::FRAC_PI_2;
///
/// assert!((bearing(0.0, 0.0, 0.0, 5.0) - FRAC_PI_2).abs() < 1e-12);
/// ```
#[inline]
pub fn bearing(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    (y2 - y1).atan2(x2 - x1)
}

/// Euclidean distance between two points.
#[inline]
pub fn distance(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    let dx = x2 - x1;
    let dy = y2 - y1;
    (dx * dx + dy * dy).sqrt()
}

/// Midpoint between two points.
#[inline]
pub fn midpoint(x1: f64, y1: f64, x2: f64, y2: f64) -> (f64, f64) {
    ((x1 + x2) / 2.0, (y1 + y2) / 2.0)
}

/// Distance from point (x3, y3) to the segment (x1, y1)-(x2, y2).
///
/// Projects the point onto the segment's supporting line. When the
/// normalized projection parameter `u` lies strictly inside (0, 1) the
/// perpendicular distance applies; otherwise the distance to the nearer
/// endpoint.
///
/// A zero-length segment has no direction, so the distance to it is
/// undefined rather than zero: returns [`Error::DegenerateSegment`].
///
/// # Example
/// ```
/// use sagar_slam::core::math::point_to_segment_distance;
///
/// let d = point_to_segment_distance(0.0, 0.0, 10.0, 0.0, 5.0, 5.0).unwrap();
/// assert!((d - 5.0).abs() < 1e-12);
/// ```
pub fn point_to_segment_distance(
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    x3: f64,
    y3: f64,
) -> Result<f64> {
    if x1 == x2 && y1 == y2 {
        return Err(Error::DegenerateSegment(x1, y1));
    }

    let seg_len_sq = (x2 - x1) * (x2 - x1) + (y2 - y1) * (y2 - y1);
    let u = ((x3 - x1) * (x2 - x1) + (y3 - y1) * (y2 - y1)) / seg_len_sq;

    if u > 0.0 && u < 1.0 {
        let px = x1 + u * (x2 - x1);
        let py = y1 + u * (y2 - y1);
        Ok(distance(px, py, x3, y3))
    } else {
        let d1 = distance(x1, y1, x3, y3);
        let d2 = distance(x2, y2, x3, y3);
        Ok(d1.min(d2))
    }
}

/// Closest point on the segment (x1, y1)-(x2, y2) to (x3, y3).
///
/// Clamps the projection parameter to [0, 1] so the result always lies
/// on the segment. Returns the closest point and the distance to it.
/// Errors like [`point_to_segment_distance`] on a zero-length segment.
pub fn closest_point_on_segment(
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    x3: f64,
    y3: f64,
) -> Result<((f64, f64), f64)> {
    if x1 == x2 && y1 == y2 {
        return Err(Error::DegenerateSegment(x1, y1));
    }

    let seg_len_sq = (x2 - x1) * (x2 - x1) + (y2 - y1) * (y2 - y1);
    let u = (((x3 - x1) * (x2 - x1) + (y3 - y1) * (y2 - y1)) / seg_len_sq).clamp(0.0, 1.0);

    let px = x1 + u * (x2 - x1);
    let py = y1 + u * (y2 - y1);
    Ok(((px, py), distance(px, py, x3, y3)))
}

/// Heading angle of a unit quaternion (w, x, y, z) about the z axis.
///
/// Recorded poses are full 3D; the planar engines keep only the yaw.
#[inline]
pub fn yaw_from_quaternion(w: f64, x: f64, y: f64, z: f64) -> f64 {
    (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z))
}
