//! Positional covariance types.
//!
//! Landmark priors and detection uncertainty are 2x2 positional
//! covariances. Rope priors are anisotropic: tight across the rope,
//! loose along it, rotated to the segment bearing.

use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};

/// 2x2 covariance matrix for a 2D position.
///
/// Stored row-major: [xx, xy, yx, yy]. Always symmetric by
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Covariance2D {
    /// Row-major 2x2 matrix data
    data: [f64; 4],
}

impl Covariance2D {
    /// Create a zero covariance matrix.
    #[inline]
    pub fn zero() -> Self {
        Self { data: [0.0; 4] }
    }

    /// Create a diagonal covariance matrix from variances.
    #[inline]
    pub fn diagonal(xx: f64, yy: f64) -> Self {
        Self {
            data: [xx, 0.0, 0.0, yy],
        }
    }

    /// Create an isotropic covariance from a single standard deviation.
    #[inline]
    pub fn isotropic(sigma: f64) -> Self {
        Self::diagonal(sigma * sigma, sigma * sigma)
    }

    /// Create from per-axis standard deviations.
    #[inline]
    pub fn from_sigmas(sigma_x: f64, sigma_y: f64) -> Self {
        Self::diagonal(sigma_x * sigma_x, sigma_y * sigma_y)
    }

    /// Anisotropic covariance aligned to a bearing.
    ///
    /// Builds `diag(σ_along², σ_cross²)` and rotates it by `bearing`:
    /// `R · diag · Rᵀ`. The along axis points in the bearing direction.
    ///
    /// # Example
    /// ```
    /// use sagar_slam::core::types::Covariance2D;
    /// use std::f64::consts::FRAC_PI_2;
    ///
    /// // Segment along x: along variance lands on xx
    /// let c = Covariance2D::rotated(0.0, 3.0, 1.0);
    /// assert!((c.xx() - 9.0).abs() < 1e-12);
    /// assert!((c.yy() - 1.0).abs() < 1e-12);
    ///
    /// // Rotated 90 degrees: axes swap
    /// let c = Covariance2D::rotated(FRAC_PI_2, 3.0, 1.0);
    /// assert!((c.xx() - 1.0).abs() < 1e-9);
    /// assert!((c.yy() - 9.0).abs() < 1e-9);
    /// ```
    pub fn rotated(bearing: f64, sigma_along: f64, sigma_cross: f64) -> Self {
        let cov = Matrix2::new(sigma_along * sigma_along, 0.0, 0.0, sigma_cross * sigma_cross);
        let (sin_b, cos_b) = bearing.sin_cos();
        let rot = Matrix2::new(cos_b, -sin_b, sin_b, cos_b);
        Self::from_matrix(&(rot * cov * rot.transpose()))
    }

    /// Create from an nalgebra matrix.
    #[inline]
    pub fn from_matrix(m: &Matrix2<f64>) -> Self {
        Self {
            data: [m[(0, 0)], m[(0, 1)], m[(1, 0)], m[(1, 1)]],
        }
    }

    /// Convert to an nalgebra matrix.
    #[inline]
    pub fn to_matrix(&self) -> Matrix2<f64> {
        Matrix2::new(self.data[0], self.data[1], self.data[2], self.data[3])
    }

    /// Variance in x (element [0,0]).
    #[inline]
    pub fn xx(&self) -> f64 {
        self.data[0]
    }

    /// Covariance of x and y (element [0,1]).
    #[inline]
    pub fn xy(&self) -> f64 {
        self.data[1]
    }

    /// Variance in y (element [1,1]).
    #[inline]
    pub fn yy(&self) -> f64 {
        self.data[3]
    }

    /// Get raw data as slice.
    #[inline]
    pub fn as_slice(&self) -> &[f64; 4] {
        &self.data
    }
}

impl Default for Covariance2D {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::ops::Add for Covariance2D {
    type Output = Covariance2D;

    /// Sum of two covariances, the combined uncertainty of two
    /// independent Gaussians.
    fn add(self, rhs: Covariance2D) -> Covariance2D {
        Covariance2D {
            data: [
                self.data[0] + rhs.data[0],
                self.data[1] + rhs.data[1],
                self.data[2] + rhs.data[2],
                self.data[3] + rhs.data[3],
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    #[test]
    fn test_diagonal() {
        let c = Covariance2D::diagonal(4.0, 9.0);
        assert_relative_eq!(c.xx(), 4.0);
        assert_relative_eq!(c.xy(), 0.0);
        assert_relative_eq!(c.yy(), 9.0);
    }

    #[test]
    fn test_from_sigmas_squares() {
        let c = Covariance2D::from_sigmas(2.0, 3.0);
        assert_relative_eq!(c.xx(), 4.0);
        assert_relative_eq!(c.yy(), 9.0);
    }

    #[test]
    fn test_rotated_zero_bearing() {
        let c = Covariance2D::rotated(0.0, 3.0, 1.0);
        assert_relative_eq!(c.xx(), 9.0, epsilon = 1e-12);
        assert_relative_eq!(c.xy(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(c.yy(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotated_quarter_turn_swaps_axes() {
        let c = Covariance2D::rotated(FRAC_PI_2, 3.0, 1.0);
        assert_relative_eq!(c.xx(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(c.yy(), 9.0, epsilon = 1e-9);
        assert_relative_eq!(c.xy(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rotated_diagonal_bearing_has_cross_terms() {
        let c = Covariance2D::rotated(FRAC_PI_4, 3.0, 1.0);
        // Rotation preserves the trace
        assert_relative_eq!(c.xx() + c.yy(), 10.0, epsilon = 1e-9);
        assert!(c.xy() > 0.0);
        // Symmetric
        assert_relative_eq!(c.xy(), c.as_slice()[2], epsilon = 1e-12);
    }

    #[test]
    fn test_matrix_roundtrip() {
        let c = Covariance2D::rotated(0.3, 2.0, 0.5);
        let back = Covariance2D::from_matrix(&c.to_matrix());
        assert_relative_eq!(c.xx(), back.xx());
        assert_relative_eq!(c.xy(), back.xy());
        assert_relative_eq!(c.yy(), back.yy());
    }

    #[test]
    fn test_add() {
        let a = Covariance2D::diagonal(1.0, 2.0);
        let b = Covariance2D::diagonal(3.0, 4.0);
        let sum = a + b;
        assert_relative_eq!(sum.xx(), 4.0);
        assert_relative_eq!(sum.yy(), 6.0);
    }
}
