//! Bivariate Gaussian evaluation.

use std::f64::consts::TAU;

use nalgebra::{Matrix2, Vector2};

use crate::core::types::{Covariance2D, Point2D};
use crate::error::{Error, Result};

fn inverse_and_det(covariance: &Covariance2D) -> Result<(Matrix2<f64>, f64)> {
    let m = covariance.to_matrix();
    let det = m.determinant();
    if det <= 0.0 {
        return Err(Error::SolverFailure(format!(
            "association covariance is not positive definite (det {})",
            det
        )));
    }
    let inv = m.try_inverse().ok_or_else(|| {
        Error::SolverFailure("association covariance is singular".to_string())
    })?;
    Ok((inv, det))
}

/// Squared Mahalanobis distance `dᵀ Σ⁻¹ d` of a point from a mean.
pub fn mahalanobis_squared(
    x: &Point2D,
    mean: &Point2D,
    covariance: &Covariance2D,
) -> Result<f64> {
    let (inv, _) = inverse_and_det(covariance)?;
    let d = Vector2::new(x.x - mean.x, x.y - mean.y);
    Ok((d.transpose() * inv * d)[(0, 0)])
}

/// Mahalanobis distance of a point from a mean.
pub fn mahalanobis(x: &Point2D, mean: &Point2D, covariance: &Covariance2D) -> Result<f64> {
    Ok(mahalanobis_squared(x, mean, covariance)?.sqrt())
}

/// Density of a bivariate Gaussian at a point.
///
/// Errors when the covariance is not positive definite.
pub fn pdf(x: &Point2D, mean: &Point2D, covariance: &Covariance2D) -> Result<f64> {
    let (inv, det) = inverse_and_det(covariance)?;
    let d = Vector2::new(x.x - mean.x, x.y - mean.y);
    let exponent = -0.5 * (d.transpose() * inv * d)[(0, 0)];
    Ok(exponent.exp() / (TAU * det.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pdf_peak_of_unit_gaussian() {
        let mean = Point2D::new(0.0, 0.0);
        let cov = Covariance2D::isotropic(1.0);
        // 1 / (2π) at the mean
        assert_relative_eq!(
            pdf(&mean, &mean, &cov).unwrap(),
            1.0 / TAU,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_pdf_decays_with_distance() {
        let mean = Point2D::new(0.0, 0.0);
        let cov = Covariance2D::isotropic(1.0);
        let near = pdf(&Point2D::new(0.5, 0.0), &mean, &cov).unwrap();
        let far = pdf(&Point2D::new(3.0, 0.0), &mean, &cov).unwrap();
        assert!(near > far);
    }

    #[test]
    fn test_mahalanobis_accounts_for_anisotropy() {
        let mean = Point2D::new(0.0, 0.0);
        let cov = Covariance2D::diagonal(9.0, 1.0);
        // Same Euclidean offset, different Mahalanobis distance
        let along = mahalanobis(&Point2D::new(3.0, 0.0), &mean, &cov).unwrap();
        let across = mahalanobis(&Point2D::new(0.0, 3.0), &mean, &cov).unwrap();
        assert_relative_eq!(along, 1.0, epsilon = 1e-12);
        assert_relative_eq!(across, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_covariance_is_an_error() {
        let mean = Point2D::new(0.0, 0.0);
        assert!(pdf(&mean, &mean, &Covariance2D::zero()).is_err());
        assert!(mahalanobis(&mean, &mean, &Covariance2D::zero()).is_err());
    }
}
