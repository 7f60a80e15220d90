//! Buoy landmark table.

use crate::core::types::Point2D;
use crate::error::{Error, Result};

/// Known buoy positions in the map frame.
///
/// Buoy identity is positional: index `i` here is buoy `i` everywhere
/// else, including association results and exported estimates. The
/// table is immutable once built.
#[derive(Debug, Clone)]
pub struct BuoyMap {
    priors: Vec<Point2D>,
    average: Point2D,
}

impl BuoyMap {
    /// Build the table from surveyed buoy positions.
    ///
    /// Errors on an empty list: an empty table would poison every
    /// downstream association.
    pub fn new(priors: Vec<Point2D>) -> Result<Self> {
        if priors.is_empty() {
            return Err(Error::EmptyBuoyList);
        }
        let n = priors.len() as f64;
        let (sum_x, sum_y) = priors
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Ok(Self {
            average: Point2D::new(sum_x / n, sum_y / n),
            priors,
        })
    }

    /// Number of buoys.
    pub fn len(&self) -> usize {
        self.priors.len()
    }

    /// Always false: construction rejects empty tables.
    pub fn is_empty(&self) -> bool {
        self.priors.is_empty()
    }

    /// All prior positions, in buoy order.
    pub fn priors(&self) -> &[Point2D] {
        &self.priors
    }

    /// Prior position of one buoy.
    pub fn prior(&self, index: usize) -> Option<Point2D> {
        self.priors.get(index).copied()
    }

    /// Mean of all priors, the fallback center for naive rope priors.
    pub fn average(&self) -> Point2D {
        self.average
    }
}
