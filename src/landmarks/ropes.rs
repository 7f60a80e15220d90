//! Rope landmark table and prior derivation.
//!
//! A rope is a straight segment between two endpoints. Its prior is a
//! Gaussian at the segment midpoint with anisotropic covariance: loose
//! along the rope, tight across it, rotated to the segment bearing.
//! Detections anywhere along the rope then score well against the
//! prior, while detections off the line are penalized.

use crate::core::math::{bearing, midpoint};
use crate::core::types::{Covariance2D, Point2D};
use crate::error::{Error, Result};
use crate::landmarks::buoys::BuoyMap;

/// How a rope is specified at setup time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RopeSpec {
    /// Endpoints resolved from the buoy table by index
    BuoyIndices(usize, usize),
    /// Endpoints given directly in map coordinates
    Endpoints(Point2D, Point2D),
}

/// One rope with its derived prior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rope {
    /// Start endpoint in the map frame
    pub start: Point2D,
    /// End endpoint in the map frame
    pub end: Point2D,
    /// Segment midpoint, the prior mean
    pub center: Point2D,
    /// Anisotropic prior covariance, rotated to the segment bearing
    pub covariance: Covariance2D,
}

/// Rope landmark table.
///
/// Like buoys, rope identity is positional and the spec list is
/// immutable. The derived endpoints can move: [`RopeMap::refresh`]
/// re-resolves index-specified ropes against updated buoy positions.
#[derive(Debug, Clone)]
pub struct RopeMap {
    specs: Vec<RopeSpec>,
    ropes: Vec<Rope>,
    sigma_along: f64,
    sigma_cross: f64,
}

impl RopeMap {
    /// Build the table, deriving each rope's prior.
    ///
    /// `sigma_along` selects the along-rope sigma mode: a positive
    /// value is used directly, zero or negative selects scaled mode
    /// where the sigma becomes `length / (2 N)` with `N = 3` for zero
    /// and `N = |sigma_along|` otherwise.
    ///
    /// Index-specified ropes need the buoy table; passing `None` for
    /// `buoys` with such a spec is an error, as is an out-of-range
    /// index.
    pub fn new(
        specs: Vec<RopeSpec>,
        sigma_along: f64,
        sigma_cross: f64,
        buoys: Option<&BuoyMap>,
    ) -> Result<Self> {
        let mut ropes = Vec::with_capacity(specs.len());
        for spec in &specs {
            let (start, end) = match spec {
                RopeSpec::BuoyIndices(a, b) => {
                    let map = buoys.ok_or(Error::BuoysNotSet)?;
                    let start = map.prior(*a).ok_or(Error::BuoyIndexOutOfRange {
                        index: *a,
                        count: map.len(),
                    })?;
                    let end = map.prior(*b).ok_or(Error::BuoyIndexOutOfRange {
                        index: *b,
                        count: map.len(),
                    })?;
                    (start, end)
                }
                RopeSpec::Endpoints(s, e) => (*s, *e),
            };
            ropes.push(derive_rope(start, end, sigma_along, sigma_cross));
        }
        Ok(Self {
            specs,
            ropes,
            sigma_along,
            sigma_cross,
        })
    }

    /// Number of ropes.
    pub fn len(&self) -> usize {
        self.ropes.len()
    }

    /// Whether the table holds no ropes.
    pub fn is_empty(&self) -> bool {
        self.ropes.is_empty()
    }

    /// All ropes, in rope order.
    pub fn ropes(&self) -> &[Rope] {
        &self.ropes
    }

    /// One rope by index.
    pub fn get(&self, index: usize) -> Option<&Rope> {
        self.ropes.get(index)
    }

    /// Re-derive index-specified ropes from updated buoy positions.
    ///
    /// Ropes specified by explicit endpoints keep their setup values:
    /// nothing in the estimate moves them.
    pub fn refresh(&mut self, buoy_positions: &[Point2D]) {
        for (spec, rope) in self.specs.iter().zip(self.ropes.iter_mut()) {
            if let RopeSpec::BuoyIndices(a, b) = spec {
                let (Some(start), Some(end)) = (buoy_positions.get(*a), buoy_positions.get(*b))
                else {
                    continue;
                };
                *rope = derive_rope(*start, *end, self.sigma_along, self.sigma_cross);
            }
        }
    }

    /// Per-rope debug rows: `[center_x, center_y, sxx, sxy, syx, syy]`.
    pub fn info_rows(&self) -> Vec<[f64; 6]> {
        self.ropes
            .iter()
            .map(|rope| {
                let cov = rope.covariance.as_slice();
                [
                    rope.center.x,
                    rope.center.y,
                    cov[0],
                    cov[1],
                    cov[2],
                    cov[3],
                ]
            })
            .collect()
    }
}

fn derive_rope(start: Point2D, end: Point2D, sigma_along: f64, sigma_cross: f64) -> Rope {
    let along = if sigma_along <= 0.0 {
        let n_sigmas = if sigma_along == 0.0 {
            3.0
        } else {
            sigma_along.abs()
        };
        start.distance(&end) / (2.0 * n_sigmas)
    } else {
        sigma_along
    };

    let angle = bearing(start.x, start.y, end.x, end.y);
    let (cx, cy) = midpoint(start.x, start.y, end.x, end.y);
    Rope {
        start,
        end,
        center: Point2D::new(cx, cy),
        covariance: Covariance2D::rotated(angle, along, sigma_cross),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_buoys() -> BuoyMap {
        BuoyMap::new(vec![Point2D::new(0.0, 0.0), Point2D::new(12.0, 0.0)]).unwrap()
    }

    #[test]
    fn test_indexed_spec_resolves_buoy_endpoints() {
        let buoys = two_buoys();
        let map = RopeMap::new(
            vec![RopeSpec::BuoyIndices(0, 1)],
            15.0,
            2.0,
            Some(&buoys),
        )
        .unwrap();

        let rope = map.get(0).unwrap();
        assert_relative_eq!(rope.center.x, 6.0);
        assert_relative_eq!(rope.center.y, 0.0);
        assert_relative_eq!(rope.covariance.xx(), 225.0, epsilon = 1e-9);
        assert_relative_eq!(rope.covariance.yy(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_indexed_spec_without_buoys_is_an_error() {
        let result = RopeMap::new(vec![RopeSpec::BuoyIndices(0, 1)], 15.0, 2.0, None);
        assert!(matches!(result, Err(Error::BuoysNotSet)));
    }

    #[test]
    fn test_out_of_range_index_is_an_error() {
        let buoys = two_buoys();
        let result = RopeMap::new(vec![RopeSpec::BuoyIndices(0, 5)], 15.0, 2.0, Some(&buoys));
        assert!(matches!(
            result,
            Err(Error::BuoyIndexOutOfRange { index: 5, count: 2 })
        ));
    }

    #[test]
    fn test_scaled_mode_zero_uses_three_sigmas() {
        // Length 12, N = 3: sigma = 12 / 6 = 2
        let buoys = two_buoys();
        let map = RopeMap::new(vec![RopeSpec::BuoyIndices(0, 1)], 0.0, 2.0, Some(&buoys)).unwrap();
        assert_relative_eq!(map.get(0).unwrap().covariance.xx(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_scaled_mode_negative_sets_sigma_count() {
        // Length 12, N = 2: sigma = 12 / 4 = 3
        let buoys = two_buoys();
        let map = RopeMap::new(vec![RopeSpec::BuoyIndices(0, 1)], -2.0, 2.0, Some(&buoys)).unwrap();
        assert_relative_eq!(map.get(0).unwrap().covariance.xx(), 9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_vertical_rope_rotates_covariance() {
        let map = RopeMap::new(
            vec![RopeSpec::Endpoints(
                Point2D::new(0.0, 0.0),
                Point2D::new(0.0, 10.0),
            )],
            5.0,
            1.0,
            None,
        )
        .unwrap();
        let cov = map.get(0).unwrap().covariance;
        // Along axis points in +y
        assert_relative_eq!(cov.xx(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(cov.yy(), 25.0, epsilon = 1e-9);
    }

    #[test]
    fn test_refresh_moves_indexed_ropes_only() {
        let buoys = two_buoys();
        let mut map = RopeMap::new(
            vec![
                RopeSpec::BuoyIndices(0, 1),
                RopeSpec::Endpoints(Point2D::new(0.0, 5.0), Point2D::new(10.0, 5.0)),
            ],
            15.0,
            2.0,
            Some(&buoys),
        )
        .unwrap();

        map.refresh(&[Point2D::new(1.0, 1.0), Point2D::new(13.0, 1.0)]);

        let moved = map.get(0).unwrap();
        assert_relative_eq!(moved.center.x, 7.0);
        assert_relative_eq!(moved.center.y, 1.0);

        let fixed = map.get(1).unwrap();
        assert_relative_eq!(fixed.center.x, 5.0);
        assert_relative_eq!(fixed.center.y, 5.0);
    }

    #[test]
    fn test_info_rows_layout() {
        let map = RopeMap::new(
            vec![RopeSpec::Endpoints(
                Point2D::new(0.0, 0.0),
                Point2D::new(4.0, 0.0),
            )],
            3.0,
            1.0,
            None,
        )
        .unwrap();
        let rows = map.info_rows();
        assert_eq!(rows.len(), 1);
        assert_relative_eq!(rows[0][0], 2.0);
        assert_relative_eq!(rows[0][1], 0.0);
        assert_relative_eq!(rows[0][2], 9.0, epsilon = 1e-9);
        assert_relative_eq!(rows[0][5], 1.0, epsilon = 1e-9);
    }
}
