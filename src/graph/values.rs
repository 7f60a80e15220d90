//! Variable handles and the estimate container.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::types::{Point2D, Pose2D};

/// Stable typed handle for a graph variable.
///
/// Handles are assigned by the engines and never reused; the solver's
/// column layout stays private to the linearization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VarKey {
    /// Vehicle pose node, by sequential pose index
    Pose(u32),
    /// Buoy landmark, by setup index
    Buoy(u32),
    /// Aggregate rope landmark, by rope setup index
    Rope(u32),
    /// Rope detection point, by detection index
    Detection(u32),
}

impl VarKey {
    /// Tangent dimension of the variable.
    #[inline]
    pub fn dim(&self) -> usize {
        match self {
            VarKey::Pose(_) => 3,
            _ => 2,
        }
    }
}

impl std::fmt::Display for VarKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarKey::Pose(i) => write!(f, "x{}", i),
            VarKey::Buoy(i) => write!(f, "b{}", i),
            VarKey::Rope(i) => write!(f, "l{}", i),
            VarKey::Detection(i) => write!(f, "r{}", i),
        }
    }
}

/// Value of a graph variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VarValue {
    /// SE(2) pose value
    Pose(Pose2D),
    /// Planar point value
    Point(Point2D),
}

impl VarValue {
    /// The pose value, if this is a pose variable.
    #[inline]
    pub fn as_pose(&self) -> Option<Pose2D> {
        match self {
            VarValue::Pose(p) => Some(*p),
            VarValue::Point(_) => None,
        }
    }

    /// The point value, if this is a point variable.
    #[inline]
    pub fn as_point(&self) -> Option<Point2D> {
        match self {
            VarValue::Point(p) => Some(*p),
            VarValue::Pose(_) => None,
        }
    }
}

/// Ordered map of variable values.
///
/// Doubles as the initial-estimate container and the solved snapshot:
/// insertion order is stable, which keeps the solver's column layout
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct Values {
    entries: Vec<(VarKey, VarValue)>,
    index: HashMap<VarKey, usize>,
}

impl Values {
    /// An empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new variable.
    ///
    /// Returns false and leaves the existing value untouched when the
    /// key is already present.
    pub fn insert(&mut self, key: VarKey, value: VarValue) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push((key, value));
        true
    }

    /// Overwrite the value of an existing variable.
    ///
    /// Returns false when the key is unknown.
    pub fn set(&mut self, key: VarKey, value: VarValue) -> bool {
        match self.index.get(&key) {
            Some(&slot) => {
                self.entries[slot].1 = value;
                true
            }
            None => false,
        }
    }

    /// Value of a variable.
    pub fn get(&self, key: VarKey) -> Option<VarValue> {
        self.index.get(&key).map(|&slot| self.entries[slot].1)
    }

    /// Pose value of a pose variable.
    pub fn pose(&self, key: VarKey) -> Option<Pose2D> {
        self.get(key).and_then(|v| v.as_pose())
    }

    /// Point value of a point variable.
    pub fn point(&self, key: VarKey) -> Option<Point2D> {
        self.get(key).and_then(|v| v.as_point())
    }

    /// Whether a variable exists.
    pub fn contains(&self, key: VarKey) -> bool {
        self.index.contains_key(&key)
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the container is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate variables in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (VarKey, VarValue)> + '_ {
        self.entries.iter().copied()
    }

    /// Absorb all variables of `other`, skipping keys already present.
    ///
    /// Returns the number of variables inserted.
    pub fn merge(&mut self, other: &Values) -> usize {
        let mut inserted = 0;
        for (key, value) in other.iter() {
            if self.insert(key, value) {
                inserted += 1;
            }
        }
        inserted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_typed_getters() {
        let mut values = Values::new();
        assert!(values.insert(VarKey::Pose(0), VarValue::Pose(Pose2D::new(1.0, 2.0, 0.5))));
        assert!(values.insert(VarKey::Buoy(0), VarValue::Point(Point2D::new(3.0, 4.0))));

        let pose = values.pose(VarKey::Pose(0)).unwrap();
        assert_eq!(pose.x, 1.0);

        let point = values.point(VarKey::Buoy(0)).unwrap();
        assert_eq!(point.y, 4.0);

        // Wrong-typed access is a miss, not a panic
        assert!(values.point(VarKey::Pose(0)).is_none());
        assert!(values.pose(VarKey::Buoy(0)).is_none());
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let mut values = Values::new();
        assert!(values.insert(VarKey::Detection(7), VarValue::Point(Point2D::new(1.0, 1.0))));
        assert!(!values.insert(VarKey::Detection(7), VarValue::Point(Point2D::new(9.0, 9.0))));
        assert_eq!(values.point(VarKey::Detection(7)).unwrap().x, 1.0);
    }

    #[test]
    fn test_set_updates_in_place() {
        let mut values = Values::new();
        values.insert(VarKey::Buoy(1), VarValue::Point(Point2D::new(0.0, 0.0)));
        assert!(values.set(VarKey::Buoy(1), VarValue::Point(Point2D::new(5.0, 6.0))));
        assert_eq!(values.point(VarKey::Buoy(1)).unwrap().x, 5.0);
        assert!(!values.set(VarKey::Buoy(2), VarValue::Point(Point2D::new(0.0, 0.0))));
    }

    #[test]
    fn test_merge_skips_existing() {
        let mut a = Values::new();
        a.insert(VarKey::Pose(0), VarValue::Pose(Pose2D::identity()));

        let mut b = Values::new();
        b.insert(VarKey::Pose(0), VarValue::Pose(Pose2D::new(9.0, 9.0, 0.0)));
        b.insert(VarKey::Pose(1), VarValue::Pose(Pose2D::new(1.0, 0.0, 0.0)));

        assert_eq!(a.merge(&b), 1);
        assert_eq!(a.len(), 2);
        assert_eq!(a.pose(VarKey::Pose(0)).unwrap().x, 0.0);
    }

    #[test]
    fn test_iteration_order_is_insertion_order() {
        let mut values = Values::new();
        values.insert(VarKey::Buoy(2), VarValue::Point(Point2D::default()));
        values.insert(VarKey::Pose(0), VarValue::Pose(Pose2D::identity()));
        values.insert(VarKey::Buoy(0), VarValue::Point(Point2D::default()));

        let keys: Vec<VarKey> = values.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![VarKey::Buoy(2), VarKey::Pose(0), VarKey::Buoy(0)]);
    }

    #[test]
    fn test_var_key_dims() {
        assert_eq!(VarKey::Pose(0).dim(), 3);
        assert_eq!(VarKey::Buoy(0).dim(), 2);
        assert_eq!(VarKey::Rope(0).dim(), 2);
        assert_eq!(VarKey::Detection(0).dim(), 2);
    }
}
