//! Landmark tables.
//!
//! Two landmark kinds exist in the field: buoys, point landmarks with
//! surveyed prior positions, and ropes, straight segments strung
//! between buoys or given as explicit endpoints. Both tables are built
//! once at setup; rope endpoints can additionally be re-resolved from
//! the running buoy estimate.

mod buoys;
mod ropes;

pub use buoys::BuoyMap;
pub use ropes::{Rope, RopeMap, RopeSpec};
