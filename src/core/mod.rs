//! Core foundation layer.
//!
//! Bottom layer of the stack with no internal dependencies besides the
//! crate error type. All other layers depend on core.
//!
//! # Contents
//!
//! - [`types`]: Core data types (poses, covariances, events)
//! - [`math`]: Planar geometry primitives

pub mod math;
pub mod types;
