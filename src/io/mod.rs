//! Dataset I/O.
//!
//! Loading of recorded mission files for offline replay, and CSV
//! dumps of estimation results.
//!
//! # Contents
//!
//! - [`dataset`]: mission file loaders and result writers

pub mod dataset;

pub use dataset::{Dataset, DetectionRow};
