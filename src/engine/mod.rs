//! The two estimation engines.
//!
//! The online engine consumes a live event stream and re-solves the
//! graph after every drained tick; the offline engine replays a whole
//! recorded mission as one batch problem:
//!
//! ```text
//!            online                          offline
//!   events ──▶ queue ──▶ drain      dataset ──▶ project detections
//!               │          │                      │
//!               │   associate, stage              ▼
//!               │          │                  GMM cluster
//!               │          ▼                      │
//!               │   incremental solve         assign to buoys
//!               │          │                      │
//!               ▼          ▼                      ▼
//!            estimates, diagnostics         one batch solve
//! ```
//!
//! # Components
//!
//! - [`OnlineSlam`]: threaded incremental engine with integrated
//!   data association and prior batching
//! - [`BatchingPolicy`]: deferral strategy for rope priors, four
//!   implementations selected from configuration
//! - [`OfflineSlam`]: replay pipeline with mixture-model clustering
//!   in place of per-event association

mod batching;
mod clustering;
mod offline;
mod online;

pub use batching::{BatchingPolicy, FlushContext, Flushed, PriorItem, StageContext, build_policy};
pub use clustering::{ClusterAssignment, GaussianMixture, assign_clusters, fit, fit_with_reduction};
pub use offline::{OfflineResult, OfflineSlam, ProjectedDetection};
pub use online::OnlineSlam;
