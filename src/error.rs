//! Error types for sagar-slam

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// sagar-slam error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Buoy priors were already loaded; buoy identity is immutable
    #[error("Buoy priors already set ({0} buoys)")]
    BuoysAlreadySet(usize),

    /// Buoy setup called with no priors
    #[error("Buoy setup requires at least one prior position")]
    EmptyBuoyList,

    /// Rope setup referenced buoy indices before any buoys were loaded
    #[error("Rope setup requires buoy priors to be set first")]
    BuoysNotSet,

    /// Rope priors were already derived
    #[error("Rope priors already set ({0} ropes)")]
    RopesAlreadySet(usize),

    /// Rope referenced a buoy index outside the loaded set
    #[error("Rope references buoy index {index}, but only {count} buoys exist")]
    BuoyIndexOutOfRange {
        /// Requested buoy index
        index: usize,
        /// Number of loaded buoys
        count: usize,
    },

    /// Zero-length segment: distance to it is undefined, not zero
    #[error("Degenerate segment: both endpoints are ({0}, {1})")]
    DegenerateSegment(f64, f64),

    /// Optimization requested on a graph with no factors
    #[error("Cannot optimize an empty graph")]
    EmptyGraph,

    /// Solver failed for the in-flight update; the event is not retried
    #[error("Solver failure: {0}")]
    SolverFailure(String),

    /// Dataset I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Dataset file missing or unreadable
    #[error("Cannot open {file}: {source}")]
    DatasetOpen {
        /// File that failed to open
        file: String,
        /// Underlying reader error
        source: csv::Error,
    },

    /// Dataset row error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed numeric field in a dataset row
    #[error("Malformed row in {file}: {detail}")]
    MalformedRow {
        /// Source file name
        file: String,
        /// What was wrong with the row
        detail: String,
    },
}
