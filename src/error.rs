//! Error types for the counting pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Errors that can occur while training, classifying or persisting a snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// I/O error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding error
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Every color group was empty when training was requested
    #[error("insufficient training data: no marked pixels in any color group")]
    NoTrainingData,

    /// Classification was requested before a palette index was built or loaded
    #[error("classifier not ready: train the colors first")]
    ClassifierNotReady,

    /// A count-mode edit needs pixel classes that have not been computed yet
    #[error("no classification available: count cards first")]
    NoClassification,

    /// A classification run was requested while one is still outstanding
    #[error("a classification run is already in progress")]
    ClassificationPending,

    /// The classification worker terminated without producing a result
    #[error("classification worker disappeared without a result")]
    WorkerLost,

    /// A persisted search index does not line up with the palette it carries
    #[error("index mismatch: expected {expected} palette entries, found {found}")]
    IndexMismatch {
        /// Entry count implied by the embedded palette
        expected: usize,
        /// Entry count the tree was built over
        found: usize,
    },

    /// A persisted file has a version this build does not understand
    #[error("unsupported file version '{found}' in {path:?}")]
    UnsupportedVersion {
        /// Version string found in the file
        found: String,
        /// File the version was read from
        path: PathBuf,
    },
}

impl SnapshotError {
    /// Create an index mismatch error.
    pub fn index_mismatch(expected: usize, found: usize) -> Self {
        Self::IndexMismatch { expected, found }
    }
}
