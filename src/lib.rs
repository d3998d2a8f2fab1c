//! votetally - count color-coded vote cards in a photograph.
//!
//! A trainable pixel-classification and region-extraction pipeline: mark
//! sample regions per color, cluster them into a Lab palette, classify every
//! pixel against a persisted nearest-neighbor index, mask the confident
//! pixels per color and count the contiguous regions. Flood-fill based edits
//! (pick/unpick/merge/clear) correct both training marks and counted
//! regions.

pub mod cache;
pub mod classify;
pub mod color;
pub mod config;
pub mod contour;
pub mod editor;
pub mod error;
pub mod index;
pub mod kmeans;
pub mod masker;
pub mod palette;
pub mod report;
pub mod snapshot;

#[cfg(test)]
mod tests;

pub use cache::{
    ArtifactCache, FileSource, ImageSource, MaskKind, MaskTag, RasterSource, StorageLayout,
};
pub use classify::{Classification, PendingClassification};
pub use config::Tuning;
pub use contour::{ContourStore, Polygon};
pub use error::{Result, SnapshotError};
pub use index::{NearestIndex, SearchEffort};
pub use palette::{COLOR_GRADATIONS, ColorPalette};
pub use report::{ColorCount, LogSink, ResultSink};
pub use snapshot::{DEFAULT_COLORS, Mode, SceneObserver, Snapshot};
