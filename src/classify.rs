//! Whole-image pixel classification.
//!
//! The most expensive operation in the pipeline: every pixel of the working
//! image is matched against the palette in one batched exhaustive 1-NN pass.
//! The interactive path dispatches it to a worker and picks the result up
//! through a single-consumer channel; everything downstream (masking,
//! extraction, refresh) waits for that handoff.

use crate::color::LabImage;
use crate::error::{Result, SnapshotError};
use crate::index::{NearestIndex, SearchEffort};
use ndarray::Array2;
use std::sync::Arc;
use std::sync::mpsc;

/// Per-pixel nearest palette entry and squared distance, both sized to the
/// working image. Recomputed wholesale on every run.
#[derive(Debug, Clone)]
pub struct Classification {
    pub indices: Array2<u32>,
    pub distances: Array2<f32>,
}

impl Classification {
    pub fn width(&self) -> u32 {
        self.indices.shape()[1] as u32
    }

    pub fn height(&self) -> u32 {
        self.indices.shape()[0] as u32
    }

    /// Nearest palette entry for the pixel at (x, y).
    pub fn entry_at(&self, x: u32, y: u32) -> u32 {
        self.indices[[y as usize, x as usize]]
    }

    /// Squared Lab distance to that entry.
    pub fn distance_at(&self, x: u32, y: u32) -> f32 {
        self.distances[[y as usize, x as usize]]
    }
}

/// Classify every pixel of the working image against the palette index.
pub fn classify(lab: &LabImage, index: &NearestIndex) -> Classification {
    let (w, h) = (lab.width() as usize, lab.height() as usize);
    let queries = lab.pixels_flat();
    let results = index.nearest_batch(&queries, SearchEffort::Exhaustive);

    let mut indices = Array2::zeros((h, w));
    let mut distances = Array2::zeros((h, w));
    for (i, (entry, distance)) in results.into_iter().enumerate() {
        let (y, x) = (i / w, i % w);
        indices[[y, x]] = entry;
        distances[[y, x]] = distance;
    }

    Classification { indices, distances }
}

/// Handle to a classification run in flight on a worker.
///
/// Consuming it through [`wait`](Self::wait) is the only way to observe the
/// result, which guarantees the post-classification sequence cannot fire
/// twice for one run. There is no cancellation.
pub struct PendingClassification {
    rx: mpsc::Receiver<Classification>,
}

impl PendingClassification {
    /// Block until the worker finishes and hand the result over.
    pub fn wait(self) -> Result<Classification> {
        self.rx.recv().map_err(|_| SnapshotError::WorkerLost)
    }
}

/// Dispatch a classification run onto a worker thread.
///
/// The working image and index are snapshotted at dispatch time; edits made
/// while the run is in flight do not affect it.
pub fn classify_background(lab: Arc<LabImage>, index: NearestIndex) -> PendingClassification {
    let (tx, rx) = mpsc::sync_channel(1);
    rayon::spawn(move || {
        let result = classify(&lab, &index);
        // the receiver may be gone if the session was torn down; nothing to do
        let _ = tx.send(result);
    });
    PendingClassification { rx }
}
