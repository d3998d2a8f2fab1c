//! One counting session over one photograph.
//!
//! The snapshot owns every piece of mutable session state: the artifact
//! cache, the committed polygons, the trained palette and its search index,
//! and the mode the user is working in. All operations assume exclusive,
//! serialized access from one logical thread of control; the only work that
//! leaves that thread is the whole-image classification, dispatched through
//! [`start_count`](Snapshot::start_count) and folded back in with
//! [`finish_count`](Snapshot::finish_count).

use crate::cache::{ArtifactCache, FileSource, ImageSource, MaskKind, MaskTag, StorageLayout};
use crate::classify::{self, Classification, PendingClassification};
use crate::config::Tuning;
use crate::contour::{self, ContourStore};
use crate::editor;
use crate::error::{Result, SnapshotError};
use crate::index::NearestIndex;
use crate::masker;
use crate::palette::{COLOR_GRADATIONS, ColorPalette};
use crate::report::{self, ColorCount, ResultSink};
use image::RgbImage;
use imageproc::rect::Rect;
use std::path::Path;

/// Card colors counted by default.
pub const DEFAULT_COLORS: &[&str] = &["green", "pink", "yellow"];

fn default_colors() -> Vec<String> {
    DEFAULT_COLORS.iter().map(|c| c.to_string()).collect()
}

/// What a left click means right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Picks mark training samples for the current color.
    Train,
    /// Picks repair counted regions, routed by the pixel's classification.
    Count,
}

/// Fire-and-forget notifications pushed to the display surface.
///
/// The core never queries the surface; hosts that render layers implement
/// whichever callbacks they care about.
pub trait SceneObserver {
    fn contours_changed(&mut self, _region: &MaskTag) {}
    fn overlay_changed(&mut self) {}
    fn palette_changed(&mut self) {}
}

/// A counting session bound to one photo.
pub struct Snapshot {
    cache: ArtifactCache,
    store: ContourStore,
    tuning: Tuning,
    colors: Vec<String>,
    mode: Mode,
    current_color: String,
    palette: Option<ColorPalette>,
    index: Option<NearestIndex>,
    classify_in_flight: bool,
    observer: Option<Box<dyn SceneObserver>>,
}

impl Snapshot {
    /// Open a session for a photo on disk, restoring any persisted state
    /// (training masks, palette, search index) found next to it.
    pub fn open(image_path: &Path, tuning: Tuning) -> Result<Self> {
        log::debug!("loading {:?}", image_path);
        let storage = StorageLayout::for_image(image_path);
        let source = FileSource::new(image_path);
        let mut snapshot =
            Self::with_source(Box::new(source), Some(storage), tuning, default_colors());
        snapshot.restore_session()?;
        Ok(snapshot)
    }

    /// Build a session over an arbitrary image source.
    ///
    /// `storage = None` keeps the whole session in memory.
    pub fn with_source(
        source: Box<dyn ImageSource>,
        storage: Option<StorageLayout>,
        tuning: Tuning,
        colors: Vec<String>,
    ) -> Self {
        let cache = ArtifactCache::new(source, storage, tuning.size_limit, &colors);
        let current_color = colors.first().cloned().unwrap_or_default();
        Self {
            cache,
            store: ContourStore::new(),
            tuning,
            colors,
            mode: Mode::Train,
            current_color,
            palette: None,
            index: None,
            classify_in_flight: false,
            observer: None,
        }
    }

    /// Restore persisted masks and, when both the swatch and the index file
    /// are present, the trained palette.
    pub fn restore_session(&mut self) -> Result<()> {
        for tag in self.cache.load_persistent_masks()? {
            self.refresh_contours(&tag)?;
        }

        if let Some(storage) = self.cache.storage() {
            let palette_file = storage.palette_path();
            let index_file = storage.index_path();
            if palette_file.exists() && index_file.exists() {
                match NearestIndex::load(&index_file) {
                    Ok((palette, index)) => {
                        self.palette = Some(palette);
                        self.index = Some(index);
                        self.notify_palette();
                    }
                    Err(e) => log::warn!("could not restore palette index: {}", e),
                }
            }
        }
        Ok(())
    }

    /// Register the display surface.
    pub fn set_observer(&mut self, observer: Box<dyn SceneObserver>) {
        self.observer = Some(observer);
    }

    // ========================================================================
    // Modes and inspection
    // ========================================================================

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Enter training mode for one color.
    pub fn set_train_color(&mut self, color: impl Into<String>) {
        self.mode = Mode::Train;
        self.current_color = color.into();
    }

    pub fn current_color(&self) -> &str {
        &self.current_color
    }

    pub fn colors(&self) -> &[String] {
        &self.colors
    }

    pub fn palette(&self) -> Option<&ColorPalette> {
        self.palette.as_ref()
    }

    pub fn contours(&self) -> &ContourStore {
        &self.store
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.cache.classification()
    }

    /// The confident-pixel display raster from the last masking run.
    pub fn overlay(&self) -> Option<&RgbImage> {
        self.cache.overlay()
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn tuning_mut(&mut self) -> &mut Tuning {
        &mut self.tuning
    }

    // ========================================================================
    // Training
    // ========================================================================

    /// Cluster the marked training pixels into a fresh palette and rebuild
    /// the search index over it.
    ///
    /// Replaces any previous palette wholesale and drops the previous index,
    /// classification and overlay. The new palette swatch and index are
    /// persisted immediately when storage is configured.
    pub fn train_palette(&mut self) -> Result<()> {
        let lab = self.cache.lab()?;
        let groups: Vec<(String, &image::GrayImage)> = self
            .colors
            .iter()
            .filter_map(|color| {
                self.cache
                    .mask_if_present(&MaskTag::train(color))
                    .map(|mask| (color.clone(), mask))
            })
            .collect();

        let palette = ColorPalette::train(&lab, &groups, COLOR_GRADATIONS)?;
        let index = NearestIndex::build(&palette)?;
        log::debug!("built palette classifier over {} centers", palette.len());

        if let Some(storage) = self.cache.storage() {
            palette.swatch().save(storage.palette_path())?;
            index.save(&palette, &storage.index_path())?;
        }

        self.palette = Some(palette);
        self.index = Some(index);
        self.cache.clear_classification();
        self.classify_in_flight = false;
        self.notify_palette();
        Ok(())
    }

    /// Throw away the current color's training samples.
    pub fn reset_training(&mut self) {
        let tag = MaskTag::train(&self.current_color);
        self.store.clear_region(&tag);
        self.cache.remove_mask(&tag);
        self.notify_contours(&tag);
    }

    // ========================================================================
    // Counting
    // ========================================================================

    /// Dispatch whole-image classification to a worker.
    ///
    /// The caller observes completion by blocking on the returned handle and
    /// then feeding the result to [`finish_count`](Self::finish_count).
    /// Requesting a second run while one is outstanding is an error.
    pub fn start_count(&mut self) -> Result<PendingClassification> {
        if self.classify_in_flight {
            return Err(SnapshotError::ClassificationPending);
        }
        let index = self
            .index
            .clone()
            .ok_or(SnapshotError::ClassifierNotReady)?;
        let lab = self.cache.lab()?;
        self.classify_in_flight = true;
        Ok(classify::classify_background(lab, index))
    }

    /// Fold a completed classification back into the session: confidence
    /// masking, per-color contour extraction and the view refresh, in that
    /// order. Returns the resulting counts.
    pub fn finish_count(&mut self, classification: Classification) -> Result<Vec<ColorCount>> {
        self.classify_in_flight = false;
        let palette = self
            .palette
            .as_ref()
            .ok_or(SnapshotError::ClassifierNotReady)?;

        let masked = masker::confidence_masks(
            &classification,
            palette,
            self.tuning.distance_threshold_sq(),
        );
        self.cache.set_classification(classification);
        self.cache.set_overlay(masked.overlay);

        for (color, mask) in masked.masks {
            let tag = MaskTag::count(&color);
            self.cache.set_mask(tag.clone(), mask);
            self.refresh_contours(&tag)?;
        }

        self.notify_overlay();
        Ok(self.counts())
    }

    /// Run the whole count synchronously: dispatch, wait, fold back in.
    pub fn count(&mut self) -> Result<Vec<ColorCount>> {
        let pending = self.start_count()?;
        let classification = match pending.wait() {
            Ok(c) => c,
            Err(e) => {
                self.classify_in_flight = false;
                return Err(e);
            }
        };
        self.finish_count(classification)
    }

    /// Re-run masking and extraction over the stored classification with the
    /// current tuning (the threshold-slider path); classification itself is
    /// not recomputed.
    pub fn remask(&mut self) -> Result<Vec<ColorCount>> {
        let classification = self
            .cache
            .classification()
            .cloned()
            .ok_or(SnapshotError::NoClassification)?;
        self.finish_count(classification)
    }

    /// Committed region count per configured color.
    pub fn counts(&self) -> Vec<ColorCount> {
        self.colors
            .iter()
            .map(|color| ColorCount {
                color: color.clone(),
                count: self.store.count_for(&MaskTag::count(color)),
            })
            .collect()
    }

    /// Push the current counts to a result sink; failures are logged and
    /// dropped.
    pub fn report_counts(&self, sink: &mut dyn ResultSink) {
        report::report(sink, &self.counts());
    }

    // ========================================================================
    // Interactive edits
    // ========================================================================

    /// Flood-pick at a point. In train mode the fill lands in the current
    /// color's training mask; in count mode it repairs the counted region of
    /// whatever color the pixel classified as. Returns whether anything
    /// changed.
    pub fn pick(&mut self, x: u32, y: u32) -> Result<bool> {
        let (w, h) = self.cache.dimensions()?;
        if x >= w || y >= h {
            return Ok(false);
        }

        let region = match self.mode {
            Mode::Train => MaskTag::train(&self.current_color),
            Mode::Count => {
                let classification = self
                    .cache
                    .classification()
                    .ok_or(SnapshotError::NoClassification)?;
                let entry = classification.entry_at(x, y) as usize;
                let palette = self
                    .palette
                    .as_ref()
                    .ok_or(SnapshotError::ClassifierNotReady)?;
                let Some(color) = palette.color_of(entry) else {
                    return Ok(false);
                };
                MaskTag::count(color)
            }
        };

        let min_area = self.region_min_area(&region);
        let outcome = editor::pick(
            &mut self.cache,
            &mut self.store,
            &region,
            x,
            y,
            self.tuning.pick_fuzz,
            min_area,
            self.tuning.simplify_tolerance,
        )?;

        if outcome.is_some() {
            self.notify_contours(&region);
        }
        Ok(outcome.is_some())
    }

    /// Erase the committed region under a point. Returns whether a polygon
    /// was hit.
    pub fn unpick(&mut self, x: u32, y: u32) -> Result<bool> {
        match editor::unpick(&mut self.cache, &mut self.store, x, y)? {
            Some(region) => {
                self.notify_contours(&region);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Merge the selected polygons of each region into their convex hull.
    /// Returns how many hulls were committed.
    pub fn merge_contours(&mut self, rect: Rect) -> Result<usize> {
        let hulls = editor::merge_contours(&mut self.cache, &mut self.store, rect)?;
        let regions: Vec<MaskTag> = hulls
            .iter()
            .filter_map(|id| self.store.get(*id).map(|c| c.region.clone()))
            .collect();
        for region in regions {
            self.notify_contours(&region);
        }
        Ok(hulls.len())
    }

    /// Erase every selected polygon from its mask. Returns how many were
    /// cleared.
    pub fn clear_contours(&mut self, rect: Rect) -> Result<usize> {
        let cleared = editor::clear_contours(&mut self.cache, &mut self.store, rect)?;
        if cleared > 0 {
            self.notify_overlay();
        }
        Ok(cleared)
    }

    /// Drop and re-derive every committed polygon of a region from its mask.
    pub fn refresh_contours(&mut self, tag: &MaskTag) -> Result<usize> {
        self.store.clear_region(tag);
        let min_area = self.region_min_area(tag);
        let tolerance = self.tuning.simplify_tolerance;
        let polygons = {
            let mask = self.cache.mask(tag)?;
            contour::extract(mask, None, min_area, tolerance)
        };
        let count = polygons.len();
        for polygon in polygons {
            self.store.commit(tag.clone(), polygon);
        }
        self.notify_contours(tag);
        Ok(count)
    }

    /// Persist the whitelisted masks. Also runs on drop.
    pub fn save(&self) -> Result<()> {
        self.cache.persist_masks()
    }

    // training masks keep every picked region; only counted regions are
    // subject to the size floor
    fn region_min_area(&self, tag: &MaskTag) -> f64 {
        match tag.kind {
            MaskKind::Train => 0.0,
            MaskKind::Count => self.tuning.min_region_area(),
        }
    }

    fn notify_contours(&mut self, region: &MaskTag) {
        if let Some(observer) = self.observer.as_deref_mut() {
            observer.contours_changed(region);
        }
    }

    fn notify_overlay(&mut self) {
        if let Some(observer) = self.observer.as_deref_mut() {
            observer.overlay_changed();
        }
    }

    fn notify_palette(&mut self) {
        if let Some(observer) = self.observer.as_deref_mut() {
            observer.palette_changed();
        }
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        if let Err(e) = self.save() {
            log::warn!("failed to persist session state: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RasterSource;
    use image::{Rgb, RgbImage};

    fn snapshot_over(img: RgbImage) -> Snapshot {
        Snapshot::with_source(
            Box::new(RasterSource::new(img)),
            None,
            Tuning::default(),
            default_colors(),
        )
    }

    fn square_canvas() -> RgbImage {
        let mut img = RgbImage::from_pixel(60, 60, Rgb([128, 128, 128]));
        for y in 10..30 {
            for x in 10..30 {
                img.put_pixel(x, y, Rgb([0, 190, 40]));
            }
        }
        img
    }

    #[test]
    fn test_mode_switching() {
        let mut snapshot = snapshot_over(square_canvas());
        assert_eq!(snapshot.mode(), Mode::Train);
        assert_eq!(snapshot.current_color(), "green");

        snapshot.set_mode(Mode::Count);
        assert_eq!(snapshot.mode(), Mode::Count);

        snapshot.set_train_color("pink");
        assert_eq!(snapshot.mode(), Mode::Train);
        assert_eq!(snapshot.current_color(), "pink");
    }

    #[test]
    fn test_pick_outside_image_is_noop() {
        let mut snapshot = snapshot_over(square_canvas());
        assert!(!snapshot.pick(500, 500).expect("pick errored"));
    }

    #[test]
    fn test_train_pick_then_reset() {
        let mut snapshot = snapshot_over(square_canvas());
        assert!(snapshot.pick(15, 15).expect("pick errored"));
        assert_eq!(snapshot.contours().count_for(&MaskTag::train("green")), 1);

        snapshot.reset_training();
        assert_eq!(snapshot.contours().count_for(&MaskTag::train("green")), 0);
    }

    #[test]
    fn test_count_requires_training() {
        let mut snapshot = snapshot_over(square_canvas());
        assert!(matches!(
            snapshot.start_count(),
            Err(SnapshotError::ClassifierNotReady)
        ));
    }

    #[test]
    fn test_count_mode_pick_requires_classification() {
        let mut snapshot = snapshot_over(square_canvas());
        snapshot.set_mode(Mode::Count);
        assert!(matches!(
            snapshot.pick(15, 15),
            Err(SnapshotError::NoClassification)
        ));
    }

    #[test]
    fn test_train_with_no_samples_fails() {
        let mut snapshot = snapshot_over(square_canvas());
        assert!(matches!(
            snapshot.train_palette(),
            Err(SnapshotError::NoTrainingData)
        ));
    }

    #[test]
    fn test_reentrant_count_rejected() {
        let mut snapshot = snapshot_over(square_canvas());
        snapshot.pick(15, 15).expect("pick errored");
        snapshot.train_palette().expect("train failed");

        let pending = snapshot.start_count().expect("dispatch failed");
        assert!(matches!(
            snapshot.start_count(),
            Err(SnapshotError::ClassificationPending)
        ));

        let classification = pending.wait().expect("worker lost");
        snapshot.finish_count(classification).expect("finish failed");
        // after completion a new run may start
        assert!(snapshot.start_count().is_ok());
    }

    #[test]
    fn test_remask_without_classification() {
        let mut snapshot = snapshot_over(square_canvas());
        assert!(matches!(
            snapshot.remask(),
            Err(SnapshotError::NoClassification)
        ));
    }
}
