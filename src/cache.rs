//! Lazily computed raster artifacts for one snapshot session.
//!
//! One cache owns every raster the pipeline derives from the source photo:
//! the size-limited input, its Lab conversion, the per-region binary masks,
//! the classification rasters and the display overlay. Masks on the
//! persistence whitelist survive across sessions as PNG files in a cache
//! directory next to the photo; everything else is recomputed per session.

use crate::classify::Classification;
use crate::color::LabImage;
use crate::error::Result;
use image::imageops::FilterType;
use image::{GrayImage, RgbImage};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ============================================================================
// Mask tags
// ============================================================================

/// Which editing context a region mask belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskKind {
    /// Hand-marked training samples for one color.
    Train,
    /// Confidently classified pixels for one color.
    Count,
}

/// Identifier of a per-region mask, e.g. `train.contours.green`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MaskTag {
    pub kind: MaskKind,
    pub color: String,
}

impl MaskTag {
    pub fn train(color: impl Into<String>) -> Self {
        Self {
            kind: MaskKind::Train,
            color: color.into(),
        }
    }

    pub fn count(color: impl Into<String>) -> Self {
        Self {
            kind: MaskKind::Count,
            color: color.into(),
        }
    }
}

impl fmt::Display for MaskTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            MaskKind::Train => "train",
            MaskKind::Count => "count",
        };
        write!(f, "{}.contours.{}", kind, self.color)
    }
}

// ============================================================================
// Collaborators: image source and storage layout
// ============================================================================

/// Supplies the decoded source raster, already scaled to the size limit.
pub trait ImageSource {
    fn load(&self, size_limit: u32) -> Result<RgbImage>;
}

/// Loads the photo from disk, scaled so its longest edge fits the limit.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ImageSource for FileSource {
    fn load(&self, size_limit: u32) -> Result<RgbImage> {
        log::debug!("loading {:?} (limit {})", self.path, size_limit);
        let img = image::open(&self.path)?;
        Ok(img
            .resize(size_limit, size_limit, FilterType::Lanczos3)
            .to_rgb8())
    }
}

/// An already-decoded raster handed in by the host.
pub struct RasterSource {
    image: RgbImage,
}

impl RasterSource {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }
}

impl ImageSource for RasterSource {
    fn load(&self, _size_limit: u32) -> Result<RgbImage> {
        Ok(self.image.clone())
    }
}

/// Where a session's artifacts live on disk.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Per-photo directory holding the persistent masks.
    pub cache_dir: PathBuf,
    /// The photo's parent directory, holding palette swatch and index.
    pub parent_dir: PathBuf,
}

impl StorageLayout {
    /// Derive the layout for a photo: `<parent>/<stem>.cache/` next to it.
    pub fn for_image(image_path: &Path) -> Self {
        let parent_dir = image_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let stem = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        let cache_dir = parent_dir.join(format!("{}.cache", stem));
        Self {
            cache_dir,
            parent_dir,
        }
    }

    pub fn mask_path(&self, tag: &MaskTag) -> PathBuf {
        self.cache_dir.join(format!("{}.png", tag))
    }

    pub fn palette_path(&self) -> PathBuf {
        self.parent_dir.join("palette.png")
    }

    pub fn index_path(&self) -> PathBuf {
        self.parent_dir.join("palette.index")
    }

    /// Create the cache directory if missing.
    pub fn ensure_cache_dir(&self) -> Result<()> {
        if !self.cache_dir.exists() {
            log::debug!("creating cache directory {:?}", self.cache_dir);
            std::fs::create_dir_all(&self.cache_dir)?;
        }
        Ok(())
    }
}

// ============================================================================
// Artifact cache
// ============================================================================

/// Owner of every raster derived for one snapshot session.
pub struct ArtifactCache {
    source: Box<dyn ImageSource>,
    storage: Option<StorageLayout>,
    size_limit: u32,
    persistent: Vec<MaskTag>,

    input: Option<RgbImage>,
    lab: Option<Arc<LabImage>>,
    masks: HashMap<MaskTag, GrayImage>,
    overlay: Option<RgbImage>,
    classification: Option<Classification>,
}

impl ArtifactCache {
    /// Create a cache over an image source.
    ///
    /// `storage` enables disk persistence; `None` keeps the session purely
    /// in memory. The persistence whitelist is the set of training masks for
    /// the configured colors.
    pub fn new(
        source: Box<dyn ImageSource>,
        storage: Option<StorageLayout>,
        size_limit: u32,
        colors: &[String],
    ) -> Self {
        Self {
            source,
            storage,
            size_limit,
            persistent: colors.iter().map(MaskTag::train).collect(),
            input: None,
            lab: None,
            masks: HashMap::new(),
            overlay: None,
            classification: None,
        }
    }

    pub fn storage(&self) -> Option<&StorageLayout> {
        self.storage.as_ref()
    }

    /// The size-limited input raster, loaded through the source on first use.
    pub fn input(&mut self) -> Result<&RgbImage> {
        if self.input.is_none() {
            self.input = Some(self.source.load(self.size_limit)?);
        }
        Ok(self.input.as_ref().unwrap())
    }

    /// Working image dimensions.
    pub fn dimensions(&mut self) -> Result<(u32, u32)> {
        Ok(self.input()?.dimensions())
    }

    /// The Lab working image; a pure function of the input, converted once.
    ///
    /// Shared so the background classifier can hold a snapshot of it while
    /// the interactive path keeps editing masks.
    pub fn lab(&mut self) -> Result<Arc<LabImage>> {
        if self.lab.is_none() {
            let input = self.input()?;
            self.lab = Some(Arc::new(LabImage::from_rgb(input)));
        }
        Ok(Arc::clone(self.lab.as_ref().unwrap()))
    }

    /// The region mask for a tag, lazily created blank at input size.
    pub fn mask(&mut self, tag: &MaskTag) -> Result<&mut GrayImage> {
        if !self.masks.contains_key(tag) {
            let (w, h) = self.dimensions()?;
            self.masks.insert(tag.clone(), GrayImage::new(w, h));
        }
        Ok(self.masks.get_mut(tag).unwrap())
    }

    /// The mask for a tag if it has been materialized.
    pub fn mask_if_present(&self, tag: &MaskTag) -> Option<&GrayImage> {
        self.masks.get(tag)
    }

    /// Replace a mask wholesale.
    pub fn set_mask(&mut self, tag: MaskTag, mask: GrayImage) {
        self.masks.insert(tag, mask);
    }

    /// Drop a mask; the next access recreates it blank.
    pub fn remove_mask(&mut self, tag: &MaskTag) {
        self.masks.remove(tag);
    }

    pub fn set_overlay(&mut self, overlay: RgbImage) {
        self.overlay = Some(overlay);
    }

    pub fn overlay(&self) -> Option<&RgbImage> {
        self.overlay.as_ref()
    }

    pub fn set_classification(&mut self, classification: Classification) {
        self.classification = Some(classification);
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    pub fn clear_classification(&mut self) {
        self.classification = None;
        self.overlay = None;
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Restore whitelisted masks from disk.
    ///
    /// Masks whose dimensions do not match the current working image are
    /// deleted from storage and skipped. Returns the tags actually restored.
    pub fn load_persistent_masks(&mut self) -> Result<Vec<MaskTag>> {
        let Some(storage) = self.storage.clone() else {
            return Ok(Vec::new());
        };
        let (w, h) = self.dimensions()?;

        let mut restored = Vec::new();
        for tag in self.persistent.clone() {
            let path = storage.mask_path(&tag);
            if !path.exists() {
                continue;
            }
            let mask = image::open(&path)?.to_luma8();
            if mask.dimensions() == (w, h) {
                self.masks.insert(tag.clone(), mask);
                restored.push(tag);
            } else {
                log::warn!("incompatible mask {:?}, removing", path);
                std::fs::remove_file(&path)?;
            }
        }
        Ok(restored)
    }

    /// Write whitelisted masks back to disk.
    ///
    /// A whitelisted tag with no in-memory mask deletes its file: an absent
    /// mask is a valid state to persist.
    pub fn persist_masks(&self) -> Result<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        storage.ensure_cache_dir()?;

        for tag in &self.persistent {
            let path = storage.mask_path(tag);
            if let Some(mask) = self.masks.get(tag) {
                mask.save(&path)?;
            } else if path.exists() {
                log::debug!("mask '{}' gone from session, removing {:?}", tag, path);
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}
