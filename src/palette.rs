//! Trained color palette: clustering of marked sample pixels into a fixed
//! number of Lab color centers per color group.
//!
//! A palette is replaced wholesale on every (re)train; it is never patched.
//! Group membership of an entry is arithmetic: entry `i` belongs to the
//! `i / gradations`-th *trained* group, so groups are always contiguous and
//! exactly `gradations` entries wide. Colors with no marked pixels simply do
//! not appear.

use crate::color::{LabImage, lab_to_rgb8};
use crate::error::{Result, SnapshotError};
use crate::kmeans;
use image::{GrayImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Cluster centers allocated to each color group.
pub const COLOR_GRADATIONS: usize = 4;

/// Relocation passes allowed per group during training.
const MAX_TRAIN_ITERATIONS: usize = 10;

/// An ordered set of color centers in parallel Lab and display-space form.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorPalette {
    lab: Vec<[f32; 3]>,
    display: Vec<[u8; 3]>,
    gradations: usize,
    group_names: Vec<String>,
}

impl ColorPalette {
    /// Build a palette from Lab centers; the display-space side is derived by
    /// inverse color conversion.
    pub fn from_lab(lab: Vec<[f32; 3]>, gradations: usize, group_names: Vec<String>) -> Self {
        let display = lab.iter().map(|&c| lab_to_rgb8(c)).collect();
        Self {
            lab,
            display,
            gradations,
            group_names,
        }
    }

    /// Cluster the marked pixels of each color group into `gradations`
    /// centers and concatenate the results in group order.
    ///
    /// Groups without any marked pixel are skipped. Returns
    /// [`SnapshotError::NoTrainingData`] when every group is empty.
    pub fn train(
        lab: &LabImage,
        groups: &[(String, &GrayImage)],
        gradations: usize,
    ) -> Result<Self> {
        let mut rng = rand::thread_rng();
        let mut centers = Vec::new();
        let mut trained_names = Vec::new();

        for (name, mask) in groups {
            let samples = masked_pixels(lab, mask);
            if samples.is_empty() {
                log::debug!("color '{}' has no training pixels, skipping", name);
                continue;
            }

            let group_centers = kmeans::cluster(&samples, gradations, MAX_TRAIN_ITERATIONS, &mut rng);
            log::debug!(
                "trained color '{}' from {} pixels into {} centers",
                name,
                samples.len(),
                group_centers.len()
            );
            centers.extend(group_centers);
            trained_names.push(name.clone());
        }

        if centers.is_empty() {
            return Err(SnapshotError::NoTrainingData);
        }

        Ok(Self::from_lab(centers, gradations, trained_names))
    }

    /// Total number of palette entries.
    pub fn len(&self) -> usize {
        self.lab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lab.is_empty()
    }

    /// Cluster count per color group.
    pub fn gradations(&self) -> usize {
        self.gradations
    }

    /// Names of the trained (non-empty) groups, in entry order.
    pub fn group_names(&self) -> &[String] {
        &self.group_names
    }

    /// Lab centers, the representation distance queries run against.
    pub fn lab_entries(&self) -> &[[f32; 3]] {
        &self.lab
    }

    /// Display-space centers, for visualization and export.
    pub fn display_entries(&self) -> &[[u8; 3]] {
        &self.display
    }

    /// Group index of a palette entry.
    pub fn group_of(&self, entry_index: usize) -> usize {
        entry_index / self.gradations
    }

    /// Color name owning a palette entry, if the entry exists.
    pub fn color_of(&self, entry_index: usize) -> Option<&str> {
        self.group_names
            .get(self.group_of(entry_index))
            .map(String::as_str)
    }

    /// Render the display-space palette as a one-row swatch image.
    pub fn swatch(&self) -> RgbImage {
        let mut img = RgbImage::new(self.len() as u32, 1);
        for (i, &rgb) in self.display.iter().enumerate() {
            img.put_pixel(i as u32, 0, Rgb(rgb));
        }
        img
    }
}

/// Collect the Lab triples of every masked pixel.
fn masked_pixels(lab: &LabImage, mask: &GrayImage) -> Vec<[f32; 3]> {
    let mut samples = Vec::new();
    for (x, y, value) in mask.enumerate_pixels() {
        if value[0] > 0 {
            samples.push(lab.pixel(x, y));
        }
    }
    samples
}

/// Serializable palette payload embedded in the persisted search index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaletteData {
    pub lab: Vec<[f32; 3]>,
    pub gradations: usize,
    pub group_names: Vec<String>,
}

impl From<&ColorPalette> for PaletteData {
    fn from(palette: &ColorPalette) -> Self {
        Self {
            lab: palette.lab.clone(),
            gradations: palette.gradations,
            group_names: palette.group_names.clone(),
        }
    }
}

impl From<PaletteData> for ColorPalette {
    fn from(data: PaletteData) -> Self {
        ColorPalette::from_lab(data.lab, data.gradations, data.group_names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::rgb8_to_lab;

    fn uniform_image(width: u32, height: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(rgb))
    }

    fn full_mask(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, image::Luma([255]))
    }

    #[test]
    fn test_train_zero_variance_group() {
        // a 10x10 marked square of one uniform color must produce 4 equal
        // centers without numeric trouble
        let img = uniform_image(100, 100, [0, 180, 60]);
        let lab = LabImage::from_rgb(&img);
        let mut mask = GrayImage::new(100, 100);
        for y in 20..30 {
            for x in 40..50 {
                mask.put_pixel(x, y, image::Luma([255]));
            }
        }

        let palette =
            ColorPalette::train(&lab, &[("green".to_string(), &mask)], 4).expect("train failed");

        assert_eq!(palette.len(), 4);
        assert_eq!(palette.group_names(), &["green".to_string()]);
        let expected = rgb8_to_lab([0, 180, 60]);
        for entry in palette.lab_entries() {
            for ch in 0..3 {
                assert!((entry[ch] - expected[ch]).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_train_skips_empty_groups() {
        let img = uniform_image(8, 8, [200, 40, 40]);
        let lab = LabImage::from_rgb(&img);
        let marked = full_mask(8, 8);
        let empty = GrayImage::new(8, 8);

        let palette = ColorPalette::train(
            &lab,
            &[
                ("green".to_string(), &empty),
                ("pink".to_string(), &marked),
                ("yellow".to_string(), &empty),
            ],
            4,
        )
        .expect("train failed");

        assert_eq!(palette.len(), 4);
        assert_eq!(palette.group_names(), &["pink".to_string()]);
        assert_eq!(palette.color_of(0), Some("pink"));
        assert_eq!(palette.color_of(3), Some("pink"));
        assert_eq!(palette.color_of(4), None);
    }

    #[test]
    fn test_train_all_empty_is_error() {
        let img = uniform_image(8, 8, [1, 2, 3]);
        let lab = LabImage::from_rgb(&img);
        let empty = GrayImage::new(8, 8);

        let result = ColorPalette::train(&lab, &[("green".to_string(), &empty)], 4);
        assert!(matches!(result, Err(SnapshotError::NoTrainingData)));
    }

    #[test]
    fn test_group_arithmetic() {
        let lab: Vec<[f32; 3]> = (0..8).map(|i| [i as f32, 0.0, 0.0]).collect();
        let palette = ColorPalette::from_lab(
            lab,
            4,
            vec!["green".to_string(), "pink".to_string()],
        );

        assert_eq!(palette.len(), 8);
        assert_eq!(palette.group_of(0), 0);
        assert_eq!(palette.group_of(3), 0);
        assert_eq!(palette.group_of(4), 1);
        assert_eq!(palette.color_of(7), Some("pink"));
    }

    #[test]
    fn test_swatch_and_data_roundtrip() {
        let palette = ColorPalette::from_lab(
            vec![rgb8_to_lab([250, 20, 120]); 4],
            4,
            vec!["pink".to_string()],
        );

        let swatch = palette.swatch();
        assert_eq!(swatch.dimensions(), (4, 1));

        let data = PaletteData::from(&palette);
        let json = serde_json::to_string(&data).expect("Failed to serialize");
        let back: PaletteData = serde_json::from_str(&json).expect("Failed to deserialize");
        let restored = ColorPalette::from(back);

        assert_eq!(restored, palette);
    }
}
