//! Confidence masking of classification results.
//!
//! Pixels whose squared distance to their nearest palette entry stays under
//! the threshold are considered confidently classified; each such pixel is
//! set in the mask of its entry's color group. A morphological opening with
//! a 3x3 element removes isolated-pixel noise. The display overlay painting
//! confident pixels in their entry's display color rides along for visual
//! feedback.

use crate::classify::Classification;
use crate::palette::ColorPalette;
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::open;

/// Per-color confidence masks plus the display overlay.
#[derive(Debug, Clone)]
pub struct ConfidenceMasks {
    /// One opened binary mask per trained color, in group order.
    pub masks: Vec<(String, GrayImage)>,
    /// Confident pixels painted in their palette entry's display color.
    pub overlay: RgbImage,
}

/// Threshold the classification distances into per-color masks.
///
/// `threshold_sq` is the squared-distance cutoff; pixels at or beyond it
/// contribute nothing.
pub fn confidence_masks(
    classification: &Classification,
    palette: &ColorPalette,
    threshold_sq: f32,
) -> ConfidenceMasks {
    let (w, h) = (classification.width(), classification.height());
    let group_count = palette.group_names().len();

    let mut masks: Vec<GrayImage> = (0..group_count).map(|_| GrayImage::new(w, h)).collect();

    for y in 0..h {
        for x in 0..w {
            if classification.distance_at(x, y) < threshold_sq {
                let entry = classification.entry_at(x, y) as usize;
                let group = palette.group_of(entry);
                if group < group_count {
                    masks[group].put_pixel(x, y, Luma([255]));
                }
            }
        }
    }

    for mask in &mut masks {
        *mask = open(mask, Norm::LInf, 1);
    }

    let mut overlay = RgbImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let entry = classification.entry_at(x, y) as usize;
            let group = palette.group_of(entry);
            if group < group_count && masks[group].get_pixel(x, y)[0] > 0 {
                overlay.put_pixel(x, y, Rgb(palette.display_entries()[entry]));
            }
        }
    }

    ConfidenceMasks {
        masks: palette
            .group_names()
            .iter()
            .cloned()
            .zip(masks)
            .collect(),
        overlay,
    }
}
