//! Perceptual color space support.
//!
//! The working image is held as a three-channel CIE L*a*b* (D65) float
//! raster. All distance computation in the pipeline happens in this space;
//! sRGB only appears at the edges (loading the photo, exporting the palette
//! swatch, painting the classification overlay).

use image::RgbImage;
use ndarray::Array3;
use palette::{Clamp, IntoColor, Lab, Srgb};

/// Convert one 8-bit sRGB triple to Lab.
pub fn rgb8_to_lab(rgb: [u8; 3]) -> [f32; 3] {
    let lab: Lab = Srgb::new(rgb[0], rgb[1], rgb[2])
        .into_format::<f32>()
        .into_color();
    [lab.l, lab.a, lab.b]
}

/// Convert one Lab triple back to 8-bit sRGB, clamped into gamut.
pub fn lab_to_rgb8(lab: [f32; 3]) -> [u8; 3] {
    let rgb: Srgb = Lab::new(lab[0], lab[1], lab[2]).into_color();
    let rgb = rgb.clamp();
    let rgb: Srgb<u8> = rgb.into_format();
    [rgb.red, rgb.green, rgb.blue]
}

/// Squared Euclidean distance between two Lab triples.
pub fn distance_sq(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dl = a[0] - b[0];
    let da = a[1] - b[1];
    let db = a[2] - b[2];
    dl * dl + da * da + db * db
}

/// The working image: a Lab raster of shape (height, width, 3).
///
/// Immutable once derived from the input photo.
#[derive(Debug, Clone)]
pub struct LabImage {
    data: Array3<f32>,
}

impl LabImage {
    /// Convert an sRGB raster into the working color space.
    pub fn from_rgb(img: &RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let mut data = Array3::zeros((height as usize, width as usize, 3));
        for (x, y, pixel) in img.enumerate_pixels() {
            let lab = rgb8_to_lab(pixel.0);
            data[[y as usize, x as usize, 0]] = lab[0];
            data[[y as usize, x as usize, 1]] = lab[1];
            data[[y as usize, x as usize, 2]] = lab[2];
        }
        Self { data }
    }

    pub fn width(&self) -> u32 {
        self.data.shape()[1] as u32
    }

    pub fn height(&self) -> u32 {
        self.data.shape()[0] as u32
    }

    /// Whether (x, y) lies inside the raster.
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width() && (y as u32) < self.height()
    }

    /// The Lab triple at (x, y). Panics when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        [
            self.data[[y as usize, x as usize, 0]],
            self.data[[y as usize, x as usize, 1]],
            self.data[[y as usize, x as usize, 2]],
        ]
    }

    /// Flatten the raster into a row-major pixel list for batched queries.
    pub fn pixels_flat(&self) -> Vec<[f32; 3]> {
        let (h, w) = (self.height(), self.width());
        let mut out = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                out.push(self.pixel(x, y));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_axis() {
        let white = rgb8_to_lab([255, 255, 255]);
        assert!((white[0] - 100.0).abs() < 0.5);
        assert!(white[1].abs() < 0.5);
        assert!(white[2].abs() < 0.5);

        let black = rgb8_to_lab([0, 0, 0]);
        assert!(black[0].abs() < 0.5);
    }

    #[test]
    fn test_red_has_positive_a() {
        let red = rgb8_to_lab([220, 30, 30]);
        assert!(red[1] > 20.0, "a* for red should be strongly positive");
    }

    #[test]
    fn test_rgb_lab_roundtrip() {
        for rgb in [[12u8, 200, 99], [255, 0, 255], [90, 90, 90]] {
            let back = lab_to_rgb8(rgb8_to_lab(rgb));
            for c in 0..3 {
                assert!(
                    (back[c] as i16 - rgb[c] as i16).abs() <= 1,
                    "channel {} drifted: {:?} -> {:?}",
                    c,
                    rgb,
                    back
                );
            }
        }
    }

    #[test]
    fn test_distance_sq() {
        let a = [10.0, 0.0, 0.0];
        let b = [13.0, 4.0, 0.0];
        assert_eq!(distance_sq(&a, &b), 25.0);
        assert_eq!(distance_sq(&a, &a), 0.0);
    }

    #[test]
    fn test_lab_image_layout() {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(2, 1, image::Rgb([255, 0, 0]));
        let lab = LabImage::from_rgb(&img);

        assert_eq!(lab.width(), 3);
        assert_eq!(lab.height(), 2);
        assert!(lab.contains(2, 1));
        assert!(!lab.contains(3, 0));
        assert!(!lab.contains(-1, 0));

        let red = lab.pixel(2, 1);
        assert!(red[1] > 20.0);

        let flat = lab.pixels_flat();
        assert_eq!(flat.len(), 6);
        // row-major: (2, 1) is the last entry
        assert_eq!(flat[5], red);
    }
}
