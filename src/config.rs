//! Tunable parameters for the counting pipeline.
//!
//! All scalar knobs live in one explicit struct handed to the snapshot, so
//! the core has no knowledge of whatever control surface produced them.
//! Values can be loaded from a JSON file for reproducible runs or
//! constructed programmatically.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// All scalar tunables consumed by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tuning {
    /// Per-channel Lab tolerance for the pick flood fill.
    #[serde(default = "default_pick_fuzz")]
    pub pick_fuzz: f32,

    /// Minimum side length of a countable region; regions with area below
    /// `size_filter_min²` are dropped.
    #[serde(default = "default_size_filter_min")]
    pub size_filter_min: u32,

    /// Per-channel confidence tolerance `t`; a pixel counts as confidently
    /// classified when its squared Lab distance is below `3·t²`.
    #[serde(default = "default_color_diff_threshold")]
    pub color_diff_threshold: f32,

    /// Longest edge of the working image; the source photo is scaled down to
    /// fit this on load.
    #[serde(default = "default_size_limit")]
    pub size_limit: u32,

    /// Douglas-Peucker tolerance for contour simplification, in pixels.
    /// Zero keeps the raw boundary points.
    #[serde(default = "default_simplify_tolerance")]
    pub simplify_tolerance: f64,
}

fn default_pick_fuzz() -> f32 {
    5.0
}

fn default_size_filter_min() -> u32 {
    10
}

fn default_color_diff_threshold() -> f32 {
    10.0
}

fn default_size_limit() -> u32 {
    1024
}

fn default_simplify_tolerance() -> f64 {
    1.0
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            pick_fuzz: default_pick_fuzz(),
            size_filter_min: default_size_filter_min(),
            color_diff_threshold: default_color_diff_threshold(),
            size_limit: default_size_limit(),
            simplify_tolerance: default_simplify_tolerance(),
        }
    }
}

impl Tuning {
    /// Load tunables from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Squared-distance confidence threshold derived from
    /// [`color_diff_threshold`](Self::color_diff_threshold).
    pub fn distance_threshold_sq(&self) -> f32 {
        3.0 * self.color_diff_threshold * self.color_diff_threshold
    }

    /// Minimum region area in pixels.
    pub fn min_region_area(&self) -> f64 {
        (self.size_filter_min as f64) * (self.size_filter_min as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let tuning = Tuning::default();
        assert_eq!(tuning.distance_threshold_sq(), 300.0);
        assert_eq!(tuning.min_region_area(), 100.0);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut tuning = Tuning::default();
        tuning.pick_fuzz = 7.5;
        tuning.size_limit = 640;

        let json = serde_json::to_string(&tuning).expect("Failed to serialize");
        let loaded: Tuning = serde_json::from_str(&json).expect("Failed to deserialize");

        assert_eq!(loaded.pick_fuzz, 7.5);
        assert_eq!(loaded.size_limit, 640);
        assert_eq!(loaded.size_filter_min, tuning.size_filter_min);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let loaded: Tuning = serde_json::from_str(r#"{ "pick_fuzz": 3.0 }"#)
            .expect("Failed to deserialize");
        assert_eq!(loaded.pick_fuzz, 3.0);
        assert_eq!(loaded.size_limit, 1024);
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join("votetally_tuning_test.json");
        std::fs::write(
            &path,
            r#"{ "pick_fuzz": 3.0, "size_filter_min": 5, "color_diff_threshold": 12.0,
                 "size_limit": 800, "simplify_tolerance": 0.0 }"#,
        )
        .expect("Failed to write config");

        let tuning = Tuning::from_json_file(&path).expect("Failed to load config");
        assert_eq!(tuning.size_filter_min, 5);
        assert_eq!(tuning.simplify_tolerance, 0.0);

        let _ = std::fs::remove_file(&path);
    }
}
