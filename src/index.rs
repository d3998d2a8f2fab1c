//! Nearest-neighbor search structure over the trained palette.
//!
//! A small kd-tree over the palette's Lab centers. Queries return the index
//! of the nearest entry and the squared distance to it. The tree can be
//! persisted together with the palette it was built over, so a session can
//! restore the classifier without retraining; a palette replacement always
//! invalidates the structure (rebuild, never patch).
//!
//! Two search modes: exhaustive descent for correctness-critical bulk runs,
//! and a bounded-effort mode that caps the number of candidate evaluations
//! for interactive queries.

use crate::color::distance_sq;
use crate::error::{Result, SnapshotError};
use crate::palette::{ColorPalette, PaletteData};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Persisted index file format version.
pub const INDEX_VERSION: &str = "1";

/// How much work a nearest-neighbor query may spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEffort {
    /// Prune-only descent; always returns the true nearest entry.
    Exhaustive,
    /// Stop after evaluating at most this many candidates. The result is
    /// approximate but never empty (at least one candidate is evaluated).
    Bounded(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KdNode {
    point: u32,
    axis: u8,
    left: Option<u32>,
    right: Option<u32>,
}

/// kd-tree over the palette's Lab centers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearestIndex {
    points: Vec<[f32; 3]>,
    nodes: Vec<KdNode>,
    root: Option<u32>,
}

impl NearestIndex {
    /// Build the search structure over a trained palette.
    pub fn build(palette: &ColorPalette) -> Result<Self> {
        if palette.is_empty() {
            return Err(SnapshotError::NoTrainingData);
        }

        let points: Vec<[f32; 3]> = palette.lab_entries().to_vec();
        let mut index = Self {
            points,
            nodes: Vec::new(),
            root: None,
        };
        let mut order: Vec<u32> = (0..index.points.len() as u32).collect();
        index.root = index.split(&mut order);
        Ok(index)
    }

    /// Number of indexed palette entries.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Nearest palette entry for one query pixel: (entry index, squared
    /// distance).
    pub fn nearest(&self, query: &[f32; 3], effort: SearchEffort) -> (u32, f32) {
        let mut best = (0u32, f32::INFINITY);
        let budget = match effort {
            SearchEffort::Exhaustive => usize::MAX,
            SearchEffort::Bounded(n) => n.max(1),
        };
        let mut evaluated = 0usize;
        if let Some(root) = self.root {
            self.descend(root, query, &mut best, &mut evaluated, budget);
        }
        best
    }

    /// Batched nearest-entry lookup over many pixels.
    pub fn nearest_batch(&self, queries: &[[f32; 3]], effort: SearchEffort) -> Vec<(u32, f32)> {
        queries
            .par_iter()
            .map(|q| self.nearest(q, effort))
            .collect()
    }

    /// Persist the structure, together with the palette it was built over.
    pub fn save(&self, palette: &ColorPalette, path: &Path) -> Result<()> {
        let file = IndexFile {
            version: INDEX_VERSION.to_string(),
            palette: PaletteData::from(palette),
            index: self.clone(),
        };
        let json = serde_json::to_string(&file)?;
        std::fs::write(path, json)?;
        log::debug!("saved search index ({} entries) to {:?}", self.len(), path);
        Ok(())
    }

    /// Restore a persisted structure and the palette it carries.
    ///
    /// The file is checked structurally: version string, entry count against
    /// the embedded palette, and group layout divisibility. A file edited by
    /// hand beyond that is undefined behavior.
    pub fn load(path: &Path) -> Result<(ColorPalette, Self)> {
        let json = std::fs::read_to_string(path)?;
        let file: IndexFile = serde_json::from_str(&json)?;

        if file.version != INDEX_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: file.version,
                path: path.to_path_buf(),
            });
        }

        let expected = file.palette.lab.len();
        if file.index.points.len() != expected {
            return Err(SnapshotError::index_mismatch(expected, file.index.points.len()));
        }
        if file.palette.gradations == 0
            || expected != file.palette.group_names.len() * file.palette.gradations
        {
            return Err(SnapshotError::index_mismatch(
                file.palette.group_names.len() * file.palette.gradations.max(1),
                expected,
            ));
        }

        let palette = ColorPalette::from(file.palette);
        log::debug!("restored search index ({} entries) from {:?}", expected, path);
        Ok((palette, file.index))
    }

    fn split(&mut self, order: &mut [u32]) -> Option<u32> {
        if order.is_empty() {
            return None;
        }

        let axis = self.widest_axis(order);
        order.sort_by(|&a, &b| {
            self.points[a as usize][axis as usize].total_cmp(&self.points[b as usize][axis as usize])
        });
        let median = order.len() / 2;
        let point = order[median];

        let node_id = self.nodes.len() as u32;
        self.nodes.push(KdNode {
            point,
            axis,
            left: None,
            right: None,
        });

        // split the order slice around the median without the pivot itself
        let (lower, upper) = order.split_at_mut(median);
        let left = self.split(lower);
        let right = self.split(&mut upper[1..]);
        self.nodes[node_id as usize].left = left;
        self.nodes[node_id as usize].right = right;
        Some(node_id)
    }

    fn widest_axis(&self, order: &[u32]) -> u8 {
        let mut lo = [f32::INFINITY; 3];
        let mut hi = [f32::NEG_INFINITY; 3];
        for &i in order {
            let p = self.points[i as usize];
            for ch in 0..3 {
                lo[ch] = lo[ch].min(p[ch]);
                hi[ch] = hi[ch].max(p[ch]);
            }
        }
        let mut axis = 0u8;
        let mut spread = f32::NEG_INFINITY;
        for ch in 0..3 {
            let s = hi[ch] - lo[ch];
            if s > spread {
                spread = s;
                axis = ch as u8;
            }
        }
        axis
    }

    fn descend(
        &self,
        node_id: u32,
        query: &[f32; 3],
        best: &mut (u32, f32),
        evaluated: &mut usize,
        budget: usize,
    ) {
        if *evaluated >= budget {
            return;
        }
        let node = &self.nodes[node_id as usize];
        let point = self.points[node.point as usize];

        *evaluated += 1;
        let d = distance_sq(query, &point);
        if d < best.1 {
            *best = (node.point, d);
        }

        let axis = node.axis as usize;
        let delta = query[axis] - point[axis];
        let (near, far) = if delta <= 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(child) = near {
            self.descend(child, query, best, evaluated, budget);
        }
        // cross the splitting plane only when it can still hold a closer point
        if delta * delta < best.1 {
            if let Some(child) = far {
                self.descend(child, query, best, evaluated, budget);
            }
        }
    }
}

/// On-disk representation: version + palette + tree in one JSON document.
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: String,
    palette: PaletteData,
    index: NearestIndex,
}
