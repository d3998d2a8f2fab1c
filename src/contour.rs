//! Contour extraction and committed polygon records.
//!
//! Contours are a derived, disposable view of the masks: the mask raster is
//! the single source of truth, and every committed polygon can be recreated
//! from it. Extraction finds outer boundaries only, drops regions under the
//! area floor and optionally simplifies the rest; the store keeps the
//! committed polygons with their owning region for hit-testing, selection
//! and counting.

use crate::cache::MaskTag;
use image::GrayImage;
use image::imageops;
use imageproc::contours::{BorderType, find_contours};
use imageproc::geometry::approximate_polygon_dp;
use imageproc::point::Point;
use imageproc::rect::Rect;
use std::collections::HashMap;

// ============================================================================
// Geometry
// ============================================================================

/// A closed contour polygon in image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub points: Vec<Point<i32>>,
}

impl Polygon {
    pub fn new(points: Vec<Point<i32>>) -> Self {
        Self { points }
    }

    /// Tight axis-aligned bounds, `None` for an empty polygon.
    pub fn bounding_rect(&self) -> Option<Rect> {
        let first = self.points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Rect::at(min_x, min_y).of_size((max_x - min_x + 1) as u32, (max_y - min_y + 1) as u32))
    }

    /// Enclosed area by the shoelace formula.
    pub fn area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        let mut sum = 0i64;
        let n = self.points.len();
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            sum += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
        }
        (sum.abs() as f64) / 2.0
    }

    /// Point-in-polygon test (ray casting).
    pub fn contains(&self, x: i32, y: i32) -> bool {
        if self.points.len() < 3 {
            return false;
        }
        let mut inside = false;
        let n = self.points.len();
        let mut j = n - 1;
        for i in 0..n {
            let vi = self.points[i];
            let vj = self.points[j];
            if (vi.y > y) != (vj.y > y) {
                let cross =
                    (vj.x - vi.x) as f64 * (y - vi.y) as f64 / (vj.y - vi.y) as f64 + vi.x as f64;
                if (x as f64) < cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Shift every vertex by (dx, dy).
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self::new(
            self.points
                .iter()
                .map(|p| Point::new(p.x + dx, p.y + dy))
                .collect(),
        )
    }
}

/// Smallest rectangle covering both arguments.
pub fn union_rect(a: Rect, b: Rect) -> Rect {
    let left = a.left().min(b.left());
    let top = a.top().min(b.top());
    let right = a.right().max(b.right());
    let bottom = a.bottom().max(b.bottom());
    Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32)
}

/// Expand a rectangle by `margin` pixels on every side.
pub fn grow_rect(rect: Rect, margin: i32) -> Rect {
    Rect::at(rect.left() - margin, rect.top() - margin).of_size(
        (rect.width() as i32 + 2 * margin) as u32,
        (rect.height() as i32 + 2 * margin) as u32,
    )
}

/// Clip a rectangle to an image of the given dimensions.
pub fn clip_rect(rect: Rect, width: u32, height: u32) -> Option<Rect> {
    rect.intersect(Rect::at(0, 0).of_size(width, height))
}

/// Whether `outer` fully contains `inner`.
pub fn rect_contains_rect(outer: Rect, inner: Rect) -> bool {
    outer.left() <= inner.left()
        && outer.top() <= inner.top()
        && outer.right() >= inner.right()
        && outer.bottom() >= inner.bottom()
}

// ============================================================================
// Extraction
// ============================================================================

/// Trace the outer contours of a binary mask.
///
/// With `roi` the search is restricted to that sub-rectangle (coordinates in
/// the result are translated back to full-image space). Contours with
/// enclosed area below `min_area` are dropped; a positive
/// `simplify_tolerance` reduces the rest with a closed-curve
/// Douglas-Peucker pass. The mask itself is never modified.
pub fn extract(
    mask: &GrayImage,
    roi: Option<Rect>,
    min_area: f64,
    simplify_tolerance: f64,
) -> Vec<Polygon> {
    let (view, dx, dy) = match roi {
        Some(rect) => {
            let Some(rect) = clip_rect(rect, mask.width(), mask.height()) else {
                return Vec::new();
            };
            let view = imageops::crop_imm(
                mask,
                rect.left() as u32,
                rect.top() as u32,
                rect.width(),
                rect.height(),
            )
            .to_image();
            (view, rect.left(), rect.top())
        }
        None => (mask.clone(), 0, 0),
    };

    find_contours::<i32>(&view)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| {
            let raw = Polygon::new(c.points);
            if raw.area() < min_area {
                return None;
            }
            let points = if simplify_tolerance > 0.0 {
                approximate_polygon_dp(&raw.points, simplify_tolerance, true)
            } else {
                raw.points
            };
            Some(Polygon::new(points).translated(dx, dy))
        })
        .collect()
}

// ============================================================================
// Committed polygon store
// ============================================================================

/// A polygon committed for display and counting, owned by a region mask.
#[derive(Debug, Clone)]
pub struct CommittedContour {
    pub id: u64,
    pub region: MaskTag,
    pub polygon: Polygon,
}

/// Store of committed polygons across all regions.
#[derive(Debug, Default)]
pub struct ContourStore {
    items: HashMap<u64, CommittedContour>,
    next_id: u64,
}

impl ContourStore {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
            next_id: 1,
        }
    }

    /// Record a polygon for a region and return its id.
    pub fn commit(&mut self, region: MaskTag, polygon: Polygon) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.items.insert(
            id,
            CommittedContour {
                id,
                region,
                polygon,
            },
        );
        id
    }

    pub fn remove(&mut self, id: u64) -> Option<CommittedContour> {
        self.items.remove(&id)
    }

    pub fn get(&self, id: u64) -> Option<&CommittedContour> {
        self.items.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommittedContour> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of committed polygons owned by a region.
    pub fn count_for(&self, region: &MaskTag) -> usize {
        self.items.values().filter(|c| &c.region == region).count()
    }

    /// Drop every polygon owned by a region; returns how many were removed.
    pub fn clear_region(&mut self, region: &MaskTag) -> usize {
        let ids: Vec<u64> = self
            .items
            .values()
            .filter(|c| &c.region == region)
            .map(|c| c.id)
            .collect();
        for id in &ids {
            self.items.remove(id);
        }
        ids.len()
    }

    /// The most recently committed polygon containing the point, if any.
    pub fn hit_test(&self, x: i32, y: i32) -> Option<u64> {
        self.items
            .values()
            .filter(|c| c.polygon.contains(x, y))
            .map(|c| c.id)
            .max()
    }

    /// Ids of polygons in a region whose bounds intersect the rectangle.
    pub fn intersecting(&self, region: &MaskTag, rect: Rect) -> Vec<u64> {
        self.items
            .values()
            .filter(|c| &c.region == region)
            .filter(|c| {
                c.polygon
                    .bounding_rect()
                    .is_some_and(|b| b.intersect(rect).is_some())
            })
            .map(|c| c.id)
            .collect()
    }

    /// Ids of polygons fully contained in the rectangle, any region.
    pub fn contained_in(&self, rect: Rect) -> Vec<u64> {
        self.items
            .values()
            .filter(|c| {
                c.polygon
                    .bounding_rect()
                    .is_some_and(|b| rect_contains_rect(rect, b))
            })
            .map(|c| c.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn mask_with_square(w: u32, h: u32, x0: u32, y0: u32, side: u32) -> GrayImage {
        let mut mask = GrayImage::new(w, h);
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        mask
    }

    #[test]
    fn test_polygon_area_and_bounds() {
        let square = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
        ]);
        assert_eq!(square.area(), 100.0);
        let bounds = square.bounding_rect().unwrap();
        assert_eq!((bounds.left(), bounds.top()), (0, 0));
        assert_eq!((bounds.width(), bounds.height()), (11, 11));
        assert!(square.contains(5, 5));
        assert!(!square.contains(15, 5));
    }

    #[test]
    fn test_rect_helpers() {
        let a = Rect::at(0, 0).of_size(10, 10);
        let b = Rect::at(5, 5).of_size(10, 10);
        let u = union_rect(a, b);
        assert_eq!((u.left(), u.top()), (0, 0));
        assert_eq!((u.width(), u.height()), (15, 15));

        let grown = grow_rect(a, 1);
        assert_eq!((grown.left(), grown.top()), (-1, -1));
        assert_eq!((grown.width(), grown.height()), (12, 12));

        let clipped = clip_rect(grown, 8, 8).unwrap();
        assert_eq!((clipped.left(), clipped.top()), (0, 0));
        assert_eq!((clipped.width(), clipped.height()), (8, 8));

        assert!(rect_contains_rect(u, a));
        assert!(!rect_contains_rect(a, u));
    }

    #[test]
    fn test_extract_single_square() {
        let mask = mask_with_square(50, 50, 10, 10, 20);
        let contours = extract(&mask, None, 0.0, 0.0);
        assert_eq!(contours.len(), 1);
        // the boundary runs through pixel centers: (side - 1)^2
        let area = contours[0].area();
        assert!((area - 361.0).abs() < 1.0, "area was {}", area);
    }

    #[test]
    fn test_extract_idempotent() {
        let mask = mask_with_square(40, 40, 5, 5, 12);
        let first = extract(&mask, None, 0.0, 1.0);
        let second = extract(&mask, None, 0.0, 1.0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_extract_area_filter() {
        let mut mask = mask_with_square(60, 60, 5, 5, 20);
        // a second, tiny region
        for y in 40..43 {
            for x in 40..43 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }

        let all = extract(&mask, None, 0.0, 0.0);
        assert_eq!(all.len(), 2);

        let min_area = 100.0;
        let filtered = extract(&mask, None, min_area, 0.0);
        assert_eq!(filtered.len(), 1);
        for polygon in &filtered {
            assert!(polygon.area() >= min_area);
        }
        for polygon in &all {
            if !filtered.contains(polygon) {
                assert!(polygon.area() < min_area);
            }
        }
    }

    #[test]
    fn test_extract_roi_translates_back() {
        let mask = mask_with_square(80, 80, 30, 30, 10);

        let full = extract(&mask, None, 0.0, 0.0);
        let roi = extract(&mask, Some(Rect::at(25, 25).of_size(25, 25)), 0.0, 0.0);

        assert_eq!(full.len(), 1);
        assert_eq!(roi.len(), 1);
        assert_eq!(full[0].bounding_rect(), roi[0].bounding_rect());
    }

    #[test]
    fn test_extract_roi_outside_image() {
        let mask = mask_with_square(20, 20, 2, 2, 5);
        let contours = extract(&mask, Some(Rect::at(100, 100).of_size(10, 10)), 0.0, 0.0);
        assert!(contours.is_empty());
    }

    #[test]
    fn test_simplification_reduces_vertices() {
        let mask = mask_with_square(50, 50, 10, 10, 20);
        let raw = extract(&mask, None, 0.0, 0.0);
        let simplified = extract(&mask, None, 0.0, 1.0);
        assert!(simplified[0].points.len() <= raw[0].points.len());
        assert!(simplified[0].points.len() >= 3);
    }

    #[test]
    fn test_store_commit_and_count() {
        let mut store = ContourStore::new();
        let green = MaskTag::count("green");
        let pink = MaskTag::count("pink");

        let poly = Polygon::new(vec![Point::new(0, 0), Point::new(4, 0), Point::new(4, 4)]);
        let id1 = store.commit(green.clone(), poly.clone());
        store.commit(green.clone(), poly.translated(10, 10));
        store.commit(pink.clone(), poly.translated(20, 20));

        assert_eq!(store.len(), 3);
        assert_eq!(store.count_for(&green), 2);
        assert_eq!(store.count_for(&pink), 1);

        store.remove(id1);
        assert_eq!(store.count_for(&green), 1);

        assert_eq!(store.clear_region(&green), 1);
        assert_eq!(store.count_for(&green), 0);
        assert_eq!(store.count_for(&pink), 1);
    }

    #[test]
    fn test_store_hit_test_prefers_latest() {
        let mut store = ContourStore::new();
        let region = MaskTag::train("green");
        let square = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
        ]);
        store.commit(region.clone(), square.clone());
        let later = store.commit(region.clone(), square);

        assert_eq!(store.hit_test(5, 5), Some(later));
        assert_eq!(store.hit_test(50, 50), None);
    }

    #[test]
    fn test_store_spatial_queries() {
        let mut store = ContourStore::new();
        let region = MaskTag::count("green");
        let small = Polygon::new(vec![
            Point::new(2, 2),
            Point::new(6, 2),
            Point::new(6, 6),
            Point::new(2, 6),
        ]);
        let far = small.translated(50, 50);
        let id_near = store.commit(region.clone(), small);
        let id_far = store.commit(region.clone(), far);

        let rect = Rect::at(0, 0).of_size(20, 20);
        assert_eq!(store.intersecting(&region, rect), vec![id_near]);
        assert_eq!(store.contained_in(rect), vec![id_near]);

        let everything = Rect::at(0, 0).of_size(100, 100);
        let mut contained = store.contained_in(everything);
        contained.sort_unstable();
        assert_eq!(contained, vec![id_near, id_far]);
    }
}
