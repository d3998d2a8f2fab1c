//! Interactive flood-fill based mask editing.
//!
//! Every operation here is a plain raster transaction against the masks in
//! the artifact cache and the committed polygon store; there is no modal
//! state. Flood fills are 4-connected and fixed-range: the tolerance is
//! measured against the seed pixel's value, never neighbor-to-neighbor, so
//! region growth stays bounded and deterministic.

use crate::cache::{ArtifactCache, MaskTag};
use crate::color::LabImage;
use crate::contour::{self, ContourStore, Polygon, clip_rect, grow_rect, union_rect};
use crate::error::Result;
use image::{GrayImage, Luma};
use imageproc::geometry::convex_hull;
use imageproc::rect::Rect;
use std::collections::HashMap;

// ============================================================================
// Flood-fill primitives
// ============================================================================

/// Grow a region from a seed over the working image, bounded by a
/// per-channel tolerance against the seed's Lab value.
///
/// Returns the filled scratch mask and the bounding rectangle of the fill,
/// or `None` when the seed lies outside the image. The working image itself
/// is never touched.
pub fn flood_select(lab: &LabImage, x: u32, y: u32, fuzz: f32) -> Option<(GrayImage, Rect)> {
    if !lab.contains(x as i64, y as i64) {
        return None;
    }
    let seed = lab.pixel(x, y);
    let mut scratch = GrayImage::new(lab.width(), lab.height());
    scratch.put_pixel(x, y, Luma([255]));

    let mut queue = vec![(x, y)];
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x, y);

    while let Some((cx, cy)) = queue.pop() {
        min_x = min_x.min(cx);
        min_y = min_y.min(cy);
        max_x = max_x.max(cx);
        max_y = max_y.max(cy);

        for (dx, dy) in [(0i64, 1i64), (0, -1), (1, 0), (-1, 0)] {
            let nx = cx as i64 + dx;
            let ny = cy as i64 + dy;
            if !lab.contains(nx, ny) {
                continue;
            }
            let (nx, ny) = (nx as u32, ny as u32);
            if scratch.get_pixel(nx, ny)[0] > 0 {
                continue;
            }
            let p = lab.pixel(nx, ny);
            if (p[0] - seed[0]).abs() <= fuzz
                && (p[1] - seed[1]).abs() <= fuzz
                && (p[2] - seed[2]).abs() <= fuzz
            {
                scratch.put_pixel(nx, ny, Luma([255]));
                queue.push((nx, ny));
            }
        }
    }

    let bounds = Rect::at(min_x as i32, min_y as i32)
        .of_size(max_x - min_x + 1, max_y - min_y + 1);
    Some((scratch, bounds))
}

/// Zero-fill the connected region of the mask holding the seed's value.
///
/// Returns the bounds of the erased region, or `None` when the seed is
/// outside the mask or already zero.
pub fn flood_erase(mask: &mut GrayImage, x: u32, y: u32) -> Option<Rect> {
    if x >= mask.width() || y >= mask.height() {
        return None;
    }
    let seed_value = mask.get_pixel(x, y)[0];
    if seed_value == 0 {
        return None;
    }

    mask.put_pixel(x, y, Luma([0]));
    let mut queue = vec![(x, y)];
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x, y);

    while let Some((cx, cy)) = queue.pop() {
        min_x = min_x.min(cx);
        min_y = min_y.min(cy);
        max_x = max_x.max(cx);
        max_y = max_y.max(cy);

        for (dx, dy) in [(0i64, 1i64), (0, -1), (1, 0), (-1, 0)] {
            let nx = cx as i64 + dx;
            let ny = cy as i64 + dy;
            if nx < 0 || ny < 0 || nx >= mask.width() as i64 || ny >= mask.height() as i64 {
                continue;
            }
            let (nx, ny) = (nx as u32, ny as u32);
            if mask.get_pixel(nx, ny)[0] == seed_value {
                mask.put_pixel(nx, ny, Luma([0]));
                queue.push((nx, ny));
            }
        }
    }

    Some(
        Rect::at(min_x as i32, min_y as i32).of_size(max_x - min_x + 1, max_y - min_y + 1),
    )
}

/// OR a filled scratch mask into the target region mask, restricted to the
/// fill bounds.
pub fn merge_into(mask: &mut GrayImage, scratch: &GrayImage, bounds: Rect) {
    for y in bounds.top()..=bounds.bottom() {
        for x in bounds.left()..=bounds.right() {
            let (x, y) = (x as u32, y as u32);
            if scratch.get_pixel(x, y)[0] > 0 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }
}

/// Paint a polygon's interior and boundary into the mask.
pub fn paint_polygon(mask: &mut GrayImage, polygon: &Polygon) {
    let mut points = polygon.points.clone();
    points.dedup();
    // draw_polygon_mut rejects a closing duplicate of the first vertex
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    match points.len() {
        0 => {}
        1 | 2 => {
            for p in &points {
                if p.x >= 0 && p.y >= 0 && (p.x as u32) < mask.width() && (p.y as u32) < mask.height()
                {
                    mask.put_pixel(p.x as u32, p.y as u32, Luma([255]));
                }
            }
        }
        _ => imageproc::drawing::draw_polygon_mut(mask, &points, Luma([255])),
    }
}

// ============================================================================
// Interactive operations
// ============================================================================

/// Result of a successful pick: the rectangle that was re-extracted, the
/// polygon records it replaced and the ones it committed.
#[derive(Debug)]
pub struct PickOutcome {
    pub affected: Rect,
    pub removed: Vec<u64>,
    pub committed: Vec<u64>,
}

/// Flood-pick a region into a mask and refresh its contours locally.
///
/// Fills from the seed with `fuzz` tolerance, merges the fill into the
/// region's mask, deletes committed polygons intersecting the affected
/// rectangle (folding their bounds in), then re-extracts contours restricted
/// to the grown, clipped rectangle and commits them. Returns `Ok(None)` when
/// the flood fill cannot start.
pub fn pick(
    cache: &mut ArtifactCache,
    store: &mut ContourStore,
    region: &MaskTag,
    x: u32,
    y: u32,
    fuzz: f32,
    min_area: f64,
    simplify_tolerance: f64,
) -> Result<Option<PickOutcome>> {
    let lab = cache.lab()?;
    let Some((scratch, bounds)) = flood_select(&lab, x, y, fuzz) else {
        return Ok(None);
    };

    let mask = cache.mask(region)?;
    merge_into(mask, &scratch, bounds);

    // polygons intersecting the touched area are stale; replace them and
    // widen the re-extraction window over their footprint
    let mut roi = grow_rect(bounds, 1);
    let mut removed = Vec::new();
    for id in store.intersecting(region, roi) {
        if let Some(stale) = store.remove(id) {
            if let Some(b) = stale.polygon.bounding_rect() {
                roi = union_rect(roi, b);
            }
            removed.push(id);
        }
    }

    let roi = grow_rect(roi, 1);
    let Some(roi) = clip_rect(roi, lab.width(), lab.height()) else {
        return Ok(None);
    };

    let mask = cache.mask(region)?;
    let committed = contour::extract(mask, Some(roi), min_area, simplify_tolerance)
        .into_iter()
        .map(|polygon| store.commit(region.clone(), polygon))
        .collect();

    Ok(Some(PickOutcome {
        affected: roi,
        removed,
        committed,
    }))
}

/// Erase the committed polygon under a point, raster and record both.
///
/// Returns the region whose mask was edited, or `Ok(None)` when no polygon
/// contains the point.
pub fn unpick(
    cache: &mut ArtifactCache,
    store: &mut ContourStore,
    x: u32,
    y: u32,
) -> Result<Option<MaskTag>> {
    let Some(id) = store.hit_test(x as i32, y as i32) else {
        return Ok(None);
    };
    let Some(record) = store.remove(id) else {
        return Ok(None);
    };

    let mask = cache.mask(&record.region)?;
    flood_erase(mask, x, y);
    Ok(Some(record.region))
}

/// Merge selected polygons into their convex hull, per region.
///
/// Every region with at least two polygons fully inside `rect` has them
/// replaced by the hull of their combined vertices; the hull is painted into
/// the region's mask and committed. Regions with fewer than two selected
/// polygons are untouched. Returns the ids of the committed hulls.
pub fn merge_contours(
    cache: &mut ArtifactCache,
    store: &mut ContourStore,
    rect: Rect,
) -> Result<Vec<u64>> {
    let mut selection: HashMap<MaskTag, Vec<u64>> = HashMap::new();
    for id in store.contained_in(rect) {
        if let Some(record) = store.get(id) {
            selection.entry(record.region.clone()).or_default().push(id);
        }
    }

    let mut hulls = Vec::new();
    for (region, ids) in selection {
        if ids.len() < 2 {
            continue;
        }

        let mut vertices = Vec::new();
        for id in ids {
            if let Some(record) = store.remove(id) {
                vertices.extend(record.polygon.points);
            }
        }

        // the hull of a union of polygons is the hull of their vertices
        let hull = Polygon::new(convex_hull(vertices.as_slice()));
        let mask = cache.mask(&region)?;
        paint_polygon(mask, &hull);
        hulls.push(store.commit(region, hull));
    }
    Ok(hulls)
}

/// Erase every polygon fully contained in `rect` from its owning mask.
///
/// The raster footprint is removed by a zero-fill seeded at one of the
/// polygon's own vertices; no re-extraction happens, the area is simply left
/// blank. Returns how many polygons were cleared.
pub fn clear_contours(
    cache: &mut ArtifactCache,
    store: &mut ContourStore,
    rect: Rect,
) -> Result<usize> {
    let ids = store.contained_in(rect);
    let mut cleared = 0;
    for id in ids {
        let Some(record) = store.remove(id) else {
            continue;
        };
        if let Some(seed) = record.polygon.points.first() {
            if seed.x >= 0 && seed.y >= 0 {
                let mask = cache.mask(&record.region)?;
                flood_erase(mask, seed.x as u32, seed.y as u32);
            }
        }
        cleared += 1;
    }
    Ok(cleared)
}
