//! Rectangle packing of UV charts into the unit square
//!
//! Charts are packed as their bounding rectangles with a deterministic shelf
//! packer: rectangles are turned wide side down, sorted by height, then
//! width, then input order, and placed left to right on shelves. The layout
//! is scaled uniformly into `[0, 1]²`. Because the requested margin is a
//! fraction of the final square, the padding is solved for iteratively.

use glbridge_core::{Error, MeshObject, Result, Uv};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Smallest chart extent; flat or collapsed charts are widened to this
pub const MIN_EXTENT: f32 = 1e-6;

const MAX_MARGIN_ITERATIONS: usize = 16;

/// Axis-aligned rectangle in UV space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UvRegion {
    pub min: Uv,
    pub max: Uv,
}

impl UvRegion {
    pub fn new(min: Uv, max: Uv) -> Self {
        Self { min, max }
    }

    /// Bounds of a set of coordinates, `None` when empty
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Uv>) -> Option<Self> {
        points.into_iter().fold(None, |acc: Option<UvRegion>, p| {
            Some(match acc {
                None => UvRegion::new(*p, *p),
                Some(r) => UvRegion::new(
                    [r.min[0].min(p[0]), r.min[1].min(p[1])],
                    [r.max[0].max(p[0]), r.max[1].max(p[1])],
                ),
            })
        })
    }

    pub fn width(&self) -> f32 {
        self.max[0] - self.min[0]
    }

    pub fn height(&self) -> f32 {
        self.max[1] - self.min[1]
    }

    pub fn union(&self, other: &UvRegion) -> UvRegion {
        UvRegion::new(
            [self.min[0].min(other.min[0]), self.min[1].min(other.min[1])],
            [self.max[0].max(other.max[0]), self.max[1].max(other.max[1])],
        )
    }

    /// Interior intersection; touching edges do not count
    pub fn overlaps(&self, other: &UvRegion) -> bool {
        self.min[0] < other.max[0]
            && other.min[0] < self.max[0]
            && self.min[1] < other.max[1]
            && other.min[1] < self.max[1]
    }

    pub fn within_unit_square(&self) -> bool {
        self.min[0] >= 0.0 && self.min[1] >= 0.0 && self.max[0] <= 1.0 && self.max[1] <= 1.0
    }
}

/// A connected set of faces laid out in its own 2D frame
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub faces: Vec<usize>,
    /// Corner coordinates per face, relative to the chart's lower-left corner
    pub corners: Vec<Vec<Uv>>,
    pub size: [f32; 2],
}

impl Chart {
    /// Build a chart from raw corner coordinates, moving them to the origin
    pub fn from_corners(faces: Vec<usize>, mut corners: Vec<Vec<Uv>>) -> Self {
        let bounds = UvRegion::from_points(corners.iter().flatten())
            .unwrap_or(UvRegion::new([0.0, 0.0], [0.0, 0.0]));
        for face in &mut corners {
            for c in face.iter_mut() {
                c[0] -= bounds.min[0];
                c[1] -= bounds.min[1];
            }
        }
        let size = [
            bounds.width().max(MIN_EXTENT),
            bounds.height().max(MIN_EXTENT),
        ];
        Self {
            faces,
            corners,
            size,
        }
    }

    pub fn area(&self) -> f32 {
        self.size[0] * self.size[1]
    }
}

/// Where one rectangle ended up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Occupied area in the unit square
    pub region: UvRegion,
    pub scale: f32,
    /// Turned 90° counter-clockwise
    pub rotated: bool,
    /// Unrotated height of the source rectangle
    source_height: f32,
}

impl Placement {
    /// Map a coordinate in the source rectangle's frame into the atlas
    pub fn map(&self, local: Uv) -> Uv {
        let (u, v) = if self.rotated {
            (self.source_height - local[1], local[0])
        } else {
            (local[0], local[1])
        };
        [
            self.region.min[0] + u * self.scale,
            self.region.min[1] + v * self.scale,
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackLayout {
    pub placements: Vec<Placement>,
    /// Gap between neighbouring rectangles actually achieved, as a fraction
    /// of the atlas side
    pub effective_margin: f32,
}

struct Shelf {
    y: f32,
    height: f32,
    cursor: f32,
}

/// Shelf-pack `rects` (already oriented) with `padding` on every side
fn pack_shelves(rects: &[[f32; 2]], order: &[usize], padding: f32) -> (Vec<[f32; 2]>, f32) {
    let padded_area: f32 = rects
        .iter()
        .map(|r| (r[0] + 2.0 * padding) * (r[1] + 2.0 * padding))
        .sum();
    let widest = rects.iter().map(|r| r[0] + 2.0 * padding).fold(0.0, f32::max);
    let shelf_width = padded_area.sqrt().max(widest);

    let mut shelves: Vec<Shelf> = Vec::new();
    let mut origins = vec![[0.0, 0.0]; rects.len()];
    let (mut used_x, mut used_y) = (0.0f32, 0.0f32);

    for &idx in order {
        let w = rects[idx][0] + 2.0 * padding;
        let h = rects[idx][1] + 2.0 * padding;

        let slot = shelves
            .iter_mut()
            .find(|s| s.cursor + w <= shelf_width * (1.0 + 1e-5) && h <= s.height);
        let (x, y) = match slot {
            Some(shelf) => {
                let at = (shelf.cursor, shelf.y);
                shelf.cursor += w;
                at
            }
            None => {
                let y = shelves.last().map_or(0.0, |s| s.y + s.height);
                shelves.push(Shelf {
                    y,
                    height: h,
                    cursor: w,
                });
                (0.0, y)
            }
        };
        origins[idx] = [x + padding, y + padding];
        used_x = used_x.max(x + w);
        used_y = used_y.max(y + h);
    }
    (origins, used_x.max(used_y))
}

/// Pack rectangles of the given sizes into the unit square.
///
/// `margin` is the requested gap between rectangles as a fraction of the
/// atlas side; half of it is also kept from the border. When that margin
/// cannot be honoured (too many rectangles), the largest achievable margin
/// is used and reported in `effective_margin`.
pub fn pack_rects(sizes: &[[f32; 2]], margin: f32) -> Result<PackLayout> {
    if sizes.is_empty() {
        return Ok(PackLayout {
            placements: Vec::new(),
            effective_margin: margin,
        });
    }
    if !(0.0..0.5).contains(&margin) {
        return Err(Error::InvalidData(format!("margin {} is outside [0, 0.5)", margin)));
    }
    if sizes.iter().flatten().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(Error::InvalidData("chart extents must be finite and non-negative".into()));
    }

    let oriented: Vec<([f32; 2], bool)> = sizes
        .iter()
        .map(|&[w, h]| if h > w { ([h, w], true) } else { ([w, h], false) })
        .collect();
    let rects: Vec<[f32; 2]> = oriented.iter().map(|(r, _)| *r).collect();
    let area: f32 = rects.iter().map(|r| r[0] * r[1]).sum();
    if !(area > 0.0) {
        return Err(Error::InvalidData("charts have zero total area".into()));
    }

    let mut order: Vec<usize> = (0..rects.len()).collect();
    order.sort_by(|&a, &b| {
        rects[b][1]
            .total_cmp(&rects[a][1])
            .then_with(|| rects[b][0].total_cmp(&rects[a][0]))
            .then(a.cmp(&b))
    });

    // past this the layout only grows; the margin fraction barely improves
    let max_padding = 2.0 * rects.iter().map(|r| r[0]).fold(0.0, f32::max);
    let mut padding = (margin * area.sqrt() / 2.0).min(max_padding);
    let (mut origins, mut extent) = pack_shelves(&rects, &order, padding);
    for _ in 0..MAX_MARGIN_ITERATIONS {
        let wanted = (margin * extent / 2.0).min(max_padding);
        if (wanted - padding).abs() <= 1e-4 * extent {
            break;
        }
        let (next_origins, next_extent) = pack_shelves(&rects, &order, wanted);
        padding = wanted;
        origins = next_origins;
        extent = next_extent;
    }

    if !(extent > 0.0 && extent.is_finite()) {
        return Err(Error::InvalidData("packed layout has no extent".into()));
    }
    let scale = 1.0 / extent;
    let effective_margin = 2.0 * padding * scale;
    if effective_margin + 1e-4 < margin {
        tracing::warn!(requested = margin, effective = effective_margin, charts = sizes.len(), "margin reduced to fit");
    }

    let placements = rects
        .iter()
        .zip(oriented.iter())
        .zip(origins.iter())
        .map(|((r, (_, rotated)), o)| {
            let min = [o[0] * scale, o[1] * scale];
            let max = [
                ((o[0] + r[0]) * scale).min(1.0),
                ((o[1] + r[1]) * scale).min(1.0),
            ];
            Placement {
                region: UvRegion::new(min, max),
                scale,
                rotated: *rotated,
                source_height: if *rotated { r[0] } else { r[1] },
            }
        })
        .collect();

    Ok(PackLayout {
        placements,
        effective_margin,
    })
}

/// Pack charts and return the layout, one placement per chart
pub fn pack_charts(charts: &[Chart], margin: f32) -> Result<PackLayout> {
    if charts
        .iter()
        .any(|c| c.corners.iter().flatten().flatten().any(|v| !v.is_finite()))
    {
        return Err(Error::InvalidData("chart has non-finite coordinates".into()));
    }
    let sizes: Vec<[f32; 2]> = charts.iter().map(|c| c.size).collect();
    pack_rects(&sizes, margin)
}

/// Write laid-out charts into UV channel `channel` of `mesh`
pub fn write_charts(mesh: &mut MeshObject, channel: usize, charts: &[Chart], layout: &PackLayout) {
    for (chart, placement) in charts.iter().zip(&layout.placements) {
        for (&fi, corners) in chart.faces.iter().zip(&chart.corners) {
            if let Some(layer) = mesh.faces.get_mut(fi).and_then(|f| f.uvs.get_mut(channel)) {
                *layer = corners.iter().map(|&c| placement.map(c)).collect();
            }
        }
    }
}

/// Whether any two regions overlap
pub fn any_overlap(regions: &[UvRegion]) -> bool {
    let mut sorted: Vec<&UvRegion> = regions.iter().collect();
    sorted.sort_by(|a, b| a.min[0].partial_cmp(&b.min[0]).unwrap_or(Ordering::Equal));
    for (i, a) in sorted.iter().enumerate() {
        for b in &sorted[i + 1..] {
            if b.min[0] >= a.max[0] {
                break;
            }
            if a.overlaps(b) {
                return true;
            }
        }
    }
    false
}
