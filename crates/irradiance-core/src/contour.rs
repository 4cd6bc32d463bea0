//! Region outline tracing with marching squares.
//!
//! The dual grid places a cell between every 2×2 group of pixel centres and
//! classifies it by which corners belong to the target region. Boundary
//! segments join edge midpoints and are oriented so the region always lies on
//! the same side; walking them end to end yields closed loops.
//!
//! Saddle cells (two diagonal corners inside) are always split into two
//! corner segments. This matches the 4-connectivity of the labeler, which
//! never joins pixels that only touch diagonally.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

use crate::segmentation::RegionStats;
use bumpalo::Bump;
use bumpalo::collections::Vec as BumpVec;
use multiversion::multiversion;

/// A 2D point in pixel space (pixel `(x, y)` has its centre at `(x, y)`).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate (rows grow downwards).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[inline]
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

// Corner bits of a cell.
const TL: u8 = 1;
const TR: u8 = 2;
const BR: u8 = 4;
const BL: u8 = 8;

const CODE_MASK: u8 = 0x0f;
const CONSUMED: [u8; 2] = [0x10, 0x20];

/// Cell edges, named by the side of the cell they lie on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

type Segment = (Edge, Edge);

/// Directed boundary segments for each of the 16 cell codes.
///
/// Every segment keeps the occupied corners on the same side of its
/// direction of travel.
const SEGMENTS: [&[Segment]; 16] = {
    use Edge::{Bottom as B, Left as L, Right as R, Top as T};
    [
        &[],               // 0
        &[(L, T)],         // 1  TL
        &[(T, R)],         // 2  TR
        &[(L, R)],         // 3  TL TR
        &[(R, B)],         // 4  BR
        &[(L, T), (R, B)], // 5  TL BR (saddle)
        &[(T, B)],         // 6  TR BR
        &[(L, B)],         // 7  TL TR BR
        &[(B, L)],         // 8  BL
        &[(B, T)],         // 9  TL BL
        &[(T, R), (B, L)], // 10 TR BL (saddle)
        &[(B, R)],         // 11 TL TR BL
        &[(R, L)],         // 12 BR BL
        &[(R, T)],         // 13 TL BR BL
        &[(T, L)],         // 14 TR BR BL
        &[],               // 15
    ]
};

impl Edge {
    /// Midpoint of this edge for the cell whose top-left corner is `(cx, cy)`.
    fn midpoint(self, cx: i32, cy: i32) -> Point {
        let (x, y) = (f64::from(cx), f64::from(cy));
        match self {
            Edge::Top => Point::new(x + 0.5, y),
            Edge::Right => Point::new(x + 1.0, y + 0.5),
            Edge::Bottom => Point::new(x + 0.5, y + 1.0),
            Edge::Left => Point::new(x, y + 0.5),
        }
    }

    /// Neighbouring cell across this edge and the edge we enter it through.
    fn step(self, cx: i32, cy: i32) -> (i32, i32, Edge) {
        match self {
            Edge::Top => (cx, cy - 1, Edge::Bottom),
            Edge::Right => (cx + 1, cy, Edge::Left),
            Edge::Bottom => (cx, cy + 1, Edge::Top),
            Edge::Left => (cx - 1, cy, Edge::Right),
        }
    }
}

/// One closed boundary loop of a region.
pub struct ContourLoop<'a> {
    /// Vertices in walk order; the first vertex is repeated at the end.
    pub points: BumpVec<'a, Point>,
    /// Shoelace area in pixel space. Outer boundaries are negative, holes
    /// positive.
    pub signed_area: f64,
}

impl ContourLoop<'_> {
    /// Enclosed area, regardless of orientation.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.signed_area.abs()
    }

    /// True for a loop that bounds the region from outside.
    #[must_use]
    pub fn is_outer(&self) -> bool {
        self.signed_area < 0.0
    }
}

/// Marching-squares tracer with its cell map sized once.
///
/// The cell grid is extended by one ring of virtual empty pixels, so regions
/// touching the buffer border still close: cell `(cx, cy)` for
/// `cx in -1..width`, `cy in -1..height`.
pub struct ContourTracer {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl ContourTracer {
    /// Allocate the cell map for a `width × height` label map.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0; (width + 1) * (height + 1)],
        }
    }

    #[inline]
    fn cell_index(&self, cx: i32, cy: i32) -> Option<usize> {
        let stride = self.width + 1;
        let (ux, uy) = (cx + 1, cy + 1);
        if ux < 0 || uy < 0 || ux as usize >= stride || uy as usize > self.height {
            return None;
        }
        Some(uy as usize * stride + ux as usize)
    }

    /// Configuration code of a cell from the last trace (0 outside the grid).
    #[must_use]
    pub fn cell_code(&self, cx: i32, cy: i32) -> u8 {
        self.cell_index(cx, cy)
            .map_or(0, |idx| self.cells[idx] & CODE_MASK)
    }

    /// Trace every boundary loop of `region` in `labels`.
    ///
    /// Regions of a single pixel and loops enclosing no area produce nothing.
    pub fn trace<'a>(
        &mut self,
        arena: &'a Bump,
        labels: &[u32],
        region: &RegionStats,
    ) -> BumpVec<'a, ContourLoop<'a>> {
        let mut loops = BumpVec::new_in(arena);
        if region.pixel_count < 2 || region.bounds.is_empty() {
            return loops;
        }
        assert_eq!(labels.len(), self.width * self.height, "label map has the wrong size");

        let x0 = region.bounds.min.x - 1;
        let y0 = region.bounds.min.y - 1;
        let x1 = region.bounds.max.x;
        let y1 = region.bounds.max.y;

        classify_cells(
            labels,
            self.width,
            self.height,
            region.id,
            (x0, y0, x1, y1),
            &mut self.cells,
        );

        for cy in y0..=y1 {
            for cx in x0..=x1 {
                for slot in 0..2 {
                    if let Some(contour) = self.walk(arena, cx, cy, slot) {
                        loops.push(contour);
                    }
                }
            }
        }

        loops
    }

    /// Follow the loop that starts with segment `start_slot` of cell `(cx, cy)`.
    fn walk<'a>(
        &mut self,
        arena: &'a Bump,
        cx: i32,
        cy: i32,
        start_slot: usize,
    ) -> Option<ContourLoop<'a>> {
        let start_idx = self.cell_index(cx, cy)?;
        let start_cell = self.cells[start_idx];
        let segments = SEGMENTS[usize::from(start_cell & CODE_MASK)];
        if start_slot >= segments.len() || start_cell & CONSUMED[start_slot] != 0 {
            return None;
        }

        let mut points = BumpVec::new_in(arena);
        let (mut x, mut y, mut idx, mut slot) = (cx, cy, start_idx, start_slot);
        let mut closed = false;

        for _ in 0..self.cells.len() * 2 {
            let code = self.cells[idx] & CODE_MASK;
            let (from, to) = SEGMENTS[usize::from(code)][slot];
            points.push(from.midpoint(x, y));
            self.cells[idx] |= CONSUMED[slot];

            let (nx, ny, entry) = to.step(x, y);
            let next_idx = self.cell_index(nx, ny)?;
            let next_code = self.cells[next_idx] & CODE_MASK;
            let next_slot = SEGMENTS[usize::from(next_code)]
                .iter()
                .position(|&(f, _)| f == entry)?;

            if next_idx == start_idx && next_slot == start_slot {
                closed = true;
                break;
            }
            if self.cells[next_idx] & CONSUMED[next_slot] != 0 {
                tracing::trace!(x = nx, y = ny, "contour walk hit a consumed segment");
                return None;
            }
            (x, y, idx, slot) = (nx, ny, next_idx, next_slot);
        }

        if !closed || points.len() < 3 {
            return None;
        }
        let first = points[0];
        points.push(first);
        let signed_area = signed_area(&points);
        if signed_area.abs() < 1e-9 {
            return None;
        }
        Some(ContourLoop {
            points,
            signed_area,
        })
    }
}

#[multiversion(targets(
    "x86_64+avx2+bmi1+bmi2+popcnt+lzcnt",
    "x86_64+avx512f+avx512bw+avx512dq+avx512vl",
    "aarch64+neon"
))]
/// Write the corner code of every cell in the inclusive range
/// `(x0, y0)..=(x1, y1)`, clearing the consumed flags.
fn classify_cells(
    labels: &[u32],
    width: usize,
    height: usize,
    target: u32,
    window: (i32, i32, i32, i32),
    cells: &mut [u8],
) {
    let (x0, y0, x1, y1) = window;
    let stride = width + 1;
    let occupied = |px: i32, py: i32| -> bool {
        px >= 0
            && py >= 0
            && (px as usize) < width
            && (py as usize) < height
            && labels[py as usize * width + px as usize] == target
    };

    for cy in y0..=y1 {
        let row = (cy + 1) as usize * stride;
        for cx in x0..=x1 {
            let mut code = 0u8;
            if occupied(cx, cy) {
                code |= TL;
            }
            if occupied(cx + 1, cy) {
                code |= TR;
            }
            if occupied(cx + 1, cy + 1) {
                code |= BR;
            }
            if occupied(cx, cy + 1) {
                code |= BL;
            }
            cells[row + (cx + 1) as usize] = code;
        }
    }
}

/// Shoelace area of a closed ring (first vertex repeated at the end).
#[must_use]
pub fn signed_area(points: &[Point]) -> f64 {
    let mut area = 0.0;
    for w in points.windows(2) {
        area += w[0].x * w[1].y - w[1].x * w[0].y;
    }
    area * 0.5
}

/// Loop with the largest enclosed area, which is the outer boundary.
#[must_use]
pub fn outer_loop<'b, 'a>(loops: &'b [ContourLoop<'a>]) -> Option<&'b ContourLoop<'a>> {
    loops.iter().max_by(|a, b| a.area().total_cmp(&b.area()))
}

/// Even-odd point-in-polygon test on a closed ring.
#[must_use]
pub fn contains(points: &[Point], p: Point) -> bool {
    let mut inside = false;
    for w in points.windows(2) {
        let (a, b) = (w[0], w[1]);
        if (a.y > p.y) != (b.y > p.y) {
            let t = (p.y - a.y) / (b.y - a.y);
            if p.x < a.x + t * (b.x - a.x) {
                inside = !inside;
            }
        }
    }
    inside
}
