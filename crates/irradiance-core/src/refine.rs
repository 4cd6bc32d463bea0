//! Outline refinement: staircase smoothing, semi-parallel edge reduction and
//! vertex welding.
//!
//! All tolerances are in pixels. Refinement runs on traced outlines before
//! they are lifted into world space, so the constants stay meaningful at every
//! map resolution.
//!
//! Thin parts of a region, such as a strip one or two pixels wide, end in a
//! short cap edge whose neighbours run back in opposite directions. Welding
//! that edge would fold the strip into a needle, so cap edges are left alone
//! by both smoothing and welding (see [`is_fold_edge`]).
//!
//! The reduction and weld passes repeat until neither changes the ring. On
//! their own output they are therefore no-ops. Every surviving edge shorter
//! than [`WELD_DISTANCE`] is a fold edge, so smoothing skips its endpoints
//! and [`refine_outline`] is idempotent.

use crate::contour::Point;
use bumpalo::Bump;
use bumpalo::collections::Vec as BumpVec;

/// Neighbours averaged on each side of a smoothed vertex.
pub const SMOOTHING_WINDOW: usize = 1;

/// Edges shorter than this are raster steps and get smoothed.
pub const DENSE_EDGE_LIMIT: f64 = 1.5;

/// Consecutive edges whose directions differ by less than this are merged.
pub const ANGULAR_TOLERANCE_DEG: f64 = 10.0;

/// Consecutive vertices closer than this are welded into their midpoint.
pub const WELD_DISTANCE: f64 = DENSE_EDGE_LIMIT;

/// An edge whose neighbouring edges turn by more than this against each other
/// caps a fold and is never welded.
pub const FOLD_ANGLE_DEG: f64 = 120.0;

/// Strip the closing vertex of a loop that repeats its first vertex.
#[must_use]
pub fn open_ring(points: &[Point]) -> &[Point] {
    match points {
        [first, .., last] if first == last => &points[..points.len() - 1],
        _ => points,
    }
}

/// Replace every vertex sitting between two dense edges by a triangular
/// weighted average of itself and up to [`SMOOTHING_WINDOW`] neighbours per
/// side, following dense edges only. Endpoints of fold edges are kept as is.
/// Reads the input ring, never the partially smoothed output.
pub fn smooth<'a>(arena: &'a Bump, ring: &[Point]) -> BumpVec<'a, Point> {
    let n = ring.len();
    let mut out = BumpVec::with_capacity_in(n, arena);
    if n < 3 {
        out.extend_from_slice(ring);
        return out;
    }

    let k = SMOOTHING_WINDOW.min((n - 1) / 2);
    let at = |i: usize, offset: isize| ring[(i as isize + offset).rem_euclid(n as isize) as usize];

    for i in 0..n {
        let p = ring[i];
        let dense = at(i, -1).distance(p) < DENSE_EDGE_LIMIT && p.distance(at(i, 1)) < DENSE_EDGE_LIMIT;
        let on_fold = is_fold_edge(ring, (i + n - 1) % n) || is_fold_edge(ring, i);
        if !dense || on_fold || k == 0 {
            out.push(p);
            continue;
        }

        let self_weight = (k + 1) as f64;
        let (mut sx, mut sy, mut sw) = (p.x * self_weight, p.y * self_weight, self_weight);
        for sign in [-1isize, 1] {
            for d in 1..=k {
                let a = at(i, sign * (d as isize - 1));
                let b = at(i, sign * d as isize);
                if a.distance(b) >= DENSE_EDGE_LIMIT {
                    break;
                }
                let w = (k + 1 - d) as f64;
                sx += b.x * w;
                sy += b.y * w;
                sw += w;
            }
        }
        out.push(Point::new(sx / sw, sy / sw));
    }
    out
}

/// Angle in radians between two direction vectors. Zero-length input counts
/// as parallel.
#[must_use]
pub fn direction_change(u: Point, v: Point) -> f64 {
    let lu = u.x.hypot(u.y);
    let lv = v.x.hypot(v.y);
    if lu == 0.0 || lv == 0.0 {
        return 0.0;
    }
    ((u.x * v.x + u.y * v.y) / (lu * lv)).clamp(-1.0, 1.0).acos()
}

/// Turn angle at `at` when walking `prev → at → next`, in radians.
#[inline]
#[must_use]
pub fn turn_angle(prev: Point, at: Point, next: Point) -> f64 {
    direction_change(edge(prev, at), edge(at, next))
}

#[inline]
fn edge(a: Point, b: Point) -> Point {
    Point::new(b.x - a.x, b.y - a.y)
}

/// Whether edge `i → i + 1` of the ring caps a fold: the edge before it and
/// the edge after it differ in direction by more than [`FOLD_ANGLE_DEG`].
/// Rings with fewer than 4 vertices have no folds.
#[must_use]
pub fn is_fold_edge(ring: &[Point], i: usize) -> bool {
    let n = ring.len();
    if n < 4 {
        return false;
    }
    let before = edge(ring[(i + n - 1) % n], ring[i % n]);
    let after = edge(ring[(i + 1) % n], ring[(i + 2) % n]);
    direction_change(before, after) > FOLD_ANGLE_DEG.to_radians()
}

/// Merge runs of edges that stay within [`ANGULAR_TOLERANCE_DEG`] of the
/// run's first edge, dropping the vertices inside each run.
///
/// The walk starts at the sharpest corner. The ring keeps its original vertex
/// order and never shrinks below 3 vertices. Returns `true` if anything was
/// removed.
pub fn reduce_semi_parallel_edges(arena: &Bump, ring: &mut BumpVec<'_, Point>) -> bool {
    let n = ring.len();
    if n <= 3 {
        return false;
    }
    let tolerance = ANGULAR_TOLERANCE_DEG.to_radians();

    let mut start = 0;
    let mut sharpest = f64::NEG_INFINITY;
    for i in 0..n {
        let turn = turn_angle(ring[(i + n - 1) % n], ring[i], ring[(i + 1) % n]);
        if turn > sharpest {
            sharpest = turn;
            start = i;
        }
    }

    let mut keep = BumpVec::from_iter_in((0..n).map(|_| false), arena);
    keep[start] = true;
    let idx = |offset: usize| (start + offset) % n;

    let mut i = 0;
    while i < n {
        let run = edge(ring[idx(i)], ring[idx(i + 1)]);
        let mut j = i + 1;
        while j < n && direction_change(run, edge(ring[idx(j)], ring[idx(j + 1)])) < tolerance {
            j += 1;
        }
        if j < n {
            keep[idx(j)] = true;
        }
        i = j;
    }

    let kept = keep.iter().filter(|&&k| k).count();
    if kept == n || kept < 3 {
        return false;
    }

    let mut write = 0;
    for read in 0..n {
        if keep[read] {
            ring[write] = ring[read];
            write += 1;
        }
    }
    ring.truncate(write);
    true
}

/// Weld pairs of consecutive vertices closer than [`WELD_DISTANCE`] into
/// their midpoint, including the last/first pair. A welded vertex is not
/// welded again in the same pass, and fold edges are never welded. Returns
/// `true` if the ring shrank.
pub fn weld_vertices<'a>(arena: &'a Bump, ring: &mut BumpVec<'a, Point>) -> bool {
    let n = ring.len();
    let mut out = BumpVec::with_capacity_in(n, arena);
    let mut read = 0;
    while read < n {
        let p = ring[read];
        let weld = read + 1 < n
            && p.distance(ring[read + 1]) < WELD_DISTANCE
            && !is_fold_edge(ring.as_slice(), read);
        if weld {
            out.push(midpoint(p, ring[read + 1]));
            read += 2;
        } else {
            out.push(p);
            read += 1;
        }
    }

    let m = out.len();
    if m > 1 {
        let (first, last) = (out[0], out[m - 1]);
        if first.distance(last) < WELD_DISTANCE && !is_fold_edge(&out, m - 1) {
            out.pop();
            out[0] = midpoint(first, last);
        }
    }
    *ring = out;
    ring.len() != n
}

#[inline]
fn midpoint(a: Point, b: Point) -> Point {
    Point::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5)
}

/// Shoelace area of an open ring (the closing edge is implicit).
#[must_use]
pub fn ring_area(ring: &[Point]) -> f64 {
    let n = ring.len();
    let mut area = 0.0;
    for i in 0..n {
        let (a, b) = (ring[i], ring[(i + 1) % n]);
        area += a.x * b.y - b.x * a.y;
    }
    area * 0.5
}

/// Run the full refinement on a traced outline (closed or open).
///
/// Returns the open vertex ring, or `None` when fewer than 3 vertices survive
/// or the result encloses no area.
#[must_use]
pub fn refine_outline(arena: &Bump, outline: &[Point]) -> Option<Vec<Point>> {
    let ring = open_ring(outline);
    if ring.len() < 3 {
        return None;
    }

    let mut ring = smooth(arena, ring);
    loop {
        let reduced = reduce_semi_parallel_edges(arena, &mut ring);
        let welded = weld_vertices(arena, &mut ring);
        if ring.len() < 3 {
            return None;
        }
        if !reduced && !welded {
            break;
        }
    }

    if ring_area(&ring).abs() < 1e-9 {
        return None;
    }
    Some(ring.to_vec())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::contour::{ContourTracer, outer_loop};
    use crate::segmentation::RegionLabeler;
    use proptest::prelude::*;

    fn traced_rect(x0: usize, y0: usize, width: usize, height: usize) -> Vec<Point> {
        let (w, h) = (40, 40);
        let mut values = vec![0.0; w * h];
        for y in y0..y0 + height {
            for x in x0..x0 + width {
                values[y * w + x] = 1.0;
            }
        }
        let mut labeler = RegionLabeler::new(w, h);
        let result = labeler.label(&values, 0.5, 1);
        let arena = Bump::new();
        let mut tracer = ContourTracer::new(w, h);
        let loops = tracer.trace(&arena, result.labels, &result.regions[0]);
        outer_loop(&loops).unwrap().points.to_vec()
    }

    fn traced_square(x0: usize, y0: usize, side: usize) -> Vec<Point> {
        traced_rect(x0, y0, side, side)
    }

    #[test]
    fn test_open_ring() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(1.0, 0.0);
        let c = Point::new(0.0, 1.0);
        assert_eq!(open_ring(&[a, b, c, a]).len(), 3);
        assert_eq!(open_ring(&[a, b, c]).len(), 3);
        assert!(open_ring(&[]).is_empty());
    }

    #[test]
    fn test_smooth_leaves_sparse_vertices() {
        let arena = Bump::new();
        let tri = [Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(0.0, 10.0)];
        let out = smooth(&arena, &tri);
        assert_eq!(out.as_slice(), &tri);
    }

    #[test]
    fn test_smooth_flattens_staircase() {
        let arena = Bump::new();
        let outline = traced_square(11, 11, 10);
        let ring = open_ring(&outline);
        let out = smooth(&arena, ring);
        assert_eq!(out.len(), ring.len());
        // Vertices along straight sides are unchanged; chamfer vertices move.
        let moved = ring.iter().zip(out.iter()).filter(|(a, b)| a != b).count();
        assert!(moved > 0 && moved < ring.len());
    }

    #[test]
    fn test_reduce_collinear_run() {
        let arena = Bump::new();
        let mut ring = BumpVec::new_in(&arena);
        for x in 0..=10 {
            ring.push(Point::new(f64::from(x), 0.0));
        }
        ring.push(Point::new(10.0, 10.0));
        ring.push(Point::new(0.0, 10.0));

        assert!(reduce_semi_parallel_edges(&arena, &mut ring));
        assert_eq!(ring.len(), 4);
        assert!(!reduce_semi_parallel_edges(&arena, &mut ring));
    }

    #[test]
    fn test_reduce_keeps_triangle() {
        let arena = Bump::new();
        let mut ring = BumpVec::from_iter_in(
            [Point::new(0.0, 0.0), Point::new(5.0, 0.0), Point::new(10.0, 0.0)],
            &arena,
        );
        assert!(!reduce_semi_parallel_edges(&arena, &mut ring));
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_weld_pairs_and_wrap() {
        let arena = Bump::new();
        let mut ring = BumpVec::from_iter_in(
            [
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.5, 0.0),
                Point::new(10.0, 10.0),
                Point::new(0.0, 10.0),
                Point::new(0.0, 0.2),
            ],
            &arena,
        );
        assert!(weld_vertices(&arena, &mut ring));
        assert_eq!(ring.len(), 4);
        assert_eq!(ring[0], Point::new(0.0, 0.1));
        assert_eq!(ring[1], Point::new(10.25, 0.0));
        assert!(!weld_vertices(&arena, &mut ring));
    }

    #[test]
    fn test_fold_edges() {
        let strip = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        assert!(is_fold_edge(&strip, 1));
        assert!(is_fold_edge(&strip, 3));

        let square = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        assert!(!is_fold_edge(&square, 0));
        assert!(!is_fold_edge(&strip[..3], 1));
    }

    #[test]
    fn test_weld_keeps_strip_caps() {
        let arena = Bump::new();
        let mut ring = BumpVec::from_iter_in(
            [
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 1.0),
                Point::new(0.0, 1.0),
            ],
            &arena,
        );
        assert!(!weld_vertices(&arena, &mut ring));
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn test_refine_square_keeps_corners() {
        let arena = Bump::new();
        let outline = traced_square(11, 11, 10);
        let refined = refine_outline(&arena, &outline).unwrap();
        assert!(refined.len() >= 4);

        for corner in [(10.5, 10.5), (20.5, 10.5), (20.5, 20.5), (10.5, 20.5)] {
            let c = Point::new(corner.0, corner.1);
            let nearest = refined.iter().map(|p| p.distance(c)).fold(f64::MAX, f64::min);
            assert!(nearest < 1.5, "no vertex near corner {corner:?} ({nearest})");
        }
        assert!(ring_area(&refined).abs() > 50.0);
    }

    #[test]
    fn test_refine_small_square_survives() {
        let arena = Bump::new();
        let refined = refine_outline(&arena, &traced_square(4, 4, 5)).unwrap();
        assert!(refined.len() >= 3);
        assert!(ring_area(&refined).abs() > 5.0);
    }

    #[test]
    fn test_refine_thin_strips_survive() {
        let arena = Bump::new();
        for (width, height) in [(1, 10), (2, 10), (1, 30), (2, 30), (10, 1), (30, 2), (2, 2)] {
            let outline = traced_rect(3, 4, width, height);
            let refined = refine_outline(&arena, &outline)
                .unwrap_or_else(|| panic!("{width}x{height} strip was rejected"));
            assert!(refined.len() >= 3);
            let pixels = (width * height) as f64;
            assert!(ring_area(&refined).abs() > pixels * 0.35, "{width}x{height}");
            assert_eq!(refine_outline(&arena, &refined), Some(refined), "{width}x{height}");
        }
    }

    #[test]
    fn test_refine_rejects_degenerate() {
        let arena = Bump::new();
        assert!(refine_outline(&arena, &[Point::new(0.0, 0.0), Point::new(1.0, 1.0)]).is_none());
        let line = [Point::new(0.0, 0.0), Point::new(5.0, 0.0), Point::new(10.0, 0.0)];
        assert!(refine_outline(&arena, &line).is_none());
        let tiny = [Point::new(0.0, 0.0), Point::new(0.5, 0.0), Point::new(0.0, 0.5)];
        assert!(refine_outline(&arena, &tiny).is_none());
    }

    #[test]
    fn test_refine_is_idempotent_on_square() {
        let arena = Bump::new();
        let once = refine_outline(&arena, &traced_square(3, 7, 12)).unwrap();
        let twice = refine_outline(&arena, &once).unwrap();
        assert_eq!(once, twice);
    }

    proptest! {
        #[test]
        fn prop_refine_idempotent(
            points in prop::collection::vec((0.0..30.0f64, 0.0..30.0f64), 3..40),
            snap in any::<bool>(),
        ) {
            let arena = Bump::new();
            let ring: Vec<Point> = points
                .iter()
                .map(|&(x, y)| if snap {
                    Point::new((x * 2.0).round() / 2.0, (y * 2.0).round() / 2.0)
                } else {
                    Point::new(x, y)
                })
                .collect();
            if let Some(once) = refine_outline(&arena, &ring) {
                prop_assert!(once.len() >= 3);
                let twice = refine_outline(&arena, &once);
                prop_assert_eq!(Some(once), twice);
            }
        }

        #[test]
        fn prop_short_edges_cap_folds(
            points in prop::collection::vec((0.0..30.0f64, 0.0..30.0f64), 3..40),
        ) {
            let arena = Bump::new();
            let ring: Vec<Point> = points.iter().map(|&(x, y)| Point::new(x, y)).collect();
            if let Some(out) = refine_outline(&arena, &ring) {
                for i in 0..out.len() {
                    let d = out[i].distance(out[(i + 1) % out.len()]);
                    prop_assert!(d >= WELD_DISTANCE || is_fold_edge(&out, i));
                }
            }
        }
    }
}
