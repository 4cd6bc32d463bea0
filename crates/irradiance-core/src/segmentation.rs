//! Region labeling of the illumination buffer.
//!
//! Pixels brighter than the threshold are grouped into 4-connected regions in
//! a single row-major scan. Label collisions are recorded in a flat merge map
//! (union-find) and resolved before the final rewrite.

use crate::image::{PixelBounds, PixelCoords};

/// A disjoint-set forest over region ids, backed by a caller-owned slice.
///
/// Unions always keep the smaller root as the canonical id, so a parent is
/// never larger than its child. Because ids are handed out in scan order, the
/// canonical id of a region is the id of the first pixel that started it.
pub struct MergeMap<'a> {
    parent: &'a mut [u32],
}

impl<'a> MergeMap<'a> {
    /// Wrap a parent slice. Entries are initialised lazily by [`Self::make_set`].
    pub fn new(parent: &'a mut [u32]) -> Self {
        Self { parent }
    }

    /// Register `id` as its own root.
    #[inline]
    pub fn make_set(&mut self, id: u32) {
        self.parent[id as usize] = id;
    }

    /// Find the canonical id of the set containing `id`.
    #[inline]
    pub fn find(&mut self, id: u32) -> u32 {
        let mut root = id;
        while self.parent[root as usize] != root {
            self.parent[root as usize] = self.parent[self.parent[root as usize] as usize];
            root = self.parent[root as usize];
        }
        root
    }

    /// Merge the sets containing `a` and `b`; returns the surviving root.
    #[inline]
    pub fn union(&mut self, a: u32, b: u32) -> u32 {
        let root_a = self.find(a);
        let root_b = self.find(b);
        let (keep, drop) = if root_a <= root_b {
            (root_a, root_b)
        } else {
            (root_b, root_a)
        };
        self.parent[drop as usize] = keep;
        keep
    }

    /// Point every id in `1..count` straight at its root.
    ///
    /// Parents are never larger than their children, so a single ascending
    /// pass sees every parent already resolved.
    pub fn resolve(&mut self, count: u32) {
        for id in 1..count as usize {
            let parent = self.parent[id] as usize;
            self.parent[id] = self.parent[parent];
        }
    }
}

/// Bounding box and pixel count of one surviving region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegionStats {
    /// Dense region id (1-based) as written in the label map.
    pub id: u32,
    /// Tight bounding rectangle of the region.
    pub bounds: PixelBounds,
    /// Number of pixels in the region.
    pub pixel_count: u32,
}

/// Result of a labeling pass.
pub struct LabelResult<'a> {
    /// Flat array of dense region ids (row-major), 0 = unlabeled.
    pub labels: &'a [u32],
    /// Statistics for each surviving region (indexed by id - 1).
    pub regions: Vec<RegionStats>,
    /// Rectangle covering every above-threshold pixel, including pixels of
    /// regions that were dropped for being too small.
    pub bounds: PixelBounds,
    /// One past the largest provisional id handed out during the scan
    /// (0 when nothing exceeded the threshold).
    pub provisional_ids: u32,
}

/// Connected-region labeler with maps sized once for a fixed resolution.
pub struct RegionLabeler {
    width: usize,
    height: usize,
    labels: Vec<u32>,
    merge: Vec<u32>,
    sizes: Vec<u32>,
    region_bounds: Vec<PixelBounds>,
    dense: Vec<u32>,
}

impl RegionLabeler {
    /// Allocate every map for a `width × height` buffer.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        // A 4-connected checkerboard is the worst case: one id per two pixels.
        let capacity = width * height / 2 + 2;
        Self {
            width,
            height,
            labels: vec![0; width * height],
            merge: vec![0; capacity],
            sizes: vec![0; capacity],
            region_bounds: vec![PixelBounds::EMPTY; capacity],
            dense: vec![0; capacity],
        }
    }

    /// Width of the label map.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height of the label map.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Labels of the last pass.
    #[must_use]
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Resolved merge map of the last pass: provisional id → canonical id.
    #[must_use]
    pub fn merge_map(&self, provisional_ids: u32) -> &[u32] {
        &self.merge[..provisional_ids as usize]
    }

    /// Label every pixel whose value exceeds `threshold`.
    ///
    /// Regions smaller than `min_region_pixels` are cleared from the map and
    /// left out of the returned statistics. NaN values never exceed the
    /// threshold.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn label(&mut self, values: &[f64], threshold: f64, min_region_pixels: u32) -> LabelResult<'_> {
        let width = self.width;
        let height = self.height;
        assert_eq!(values.len(), width * height, "value buffer has the wrong length");

        let Self {
            labels,
            merge,
            sizes,
            region_bounds,
            dense,
            ..
        } = self;

        labels.fill(0);
        let mut merge_map = MergeMap::new(merge);
        let mut next_id = 1u32;
        let mut bounds = PixelBounds::EMPTY;

        // Pass 1: provisional labels from the causal (left, up) neighbourhood
        for y in 0..height {
            let row_off = y * width;
            for x in 0..width {
                let idx = row_off + x;
                if !(values[idx] > threshold) {
                    continue;
                }
                bounds.include(x as i32, y as i32);

                let left = if x > 0 { labels[idx - 1] } else { 0 };
                let up = if y > 0 { labels[idx - width] } else { 0 };

                labels[idx] = match (left, up) {
                    (0, 0) => {
                        let id = next_id;
                        next_id += 1;
                        merge_map.make_set(id);
                        id
                    }
                    (l, 0) => l,
                    (0, u) => u,
                    (l, u) if l == u => l,
                    (l, u) => merge_map.union(l, u),
                };
            }
        }

        if next_id == 1 {
            return LabelResult {
                labels,
                regions: Vec::new(),
                bounds,
                provisional_ids: 0,
            };
        }

        // Pass 2: resolve merges, accumulate sizes and bounds per root
        merge_map.resolve(next_id);
        let count = next_id as usize;
        sizes[..count].fill(0);
        region_bounds[..count].fill(PixelBounds::EMPTY);

        for y in 0..height {
            let row_off = y * width;
            for x in 0..width {
                let label = labels[row_off + x];
                if label == 0 {
                    continue;
                }
                let root = merge[label as usize] as usize;
                sizes[root] += 1;
                region_bounds[root].include(x as i32, y as i32);
            }
        }

        // Pass 3: dense ids for surviving roots, in root order
        let mut regions = Vec::new();
        for root in 1..count {
            dense[root] = 0;
            if merge[root] as usize != root || sizes[root] < min_region_pixels {
                continue;
            }
            let id = regions.len() as u32 + 1;
            dense[root] = id;
            regions.push(RegionStats {
                id,
                bounds: region_bounds[root],
                pixel_count: sizes[root],
            });
        }

        for label in labels.iter_mut().filter(|l| **l != 0) {
            *label = dense[merge[*label as usize] as usize];
        }

        tracing::trace!(
            provisional = next_id - 1,
            regions = regions.len(),
            "region labeling finished"
        );

        LabelResult {
            labels,
            regions,
            bounds,
            provisional_ids: next_id,
        }
    }
}

/// Pixel coordinates of flat index `idx` in a buffer of `width` columns.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn index_to_coords(idx: usize, width: usize) -> PixelCoords {
    PixelCoords::new((idx % width) as i32, (idx / width) as i32)
}
