//! Bounce-light extraction for polygonal area lights.
//!
//! An area light sees a small offscreen G-buffer of its frustum. Every
//! contiguous patch of that buffer which receives enough direct light is turned
//! into a new, secondary area light that re-emits the bounce.
//!
//! # Pipeline
//!
//! 1. **Render**: a [`RenderBackend`] fills the [`GBuffer`] (albedo, depth,
//!    normal, geometry, illumination) for the light's [`camera::OffscreenCamera`].
//! 2. **Region labeling**: illumination is decoded and thresholded, and
//!    4-connected regions are labeled with a flat union-find.
//! 3. **Contour tracing**: each region's outline is walked with marching
//!    squares; the loop with the largest area is kept.
//! 4. **Polygon refinement**: staircase smoothing, semi-parallel edge
//!    reduction and vertex welding, all in pixel space.
//! 5. **Registration**: the refined outline is lifted onto the region's
//!    surface plane, photometry is averaged over the region, and the result is
//!    handed to an [`AreaLightRegistry`].
//!
//! Passes are cached: as long as the light's transform, intensity and the
//! camera field of view stay put, [`IrradianceTransfer::evaluate`] only
//! re-submits the existing lights.
//!
//! # Example
//!
//! ```
//! use irradiance_core::{IrradianceTransfer, PrimaryAreaLight, TransferConfig};
//! use irradiance_core::config::MapResolution;
//! use irradiance_core::test_utils::RecordingRegistry;
//! use irradiance_core::test_utils::scene::PlaneScene;
//! use nalgebra::{Matrix4, Vector3};
//!
//! let config = TransferConfig::builder()
//!     .resolution(MapResolution::R32)
//!     .camera_fov_deg(90.0)
//!     .build();
//! let mut transfer = IrradianceTransfer::with_config(config);
//!
//! let light = PrimaryAreaLight::new(
//!     Matrix4::new_translation(&Vector3::new(0.0, 0.0, 2.0)),
//!     -Vector3::z(),
//! );
//! let mut scene = PlaneScene::new(32, 32).with_lit_rect(11, 11, 10, 10, 1.0);
//! let mut registry = RecordingRegistry::default();
//!
//! let stats = transfer.evaluate(&light, &mut scene, &mut registry);
//! assert_eq!(stats.num_polygons, 1);
//! transfer.release(&mut registry);
//! assert!(registry.is_balanced());
//! ```

/// Offscreen camera and ray/plane helpers.
pub mod camera;
/// Configuration types for the transfer.
pub mod config;
/// Marching-squares outline tracing.
pub mod contour;
/// Packed RGBA8 scalar codec.
pub mod decode;
/// Pixel buffers and the G-buffer frame.
pub mod image;
/// Area-light records and the registry seam.
pub mod light;
/// Outline smoothing, reduction and welding.
pub mod refine;
/// Connected-region labeling using union-find.
pub mod segmentation;
/// Utilities for testing and synthetic scene generation.
pub mod test_utils;

use crate::camera::{OffscreenCamera, Plane};
use crate::config::clamp_fov;
pub use crate::config::{MapResolution, TransferConfig};
use crate::contour::{ContourTracer, outer_loop};
pub use crate::image::GBuffer;
pub use crate::light::{
    AreaLight, AreaLightRegistry, IrradiancePolygon, PrimaryAreaLight, ProjectionMode, RawPolygon,
};
use crate::segmentation::RegionLabeler;
use bumpalo::Bump;
use bumpalo::collections::Vec as BumpVec;
use nalgebra::Vector3;

/// Decoded depth at or above this is treated as background.
const FAR_DEPTH: f64 = 1.0 - 1e-6;

/// Outline colours cycled by light index in [`IrradianceTransfer::debug_segments`].
pub const DEBUG_PALETTE: [[f64; 3]; 6] = [
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.92, 0.016],
    [0.0, 1.0, 1.0],
    [1.0, 0.0, 1.0],
];

/// Colour of the edge that closes each debug outline.
pub const CLOSING_EDGE_COLOR: [f64; 3] = [1.0, 1.0, 1.0];

/// What a backend is asked to draw.
#[derive(Clone, Copy, Debug)]
pub struct RenderRequest<'a> {
    /// Camera to render from.
    pub camera: OffscreenCamera,
    /// Light whose direct illumination goes into the illumination buffer.
    pub light: &'a PrimaryAreaLight,
    /// Buffer width in pixels.
    pub width: usize,
    /// Buffer height in pixels.
    pub height: usize,
}

/// Rasterizer that produces the offscreen G-buffer.
pub trait RenderBackend {
    /// Draw the scene for `request` into `frame`, which arrives cleared.
    ///
    /// Pixels without a surface must keep geometry `w == 0`.
    fn render(&mut self, request: &RenderRequest<'_>, frame: &mut GBuffer);
}

/// Inputs whose change invalidates the cached lights.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fingerprint {
    /// Light transform applied to the local point `(1, 1, 1)`.
    pub transform_sample: Vector3<f64>,
    /// Light intensity.
    pub intensity: f64,
    /// Offscreen camera field of view in degrees.
    pub fov_deg: f64,
}

impl Fingerprint {
    /// Tolerance below which two fingerprints are considered equal.
    pub const EPSILON: f64 = 1e-6;

    /// Fingerprint of a light rendered with the given field of view.
    #[must_use]
    pub fn of(light: &PrimaryAreaLight, fov_deg: f64) -> Self {
        Self {
            transform_sample: light.fingerprint_sample(),
            intensity: light.intensity,
            fov_deg,
        }
    }

    /// True when no input moved by more than [`Self::EPSILON`].
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        (self.transform_sample - other.transform_sample).norm() <= Self::EPSILON
            && (self.intensity - other.intensity).abs() <= Self::EPSILON
            && (self.fov_deg - other.fov_deg).abs() <= Self::EPSILON
    }
}

/// Statistics for one evaluation pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassStats {
    /// Whether the lights were rebuilt (false: cached lights re-submitted).
    pub rebuilt: bool,
    /// Time spent in the backend in milliseconds.
    pub render_ms: f64,
    /// Time taken for decoding and region labeling in milliseconds.
    pub labeling_ms: f64,
    /// Time taken for contour tracing and accumulation in milliseconds.
    pub tracing_ms: f64,
    /// Time taken for refinement and photometry in milliseconds.
    pub refinement_ms: f64,
    /// Total pass time in milliseconds.
    pub total_ms: f64,
    /// Number of labeled regions.
    pub num_regions: usize,
    /// Number of secondary lights held after the pass.
    pub num_polygons: usize,
    /// Regions that did not yield a light (no outline, degenerate plane,
    /// collapsed during refinement, or missed by the camera ray).
    pub num_rejected: usize,
    /// `register` calls issued.
    pub registered: usize,
    /// `update` calls issued.
    pub updated: usize,
    /// `unregister` calls issued.
    pub unregistered: usize,
}

#[derive(Clone, Copy)]
struct RegionAccum {
    pixels: u32,
    illumination: f64,
    color: [u64; 3],
    normal: Vector3<f64>,
    position: Vector3<f64>,
}

impl Default for RegionAccum {
    fn default() -> Self {
        Self {
            pixels: 0,
            illumination: 0.0,
            color: [0; 3],
            normal: Vector3::zeros(),
            position: Vector3::zeros(),
        }
    }
}

/// Extracts secondary area lights from one primary light's bounce.
///
/// Holds every buffer and map for its configured resolution, allocated once,
/// plus the lights it currently has registered. Call
/// [`release`](Self::release) before dropping it.
pub struct IrradianceTransfer {
    arena: Bump,
    config: TransferConfig,
    frame: GBuffer,
    illumination: Vec<f64>,
    depth: Vec<f64>,
    labeler: RegionLabeler,
    tracer: ContourTracer,
    polygons: Vec<IrradiancePolygon>,
    fingerprint: Option<Fingerprint>,
    generation: u64,
}

impl IrradianceTransfer {
    /// Create a transfer with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TransferConfig::default())
    }

    /// Create a transfer with a custom configuration.
    #[must_use]
    pub fn with_config(config: TransferConfig) -> Self {
        let config = config.clamped();
        let (width, height) = config.resolution.dimensions();
        Self {
            arena: Bump::new(),
            config,
            frame: GBuffer::new(width, height),
            illumination: vec![0.0; width * height],
            depth: vec![0.0; width * height],
            labeler: RegionLabeler::new(width, height),
            tracer: ContourTracer::new(width, height),
            polygons: Vec::new(),
            fingerprint: None,
            generation: 0,
        }
    }

    /// Get the current configuration.
    #[must_use]
    pub fn config(&self) -> TransferConfig {
        self.config
    }

    /// Change the offscreen camera's field of view (clamped to
    /// [`config::CAMERA_FOV_RANGE`]). Takes effect on the next pass.
    pub fn set_camera_fov(&mut self, fov_deg: f64) {
        self.config.camera_fov_deg = clamp_fov(fov_deg);
    }

    /// Force the next [`evaluate`](Self::evaluate) to rebuild.
    pub fn invalidate(&mut self) {
        self.fingerprint = None;
    }

    /// Secondary lights currently registered.
    #[must_use]
    pub fn polygons(&self) -> &[IrradiancePolygon] {
        &self.polygons
    }

    /// The frame rendered by the last rebuild.
    #[must_use]
    pub fn frame(&self) -> &GBuffer {
        &self.frame
    }

    /// World-space outline segments of the current lights for debug drawing.
    ///
    /// Each light's open edges take `palette[index % palette.len()]`; the edge
    /// from its last vertex back to the first takes [`CLOSING_EDGE_COLOR`]. An
    /// empty palette yields nothing.
    pub fn debug_segments<'a>(
        &'a self,
        palette: &'a [[f64; 3]],
    ) -> impl Iterator<Item = (Vector3<f64>, Vector3<f64>, [f64; 3])> + 'a {
        self.polygons
            .iter()
            .filter(move |_| !palette.is_empty())
            .flat_map(move |polygon| {
                let color = palette[polygon.index % palette.len()];
                let vertices = &polygon.vertices;
                let closing = match vertices.as_slice() {
                    [first, .., last] => Some((*last, *first, CLOSING_EDGE_COLOR)),
                    _ => None,
                };
                vertices
                    .windows(2)
                    .map(move |pair| (pair[0], pair[1], color))
                    .chain(closing)
            })
    }

    /// Region labels of the last rebuild (row-major, 0 = unlabeled).
    #[must_use]
    pub fn labels(&self) -> &[u32] {
        self.labeler.labels()
    }

    /// Run one pass: re-submit cached lights if nothing changed, otherwise
    /// rebuild them from a fresh render.
    pub fn evaluate<B, R>(
        &mut self,
        light: &PrimaryAreaLight,
        backend: &mut B,
        registry: &mut R,
    ) -> PassStats
    where
        B: RenderBackend + ?Sized,
        R: AreaLightRegistry + ?Sized,
    {
        let start_total = std::time::Instant::now();
        let mut stats = PassStats::default();

        let fingerprint = Fingerprint::of(light, self.config.camera_fov_deg);
        if self.fingerprint.is_some_and(|prev| prev.matches(&fingerprint)) {
            for polygon in &self.polygons {
                registry.update(AreaLight::Secondary(polygon));
            }
            stats.updated = self.polygons.len();
            stats.num_polygons = self.polygons.len();
            stats.total_ms = start_total.elapsed().as_secs_f64() * 1000.0;
            return stats;
        }

        stats.rebuilt = true;
        stats.unregistered = self.unregister_all(registry);
        self.fingerprint = Some(fingerprint);
        self.generation += 1;
        self.arena.reset();

        let Some(camera) = light.offscreen_camera(self.config.camera_fov_deg) else {
            tracing::debug!("light normal degenerates; no offscreen camera");
            stats.total_ms = start_total.elapsed().as_secs_f64() * 1000.0;
            return stats;
        };
        let (width, height) = self.config.resolution.dimensions();

        // 1. Render
        let start_render = std::time::Instant::now();
        {
            let _span = tracing::info_span!("render").entered();
            self.frame.clear();
            let request = RenderRequest {
                camera,
                light,
                width,
                height,
            };
            backend.render(&request, &mut self.frame);
        }
        stats.render_ms = start_render.elapsed().as_secs_f64() * 1000.0;

        // 2. Decode, mask ineligible pixels and label
        let start_label = std::time::Instant::now();
        let label_result = {
            let _span = tracing::info_span!("region_labeling").entered();
            self.frame
                .illumination
                .decode_illumination_into(&mut self.illumination);
            self.frame.depth.decode_into(&mut self.depth);
            let geometry = self.frame.geometry.data();
            for ((value, &depth), g) in self.illumination.iter_mut().zip(&self.depth).zip(geometry) {
                if g[3] == 0.0 || depth >= FAR_DEPTH {
                    *value = 0.0;
                }
            }
            self.labeler.label(
                &self.illumination,
                self.config.bounce_threshold,
                self.config.min_region_pixels,
            )
        };
        stats.labeling_ms = start_label.elapsed().as_secs_f64() * 1000.0;
        stats.num_regions = label_result.regions.len();

        // 3. Accumulate region statistics and trace outlines
        let start_trace = std::time::Instant::now();
        let mut raws = Vec::with_capacity(label_result.regions.len());
        {
            let _span = tracing::info_span!("contour_tracing").entered();
            let mut accums = BumpVec::from_iter_in(
                label_result.regions.iter().map(|_| RegionAccum::default()),
                &self.arena,
            );
            let albedo = self.frame.albedo.data();
            let normals = self.frame.normal.data();
            let geometry = self.frame.geometry.data();
            for (idx, &id) in label_result.labels.iter().enumerate() {
                if id == 0 {
                    continue;
                }
                let acc = &mut accums[id as usize - 1];
                let (n, g, a) = (normals[idx], geometry[idx], albedo[idx]);
                acc.pixels += 1;
                acc.illumination += self.illumination[idx];
                for c in 0..3 {
                    acc.color[c] += u64::from(a[c]);
                }
                acc.normal += Vector3::new(f64::from(n[0]), f64::from(n[1]), f64::from(n[2]));
                acc.position += Vector3::new(f64::from(g[0]), f64::from(g[1]), f64::from(g[2]));
            }

            for (region, acc) in label_result.regions.iter().zip(accums.iter()) {
                let loops = self.tracer.trace(&self.arena, label_result.labels, region);
                let Some(outer) = outer_loop(&loops) else {
                    tracing::trace!(region = region.id, "region has no outline");
                    stats.num_rejected += 1;
                    continue;
                };
                let origin = acc.position / f64::from(acc.pixels.max(1));
                let Some(plane) = Plane::new(origin, acc.normal) else {
                    tracing::debug!(region = region.id, "region normals cancel out");
                    stats.num_rejected += 1;
                    continue;
                };
                raws.push(RawPolygon {
                    region_id: region.id,
                    outline: outer.points.to_vec(),
                    pixel_count: acc.pixels,
                    illumination_sum: acc.illumination,
                    color_sums: acc.color,
                    plane,
                });
            }
        }
        stats.tracing_ms = start_trace.elapsed().as_secs_f64() * 1000.0;

        // 4. Refine, lift and compute photometry
        let start_refine = std::time::Instant::now();
        {
            let _span = tracing::info_span!("polygon_refinement").entered();
            for raw in &raws {
                let built = crate::refine::refine_outline(&self.arena, &raw.outline)
                    .and_then(|ring| raw.lift(&ring, &camera, width, height))
                    .and_then(|world| {
                        IrradiancePolygon::build(
                            self.polygons.len(),
                            self.generation,
                            raw,
                            &world,
                            light,
                            &self.config,
                        )
                    });
                match built {
                    Some(polygon) => self.polygons.push(polygon),
                    None => {
                        tracing::debug!(region = raw.region_id, "outline rejected during refinement");
                        stats.num_rejected += 1;
                    }
                }
            }
        }
        stats.refinement_ms = start_refine.elapsed().as_secs_f64() * 1000.0;

        // 5. Registration
        {
            let _span = tracing::info_span!("registration").entered();
            for polygon in &self.polygons {
                registry.register(AreaLight::Secondary(polygon));
                registry.update(AreaLight::Secondary(polygon));
            }
        }
        stats.registered = self.polygons.len();
        stats.updated = self.polygons.len();
        stats.num_polygons = self.polygons.len();
        stats.total_ms = start_total.elapsed().as_secs_f64() * 1000.0;

        tracing::debug!(
            regions = stats.num_regions,
            polygons = stats.num_polygons,
            rejected = stats.num_rejected,
            total_ms = stats.total_ms,
            "irradiance transfer rebuilt"
        );
        stats
    }

    /// Unregister every light and forget the cache. Returns the number of
    /// lights released.
    pub fn release<R: AreaLightRegistry + ?Sized>(&mut self, registry: &mut R) -> usize {
        self.fingerprint = None;
        self.unregister_all(registry)
    }

    fn unregister_all<R: AreaLightRegistry + ?Sized>(&mut self, registry: &mut R) -> usize {
        let count = self.polygons.len();
        for polygon in self.polygons.drain(..) {
            registry.unregister(AreaLight::Secondary(&polygon));
        }
        count
    }
}

impl Default for IrradianceTransfer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IrradianceTransfer {
    fn drop(&mut self) {
        if !self.polygons.is_empty() {
            tracing::warn!(
                count = self.polygons.len(),
                "irradiance transfer dropped while lights are still registered"
            );
        }
    }
}
