//! Area-light records and the seam to the external batching registry.
//!
//! A [`PrimaryAreaLight`] is the emitter the offscreen pass is rendered for.
//! Every lit region that survives refinement becomes an
//! [`IrradiancePolygon`], a secondary area light carrying the averaged
//! photometry of its pixels.

use crate::camera::{OffscreenCamera, Plane};
use crate::config::TransferConfig;
use crate::contour::Point;
use nalgebra::{Matrix4, Point3, Vector3};

/// Distance secondary-light vertices are pushed off their surface, so the
/// new light does not self-intersect the geometry it sits on.
pub const SURFACE_OFFSET: f64 = 0.001;

/// Which side of a polygon emits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProjectionMode {
    /// Emit along the polygon normal only.
    #[default]
    FrontFace,
    /// Emit against the polygon normal only.
    BackFace,
    /// Emit on both sides.
    TwoSided,
}

/// The primary emitter whose bounce light is being extracted.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimaryAreaLight {
    /// Object-to-world transform of the light.
    pub local_to_world: Matrix4<f64>,
    /// Emitting direction in the light's local space.
    pub polygon_normal: Vector3<f64>,
    /// Linear RGB colour.
    pub color: [f64; 3],
    /// Scalar intensity.
    pub intensity: f64,
    /// Emission side, inherited by every secondary light.
    pub projection_mode: ProjectionMode,
}

impl PrimaryAreaLight {
    /// White light of unit intensity.
    #[must_use]
    pub fn new(local_to_world: Matrix4<f64>, polygon_normal: Vector3<f64>) -> Self {
        Self {
            local_to_world,
            polygon_normal,
            color: [1.0; 3],
            intensity: 1.0,
            projection_mode: ProjectionMode::default(),
        }
    }

    /// Set the colour.
    #[must_use]
    pub fn with_color(mut self, color: [f64; 3]) -> Self {
        self.color = color;
        self
    }

    /// Set the intensity.
    #[must_use]
    pub fn with_intensity(mut self, intensity: f64) -> Self {
        self.intensity = intensity;
        self
    }

    /// Set the projection mode.
    #[must_use]
    pub fn with_projection_mode(mut self, mode: ProjectionMode) -> Self {
        self.projection_mode = mode;
        self
    }

    /// World-space position of the light's local origin.
    #[must_use]
    pub fn origin(&self) -> Vector3<f64> {
        self.local_to_world.transform_point(&Point3::origin()).coords
    }

    /// Transform of the local point `(1, 1, 1)`; moves with any change of
    /// translation, rotation or scale.
    #[must_use]
    pub fn fingerprint_sample(&self) -> Vector3<f64> {
        self.local_to_world
            .transform_point(&Point3::new(1.0, 1.0, 1.0))
            .coords
    }

    /// Emitting direction in world space, `None` if it degenerates.
    #[must_use]
    pub fn world_normal(&self) -> Option<Vector3<f64>> {
        self.local_to_world
            .transform_vector(&self.polygon_normal)
            .try_normalize(1e-12)
    }

    /// The offscreen camera for this light: at its origin, looking along its
    /// normal, rolled to keep the local Y axis up.
    #[must_use]
    pub fn offscreen_camera(&self, fov_deg: f64) -> Option<OffscreenCamera> {
        let up_hint = self.local_to_world.transform_vector(&Vector3::y());
        OffscreenCamera::looking_along(self.origin(), self.world_normal()?, up_hint, fov_deg)
    }
}

/// Bounding sphere of a polygon, centred on its vertex mean.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Circumcircle {
    /// Centre (the polygon centroid).
    pub center: Vector3<f64>,
    /// Largest vertex distance from the centre.
    pub radius: f64,
}

/// A traced region before refinement and photometry.
#[derive(Clone, Debug)]
pub struct RawPolygon {
    /// Dense region id in the label map.
    pub region_id: u32,
    /// Outer loop in pixel space, first vertex repeated at the end.
    pub outline: Vec<Point>,
    /// Number of pixels in the region.
    pub pixel_count: u32,
    /// Sum of decoded illumination over the region.
    pub illumination_sum: f64,
    /// Per-channel sum of 8-bit albedo over the region.
    pub color_sums: [u64; 3],
    /// Surface the region lies on.
    pub plane: Plane,
}

impl RawPolygon {
    /// Lift a pixel-space ring onto this polygon's plane through `camera`.
    ///
    /// `None` if any vertex misses the plane.
    #[must_use]
    pub fn lift(
        &self,
        ring: &[Point],
        camera: &OffscreenCamera,
        width: usize,
        height: usize,
    ) -> Option<Vec<Vector3<f64>>> {
        ring.iter()
            .map(|&p| camera.unproject(p, width, height, &self.plane))
            .collect()
    }

    /// Mean 8-bit albedo mapped to `[0, 1]` per channel.
    #[must_use]
    pub fn average_albedo(&self) -> [f64; 3] {
        let count = f64::from(self.pixel_count.max(1));
        self.color_sums
            .map(|sum| (sum as f64 / count / 255.0).clamp(0.0, 1.0))
    }
}

/// A secondary area light extracted from one lit region.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IrradiancePolygon {
    /// Position within the owning transfer's current set of lights.
    pub index: usize,
    /// Rebuild counter of the owning transfer when this light was created.
    pub generation: u64,
    /// World-space vertices, already offset off the surface.
    pub vertices: Vec<Vector3<f64>>,
    /// Linear RGB colour: parent colour times average albedo.
    pub color: [f64; 3],
    /// Average illumination times the configured multiplier.
    pub intensity: f64,
    /// Shadow bias.
    pub bias: f64,
    /// Unit surface normal.
    pub normal: Vector3<f64>,
    /// Emission side, copied from the parent light.
    pub projection_mode: ProjectionMode,
    /// Vertex mean.
    pub centroid: Vector3<f64>,
    /// Bounding circle around the centroid.
    pub circumcircle: Circumcircle,
    /// Pixels the light was averaged over.
    pub pixel_count: u32,
}

impl IrradiancePolygon {
    /// Compute photometry and bounds for a lifted polygon.
    ///
    /// Returns `None` for a region without pixels or fewer than 3 vertices.
    #[must_use]
    pub fn build(
        index: usize,
        generation: u64,
        raw: &RawPolygon,
        world_vertices: &[Vector3<f64>],
        parent: &PrimaryAreaLight,
        config: &TransferConfig,
    ) -> Option<Self> {
        if raw.pixel_count == 0 || world_vertices.len() < 3 {
            return None;
        }
        let normal = raw.plane.normal;
        let vertices: Vec<Vector3<f64>> = world_vertices
            .iter()
            .map(|v| v + normal * SURFACE_OFFSET)
            .collect();

        let centroid = vertices.iter().sum::<Vector3<f64>>() / vertices.len() as f64;
        let radius = vertices
            .iter()
            .map(|v| (v - centroid).norm())
            .fold(0.0, f64::max);

        let albedo = raw.average_albedo();
        let color = [
            parent.color[0] * albedo[0],
            parent.color[1] * albedo[1],
            parent.color[2] * albedo[2],
        ];
        let intensity =
            raw.illumination_sum / f64::from(raw.pixel_count) * config.intensity_multiplier;

        Some(Self {
            index,
            generation,
            vertices,
            color,
            intensity,
            bias: config.bias,
            normal,
            projection_mode: parent.projection_mode,
            centroid,
            circumcircle: Circumcircle {
                center: centroid,
                radius,
            },
            pixel_count: raw.pixel_count,
        })
    }

    /// Registry key, unique over the lifetime of the owning transfer.
    #[must_use]
    pub fn key(&self) -> (u64, usize) {
        (self.generation, self.index)
    }
}

/// A light handed to the registry.
#[derive(Clone, Copy, Debug)]
pub enum AreaLight<'a> {
    /// An emitter placed by the host.
    Primary(&'a PrimaryAreaLight),
    /// A light extracted from bounce illumination.
    Secondary(&'a IrradiancePolygon),
}

/// External batching system that renders area lights.
///
/// Every `register` is eventually matched by exactly one `unregister` of the
/// same light; `update` may be called any number of times in between.
pub trait AreaLightRegistry {
    /// Start rendering a light.
    fn register(&mut self, light: AreaLight<'_>);
    /// Re-submit a registered light's current parameters.
    fn update(&mut self, light: AreaLight<'_>);
    /// Stop rendering a light.
    fn unregister(&mut self, light: AreaLight<'_>);
}
