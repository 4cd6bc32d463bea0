#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

use crate::camera::Plane;
use crate::contour::Point;
use crate::decode::{encode_illumination, encode_rgba};
use crate::image::GBuffer;
use crate::{RenderBackend, RenderRequest};
use nalgebra::Vector3;
use rand::Rng;

/// A backend that renders a single infinite plane.
///
/// Illumination is painted directly in pixel space, so tests can place lit
/// patches exactly on the label grid. Every pixel whose camera ray meets the
/// plane in front of the camera gets a surface; pixels cut out with
/// [`with_hole`](Self::with_hole) stay empty.
#[derive(Debug, Clone)]
pub struct PlaneScene {
    width: usize,
    height: usize,
    plane: Plane,
    albedo: [u8; 3],
    illumination: Vec<f64>,
    holes: Vec<bool>,
    renders: usize,
}

impl PlaneScene {
    /// The floor `z = 0`, unlit, with a light grey albedo.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            plane: Plane {
                origin: Vector3::zeros(),
                normal: Vector3::z(),
            },
            albedo: [200, 180, 160],
            illumination: vec![0.0; width * height],
            holes: vec![false; width * height],
            renders: 0,
        }
    }

    /// Replace the plane. Ignored if `normal` is zero.
    pub fn with_plane(mut self, origin: Vector3<f64>, normal: Vector3<f64>) -> Self {
        if let Some(plane) = Plane::new(origin, normal) {
            self.plane = plane;
        }
        self
    }

    /// Set the surface albedo.
    pub fn with_albedo(mut self, rgb: [u8; 3]) -> Self {
        self.albedo = rgb;
        self
    }

    /// Light the pixel rectangle `(x0, y0, w, h)` with `value`, clipped to
    /// the image.
    pub fn with_lit_rect(mut self, x0: usize, y0: usize, w: usize, h: usize, value: f64) -> Self {
        self.fill(x0, y0, w, h, |scene, idx| scene.illumination[idx] = value);
        self
    }

    /// Remove the surface under the pixel rectangle `(x0, y0, w, h)`.
    pub fn with_hole(mut self, x0: usize, y0: usize, w: usize, h: usize) -> Self {
        self.fill(x0, y0, w, h, |scene, idx| scene.holes[idx] = true);
        self
    }

    /// Light the pixels set in `mask` (row-major, same size as the scene).
    ///
    /// # Panics
    /// Panics if the mask has the wrong length.
    pub fn with_lit_mask(mut self, mask: &[u8], value: f64) -> Self {
        assert_eq!(mask.len(), self.illumination.len(), "mask has the wrong size");
        for (dst, &m) in self.illumination.iter_mut().zip(mask) {
            if m != 0 {
                *dst = value;
            }
        }
        self
    }

    /// Add uniform noise in `[-amplitude, amplitude)` to every pixel's
    /// illumination, clamped at zero.
    pub fn with_noise<R: Rng>(mut self, rng: &mut R, amplitude: f64) -> Self {
        if amplitude > 0.0 {
            for v in &mut self.illumination {
                *v = (*v + rng.gen_range(-amplitude..amplitude)).max(0.0);
            }
        }
        self
    }

    /// Number of times [`RenderBackend::render`] was called.
    pub fn render_count(&self) -> usize {
        self.renders
    }

    fn fill(&mut self, x0: usize, y0: usize, w: usize, h: usize, mut f: impl FnMut(&mut Self, usize)) {
        for y in y0..(y0 + h).min(self.height) {
            for x in x0..(x0 + w).min(self.width) {
                f(self, y * self.width + x);
            }
        }
    }
}

impl RenderBackend for PlaneScene {
    /// # Panics
    /// Panics if the request or the frame differs in size from the scene.
    fn render(&mut self, request: &RenderRequest<'_>, frame: &mut GBuffer) {
        let (width, height) = (self.width, self.height);
        assert_eq!(
            (request.width, request.height),
            (width, height),
            "request does not match the scene size"
        );
        assert_eq!(
            (frame.width(), frame.height()),
            (width, height),
            "frame does not match the scene size"
        );
        self.renders += 1;
        let n = self.plane.normal;
        let normal = [n.x as f32, n.y as f32, n.z as f32, 0.0];
        let albedo = [self.albedo[0], self.albedo[1], self.albedo[2], 255];

        for y in 0..height {
            for x in 0..width {
                let idx = y * width + x;
                if self.holes[idx] {
                    continue;
                }
                let pixel = Point::new(x as f64, y as f64);
                let Some(hit) = request
                    .camera
                    .unproject(pixel, request.width, request.height, &self.plane)
                else {
                    continue;
                };
                let Some(depth) = request.camera.linear_depth(&hit) else {
                    continue;
                };

                frame
                    .geometry
                    .set(x, y, [hit.x as f32, hit.y as f32, hit.z as f32, 1.0]);
                frame.normal.set(x, y, normal);
                frame.albedo.set(x, y, albedo);
                frame.depth.set(x, y, encode_rgba(depth));
                frame
                    .illumination
                    .set(x, y, encode_illumination(self.illumination[idx]));
            }
        }
    }
}
