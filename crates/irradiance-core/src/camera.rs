//! Offscreen camera placed at an area light, and the pixel ↔ world mapping
//! used to lift traced outlines back onto the lit surface.

use crate::contour::Point;
use nalgebra::Vector3;

/// Near clip distance of the offscreen camera.
pub const NEAR_PLANE: f64 = 0.1;
/// Far clip distance of the offscreen camera.
pub const FAR_PLANE: f64 = 50.0;

/// A plane through `origin` with unit `normal`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Plane {
    /// Any point on the plane.
    pub origin: Vector3<f64>,
    /// Unit normal.
    pub normal: Vector3<f64>,
}

impl Plane {
    /// Build a plane, normalizing `normal`. Returns `None` for a zero normal.
    #[must_use]
    pub fn new(origin: Vector3<f64>, normal: Vector3<f64>) -> Option<Self> {
        let normal = normal.try_normalize(1e-12)?;
        Some(Self { origin, normal })
    }

    /// Signed distance of `point` above the plane.
    #[must_use]
    pub fn distance(&self, point: &Vector3<f64>) -> f64 {
        (point - self.origin).dot(&self.normal)
    }
}

/// Pinhole camera with a square image and a vertical field of view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffscreenCamera {
    /// Centre of projection.
    pub position: Vector3<f64>,
    /// Unit viewing direction.
    pub forward: Vector3<f64>,
    /// Unit image-right direction.
    pub right: Vector3<f64>,
    /// Unit image-up direction.
    pub up: Vector3<f64>,
    /// Vertical field of view in degrees.
    pub fov_deg: f64,
}

impl OffscreenCamera {
    /// Camera at `position` looking along `forward`, rolled so that `up_hint`
    /// points up in the image as far as possible.
    ///
    /// Falls back to the world axes when `up_hint` is parallel to `forward`.
    /// Returns `None` if `forward` is zero.
    #[must_use]
    pub fn looking_along(
        position: Vector3<f64>,
        forward: Vector3<f64>,
        up_hint: Vector3<f64>,
        fov_deg: f64,
    ) -> Option<Self> {
        let forward = forward.try_normalize(1e-12)?;
        let right = [up_hint, Vector3::y(), Vector3::z()]
            .iter()
            .find_map(|hint| forward.cross(hint).try_normalize(1e-6))?;
        let up = right.cross(&forward);
        Some(Self {
            position,
            forward,
            right,
            up,
            fov_deg,
        })
    }

    #[inline]
    fn tan_half_fov(&self) -> f64 {
        (self.fov_deg.to_radians() * 0.5).tan()
    }

    /// Unit direction of the primary ray through a pixel-space point of a
    /// `width × height` image. Pixel `(x, y)` has its centre at `(x, y)`.
    #[must_use]
    pub fn ray_direction(&self, pixel: Point, width: usize, height: usize) -> Vector3<f64> {
        let t = self.tan_half_fov();
        let sx = ((pixel.x + 0.5) / width as f64) * 2.0 - 1.0;
        let sy = 1.0 - ((pixel.y + 0.5) / height as f64) * 2.0;
        (self.forward + self.right * (sx * t) + self.up * (sy * t)).normalize()
    }

    /// Point where the primary ray through `pixel` meets `plane`.
    ///
    /// `None` when the ray is parallel to the plane or the hit lies behind
    /// the camera.
    #[must_use]
    pub fn unproject(
        &self,
        pixel: Point,
        width: usize,
        height: usize,
        plane: &Plane,
    ) -> Option<Vector3<f64>> {
        let dir = self.ray_direction(pixel, width, height);
        intersect_plane(&self.position, &dir, plane)
    }

    /// Pixel-space position of a world point, or `None` behind the camera.
    #[must_use]
    pub fn project(&self, world: &Vector3<f64>, width: usize, height: usize) -> Option<Point> {
        let rel = world - self.position;
        let z = rel.dot(&self.forward);
        if z <= 0.0 {
            return None;
        }
        let t = self.tan_half_fov();
        let sx = rel.dot(&self.right) / (z * t);
        let sy = rel.dot(&self.up) / (z * t);
        Some(Point::new(
            (sx + 1.0) * 0.5 * width as f64 - 0.5,
            (1.0 - sy) * 0.5 * height as f64 - 0.5,
        ))
    }

    /// View depth of a world point mapped to `[0, 1]` between the clip
    /// planes, or `None` outside them.
    #[must_use]
    pub fn linear_depth(&self, world: &Vector3<f64>) -> Option<f64> {
        let z = (world - self.position).dot(&self.forward);
        if !(NEAR_PLANE..=FAR_PLANE).contains(&z) {
            return None;
        }
        Some((z - NEAR_PLANE) / (FAR_PLANE - NEAR_PLANE))
    }
}

/// Ray/plane intersection. `dir` need not be normalized.
#[must_use]
pub fn intersect_plane(
    origin: &Vector3<f64>,
    dir: &Vector3<f64>,
    plane: &Plane,
) -> Option<Vector3<f64>> {
    let denom = dir.dot(&plane.normal);
    if denom.abs() < 1e-9 {
        return None;
    }
    let t = (plane.origin - origin).dot(&plane.normal) / denom;
    if t <= 0.0 {
        return None;
    }
    Some(origin + dir * t)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn down_camera(fov: f64) -> OffscreenCamera {
        OffscreenCamera::looking_along(
            Vector3::new(0.0, 0.0, 2.0),
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::y(),
            fov,
        )
        .unwrap()
    }

    #[test]
    fn test_basis_is_orthonormal() {
        let cam = down_camera(120.0);
        assert!((cam.right - Vector3::x()).norm() < 1e-12);
        assert!((cam.up - Vector3::y()).norm() < 1e-12);
        assert!(cam.right.dot(&cam.forward).abs() < 1e-12);
    }

    #[test]
    fn test_parallel_up_hint_falls_back() {
        let cam = OffscreenCamera::looking_along(
            Vector3::zeros(),
            Vector3::y(),
            Vector3::y() * 3.0,
            90.0,
        )
        .unwrap();
        assert!(cam.right.norm() > 0.99);
        assert!(cam.up.dot(&cam.forward).abs() < 1e-12);
        assert!(
            OffscreenCamera::looking_along(Vector3::zeros(), Vector3::zeros(), Vector3::y(), 90.0)
                .is_none()
        );
    }

    #[test]
    fn test_centre_ray_hits_below_camera() {
        let cam = down_camera(90.0);
        let floor = Plane::new(Vector3::zeros(), Vector3::z()).unwrap();
        // The image centre of a 32×32 map sits between pixels 15 and 16.
        let hit = cam.unproject(Point::new(15.5, 15.5), 32, 32, &floor).unwrap();
        assert!(hit.xy().norm() < 1e-12);
        assert!(hit.z.abs() < 1e-12);
    }

    #[test]
    fn test_image_orientation() {
        let cam = down_camera(90.0);
        let floor = Plane::new(Vector3::zeros(), Vector3::z()).unwrap();
        let top_left = cam.unproject(Point::new(0.0, 0.0), 16, 16, &floor).unwrap();
        assert!(top_left.x < 0.0);
        assert!(top_left.y > 0.0);
    }

    #[test]
    fn test_rejects_parallel_and_behind() {
        let cam = down_camera(90.0);
        let wall = Plane::new(Vector3::new(0.0, 0.0, 5.0), Vector3::z()).unwrap();
        assert!(cam.unproject(Point::new(8.0, 8.0), 16, 16, &wall).is_none());
        let parallel = Plane::new(Vector3::zeros(), Vector3::x()).unwrap();
        assert!(intersect_plane(&cam.position, &Vector3::y(), &parallel).is_none());
        assert!(Plane::new(Vector3::zeros(), Vector3::zeros()).is_none());
    }

    #[test]
    fn test_linear_depth_range() {
        let cam = down_camera(90.0);
        let near = cam.linear_depth(&Vector3::new(0.0, 0.0, 1.5)).unwrap();
        assert!((near - (0.5 - NEAR_PLANE) / (FAR_PLANE - NEAR_PLANE)).abs() < 1e-12);
        let d = cam.linear_depth(&Vector3::zeros()).unwrap();
        assert!((d - (2.0 - NEAR_PLANE) / (FAR_PLANE - NEAR_PLANE)).abs() < 1e-12);
        assert!(cam.linear_depth(&Vector3::new(0.0, 0.0, 3.0)).is_none());
    }

    proptest! {
        #[test]
        fn prop_project_inverts_unproject(
            x in 0.0..31.0f64,
            y in 0.0..31.0f64,
            fov in 90.0..165.0f64,
        ) {
            let cam = down_camera(fov);
            let floor = Plane::new(Vector3::zeros(), Vector3::z()).unwrap();
            let hit = cam.unproject(Point::new(x, y), 32, 32, &floor).unwrap();
            let back = cam.project(&hit, 32, 32).unwrap();
            prop_assert!((back.x - x).abs() < 1e-6);
            prop_assert!((back.y - y).abs() < 1e-6);
        }
    }
}
