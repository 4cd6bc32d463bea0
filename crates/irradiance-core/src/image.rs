//! Fixed-size pixel buffers for the offscreen G-buffer.

use crate::decode::{decode_illumination, decode_rgba};

/// Errors raised when wrapping caller-provided pixel data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// The sample count does not match `width * height`.
    #[error("buffer holds {len} samples, {width}x{height} requires {required}")]
    SizeMismatch {
        /// Number of samples provided.
        len: usize,
        /// Requested width.
        width: usize,
        /// Requested height.
        height: usize,
        /// `width * height`.
        required: usize,
    },
}

/// Integer pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PixelCoords {
    /// Column.
    pub x: i32,
    /// Row (top to bottom).
    pub y: i32,
}

impl PixelCoords {
    /// The origin.
    pub const ZERO: Self = Self { x: 0, y: 0 };

    /// Create new coordinates.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Inclusive integer rectangle. The empty rectangle has `min > max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBounds {
    /// Top-left corner (inclusive).
    pub min: PixelCoords,
    /// Bottom-right corner (inclusive).
    pub max: PixelCoords,
}

impl PixelBounds {
    /// Rectangle that contains nothing; any `include` replaces it.
    pub const EMPTY: Self = Self {
        min: PixelCoords::new(i32::MAX, i32::MAX),
        max: PixelCoords::new(i32::MIN, i32::MIN),
    };

    /// True when no pixel was ever included.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    /// Grow the rectangle to cover `(x, y)`.
    #[inline]
    pub fn include(&mut self, x: i32, y: i32) {
        self.min.x = self.min.x.min(x);
        self.min.y = self.min.y.min(y);
        self.max.x = self.max.x.max(x);
        self.max.y = self.max.y.max(y);
    }

    /// Grow the rectangle to cover another one.
    pub fn union(&mut self, other: &Self) {
        if !other.is_empty() {
            self.include(other.min.x, other.min.y);
            self.include(other.max.x, other.max.y);
        }
    }

    /// Width in pixels (0 when empty).
    #[must_use]
    pub fn width(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.max.x.abs_diff(self.min.x) + 1
        }
    }

    /// Height in pixels (0 when empty).
    #[must_use]
    pub fn height(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.max.y.abs_diff(self.min.y) + 1
        }
    }
}

impl Default for PixelBounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Row-major grid of samples, fixed in shape after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Buffer<T> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

/// Packed RGBA8 buffer (albedo, depth, illumination).
pub type PixelBuffer = Buffer<[u8; 4]>;

/// Four 32-bit floats per pixel (normal, geometry).
pub type FloatBuffer = Buffer<[f32; 4]>;

impl<T: Copy + Default> Buffer<T> {
    /// Allocate a buffer filled with the default sample.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![T::default(); width * height],
            width,
            height,
        }
    }

    /// Wrap existing samples after checking they match the dimensions.
    pub fn from_vec(data: Vec<T>, width: usize, height: usize) -> Result<Self, BufferError> {
        let required = width * height;
        if data.len() != required {
            return Err(BufferError::SizeMismatch {
                len: data.len(),
                width,
                height,
                required,
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Width in pixels.
    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    #[inline]
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// All samples, row-major.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable samples, row-major. The shape cannot change through this.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Safe accessor for a specific row.
    #[inline(always)]
    #[must_use]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "Row index {} out of bounds", y);
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    /// Safe accessor for a specific pixel.
    #[inline(always)]
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> T {
        assert!(x < self.width, "Column index {} out of bounds", x);
        self.row(y)[x]
    }

    /// Overwrite a single pixel.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        assert!(x < self.width && y < self.height, "Pixel ({}, {}) out of bounds", x, y);
        self.data[y * self.width + x] = value;
    }

    /// Reset every sample to the default value.
    pub fn clear(&mut self) {
        self.data.fill(T::default());
    }
}

impl PixelBuffer {
    /// Decode every sample into `out` (same length as the buffer).
    pub fn decode_into(&self, out: &mut [f64]) {
        assert_eq!(out.len(), self.data.len(), "decode target has the wrong length");
        for (dst, &src) in out.iter_mut().zip(&self.data) {
            *dst = decode_rgba(src);
        }
    }

    /// Decode every sample as illumination into `out`.
    pub fn decode_illumination_into(&self, out: &mut [f64]) {
        assert_eq!(out.len(), self.data.len(), "decode target has the wrong length");
        for (dst, &src) in out.iter_mut().zip(&self.data) {
            *dst = decode_illumination(src);
        }
    }
}

/// The frame a rendering backend produces for one evaluation pass.
///
/// All five buffers share one resolution. Depth and illumination are packed
/// scalars (see [`crate::decode`]); normals and geometry are world-space
/// vectors whose `w` channel is 1 where a surface was rasterized.
#[derive(Clone, Debug)]
pub struct GBuffer {
    /// Surface albedo, RGB in 0..=255.
    pub albedo: PixelBuffer,
    /// Linear depth between the camera near and far planes, packed.
    pub depth: PixelBuffer,
    /// World-space surface normal.
    pub normal: FloatBuffer,
    /// World-space surface position.
    pub geometry: FloatBuffer,
    /// Direct illumination received by each surface, packed.
    pub illumination: PixelBuffer,
}

impl GBuffer {
    /// Allocate an empty frame.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            albedo: PixelBuffer::new(width, height),
            depth: PixelBuffer::new(width, height),
            normal: FloatBuffer::new(width, height),
            geometry: FloatBuffer::new(width, height),
            illumination: PixelBuffer::new(width, height),
        }
    }

    /// Width shared by all buffers.
    #[must_use]
    pub fn width(&self) -> usize {
        self.illumination.width()
    }

    /// Height shared by all buffers.
    #[must_use]
    pub fn height(&self) -> usize {
        self.illumination.height()
    }

    /// Reset all buffers before the backend draws into them.
    pub fn clear(&mut self) {
        self.albedo.clear();
        self.depth.clear();
        self.normal.clear();
        self.geometry.clear();
        self.illumination.clear();
    }
}
