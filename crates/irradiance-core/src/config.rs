//! Configuration types for the irradiance transfer.
//!
//! [`TransferConfig`] is fixed for the lifetime of an
//! [`IrradianceTransfer`](crate::IrradianceTransfer); only the camera field of
//! view may be changed between passes.

use std::fmt;
use std::str::FromStr;

// ============================================================================
// MapResolution: offscreen G-buffer size
// ============================================================================

/// Resolution of the offscreen G-buffer. Always square.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MapResolution {
    /// 16×16 pixels.
    R16,
    /// 32×32 pixels.
    #[default]
    R32,
    /// 64×64 pixels.
    R64,
    /// 96×96 pixels.
    R96,
    /// 128×128 pixels.
    R128,
    /// 192×192 pixels.
    R192,
    /// 256×256 pixels.
    R256,
}

/// Returned when a resolution token names none of the supported sizes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported irradiance map resolution `{token}`")]
pub struct ResolutionParseError {
    /// The rejected token.
    pub token: String,
}

impl MapResolution {
    /// Resolution used when a configured token cannot be parsed.
    pub const FALLBACK: Self = Self::R16;

    /// Returns all supported resolutions, smallest first.
    #[must_use]
    pub const fn all() -> &'static [MapResolution] {
        &[
            MapResolution::R16,
            MapResolution::R32,
            MapResolution::R64,
            MapResolution::R96,
            MapResolution::R128,
            MapResolution::R192,
            MapResolution::R256,
        ]
    }

    /// Edge length in pixels.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::R16 => 16,
            Self::R32 => 32,
            Self::R64 => 64,
            Self::R96 => 96,
            Self::R128 => 128,
            Self::R192 => 192,
            Self::R256 => 256,
        }
    }

    /// `(width, height)` in pixels.
    #[must_use]
    pub const fn dimensions(self) -> (usize, usize) {
        (self.size(), self.size())
    }

    /// Parse a token, logging and falling back to [`Self::FALLBACK`] on failure.
    #[must_use]
    pub fn parse_or_default(token: &str) -> Self {
        match token.parse() {
            Ok(resolution) => resolution,
            Err(err) => {
                tracing::error!(
                    %err,
                    fallback = %Self::FALLBACK,
                    "unable to parse buffer resolution"
                );
                Self::FALLBACK
            }
        }
    }
}

impl fmt::Display for MapResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{0}x{0}", self.size())
    }
}

impl FromStr for MapResolution {
    type Err = ResolutionParseError;

    /// Accepts `"32x32"`, `"_32x32"` or a bare `"32"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ResolutionParseError {
            token: s.to_string(),
        };
        let trimmed = s.trim().trim_matches('_');
        let mut parts = trimmed.split(['x', 'X']);
        let width: usize = parts
            .next()
            .and_then(|w| w.trim().parse().ok())
            .ok_or_else(err)?;
        let height: usize = match parts.next() {
            Some(h) => h.trim().parse().map_err(|_| err())?,
            None => width,
        };
        if parts.next().is_some() || width != height {
            return Err(err());
        }
        Self::all()
            .iter()
            .copied()
            .find(|r| r.size() == width)
            .ok_or_else(err)
    }
}

// ============================================================================
// TransferConfig: per-instance settings
// ============================================================================

/// Valid range of the offscreen camera's field of view, in degrees.
pub const CAMERA_FOV_RANGE: (f64, f64) = (90.0, 165.0);

/// Per-instance configuration of the bounce-light extraction.
///
/// # Example
/// ```
/// use irradiance_core::config::{MapResolution, TransferConfig};
///
/// let config = TransferConfig::builder()
///     .resolution(MapResolution::R64)
///     .bounce_threshold(0.25)
///     .build();
/// assert_eq!(config.resolution.size(), 64);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransferConfig {
    /// Offscreen G-buffer resolution (default: 32×32).
    pub resolution: MapResolution,
    /// Illumination a pixel must exceed to seed a secondary light (0..=2, default: 0.5).
    pub bounce_threshold: f64,
    /// Shadow bias copied onto every secondary light (0..=2, default: 0.0).
    pub bias: f64,
    /// Multiplier applied to the average illumination of a region (0..=5, default: 1.0).
    pub intensity_multiplier: f64,
    /// Vertical field of view of the offscreen camera in degrees (90..=165, default: 145).
    pub camera_fov_deg: f64,
    /// Regions with fewer pixels are discarded (default: 2).
    pub min_region_pixels: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            resolution: MapResolution::R32,
            bounce_threshold: 0.5,
            bias: 0.0,
            intensity_multiplier: 1.0,
            camera_fov_deg: 145.0,
            min_region_pixels: 2,
        }
    }
}

impl TransferConfig {
    /// Create a new builder for `TransferConfig`.
    #[must_use]
    pub fn builder() -> TransferConfigBuilder {
        TransferConfigBuilder::default()
    }

    /// Copy of this configuration with every field forced into its valid range.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            resolution: self.resolution,
            bounce_threshold: clamp_or(self.bounce_threshold, 0.0, 2.0, 0.5),
            bias: clamp_or(self.bias, 0.0, 2.0, 0.0),
            intensity_multiplier: clamp_or(self.intensity_multiplier, 0.0, 5.0, 1.0),
            camera_fov_deg: clamp_fov(self.camera_fov_deg),
            min_region_pixels: self.min_region_pixels.max(1),
        }
    }
}

/// Clamp a field of view into [`CAMERA_FOV_RANGE`].
#[must_use]
pub fn clamp_fov(fov_deg: f64) -> f64 {
    clamp_or(fov_deg, CAMERA_FOV_RANGE.0, CAMERA_FOV_RANGE.1, 145.0)
}

fn clamp_or(value: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(lo, hi)
    }
}

/// Builder for [`TransferConfig`].
#[derive(Default)]
pub struct TransferConfigBuilder {
    resolution: Option<MapResolution>,
    bounce_threshold: Option<f64>,
    bias: Option<f64>,
    intensity_multiplier: Option<f64>,
    camera_fov_deg: Option<f64>,
    min_region_pixels: Option<u32>,
}

impl TransferConfigBuilder {
    /// Set the G-buffer resolution.
    #[must_use]
    pub fn resolution(mut self, resolution: MapResolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Set the G-buffer resolution from a token such as `"64x64"`.
    /// Unparseable tokens are logged and replaced by [`MapResolution::FALLBACK`].
    #[must_use]
    pub fn resolution_token(mut self, token: &str) -> Self {
        self.resolution = Some(MapResolution::parse_or_default(token));
        self
    }

    /// Set the illumination threshold.
    #[must_use]
    pub fn bounce_threshold(mut self, threshold: f64) -> Self {
        self.bounce_threshold = Some(threshold);
        self
    }

    /// Set the bias copied onto secondary lights.
    #[must_use]
    pub fn bias(mut self, bias: f64) -> Self {
        self.bias = Some(bias);
        self
    }

    /// Set the intensity multiplier.
    #[must_use]
    pub fn intensity_multiplier(mut self, multiplier: f64) -> Self {
        self.intensity_multiplier = Some(multiplier);
        self
    }

    /// Set the offscreen camera field of view in degrees.
    #[must_use]
    pub fn camera_fov_deg(mut self, fov: f64) -> Self {
        self.camera_fov_deg = Some(fov);
        self
    }

    /// Set the minimum pixel count of a region.
    #[must_use]
    pub fn min_region_pixels(mut self, pixels: u32) -> Self {
        self.min_region_pixels = Some(pixels);
        self
    }

    /// Build the configuration, using defaults for unset fields and clamping
    /// every value into its valid range.
    #[must_use]
    pub fn build(self) -> TransferConfig {
        let d = TransferConfig::default();
        TransferConfig {
            resolution: self.resolution.unwrap_or(d.resolution),
            bounce_threshold: self.bounce_threshold.unwrap_or(d.bounce_threshold),
            bias: self.bias.unwrap_or(d.bias),
            intensity_multiplier: self
                .intensity_multiplier
                .unwrap_or(d.intensity_multiplier),
            camera_fov_deg: self.camera_fov_deg.unwrap_or(d.camera_fov_deg),
            min_region_pixels: self.min_region_pixels.unwrap_or(d.min_region_pixels),
        }
        .clamped()
    }
}
