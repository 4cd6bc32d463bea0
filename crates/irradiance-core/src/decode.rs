//! Packed RGBA8 scalar codec.
//!
//! Depth and illumination passes write a single scalar spread across the four
//! 8-bit channels of a pixel. The channels are base-256 digits of a fraction,
//! most significant first.
//!
//! Backends must pack with [`encode_rgba`] (or the same base-256 layout in a
//! shader). The common base-255 `EncodeFloatRGBA` shader packing is not
//! compatible: its digits decode here with an error of about `1 / 512`.

/// Scale the illumination pass applies before packing, so that values up to
/// `1 / ILLUMINATION_BUFFER_SCALE` survive the `[0, 1)` encoding.
pub const ILLUMINATION_BUFFER_SCALE: f64 = 0.125;

const DIGIT: f64 = 256.0;
const R_WEIGHT: f64 = 1.0 / DIGIT;
const G_WEIGHT: f64 = R_WEIGHT / DIGIT;
const B_WEIGHT: f64 = G_WEIGHT / DIGIT;
const A_WEIGHT: f64 = B_WEIGHT / DIGIT;

/// Decode a packed sample into a scalar in `[0, 1)`.
///
/// Defined for every input. The result is strictly monotonic in each channel
/// when the others are held fixed.
#[inline]
#[must_use]
pub fn decode_rgba(sample: [u8; 4]) -> f64 {
    f64::from(sample[0]) * R_WEIGHT
        + f64::from(sample[1]) * G_WEIGHT
        + f64::from(sample[2]) * B_WEIGHT
        + f64::from(sample[3]) * A_WEIGHT
}

/// Pack a scalar into four base-256 digits.
///
/// Inverse of [`decode_rgba`] up to the 32-bit quantization step. Values
/// outside `[0, 1)` saturate to the smallest or largest code.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn encode_rgba(value: f64) -> [u8; 4] {
    if !(value > 0.0) {
        return [0; 4];
    }
    let max = f64::from(u32::MAX);
    let fixed = (value * (max + 1.0)).floor().min(max) as u32;
    fixed.to_be_bytes()
}

/// Decode an illumination sample back into light units.
#[inline]
#[must_use]
pub fn decode_illumination(sample: [u8; 4]) -> f64 {
    decode_rgba(sample) / ILLUMINATION_BUFFER_SCALE
}

/// Pack an illumination value the way the illumination pass does.
#[must_use]
pub fn encode_illumination(illumination: f64) -> [u8; 4] {
    encode_rgba(illumination * ILLUMINATION_BUFFER_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_extremes() {
        assert_eq!(decode_rgba([0, 0, 0, 0]), 0.0);
        let top = decode_rgba([255, 255, 255, 255]);
        assert!(top < 1.0);
        assert!(top > 0.999_999);
    }

    #[test]
    fn test_channel_weights() {
        assert!((decode_rgba([128, 0, 0, 0]) - 0.5).abs() < 1e-12);
        assert!((decode_rgba([0, 1, 0, 0]) - 1.0 / 65536.0).abs() < 1e-15);
        // The last digit still contributes.
        assert!(decode_rgba([0, 0, 0, 1]) > 0.0);
    }

    #[test]
    fn test_encode_saturates() {
        assert_eq!(encode_rgba(-3.0), [0, 0, 0, 0]);
        assert_eq!(encode_rgba(f64::NAN), [0, 0, 0, 0]);
        assert_eq!(encode_rgba(1.0), [255, 255, 255, 255]);
        assert_eq!(encode_rgba(42.0), [255, 255, 255, 255]);
    }

    #[test]
    fn test_base_255_packing_decodes_off() {
        assert_eq!(encode_rgba(0.5), [128, 0, 0, 0]);
        // 0.5 packed as base-255 digits.
        let base_255 = [127, 127, 127, 128];
        assert!((decode_rgba(base_255) - 0.5).abs() > 1e-3);
    }

    #[test]
    fn test_illumination_scale() {
        let packed = encode_illumination(2.0);
        assert!((decode_illumination(packed) - 2.0).abs() < 1e-6);
        // Anything at or above 8.0 saturates.
        assert!(decode_illumination(encode_illumination(100.0)) < 8.0);
    }

    proptest! {
        #[test]
        fn prop_decode_in_unit_range(sample in any::<[u8; 4]>()) {
            let v = decode_rgba(sample);
            prop_assert!(v >= 0.0);
            prop_assert!(v < 1.0);
        }

        #[test]
        fn prop_decode_monotonic_in_first_channel(r in 0u8..255, rest in any::<[u8; 3]>()) {
            let lo = decode_rgba([r, rest[0], rest[1], rest[2]]);
            let hi = decode_rgba([r + 1, rest[0], rest[1], rest[2]]);
            prop_assert!(hi > lo);
        }

        #[test]
        fn prop_encode_inverts_decode(sample in any::<[u8; 4]>()) {
            prop_assert_eq!(encode_rgba(decode_rgba(sample)), sample);
        }
    }
}
