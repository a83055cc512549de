//! Math type aliases and the fixed-point / normalized-integer encodings used
//! by skinned vertex data.

pub use nalgebra;

/// 2D vector (f32).
pub type Vec2 = nalgebra::Vector2<f32>;

/// 3D vector (f32).
pub type Vec3 = nalgebra::Vector3<f32>;

/// 4D vector (f32).
pub type Vec4 = nalgebra::Vector4<f32>;

/// Scale applied to unit-range floats before they are accumulated as `i32`.
///
/// With unit vectors weighted by corner angles (at most pi), about 20 000
/// contributions fit in an `i32` before overflow.
pub const FIXED_POINT_SCALE: f32 = 32767.0;

/// Converts a float to the fixed-point accumulator representation.
#[inline]
pub fn to_fixed(value: f32) -> i32 {
    (value * FIXED_POINT_SCALE).round() as i32
}

/// Converts a fixed-point accumulator value back to a float.
#[inline]
pub fn from_fixed(value: i32) -> f32 {
    value as f32 / FIXED_POINT_SCALE
}

/// Encodes a value in `[-1, 1]` as 8-bit signed-normalized.
#[inline]
pub fn encode_snorm8(value: f32) -> i8 {
    (value.clamp(-1.0, 1.0) * 127.0).round() as i8
}

/// Decodes an 8-bit signed-normalized value.
#[inline]
pub fn decode_snorm8(value: i8) -> f32 {
    (value as f32 / 127.0).max(-1.0)
}

/// Encodes a value in `[-1, 1]` as 16-bit signed-normalized.
#[inline]
pub fn encode_snorm16(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

/// Decodes a 16-bit signed-normalized value.
#[inline]
pub fn decode_snorm16(value: i16) -> f32 {
    (value as f32 / 32767.0).max(-1.0)
}

/// Normalizes `v`, or returns `None` if its length is below `epsilon`.
#[inline]
pub fn try_normalize(v: Vec3, epsilon: f32) -> Option<Vec3> {
    v.try_normalize(epsilon)
}

/// Angle between two edge vectors in radians. Zero for degenerate edges.
pub fn corner_angle(a: Vec3, b: Vec3) -> f32 {
    let (Some(a), Some(b)) = (a.try_normalize(1e-12), b.try_normalize(1e-12)) else {
        return 0.0;
    };
    a.dot(&b).clamp(-1.0, 1.0).acos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_point_round_trip() {
        for value in [-1.0f32, -0.5, 0.0, 0.25, 1.0] {
            assert!((from_fixed(to_fixed(value)) - value).abs() < 1e-4);
        }
    }

    #[test]
    fn test_snorm_limits() {
        assert_eq!(encode_snorm8(1.0), 127);
        assert_eq!(encode_snorm8(-1.0), -127);
        assert_eq!(encode_snorm8(3.0), 127);
        assert_eq!(decode_snorm8(-128), -1.0);
        assert_eq!(encode_snorm16(1.0), 32767);
        assert_eq!(decode_snorm16(i16::MIN), -1.0);
    }

    #[test]
    fn test_corner_angle() {
        let right = corner_angle(Vec3::x(), Vec3::y());
        assert!((right - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert_eq!(corner_angle(Vec3::zeros(), Vec3::y()), 0.0);
    }
}
