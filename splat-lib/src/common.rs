/// Zeroth-order spherical harmonic basis constant.
pub const SH_C0: f32 = 0.282_094_791_773_878_14_f64 as f32;

#[inline]
pub(crate) fn clamp_u8(x: f32) -> u8 {
    x.round().clamp(0.0, 255.0) as u8
}

#[inline]
pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Maps a unit quaternion component from [-1, 1] onto a byte.
#[inline]
pub(crate) fn quantize_unit(c: f32) -> u8 {
    clamp_u8(c * 128.0 + 128.0)
}

#[inline]
pub(crate) fn unquantize_unit(x: u8) -> f32 {
    x as f32 / 128.0 - 1.0
}

/// Maps a [0, 1] channel onto a byte.
#[inline]
pub(crate) fn quantize_channel(c: f32) -> u8 {
    clamp_u8(c * 255.0)
}

#[inline]
pub(crate) fn quat_norm(q: [f32; 4]) -> f32 {
    (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt()
}

/// Returns `None` when the quaternion has no usable direction: all zero,
/// or a NaN/infinite component.
#[inline]
pub(crate) fn normalize_quat(q: [f32; 4]) -> Option<[f32; 4]> {
    let norm = quat_norm(q);
    if norm > 0.0 && norm.is_finite() {
        return Some(q.map(|c| c / norm));
    }

    // The squared sum over- or underflowed; rescale by the largest component.
    let max = q.iter().fold(0.0f32, |m, c| m.max(c.abs()));
    if max == 0.0 || !max.is_finite() || q.iter().any(|c| c.is_nan()) {
        return None;
    }
    let q = q.map(|c| c / max);
    let norm = quat_norm(q);
    Some(q.map(|c| c / norm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_u8_saturates() {
        assert_eq!(clamp_u8(-3.0), 0);
        assert_eq!(clamp_u8(127.5), 128);
        assert_eq!(clamp_u8(256.0), 255);
        assert_eq!(clamp_u8(1e9), 255);
    }

    #[test]
    fn test_quantize_unit_endpoints() {
        assert_eq!(quantize_unit(1.0), 255);
        assert_eq!(quantize_unit(0.0), 128);
        assert_eq!(quantize_unit(-1.0), 0);
        assert_eq!(unquantize_unit(128), 0.0);
    }

    #[test]
    fn test_normalize_quat() {
        let q = normalize_quat([0.0, 3.0, 0.0, 4.0]).unwrap();
        assert_eq!(q, [0.0, 0.6, 0.0, 0.8]);
        assert!(normalize_quat([0.0; 4]).is_none());
        assert!(normalize_quat([f32::NAN, 0.0, 0.0, 1.0]).is_none());
        assert!(normalize_quat([f32::INFINITY, 0.0, 0.0, 1.0]).is_none());
    }

    #[test]
    fn test_normalize_quat_extreme_magnitudes() {
        let big = 2f32.powi(70);
        let q = normalize_quat([0.0, 3.0 * big, 0.0, 4.0 * big]).unwrap();
        assert_eq!(q, [0.0, 0.6, 0.0, 0.8]);
        assert_eq!(quantize_unit(q[1]), 205);

        let q = normalize_quat([1e-30, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(q, [1.0, 0.0, 0.0, 0.0]);
    }
}
