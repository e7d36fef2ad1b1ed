//! Precision policies.
//!
//! Deterministic helpers for turning coordinates into keys:
//! - canonicalisation (`-0.0` and NaN payloads collapse to one value)
//! - fixed-decimal rounding for display ids
//! - integer quantisation for hash keys

/// Canonicalize a floating-point value for deterministic keys and output.
///
/// Rules:
/// - `-0.0` becomes `0.0`
/// - all NaNs become a single canonical NaN
pub fn canonical_f64(v: f64) -> f64 {
    if v == 0.0 {
        // Handles +0.0 and -0.0.
        0.0
    } else if v.is_nan() {
        f64::NAN
    } else {
        v
    }
}

#[inline]
fn scale(decimals: u32) -> f64 {
    10f64.powi(decimals as i32)
}

/// Round `v` to `decimals` places, half away from zero.
///
/// The result is canonicalised so that tiny negative values never round to
/// `-0.0` (which would print as `-0.0000`).
pub fn round_to_decimals(v: f64, decimals: u32) -> f64 {
    let s = scale(decimals);
    canonical_f64((v * s).round() / s)
}

/// Quantise `v` to an integer grid of `10^-decimals`.
///
/// Two values quantise equal iff they round to the same `decimals`-place
/// value. Non-finite input, and input beyond `i64::MAX / 10^decimals`,
/// saturates (`as` casts); callers validate first. Coordinates admitted by
/// [`crate::LonLat::try_new`] are always in range.
pub fn quantize(v: f64, decimals: u32) -> i64 {
    (v * scale(decimals)).round() as i64
}

/// Format `v` with exactly `decimals` places after rounding.
pub fn format_fixed(v: f64, decimals: u32) -> String {
    format!("{:.*}", decimals as usize, round_to_decimals(v, decimals))
}

#[cfg(test)]
mod tests {
    use super::{canonical_f64, format_fixed, quantize, round_to_decimals};

    #[test]
    fn canonicalizes_negative_zero() {
        assert_eq!(canonical_f64(-0.0), 0.0);
        assert_eq!(canonical_f64(0.0), 0.0);
        assert!(canonical_f64(-0.0).is_sign_positive());
    }

    #[test]
    fn rounding_matches_quantisation() {
        assert_eq!(round_to_decimals(10.123_456, 4), 10.1235);
        assert_eq!(round_to_decimals(10.123_456, 2), 10.12);
        assert_eq!(quantize(10.123_456, 4), 101_235);
        assert_eq!(quantize(-2.005_01, 2), -201);
        assert_eq!(quantize(30.00001, 4), quantize(30.0, 4));
        assert_ne!(quantize(30.0001, 4), quantize(30.0, 4));
    }

    #[test]
    fn fixed_format_never_prints_negative_zero() {
        assert_eq!(format_fixed(-0.00001, 4), "0.0000");
        assert_eq!(format_fixed(2.5, 2), "2.50");
        assert_eq!(format_fixed(-73.98766, 4), "-73.9877");
    }
}
