//! Numeric coercions shared by the sandbox engine.

/// `ToInt32` of a double.
pub(crate) fn to_int32(value: f64) -> i32 {
    to_uint32(value) as i32
}

/// `ToUint32` of a double.
pub(crate) fn to_uint32(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    let truncated = value.trunc();
    truncated.rem_euclid(4_294_967_296.0) as u32
}

pub(crate) fn is_int32(value: f64) -> bool {
    value.fract() == 0.0 && value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX)
}

pub(crate) fn is_uint32(value: f64) -> bool {
    value.fract() == 0.0 && value >= 0.0 && value <= f64::from(u32::MAX)
}

/// Decimal form used when a number becomes a property key.
pub(crate) fn to_key(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int32_wraps() {
        assert_eq!(to_int32(1.9), 1);
        assert_eq!(to_int32(-1.9), -1);
        assert_eq!(to_int32(4_294_967_295.0), -1);
        assert_eq!(to_int32(2_147_483_648.0), i32::MIN);
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_int32(f64::INFINITY), 0);
    }

    #[test]
    fn uint32_wraps() {
        assert_eq!(to_uint32(-1.0), u32::MAX);
        assert_eq!(to_uint32(4_294_967_296.0), 0);
        assert_eq!(to_uint32(7.5), 7);
    }

    #[test]
    fn integral_ranges() {
        assert!(is_int32(-5.0));
        assert!(!is_int32(0.5));
        assert!(!is_int32(3_000_000_000.0));
        assert!(is_uint32(3_000_000_000.0));
        assert!(!is_uint32(-1.0));
    }

    #[test]
    fn key_form() {
        assert_eq!(to_key(3.0), "3");
        assert_eq!(to_key(0.5), "0.5");
    }
}
