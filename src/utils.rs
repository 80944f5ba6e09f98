//! Helper functions shared by the protocol and the control loop.

use crate::kinematic_traits::CartesianVector;

/// Formats a number the way the G-code dialect reports it: two decimals,
/// no padding.
pub fn format_double(value: f64) -> String {
    format!("{:.2}", value)
}

/// Caps the length of the vector at `max_len`, preserving direction. The
/// vector is never scaled up: if it is already shorter than `max_len` it is
/// left as is, so an arm close to its target does not overshoot and
/// oscillate.
pub fn scale_vector_to_magnitude(vector: &mut CartesianVector, max_len: f64) {
    let len = vector.norm();
    let max_len = if max_len > len { len } else { max_len };

    // catch len == 0
    let scale = if len == 0.0 { 0.0 } else { max_len / len };
    *vector *= scale;
}

/// Sum of the absolute values of all components. Used as the "are we there
/// yet" measure of the remaining Cartesian distance.
pub fn sum_of_components(vector: &CartesianVector) -> f64 {
    vector.iter().map(|v| v.abs()).sum()
}

/// Checks that all values are finite (neither NaN nor infinite).
pub fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_double() {
        assert_eq!(format_double(10.0), "10.00");
        assert_eq!(format_double(-5.0), "-5.00");
        assert_eq!(format_double(0.125), "0.12");
        assert_eq!(format_double(1.999), "2.00");
    }

    #[test]
    fn test_scale_vector_under_max_is_unchanged() {
        let mut v = CartesianVector::new(3.0, 4.0, 0.0, 0.0, 0.0, 0.0);
        scale_vector_to_magnitude(&mut v, 10.0);
        assert!((v[0] - 3.0).abs() < 1e-12);
        assert!((v[1] - 4.0).abs() < 1e-12);
        assert!((v.norm() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_scale_vector_over_max_is_capped() {
        let mut v = CartesianVector::new(3.0, 4.0, 0.0, 0.0, 0.0, 0.0);
        scale_vector_to_magnitude(&mut v, 2.0);
        assert!((v[0] - 1.2).abs() < 1e-12);
        assert!((v[1] - 1.6).abs() < 1e-12);
        assert!((v.norm() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_scale_zero_vector_stays_zero() {
        let mut v = CartesianVector::zeros();
        scale_vector_to_magnitude(&mut v, 2.0);
        assert_eq!(v, CartesianVector::zeros());
    }

    #[test]
    fn test_sum_of_components() {
        let v = CartesianVector::new(1.0, -2.0, 3.0, -4.0, 0.0, 0.5);
        assert!((sum_of_components(&v) - 10.5).abs() < 1e-12);
    }

    #[test]
    fn test_all_finite() {
        assert!(all_finite(&[0.0, 1.0, -1.0]));
        assert!(!all_finite(&[0.0, f64::NAN]));
        assert!(!all_finite(&[f64::INFINITY]));
    }
}
