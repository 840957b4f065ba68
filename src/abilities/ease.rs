//! Easing primitive shared by every progress-toward-threshold computation
//!
//! `ease_mult(t, d)` maps progress `t` against a determinate `d` onto a
//! saturating S-curve: 0 at no progress, 1 at the threshold, whole units
//! accumulating past it. Every "how accustomed", "how resistant", "how
//! attenuated" ratio in the engine routes through this one function so
//! progress never feels linear.

use std::f64::consts::PI;

/// S-curve easing of `t` against the determinate value `d`.
///
/// Within `[0, d]` this is the half-cosine smoothstep; beyond `d` each full
/// multiple of `d` adds a whole unit and the remainder is eased again. When
/// `t` and `d` differ in sign the result is negated, preserving direction
/// for signed comparisons.
pub fn ease_mult(t: f64, d: f64) -> f64 {
    if d == 0.0 {
        return 0.0;
    }
    let negative = (d < 0.0 && t > 0.0) || (t < 0.0 && d > 0.0);
    let mut t = t;
    let mut whole = 0.0;
    if t > d && d > 0.0 {
        whole = (t / d).trunc();
        t %= d;
    }
    let eased = -0.5 * ((PI * t / d).cos() - 1.0) + whole;
    if negative {
        -eased
    } else {
        eased
    }
}

/// `ease_mult` with `t` clamped into `[0, d]` (or `[d, 0]` for negative `d`)
/// so the result never leaves the unit range.
pub fn ease_mult_cap(t: f64, d: f64) -> f64 {
    let t = if d >= 0.0 {
        t.clamp(0.0, d)
    } else {
        t.clamp(d, 0.0)
    };
    ease_mult(t, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ease_endpoints() {
        assert_eq!(ease_mult(0.0, 100.0), 0.0);
        assert!((ease_mult(100.0, 100.0) - 1.0).abs() < 1e-12);
        assert!((ease_mult(50.0, 100.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_ease_zero_determinate() {
        assert_eq!(ease_mult(5.0, 0.0), 0.0);
    }

    #[test]
    fn test_ease_accumulates_whole_units() {
        assert!((ease_mult(200.0, 100.0) - 2.0).abs() < 1e-12);
        assert!((ease_mult(250.0, 100.0) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_ease_sign_preserving() {
        let pos = ease_mult(30.0, 100.0);
        let neg = ease_mult(-30.0, 100.0);
        assert!((pos + neg).abs() < 1e-12);
        assert!(neg < 0.0);
    }

    #[test]
    fn test_cap_bounds() {
        assert_eq!(ease_mult_cap(500.0, 100.0), 1.0);
        assert_eq!(ease_mult_cap(-5.0, 100.0), 0.0);
    }

    #[test]
    fn test_smooth_not_linear() {
        // Early progress yields less than a linear ramp, late progress more.
        assert!(ease_mult(10.0, 100.0) < 0.1);
        assert!(ease_mult(90.0, 100.0) > 0.9);
    }

    proptest! {
        #[test]
        fn prop_cap_stays_in_unit_range(t in 0.0f64..1e9, d in 1e-6f64..1e9) {
            let v = ease_mult_cap(t, d);
            prop_assert!((0.0..=1.0).contains(&v));
        }

        #[test]
        fn prop_monotonic_non_decreasing(
            t in 0.0f64..1e6,
            step in 0.0f64..1e5,
            d in 1e-3f64..1e6,
        ) {
            prop_assert!(ease_mult(t + step, d) >= ease_mult(t, d) - 1e-9);
        }

        #[test]
        fn prop_threshold_is_unity(d in 1e-3f64..1e9) {
            prop_assert!((ease_mult(d, d) - 1.0).abs() < 1e-9);
        }
    }
}
