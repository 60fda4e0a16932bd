//! Property-based tests for gc-math numerical functions.
//!
//! Uses proptest to verify distributional properties hold across many random inputs.

use gc_math::{chi_squared_cdf, chi_squared_quantile, chi_squared_survival, gamma_p, gamma_q};
use proptest::prelude::*;

/// Tolerance for floating point comparisons.
const TOL: f64 = 1e-9;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// CDF and survival partition the probability mass.
    #[test]
    fn cdf_plus_survival_is_one(x in 0.0..500.0f64, k in 1u32..150) {
        let dof = 2.0 * k as f64;
        let total = chi_squared_cdf(x, dof) + chi_squared_survival(x, dof);
        prop_assert!((total - 1.0).abs() < TOL, "cdf+sf at x={} dof={} = {}", x, dof, total);
    }

    /// The CDF never decreases in x.
    #[test]
    fn cdf_monotone(x in 0.0..300.0f64, dx in 0.0..50.0f64, k in 1u32..150) {
        let dof = 2.0 * k as f64;
        prop_assert!(chi_squared_cdf(x + dx, dof) + 1e-15 >= chi_squared_cdf(x, dof));
    }

    /// P and Q stay inside [0, 1].
    #[test]
    fn incomplete_gamma_in_unit_interval(a in 0.01..200.0f64, x in 0.0..400.0f64) {
        let p = gamma_p(a, x);
        let q = gamma_q(a, x);
        prop_assert!((0.0..=1.0).contains(&p), "P({}, {}) = {}", a, x, p);
        prop_assert!((0.0..=1.0).contains(&q), "Q({}, {}) = {}", a, x, q);
    }

    /// The quantile is the inverse of the CDF.
    #[test]
    fn quantile_round_trips(prob in 0.0005..0.9995f64, k in 1u32..150) {
        let dof = 2.0 * k as f64;
        let x = chi_squared_quantile(prob, dof);
        prop_assert!(x.is_finite() && x > 0.0);
        let back = chi_squared_cdf(x, dof);
        prop_assert!((back - prob).abs() < 1e-8, "cdf(q({}, {})) = {}", prob, dof, back);
    }

    /// Lower and upper tail quantiles bracket the degrees of freedom.
    #[test]
    fn tails_bracket_the_mean(k in 1u32..150) {
        let dof = 2.0 * k as f64;
        let lower = chi_squared_quantile(0.025, dof);
        let upper = chi_squared_quantile(0.975, dof);
        prop_assert!(lower < dof && dof < upper, "{} < {} < {}", lower, dof, upper);
    }
}
