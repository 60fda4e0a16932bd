//! Chi-squared distribution utilities for Poisson rate confidence bounds.
//!
//! For a stationary Poisson process with rate λ, the sum `S` of `k`
//! inter-arrival times is `Gamma(k, λ)` distributed and `2λS ~ χ²(2k)`.
//! Quantiles of `χ²(2k)` therefore bound how long (or how short) `k`
//! intervals may plausibly last under an unchanged rate.
//!
//! The CDF is the regularized lower incomplete gamma function:
//! `F(x; ν) = P(ν/2, x/2)`. It is evaluated with a series expansion for
//! `x < a+1` and a continued fraction otherwise; the quantile inverts it by
//! bracketed bisection.

use super::stable::log_gamma;

// Constants for incomplete gamma computation
const GAMMAINC_MAX_ITERS: usize = 500;
const GAMMAINC_EPS: f64 = 1.0e-14;
const GAMMAINC_FPMIN: f64 = 1.0e-300;

// Quantile search
const QUANTILE_MAX_ITERS: usize = 400;
const QUANTILE_REL_TOL: f64 = 1.0e-12;

/// Regularized lower incomplete gamma function P(a, x).
///
/// P(a, x) = γ(a, x) / Γ(a) = ∫₀ˣ t^(a-1) e^(-t) dt / Γ(a)
pub fn gamma_p(a: f64, x: f64) -> f64 {
    if a.is_nan() || x.is_nan() || a <= 0.0 || x < 0.0 {
        return f64::NAN;
    }
    if x == 0.0 {
        return 0.0;
    }
    if x.is_infinite() {
        return 1.0;
    }

    if x < a + 1.0 {
        gammainc_series(a, x)
    } else {
        1.0 - gammainc_cf(a, x)
    }
}

/// Regularized upper incomplete gamma function Q(a, x) = 1 - P(a, x).
pub fn gamma_q(a: f64, x: f64) -> f64 {
    if a.is_nan() || x.is_nan() || a <= 0.0 || x < 0.0 {
        return f64::NAN;
    }
    if x == 0.0 {
        return 1.0;
    }
    if x.is_infinite() {
        return 0.0;
    }

    if x < a + 1.0 {
        1.0 - gammainc_series(a, x)
    } else {
        gammainc_cf(a, x)
    }
}

/// Series expansion for P(a, x) when x < a+1.
///
/// P(a, x) = e^(-x) * x^a * Σ_{n=0}^∞ x^n / Γ(a+n+1)
fn gammainc_series(a: f64, x: f64) -> f64 {
    let log_prefactor = a * x.ln() - x - log_gamma(a);

    let mut term = 1.0 / a;
    let mut sum = term;
    for n in 1..=GAMMAINC_MAX_ITERS {
        term *= x / (a + n as f64);
        sum += term;
        if term.abs() < GAMMAINC_EPS * sum.abs() {
            break;
        }
    }

    (log_prefactor.exp() * sum).clamp(0.0, 1.0)
}

/// Continued fraction for Q(a, x) when x >= a+1 (modified Lentz).
fn gammainc_cf(a: f64, x: f64) -> f64 {
    let log_prefactor = a * x.ln() - x - log_gamma(a);

    let mut b = x - a + 1.0;
    let mut c = 1.0 / GAMMAINC_FPMIN;
    let mut d = 1.0 / b;
    let mut h = d;

    for i in 1..=GAMMAINC_MAX_ITERS {
        let ai = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = ai * d + b;
        if d.abs() < GAMMAINC_FPMIN {
            d = GAMMAINC_FPMIN;
        }
        c = b + ai / c;
        if c.abs() < GAMMAINC_FPMIN {
            c = GAMMAINC_FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < GAMMAINC_EPS {
            break;
        }
    }

    (log_prefactor.exp() * h).clamp(0.0, 1.0)
}

/// CDF of the chi-squared distribution with `dof` degrees of freedom.
pub fn chi_squared_cdf(x: f64, dof: f64) -> f64 {
    if x.is_nan() || dof.is_nan() || dof <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 0.0;
    }
    gamma_p(dof / 2.0, x / 2.0)
}

/// Survival function `P(X > x)` of the chi-squared distribution.
pub fn chi_squared_survival(x: f64, dof: f64) -> f64 {
    if x.is_nan() || dof.is_nan() || dof <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 1.0;
    }
    gamma_q(dof / 2.0, x / 2.0)
}

/// Inverse CDF of the chi-squared distribution.
///
/// Returns `x` such that `chi_squared_cdf(x, dof) == prob`. Upper-half
/// probabilities are matched against the survival function so that tails
/// close to 1 keep their precision.
///
/// # Returns
/// * `NaN` for `prob` outside `[0, 1]` or `dof <= 0`
/// * `0` at `prob == 0`, `+∞` at `prob == 1`
pub fn chi_squared_quantile(prob: f64, dof: f64) -> f64 {
    if prob.is_nan() || dof.is_nan() || dof <= 0.0 || !(0.0..=1.0).contains(&prob) {
        return f64::NAN;
    }
    if prob == 0.0 {
        return 0.0;
    }
    if prob == 1.0 {
        return f64::INFINITY;
    }

    let upper_half = prob > 0.5;
    let target = if upper_half { 1.0 - prob } else { prob };
    // true while x is still left of the quantile
    let below = |x: f64| {
        if upper_half {
            chi_squared_survival(x, dof) > target
        } else {
            chi_squared_cdf(x, dof) < target
        }
    };

    let mut lo = 0.0_f64;
    let mut hi = dof.max(1.0);
    while below(hi) {
        lo = hi;
        hi *= 2.0;
        if !hi.is_finite() {
            return f64::NAN;
        }
    }

    for _ in 0..QUANTILE_MAX_ITERS {
        let mid = 0.5 * (lo + hi);
        if below(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= QUANTILE_REL_TOL * hi {
            break;
        }
    }

    0.5 * (lo + hi)
}
