//! Chi-squared bound tables for the reset heuristics.
//!
//! Row `i` holds quantiles of `χ²(2(i+1))`, the distribution of `2λS` where
//! `S` is the sum of `i+1` exponential inter-arrival times at rate `λ`.
//! Dividing `2 * k * mean_interval` by a row value turns the current mean
//! into a confidence limit on the true mean interval:
//!
//! - `upper` rows are the small (lower-tail) quantiles, giving the *upper*
//!   limit of the mean interval. Used to detect a rate drop.
//! - `lower` rows are the large (upper-tail) quantiles, giving the *lower*
//!   limit. Used to detect a burst.

use gc_common::{Error, Result};
use gc_config::EstimatorConfig;
use gc_math::chi_squared_quantile;
use serde::Serialize;

/// Rows in the built-in tables.
pub const STANDARD_ROWS: usize = 100;

/// Two-sided confidence level of the built-in tables.
pub const STANDARD_CONFIDENCE: f64 = 0.95;

/// `χ²(2k)` quantiles at cumulative probability 0.025, k = 1..=100.
#[rustfmt::skip]
const STANDARD_UPPER: [f64; STANDARD_ROWS] = [
    0.0506356, 0.484419, 1.23734, 2.17973, 3.24697, 4.40379,
    5.62873, 6.90766, 8.23075, 9.59078, 10.9823, 12.4012,
    13.8439, 15.3079, 16.7908, 18.2908, 19.8063, 21.3359,
    22.8785, 24.433, 25.9987, 27.5746, 29.1601, 30.7545,
    32.3574, 33.9681, 35.5863, 37.2116, 38.8435, 40.4817,
    42.126, 43.776, 45.4314, 47.092, 48.7576, 50.4279,
    52.1028, 53.7821, 55.4656, 57.1532, 58.8446, 60.5398,
    62.2386, 63.9409, 65.6466, 67.3556, 69.0677, 70.7828,
    72.5009, 74.2219, 75.9457, 77.6722, 79.4013, 81.1329,
    82.8671, 84.6036, 86.3425, 88.0837, 89.8271, 91.5726,
    93.3203, 95.0701, 96.8219, 98.5756, 100.331, 102.089,
    103.848, 105.609, 107.372, 109.137, 110.903, 112.671,
    114.441, 116.212, 117.985, 119.759, 121.534, 123.312,
    125.09, 126.87, 128.651, 130.434, 132.218, 134.003,
    135.79, 137.578, 139.367, 141.157, 142.949, 144.741,
    146.535, 148.33, 150.126, 151.923, 153.721, 155.521,
    157.321, 159.122, 160.925, 162.728,
];

/// `χ²(2k)` quantiles at cumulative probability 0.975, k = 1..=100.
#[rustfmt::skip]
const STANDARD_LOWER: [f64; STANDARD_ROWS] = [
    7.37776, 11.1433, 14.4494, 17.5345, 20.4832, 23.3367,
    26.1189, 28.8454, 31.5264, 34.1696, 36.7807, 39.3641,
    41.9232, 44.4608, 46.9792, 49.4804, 51.966, 54.4373,
    56.8955, 59.3417, 61.7768, 64.2015, 66.6165, 69.0226,
    71.4202, 73.8099, 76.192, 78.5672, 80.9356, 83.2977,
    85.6537, 88.0041, 90.3489, 92.6885, 95.0232, 97.3531,
    99.6783, 101.999, 104.316, 106.629, 108.937, 111.242,
    113.544, 115.841, 118.136, 120.427, 122.715, 125.0,
    127.282, 129.561, 131.838, 134.111, 136.382, 138.651,
    140.917, 143.18, 145.441, 147.7, 149.957, 152.211,
    154.464, 156.714, 158.962, 161.209, 163.453, 165.696,
    167.936, 170.175, 172.412, 174.648, 176.882, 179.114,
    181.344, 183.573, 185.8, 188.026, 190.251, 192.474,
    194.695, 196.915, 199.134, 201.351, 203.567, 205.782,
    207.995, 210.208, 212.419, 214.628, 216.837, 219.044,
    221.251, 223.456, 225.66, 227.863, 230.064, 232.265,
    234.465, 236.664, 238.861, 241.058,
];

/// Immutable pair of bound tables indexed by event count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceBoundTable {
    confidence: f64,
    upper: Vec<f64>,
    lower: Vec<f64>,
}

impl ConfidenceBoundTable {
    /// The built-in 95% tables for up to 100 events.
    pub fn standard() -> Self {
        Self {
            confidence: STANDARD_CONFIDENCE,
            upper: STANDARD_UPPER.to_vec(),
            lower: STANDARD_LOWER.to_vec(),
        }
    }

    /// Compute tables for a two-sided `confidence` level with `rows` rows.
    pub fn from_confidence(confidence: f64, rows: usize) -> Result<Self> {
        if !confidence.is_finite() || confidence <= 0.0 || confidence >= 1.0 {
            return Err(Error::InvalidParameter {
                field: "table_confidence".to_string(),
                message: format!("must be in (0, 1), got {}", confidence),
            });
        }
        if rows == 0 {
            return Err(Error::InvalidParameter {
                field: "rows".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let lower_tail = (1.0 - confidence) / 2.0;
        let upper_tail = (1.0 + confidence) / 2.0;
        let mut upper = Vec::with_capacity(rows);
        let mut lower = Vec::with_capacity(rows);

        for k in 1..=rows {
            let dof = 2.0 * k as f64;
            upper.push(checked_quantile(lower_tail, dof)?);
            lower.push(checked_quantile(upper_tail, dof)?);
        }

        Ok(Self {
            confidence,
            upper,
            lower,
        })
    }

    /// Tables sized for an estimator.
    ///
    /// Uses the built-in tables when they cover the configuration and
    /// computes them otherwise.
    pub fn for_estimator(config: &EstimatorConfig) -> Result<Self> {
        let rows = config.ring_size;
        if config.table_confidence == STANDARD_CONFIDENCE && rows <= STANDARD_ROWS {
            return Ok(Self::standard());
        }
        tracing::debug!(
            confidence = config.table_confidence,
            rows,
            "computing chi-squared bound tables"
        );
        Self::from_confidence(config.table_confidence, rows.max(STANDARD_ROWS))
    }

    pub fn rows(&self) -> usize {
        self.upper.len()
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Small quantile for `event_count` events (divisor of the upper limit).
    ///
    /// # Panics
    /// Panics if `event_count` is 0 or exceeds [`rows`](Self::rows).
    pub fn upper(&self, event_count: usize) -> f64 {
        self.upper[self.row(event_count)]
    }

    /// Large quantile for `event_count` events (divisor of the lower limit).
    ///
    /// # Panics
    /// Panics if `event_count` is 0 or exceeds [`rows`](Self::rows).
    pub fn lower(&self, event_count: usize) -> f64 {
        self.lower[self.row(event_count)]
    }

    pub fn upper_table(&self) -> &[f64] {
        &self.upper
    }

    pub fn lower_table(&self) -> &[f64] {
        &self.lower
    }

    fn row(&self, event_count: usize) -> usize {
        assert!(
            event_count >= 1 && event_count <= self.rows(),
            "bound table lookup for event count {} outside 1..={}",
            event_count,
            self.rows()
        );
        event_count - 1
    }
}

fn checked_quantile(prob: f64, dof: f64) -> Result<f64> {
    let q = chi_squared_quantile(prob, dof);
    if !q.is_finite() || q <= 0.0 {
        return Err(Error::Numerical(format!(
            "chi-squared quantile at p={} with {} degrees of freedom is {}",
            prob, dof, q
        )));
    }
    Ok(q)
}
