//! Time series reduction
//!
//! Reduces a noisy series of samples to one representative value and flags
//! distributions where that value is likely misleading.

use crate::error::StatsError;
use crate::prometheus::Sample;
use tracing::trace;

/// Relative deviation above which a distribution is reported as uneven
const UNEVEN_DISTRIBUTION_RATIO: f64 = 0.1;

/// Digest of a single time series
#[derive(Debug, Clone, PartialEq)]
pub struct ValueStats {
    pub n: usize,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (Bessel's correction); 0 for a single sample
    pub stdev: f64,
}

impl ValueStats {
    /// Compute the digest, `None` for an empty series
    pub fn from_samples(samples: &[Sample]) -> Option<Self> {
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        Self::from_values(&values)
    }

    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let n = values.len();
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let sum: f64 = values.iter().sum();
        let mean = sum / n as f64;

        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };

        let stdev = if n > 1 {
            let acc: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
            (acc / (n - 1) as f64).sqrt()
        } else {
            0.0
        };

        Some(Self {
            n,
            min: sorted[0],
            max: sorted[n - 1],
            sum,
            mean,
            median,
            stdev,
        })
    }
}

/// Representative value of a series plus advisory warnings
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesValue {
    pub value: f64,
    pub warnings: Vec<String>,
}

/// Reduce a series to a single value (currently the rounded mean).
///
/// An empty series is an error: there is no value, and the caller must not
/// substitute zero.
pub fn representative_value(samples: &[Sample], label: &str) -> Result<SeriesValue, StatsError> {
    let stats = ValueStats::from_samples(samples).ok_or_else(|| StatsError::NoSamples {
        label: label.to_string(),
    })?;
    trace!(series = %label, stats = ?stats, "Series statistics");

    let mut warnings = Vec::new();
    if (stats.mean - stats.median).abs() > UNEVEN_DISTRIBUTION_RATIO * stats.mean {
        warnings.push(format!(
            "Potentially uneven distribution for {}: average {}, median {}",
            label, stats.mean, stats.median
        ));
    }
    if stats.mean != 0.0 && stats.stdev / stats.mean > UNEVEN_DISTRIBUTION_RATIO {
        warnings.push(format!(
            "Potentially uneven distribution for {}: average {}, stdev {}",
            label, stats.mean, stats.stdev
        ));
    }

    Ok(SeriesValue {
        value: magic_round(stats.mean),
        warnings,
    })
}

/// Round to whole numbers at magnitude >= 1000, otherwise keep up to 4 significant digits
pub fn magic_round(x: f64) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    let digits = (3.0 - x.abs().log10()).round().max(0.0);
    let scale = 10f64.powf(digits).round();
    if scale == 0.0 {
        return x;
    }
    (x * scale).round() / scale
}

/// Minimum of the finite values, NaN if there are none
pub fn min(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v < acc { v } else { acc })
}

/// Sum of the finite values
pub fn sum(values: &[f64]) -> f64 {
    values.iter().copied().filter(|v| v.is_finite()).sum()
}

/// Average of the finite values, 0 if there are none
pub fn avg(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return 0.0;
    }
    finite.iter().sum::<f64>() / finite.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: &[f64]) -> Vec<Sample> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample {
                timestamp: 1_600_000_000.0 + i as f64 * 60.0,
                value: *v,
            })
            .collect()
    }

    #[test]
    fn test_magic_round_table() {
        let cases = [
            (0.0, 0.0),
            (1.0, 1.0),
            (11.0, 11.0),
            (100.0, 100.0),
            (1234.0, 1234.0),
            (12345.0, 12345.0),
            (123456.0, 123456.0),
            (0.1, 0.1),
            (0.33333333, 0.333),
            (0.55555555, 0.556),
            (0.000000123, 0.000000123),
            (0.0000001234, 0.0000001234),
            (0.00000012345, 0.0000001235),
            (1.1, 1.1),
            (1.1111, 1.111),
            (11.111, 11.11),
            (11.1111, 11.11),
            (101.123456, 101.1),
            (101.555555, 101.6),
            (1010.1, 1010.0),
            (1010.555555, 1011.0),
        ];

        for (x, expected) in cases {
            assert_eq!(magic_round(x), expected, "magic_round({})", x);
        }
    }

    #[test]
    fn test_stats_odd_count() {
        let stats = ValueStats::from_values(&[3.0, 1.0, 2.0]).unwrap();
        assert_eq!(stats.n, 3);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 3.0);
        assert_eq!(stats.sum, 6.0);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.median, 2.0);
        assert!((stats.stdev - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_stats_even_count_median() {
        let stats = ValueStats::from_values(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(stats.median, 2.5);
    }

    #[test]
    fn test_stats_single_sample_has_zero_stdev() {
        let stats = ValueStats::from_values(&[5.0]).unwrap();
        assert_eq!(stats.stdev, 0.0);
        assert_eq!(stats.median, 5.0);
    }

    #[test]
    fn test_empty_series_is_an_error() {
        let err = representative_value(&[], "cpu usage").unwrap_err();
        assert_eq!(
            err,
            StatsError::NoSamples {
                label: "cpu usage".to_string()
            }
        );
        assert!(ValueStats::from_samples(&[]).is_none());
    }

    #[test]
    fn test_representative_value_is_rounded_mean() {
        let result = representative_value(&samples(&[1.0, 1.0, 1.0]), "x").unwrap();
        assert_eq!(result.value, 1.0);
        assert!(result.warnings.is_empty());

        let result = representative_value(&samples(&[0.3333333, 0.3333333]), "x").unwrap();
        assert_eq!(result.value, 0.333);
    }

    #[test]
    fn test_representative_value_order_independent() {
        let a = representative_value(&samples(&[1.0, 7.0, 2.5, 9.0]), "x").unwrap();
        let b = representative_value(&samples(&[9.0, 2.5, 7.0, 1.0]), "x").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_skewed_distribution_warns() {
        // mean 25, median 1
        let result = representative_value(&samples(&[1.0, 1.0, 1.0, 97.0]), "skewed").unwrap();
        assert_eq!(result.value, 25.0);
        assert_eq!(result.warnings.len(), 2);
        assert!(result.warnings[0].contains("median"));
        assert!(result.warnings[1].contains("stdev"));
    }

    #[test]
    fn test_zero_series_does_not_warn() {
        let result = representative_value(&samples(&[0.0, 0.0]), "idle").unwrap();
        assert_eq!(result.value, 0.0);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_nan_tolerant_helpers() {
        let values = [2.0, f64::NAN, 1.0, f64::INFINITY];
        assert_eq!(min(&values), 1.0);
        assert_eq!(sum(&values), 3.0);
        assert_eq!(avg(&values), 1.5);

        assert!(min(&[]).is_nan());
        assert_eq!(sum(&[]), 0.0);
        assert_eq!(avg(&[f64::NAN]), 0.0);
    }
}
