//! Throughput summary over a run's successful trials

use serde::{Deserialize, Serialize};

/// Descriptive statistics of per-trial throughput, in Mbit/s
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputSummary {
    /// Number of samples
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; zero with fewer than two samples
    pub std_dev: f64,
    pub median: f64,
    pub p90: f64,
}

impl ThroughputSummary {
    /// Summarise `samples`; `None` when there are none
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        Some(Self {
            count,
            mean,
            min: sorted[0],
            max: sorted[count - 1],
            std_dev: standard_deviation(&sorted, mean),
            median: percentile(&sorted, 50.0),
            p90: percentile(&sorted, 90.0),
        })
    }
}

/// Linear-interpolated percentile of already sorted values
pub fn percentile(sorted_values: &[f64], percentile: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0) * (sorted_values.len() as f64 - 1.0);
    let lower_index = index.floor() as usize;
    let upper_index = index.ceil() as usize;

    if lower_index == upper_index {
        sorted_values[lower_index]
    } else {
        let lower_value = sorted_values[lower_index];
        let upper_value = sorted_values[upper_index];
        let weight = index - lower_index as f64;
        lower_value + weight * (upper_value - lower_value)
    }
}

fn standard_deviation(values: &[f64], mean: f64) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_has_no_summary() {
        assert!(ThroughputSummary::from_samples(&[]).is_none());
        assert!(ThroughputSummary::from_samples(&[f64::NAN]).is_none());
    }

    #[test]
    fn test_summary_values() {
        let summary = ThroughputSummary::from_samples(&[4.0, 2.0, 8.0, 6.0]).unwrap();
        assert_eq!(summary.count, 4);
        assert_eq!(summary.mean, 5.0);
        assert_eq!(summary.min, 2.0);
        assert_eq!(summary.max, 8.0);
        assert_eq!(summary.median, 5.0);
        assert!((summary.std_dev - 2.581_988_897).abs() < 1e-6);
        assert!((summary.p90 - 7.4).abs() < 1e-9);
    }

    #[test]
    fn test_single_sample() {
        let summary = ThroughputSummary::from_samples(&[8.0]).unwrap();
        assert_eq!(summary.std_dev, 0.0);
        assert_eq!(summary.median, 8.0);
        assert_eq!(summary.p90, 8.0);
    }
}
