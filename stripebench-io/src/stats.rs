//! Per-worker bandwidth statistics.

use std::fmt;

use crate::topology::StorageUnitIndex;
use crate::transfer::TransferResult;

/// Descriptive statistics over per-worker bandwidths, in GiB/s.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Summary {
    /// Lowest bandwidth.
    pub min: f64,
    /// Highest bandwidth.
    pub max: f64,
    /// `max / min`, a measure of imbalance between workers.
    pub imbalance: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// The element at sorted position `n / 2`.
    ///
    /// For an even number of samples this is the upper of the two middle elements, not their
    /// average.
    pub median: f64,
    /// Population standard deviation.
    pub stddev: f64,
    /// `100 * stddev / mean`.
    pub cv_percent: f64,
}

impl Summary {
    /// Computes statistics over `samples`.
    ///
    /// Returns `None` for fewer than two samples, where spread statistics carry no meaning.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.len() < 2 {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let min = sorted[0];
        let max = sorted[sorted.len() - 1];
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let stddev = variance.sqrt();

        Some(Self {
            min,
            max,
            imbalance: max / min,
            mean,
            median: sorted[sorted.len() / 2],
            stddev,
            cv_percent: 100.0 * stddev / mean,
        })
    }
}

/// Renders per-worker results, optionally attributed to storage units.
///
/// Units are only used when there is exactly one unit per result. Otherwise the attribution between
/// workers and units is unknown and the report omits it.
#[derive(Debug)]
pub struct BandwidthReport<'a> {
    results: &'a [TransferResult],
    units: Option<&'a [StorageUnitIndex]>,
}

impl<'a> BandwidthReport<'a> {
    /// Creates a report over `results`, positionally paired with `units`.
    pub fn new(results: &'a [TransferResult], units: Option<&'a [StorageUnitIndex]>) -> Self {
        let units = units.filter(|units| units.len() == results.len());
        Self { results, units }
    }

    /// Returns `true` if bandwidths are attributed to storage units.
    pub fn has_units(&self) -> bool {
        self.units.is_some()
    }

    /// The statistics shown by this report, if there is more than one result.
    pub fn summary(&self) -> Option<Summary> {
        Summary::from_samples(&self.bandwidths())
    }

    fn bandwidths(&self) -> Vec<f64> {
        self.results.iter().map(|r| r.bandwidth_gibps).collect()
    }

    fn unit_of(&self, bandwidth: f64) -> Option<StorageUnitIndex> {
        let units = self.units?;
        self.results
            .iter()
            .position(|r| r.bandwidth_gibps == bandwidth)
            .map(|index| units[index])
    }
}

impl fmt::Display for BandwidthReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(units) = self.units {
            let mut pairs: Vec<_> = units
                .iter()
                .zip(self.results)
                .map(|(unit, result)| (*unit, result.bandwidth_gibps))
                .collect();
            pairs.sort_by(|a, b| a.1.total_cmp(&b.1));
            for (unit, bandwidth) in pairs {
                writeln!(f, "OST {unit}: {bandwidth} GiB/s")?;
            }
        }

        let Some(summary) = self.summary() else {
            return Ok(());
        };

        let label = |bandwidth| match self.unit_of(bandwidth) {
            Some(unit) => format!(" - OST {unit}"),
            None => String::new(),
        };

        writeln!(f, "min:     {} GiB/s{}", summary.min, label(summary.min))?;
        writeln!(f, "Max:     {} GiB/s{}", summary.max, label(summary.max))?;
        writeln!(f, "Max/min: {}", summary.imbalance)?;
        writeln!(f, "Average: {} GiB/s", summary.mean)?;
        writeln!(f, "Median:  {} GiB/s{}", summary.median, label(summary.median))?;
        writeln!(f, "Standard deviation: {} GiB/s", summary.stddev)?;
        writeln!(f, "Standard deviation / average: {} %", summary.cv_percent)
    }
}

/// Renders the report for `results` as text.
pub fn report(results: &[TransferResult], units: Option<&[StorageUnitIndex]>) -> String {
    BandwidthReport::new(results, units).to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn result(bandwidth_gibps: f64) -> TransferResult {
        TransferResult {
            bytes_moved: 1,
            elapsed: Duration::from_secs(1),
            bandwidth_gibps,
        }
    }

    #[test]
    fn median_of_even_count_takes_upper_middle() {
        let summary = Summary::from_samples(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(summary.median, 3.0);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 4.0);
        assert_eq!(summary.imbalance, 4.0);
        assert_eq!(summary.mean, 2.5);
    }

    #[test]
    fn population_standard_deviation() {
        let summary = Summary::from_samples(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(summary.stddev, 2.0);
        assert_eq!(summary.cv_percent, 40.0);
    }

    #[test]
    fn single_result_has_no_statistics() {
        assert_eq!(Summary::from_samples(&[1.5]), None);

        let text = report(&[result(1.5)], None);
        assert!(text.is_empty());

        let text = report(&[result(1.5)], Some(&[StorageUnitIndex(7)]));
        assert_eq!(text, "OST 7: 1.5 GiB/s\n");
    }

    #[test]
    fn units_sorted_by_bandwidth() {
        let results = [result(2.0), result(1.0), result(3.0)];
        let units = [StorageUnitIndex(10), StorageUnitIndex(11), StorageUnitIndex(12)];
        let text = report(&results, Some(&units));

        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "OST 11: 1 GiB/s");
        assert_eq!(lines[1], "OST 10: 2 GiB/s");
        assert_eq!(lines[2], "OST 12: 3 GiB/s");
        assert_eq!(lines[3], "min:     1 GiB/s - OST 11");
        assert_eq!(lines[4], "Max:     3 GiB/s - OST 12");
        assert_eq!(lines[7], "Median:  2 GiB/s - OST 10");
    }

    #[test]
    fn mismatched_units_are_ignored() {
        let results = [result(2.0), result(1.0)];
        let units = [StorageUnitIndex(1)];
        let report = BandwidthReport::new(&results, Some(&units));

        assert!(!report.has_units());
        let text = report.to_string();
        assert!(!text.contains("OST"));
        assert!(text.starts_with("min:     1 GiB/s\n"));
    }
}
