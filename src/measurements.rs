//! Derived metrics and the synthetic values substituted when measuring fails.

use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::ops::Range;
use std::time::Duration;

/// The three numbers a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Ping,
    Download,
    Upload,
}

impl Metric {
    pub fn unit(&self) -> &'static str {
        match self {
            Metric::Ping => "ms",
            Metric::Download | Metric::Upload => "Mbps",
        }
    }

    /// Range the fallback estimate is drawn from.
    pub fn fallback_range(&self) -> Range<f64> {
        match self {
            Metric::Ping => 10.0..60.0,
            Metric::Download => 30.0..80.0,
            Metric::Upload => 10.0..30.0,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Metric::Ping => "ping",
            Metric::Download => "download",
            Metric::Upload => "upload",
        })
    }
}

/// Where a reported value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Measured,
    Estimated,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    pub value: f64,
    pub source: Source,
}

impl Measurement {
    pub fn measured(value: f64) -> Self {
        Self { value, source: Source::Measured }
    }

    pub fn estimated(value: f64) -> Self {
        Self { value, source: Source::Estimated }
    }

    pub fn is_estimated(&self) -> bool {
        self.source == Source::Estimated
    }
}

/// Megabits per second for `bytes` moved in `elapsed`.
///
/// Returns `None` for a zero duration rather than an infinite rate.
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> Option<f64> {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        return None;
    }

    Some((bytes as f64 * 8.0) / (1_000_000.0 * seconds))
}

/// A plausible stand-in for `metric`, uniformly drawn from its
/// [`Metric::fallback_range`].
pub fn estimate(metric: Metric) -> Measurement {
    estimate_with(metric, &mut rand::thread_rng())
}

pub fn estimate_with<R: Rng + ?Sized>(metric: Metric, rng: &mut R) -> Measurement {
    Measurement::estimated(rng.gen_range(metric.fallback_range()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_throughput_one_megabyte_per_second() {
        let mbps = throughput_mbps(1_000_000, Duration::from_secs(1)).unwrap();
        assert!((mbps - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_throughput_zero_duration() {
        assert_eq!(throughput_mbps(1_000, Duration::ZERO), None);
        assert_eq!(throughput_mbps(0, Duration::from_millis(5)), Some(0.0));
    }

    #[test]
    fn test_estimates_fall_in_documented_ranges() {
        let mut rng = SmallRng::seed_from_u64(7);

        for _ in 0..1_000 {
            let ping = estimate_with(Metric::Ping, &mut rng);
            assert!(ping.is_estimated());
            assert!((10.0..60.0).contains(&ping.value));

            let down = estimate_with(Metric::Download, &mut rng);
            assert!((30.0..80.0).contains(&down.value));

            let up = estimate_with(Metric::Upload, &mut rng);
            assert!((10.0..30.0).contains(&up.value));
        }
    }

    #[test]
    fn test_measurement_serializes_source() {
        let json = serde_json::to_value(Measurement::measured(12.5)).unwrap();
        assert_eq!(json["value"], 12.5);
        assert_eq!(json["source"], "measured");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn throughput_scales_linearly_with_bytes(
            bytes in 1u64..1_000_000_000,
            millis in 1u64..60_000,
        ) {
            let elapsed = Duration::from_millis(millis);
            let single = throughput_mbps(bytes, elapsed).unwrap();
            let double = throughput_mbps(bytes * 2, elapsed).unwrap();

            prop_assert!((double - 2.0 * single).abs() <= single * 1e-9);
        }
    }
}
