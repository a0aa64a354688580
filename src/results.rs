//! Serializable report of a complete run, used for `--json` output.

use crate::config::SpeedTestConfig;
use crate::geo::IpInfo;
use crate::measurements::{Measurement, Metric};
use crate::speedtest::{RunOutcome, SpeedTestOutput};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SpeedTestResults {
    pub timestamp: DateTime<Utc>,
    /// `backend` or `client-only`.
    pub mode: &'static str,
    pub outcome: RunOutcome,
    pub ping: MetricResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<f64>,
    pub download: MetricResult,
    pub upload: MetricResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<IpInfo>,
}

/// A single metric with its unit spelled out.
#[derive(Debug, Clone, Serialize)]
pub struct MetricResult {
    #[serde(flatten)]
    pub measurement: Measurement,
    pub unit: &'static str,
}

impl MetricResult {
    fn new(metric: Metric, measurement: Measurement) -> Self {
        Self { measurement, unit: metric.unit() }
    }
}

impl SpeedTestResults {
    pub fn from_engine_output(
        output: &SpeedTestOutput,
        config: &SpeedTestConfig,
        connection: Option<IpInfo>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            mode: config.deployment.label(),
            outcome: output.outcome,
            ping: MetricResult::new(Metric::Ping, output.ping),
            jitter_ms: output.jitter_ms,
            download: MetricResult::new(Metric::Download, output.download),
            upload: MetricResult::new(Metric::Upload, output.upload),
            connection,
        }
    }
}
