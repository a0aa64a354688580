use crate::client::Transport;
use crate::config::SpeedTestConfig;
use crate::errors::SpeedTestError;
use crate::measurements::{estimate, Measurement, Metric};
use crate::speedtest::download::measure_download;
use crate::speedtest::ping::measure_latency;
use crate::speedtest::progress::{
    NoProgress, ProgressCallback, ProgressEvent, TestPhase,
};
use crate::speedtest::upload::measure_upload;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every phase ran. Individual metrics may still be estimates.
    Completed,
    /// The sequence was aborted and all three metrics were substituted.
    CompletedWithEstimates,
}

/// Results of a complete run.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedTestOutput {
    pub ping: Measurement,
    pub jitter_ms: Option<f64>,
    pub download: Measurement,
    pub upload: Measurement,
    pub outcome: RunOutcome,
}

impl SpeedTestOutput {
    /// Fallback values for every metric.
    pub fn estimated() -> Self {
        Self {
            ping: estimate(Metric::Ping),
            jitter_ms: None,
            download: estimate(Metric::Download),
            upload: estimate(Metric::Upload),
            outcome: RunOutcome::CompletedWithEstimates,
        }
    }

    pub fn any_estimated(&self) -> bool {
        self.ping.is_estimated()
            || self.download.is_estimated()
            || self.upload.is_estimated()
    }
}

/// Runs ping, download and upload strictly in that order.
///
/// # Example
/// ```no_run
/// use netspeed::client::HttpTransport;
/// use netspeed::config::SpeedTestConfig;
/// use netspeed::speedtest::engine::TestEngine;
///
/// #[tokio::main]
/// async fn main() {
///     let config = SpeedTestConfig::resolve(None).unwrap();
///     let engine = TestEngine::new(config, HttpTransport::new().unwrap());
///     let results = engine.run().await;
///     println!("Download: {:.1} Mbps", results.download.value);
/// }
/// ```
pub struct TestEngine<T: Transport> {
    config: SpeedTestConfig,
    transport: T,
    progress: Arc<dyn ProgressCallback>,
}

impl<T: Transport> TestEngine<T> {
    pub fn new(config: SpeedTestConfig, transport: T) -> Self {
        Self { config, transport, progress: Arc::new(NoProgress) }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &SpeedTestConfig {
        &self.config
    }

    /// Run the whole sequence. Never fails.
    ///
    /// The estimators absorb the failures they anticipate. Anything else
    /// stops the sequence where it is, and the run is reported with
    /// estimates for all three metrics.
    pub async fn run(&self) -> SpeedTestOutput {
        info!("Starting speed test ({} mode)", self.config.deployment.label());

        match self.run_sequence().await {
            Ok(output) => {
                self.checkpoint(TestPhase::Complete, TestPhase::Complete.status());
                output
            }
            Err(e) => {
                warn!("Speed test aborted: {}", e);

                let output = SpeedTestOutput::estimated();
                self.report(Metric::Ping, output.ping);
                self.report(Metric::Download, output.download);
                self.report(Metric::Upload, output.upload);
                self.checkpoint(
                    TestPhase::Complete,
                    "Test completed with estimated values",
                );
                output
            }
        }
    }

    async fn run_sequence(&self) -> Result<SpeedTestOutput, SpeedTestError> {
        let progress = self.progress.as_ref();

        self.checkpoint(TestPhase::Ping, TestPhase::Ping.status());
        let latency = measure_latency(&self.config, &self.transport).await?;
        self.report(Metric::Ping, latency.latency);

        self.checkpoint(TestPhase::Download, TestPhase::Download.status());
        let download =
            measure_download(&self.config, &self.transport, progress).await?;
        self.report(Metric::Download, download);

        self.checkpoint(TestPhase::Upload, TestPhase::Upload.status());
        let upload = measure_upload(&self.config, &self.transport).await?;
        self.report(Metric::Upload, upload);

        info!(
            "Speed test complete: ping={:.1} ms, download={:.2} Mbps, upload={:.2} Mbps",
            latency.latency.value, download.value, upload.value
        );

        Ok(SpeedTestOutput {
            ping: latency.latency,
            jitter_ms: latency.jitter_ms,
            download,
            upload,
            outcome: RunOutcome::Completed,
        })
    }

    fn checkpoint(&self, phase: TestPhase, status: &str) {
        debug!("{:>3}% {}", phase.checkpoint(), status);
        self.progress.on_progress(ProgressEvent::Progress {
            phase,
            percent: phase.checkpoint(),
            status: status.to_string(),
        });
    }

    fn report(&self, metric: Metric, measurement: Measurement) {
        self.progress.on_progress(ProgressEvent::Result { metric, measurement });
    }
}
