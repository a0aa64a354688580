//! The measurement client: three estimators and the engine that runs them.

pub mod download;
pub mod engine;
pub mod ping;
pub mod progress;
pub mod upload;

pub use engine::{RunOutcome, SpeedTestOutput, TestEngine};
pub use progress::{ProgressCallback, ProgressEvent, TestPhase};

#[cfg(test)]
pub(crate) mod testing {
    use crate::client::{ChunkStream, Transport};
    use crate::config::SpeedTestConfig;
    use crate::errors::SpeedTestError;
    use crate::measurements::Metric;
    use crate::speedtest::progress::{ProgressCallback, ProgressEvent};
    use bytes::Bytes;
    use futures::{stream, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use url::Url;

    pub const CHUNK_LEN: usize = 1_000;
    static CHUNK: [u8; CHUNK_LEN] = [0x55; CHUNK_LEN];

    pub fn backend_config() -> SpeedTestConfig {
        let origin = Url::parse("http://localhost:3000").unwrap();
        SpeedTestConfig::resolve(Some(&origin)).unwrap()
    }

    /// Scriptable transport: every call takes `latency`, calls to
    /// `failing` hosts fail with a network error, and a `fatal` transport
    /// fails everything with an unclassified error.
    pub struct FakeTransport {
        latency: Duration,
        failing: Vec<&'static str>,
        fatal: bool,
        stalled: bool,
        pulled: Arc<AtomicUsize>,
        calls: Mutex<Vec<(&'static str, Url)>>,
        uploads: Mutex<Vec<usize>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self {
                latency: Duration::from_millis(5),
                failing: Vec::new(),
                fatal: false,
                stalled: false,
                pulled: Arc::new(AtomicUsize::new(0)),
                calls: Mutex::new(Vec::new()),
                uploads: Mutex::new(Vec::new()),
            }
        }

        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        pub fn failing(mut self, hosts: &[&'static str]) -> Self {
            self.failing.extend_from_slice(hosts);
            self
        }

        pub fn fatal(mut self) -> Self {
            self.fatal = true;
            self
        }

        /// Downloads connect but never deliver a byte.
        pub fn stalled(mut self) -> Self {
            self.stalled = true;
            self
        }

        pub fn calls_to(&self, host: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, url)| url.host_str() == Some(host))
                .count()
        }

        pub fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn operations(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().iter().map(|(op, _)| *op).collect()
        }

        pub fn pulled_chunks(&self) -> usize {
            self.pulled.load(Ordering::SeqCst)
        }

        pub fn uploaded_sizes(&self) -> Vec<usize> {
            self.uploads.lock().unwrap().clone()
        }

        async fn exchange(&self, op: &'static str, url: &Url) -> Result<(), SpeedTestError> {
            self.calls.lock().unwrap().push((op, url.clone()));

            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            if self.fatal {
                return Err(SpeedTestError::unknown("transport exploded"));
            }

            if url.host_str().is_some_and(|host| self.failing.contains(&host)) {
                return Err(SpeedTestError::network(format!("connection refused: {}", url)));
            }

            Ok(())
        }
    }

    impl Transport for FakeTransport {
        async fn ping(&self, url: &Url, _require_success: bool) -> Result<(), SpeedTestError> {
            self.exchange("ping", url).await
        }

        async fn download(&self, url: &Url) -> Result<ChunkStream, SpeedTestError> {
            self.exchange("download", url).await?;

            if self.stalled {
                return Ok(stream::pending().boxed());
            }

            let pulled = self.pulled.clone();
            Ok(stream::repeat_with(move || {
                pulled.fetch_add(1, Ordering::SeqCst);
                Ok(Bytes::from_static(&CHUNK))
            })
            .boxed())
        }

        async fn upload(
            &self,
            url: &Url,
            payload: Bytes,
            _require_success: bool,
        ) -> Result<(), SpeedTestError> {
            self.uploads.lock().unwrap().push(payload.len());
            self.exchange("upload", url).await
        }
    }

    #[derive(Default)]
    pub struct RecordingProgress {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl RecordingProgress {
        pub fn percents(&self) -> Vec<f64> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|event| match event {
                    ProgressEvent::Progress { percent, .. } => Some(*percent),
                    _ => None,
                })
                .collect()
        }

        /// Fixed phase checkpoints, without the intra-download sweep.
        pub fn checkpoints(&self) -> Vec<f64> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|event| match event {
                    ProgressEvent::Progress { phase, percent, .. }
                        if *percent == phase.checkpoint() =>
                    {
                        Some(*percent)
                    }
                    _ => None,
                })
                .collect()
        }

        pub fn metrics(&self) -> Vec<Metric> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|event| match event {
                    ProgressEvent::Result { metric, .. } => Some(*metric),
                    _ => None,
                })
                .collect()
        }

        pub fn last_status(&self) -> Option<String> {
            self.events.lock().unwrap().iter().rev().find_map(|event| match event {
                ProgressEvent::Progress { status, .. } => Some(status.clone()),
                _ => None,
            })
        }
    }

    impl ProgressCallback for RecordingProgress {
        fn on_progress(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
