//! Progress events and the callback interface the engine reports through.

use crate::measurements::{Measurement, Metric};

/// Phases of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    Ping,
    Download,
    Upload,
    Complete,
}

impl TestPhase {
    /// Fixed progress checkpoint reached when the phase starts.
    pub fn checkpoint(&self) -> f64 {
        match self {
            TestPhase::Ping => 10.0,
            TestPhase::Download => 30.0,
            TestPhase::Upload => 60.0,
            TestPhase::Complete => 100.0,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            TestPhase::Ping => "Measuring ping...",
            TestPhase::Download => "Measuring download speed...",
            TestPhase::Upload => "Measuring upload speed...",
            TestPhase::Complete => "Test completed!",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The progress indicator moved.
    Progress {
        phase: TestPhase,
        /// 0 to 100.
        percent: f64,
        status: String,
    },
    /// A metric is final and can be shown.
    Result { metric: Metric, measurement: Measurement },
}

/// Receives progress updates.
///
/// Implementations must be non-blocking to avoid affecting
/// measurement accuracy.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// Download progress after `chunks` of `max_chunks` have arrived.
///
/// Sweeps the download phase from 30% towards 60%, never above 90%.
pub fn download_progress(chunks: usize, max_chunks: usize) -> f64 {
    if max_chunks == 0 {
        return TestPhase::Download.checkpoint();
    }

    let share = chunks as f64 / max_chunks as f64;
    (TestPhase::Download.checkpoint() + share * 30.0).min(90.0)
}
