//! Download throughput estimator.
//!
//! Only the first few chunks of the response are read; the rest of the
//! transfer is abandoned and throughput is extrapolated from that sample.

use crate::client::{ChunkStream, Transport};
use crate::config::{cache_busted, SpeedTestConfig};
use crate::errors::SpeedTestError;
use crate::measurements::{estimate, throughput_mbps, Measurement, Metric};
use crate::speedtest::progress::{
    download_progress, ProgressCallback, ProgressEvent, TestPhase,
};
use futures::StreamExt;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::{timeout, Instant};
use url::Url;

/// Measure download throughput in Mbps.
///
/// The primary attempt is bounded by `config.download_timeout`. In backend
/// mode a failure triggers one reduced attempt against the external host;
/// if that fails too, or in client-only mode, the result is an estimate.
pub async fn measure_download<T: Transport>(
    config: &SpeedTestConfig,
    transport: &T,
    progress: &dyn ProgressCallback,
) -> Result<Measurement, SpeedTestError> {
    let (url, max_chunks) = config.download_target()?;

    let report = |chunks: usize| {
        progress.on_progress(ProgressEvent::Progress {
            phase: TestPhase::Download,
            percent: download_progress(chunks, max_chunks),
            status: TestPhase::Download.status().to_string(),
        })
    };

    let error = match timed_download(
        transport,
        &url,
        max_chunks,
        config.download_timeout,
        report,
    )
    .await
    {
        Ok(mbps) => {
            info!("Download: {:.2} Mbps", mbps);
            return Ok(Measurement::measured(mbps));
        }
        Err(e) if e.is_recoverable() => e,
        Err(e) => return Err(e),
    };

    warn!("Download test failed: {}", error);

    if config.deployment.is_backend() {
        let fallback = cache_busted(&config.external.download);

        match timed_download(
            transport,
            &fallback,
            config.fallback_download_chunks,
            config.download_timeout,
            |_| {},
        )
        .await
        {
            Ok(mbps) => {
                info!("Download via fallback host: {:.2} Mbps", mbps);
                return Ok(Measurement::measured(mbps));
            }
            Err(e) if e.is_recoverable() => {
                warn!("Fallback download failed: {}", e);
            }
            Err(e) => return Err(e),
        }
    }

    let estimate = estimate(Metric::Download);
    warn!("Reporting an estimated download speed of {:.1} Mbps", estimate.value);

    Ok(estimate)
}

/// One timed, bounded, cancellable download.
async fn timed_download<T, F>(
    transport: &T,
    url: &Url,
    max_chunks: usize,
    budget: Duration,
    on_chunk: F,
) -> Result<f64, SpeedTestError>
where
    T: Transport,
    F: FnMut(usize),
{
    debug!("Downloading at most {} chunks from {}", max_chunks, url);
    let start = Instant::now();

    let transfer = async {
        let mut body = transport.download(url).await?;
        read_bounded(&mut body, max_chunks, on_chunk).await
    };

    let received = timeout(budget, transfer).await.map_err(|_| {
        SpeedTestError::timeout(format!(
            "download from {} did not finish within {:?}",
            url.host_str().unwrap_or("server"),
            budget
        ))
    })??;

    let elapsed = start.elapsed();
    debug!("Received {} bytes in {:?}", received, elapsed);

    throughput_mbps(received, elapsed).ok_or_else(|| {
        SpeedTestError::measurement("download completed in zero time")
    })
}

/// Pull at most `max_chunks` chunks from `body` and return the byte count.
///
/// Stops early at end of stream. No chunk beyond the cap is ever requested.
pub(crate) async fn read_bounded<F: FnMut(usize)>(
    body: &mut ChunkStream,
    max_chunks: usize,
    mut on_chunk: F,
) -> Result<u64, SpeedTestError> {
    let mut received = 0u64;
    let mut chunks = 0usize;

    while chunks < max_chunks {
        let Some(chunk) = body.next().await else { break };
        let chunk = chunk?;

        chunks += 1;
        received += chunk.len() as u64;
        on_chunk(chunks);
    }

    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speedtest::progress::NoProgress;
    use crate::speedtest::testing::{
        backend_config, FakeTransport, RecordingProgress, CHUNK_LEN,
    };
    use bytes::Bytes;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_read_bounded_never_pulls_past_cap() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let mut body: ChunkStream = stream::repeat_with(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(b"0123456789"))
        })
        .boxed();

        let received = read_bounded(&mut body, 20, |_| {}).await.unwrap();

        assert_eq!(received, 200);
        assert_eq!(pulled.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn test_read_bounded_stops_at_end_of_stream() {
        let mut body: ChunkStream = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"de")),
        ])
        .boxed();

        let mut seen = Vec::new();
        let received = read_bounded(&mut body, 5, |n| seen.push(n)).await.unwrap();

        assert_eq!(received, 5);
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_read_bounded_surfaces_body_errors() {
        let mut body: ChunkStream = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(SpeedTestError::network("connection reset")),
        ])
        .boxed();

        assert!(read_bounded(&mut body, 5, |_| {}).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_reads_twenty_chunks() {
        let transport = FakeTransport::new();
        let progress = RecordingProgress::default();

        let result = measure_download(&backend_config(), &transport, &progress)
            .await
            .unwrap();

        assert!(!result.is_estimated());
        assert_eq!(transport.pulled_chunks(), 20);

        // 20 chunks over the fake's 5 ms time-to-first-byte.
        let expected = (20 * CHUNK_LEN) as f64 * 8.0 / (1e6 * 0.005);
        assert!((result.value - expected).abs() < 1e-6);

        let percents = progress.percents();
        assert_eq!(percents.len(), 20);
        assert_eq!(percents.last().copied(), Some(60.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_only_reads_five_chunks() {
        let transport = FakeTransport::new();

        let result =
            measure_download(&SpeedTestConfig::default(), &transport, &NoProgress)
                .await
                .unwrap();

        assert!(!result.is_estimated());
        assert_eq!(transport.pulled_chunks(), 5);
        assert_eq!(transport.calls_to("speed.cloudflare.com"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_download_aborts_at_timeout() {
        let transport = FakeTransport::new().stalled();
        let start = Instant::now();

        let result =
            measure_download(&SpeedTestConfig::default(), &transport, &NoProgress)
                .await
                .unwrap();

        let elapsed = start.elapsed();
        assert!(result.is_estimated());
        assert!((30.0..80.0).contains(&result.value));
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_failure_retries_external_with_three_chunks() {
        let transport = FakeTransport::new().failing(&["localhost"]);

        let result = measure_download(&backend_config(), &transport, &NoProgress)
            .await
            .unwrap();

        assert!(!result.is_estimated());
        assert_eq!(transport.calls_to("localhost"), 1);
        assert_eq!(transport.calls_to("speed.cloudflare.com"), 1);
        assert_eq!(transport.pulled_chunks(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_host_failing_yields_estimate() {
        let transport =
            FakeTransport::new().failing(&["localhost", "speed.cloudflare.com"]);

        let result = measure_download(&backend_config(), &transport, &NoProgress)
            .await
            .unwrap();

        assert!(result.is_estimated());
        assert!((30.0..80.0).contains(&result.value));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_error_propagates() {
        let transport = FakeTransport::new().fatal();

        let err = measure_download(&backend_config(), &transport, &NoProgress)
            .await
            .unwrap_err();

        assert!(!err.is_recoverable());
        assert_eq!(transport.total_calls(), 1);
    }
}
