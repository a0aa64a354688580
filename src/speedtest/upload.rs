//! Upload throughput estimator.

use crate::client::Transport;
use crate::config::SpeedTestConfig;
use crate::errors::SpeedTestError;
use crate::measurements::{estimate, throughput_mbps, Measurement, Metric};
use crate::random::random_bytes;
use log::{debug, info, warn};
use tokio::time::Instant;
use url::Url;

/// POST a random payload and time the exchange.
///
/// In backend mode a failure is retried once with the smaller fallback
/// payload against the external echo host. Anything beyond that is
/// reported as an estimate.
pub async fn measure_upload<T: Transport>(
    config: &SpeedTestConfig,
    transport: &T,
) -> Result<Measurement, SpeedTestError> {
    let url = config.upload_target()?;

    let error = match timed_upload(transport, &url, config.upload_bytes, true).await {
        Ok(mbps) => {
            info!("Upload: {:.2} Mbps", mbps);
            return Ok(Measurement::measured(mbps));
        }
        Err(e) if e.is_recoverable() => e,
        Err(e) => return Err(e),
    };

    warn!("Upload test failed: {}", error);

    if config.deployment.is_backend() {
        match timed_upload(
            transport,
            &config.external.upload,
            config.fallback_upload_bytes,
            false,
        )
        .await
        {
            Ok(mbps) => {
                info!("Upload via fallback host: {:.2} Mbps", mbps);
                return Ok(Measurement::measured(mbps));
            }
            Err(e) if e.is_recoverable() => {
                warn!("Fallback upload failed: {}", e);
            }
            Err(e) => return Err(e),
        }
    }

    let estimate = estimate(Metric::Upload);
    warn!("Reporting an estimated upload speed of {:.1} Mbps", estimate.value);

    Ok(estimate)
}

async fn timed_upload<T: Transport>(
    transport: &T,
    url: &Url,
    bytes: usize,
    strict: bool,
) -> Result<f64, SpeedTestError> {
    let payload = random_bytes(bytes);
    debug!("Uploading {} bytes to {}", payload.len(), url);

    let start = Instant::now();
    transport.upload(url, payload, strict).await?;
    let elapsed = start.elapsed();

    throughput_mbps(bytes as u64, elapsed)
        .ok_or_else(|| SpeedTestError::measurement("upload completed in zero time"))
}
