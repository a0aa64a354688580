//! Latency estimator: sequential timed round-trips, reduced to a trimmed
//! mean.

use crate::client::Transport;
use crate::config::{cache_busted, SpeedTestConfig};
use crate::errors::SpeedTestError;
use crate::measurements::{estimate, Measurement, Metric};
use crate::stats::{jitter, trimmed_mean, TRIM_FRACTION};
use log::{debug, info, warn};
use tokio::time::{sleep, Instant};
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct LatencyResult {
    pub latency: Measurement,
    /// Mean difference between consecutive samples, when at least two
    /// rounds succeeded.
    pub jitter_ms: Option<f64>,
    /// Raw round-trip times in collection order.
    pub samples: Vec<f64>,
}

/// Run `config.ping_count` rounds and reduce them to one latency value.
///
/// A round that fails against the primary target is retried once against
/// the external ping host (backend mode only) and otherwise dropped. With
/// no samples at all the latency is a fallback estimate.
pub async fn measure_latency<T: Transport>(
    config: &SpeedTestConfig,
    transport: &T,
) -> Result<LatencyResult, SpeedTestError> {
    let rounds = config.ping_count;
    let mut samples = Vec::with_capacity(rounds);

    for round in 1..=rounds {
        let (url, strict) = config.ping_target()?;

        match timed_ping(transport, &url, strict).await {
            Ok(ms) => {
                debug!("Ping {}/{}: {:.2} ms", round, rounds, ms);
                samples.push(ms);
            }
            Err(e) if e.is_recoverable() => {
                warn!("Ping {}/{} failed: {}", round, rounds, e);

                if config.deployment.is_backend() {
                    let fallback = cache_busted(&config.external.ping);
                    match timed_ping(transport, &fallback, false).await {
                        Ok(ms) => {
                            debug!("Ping {}/{} via fallback host: {:.2} ms", round, rounds, ms);
                            samples.push(ms);
                        }
                        Err(e) if e.is_recoverable() => {
                            warn!("Ping {}/{} fallback failed: {}", round, rounds, e);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            Err(e) => return Err(e),
        }

        if round < rounds {
            sleep(config.ping_interval).await;
        }
    }

    let latency = match trimmed_mean(&samples, TRIM_FRACTION) {
        Some(ms) => {
            info!(
                "Latency: {:.2} ms from {} of {} rounds",
                ms,
                samples.len(),
                rounds
            );
            Measurement::measured(ms)
        }
        None => {
            let estimate = estimate(Metric::Ping);
            warn!(
                "All {} ping rounds failed, reporting an estimated {:.1} ms",
                rounds, estimate.value
            );
            estimate
        }
    };

    Ok(LatencyResult { latency, jitter_ms: jitter(&samples), samples })
}

async fn timed_ping<T: Transport>(
    transport: &T,
    url: &Url,
    strict: bool,
) -> Result<f64, SpeedTestError> {
    let start = Instant::now();
    transport.ping(url, strict).await?;

    Ok(start.elapsed().as_secs_f64() * 1000.0)
}
