//! Run configuration, resolved once before any measurement starts.
//!
//! The estimators never look at the environment themselves; they read the
//! [`SpeedTestConfig`] they are handed.

use crate::errors::SpeedTestError;
use chrono::Utc;
use std::time::Duration;
use url::Url;

/// Size requested from the byte source service for the download test.
pub const DEFAULT_DOWNLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Ping round-trips per run.
pub const DEFAULT_PING_COUNT: usize = 10;

/// Pause between ping rounds.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(100);

/// Wall-clock budget for one download attempt.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

pub const BACKEND_DOWNLOAD_CHUNKS: usize = 20;
pub const EXTERNAL_DOWNLOAD_CHUNKS: usize = 5;
pub const FALLBACK_DOWNLOAD_CHUNKS: usize = 3;

pub const DEFAULT_UPLOAD_BYTES: usize = 500_000;
pub const FALLBACK_UPLOAD_BYTES: usize = 100_000;

const API_PREFIX: &str = "api/speedtest/";

/// Third-party hosts used when there is no backend, or when it fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalHosts {
    /// Serves a large file; only its first few chunks are read.
    pub download: Url,
    /// Accepts (and echoes) an arbitrary POST body.
    pub upload: Url,
    /// Any reachable host; the response itself is ignored.
    pub ping: Url,
    /// IP geolocation lookup, consumed outside the speed test.
    pub geolocation: Url,
}

impl Default for ExternalHosts {
    fn default() -> Self {
        Self {
            download: static_url("https://speed.cloudflare.com/__down?bytes=100000000"),
            upload: static_url("https://httpbin.org/post"),
            ping: static_url("https://www.google.com/"),
            geolocation: static_url("https://ipapi.co/json/"),
        }
    }
}

fn static_url(raw: &str) -> Url {
    Url::parse(raw).unwrap_or_else(|e| panic!("invalid built-in url {raw}: {e}"))
}

/// Which server the primary measurements run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deployment {
    /// A `netspeed serve` instance; `api_base` ends in `/api/speedtest/`.
    Backend { api_base: Url },
    /// No backend: every measurement goes to [`ExternalHosts`].
    ClientOnly,
}

impl Deployment {
    pub fn is_backend(&self) -> bool {
        matches!(self, Deployment::Backend { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Deployment::Backend { .. } => "backend",
            Deployment::ClientOnly => "client-only",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpeedTestConfig {
    pub deployment: Deployment,
    pub external: ExternalHosts,
    pub ping_count: usize,
    pub ping_interval: Duration,
    /// `size` requested from the backend download route.
    pub download_bytes: u64,
    pub download_timeout: Duration,
    pub backend_download_chunks: usize,
    pub external_download_chunks: usize,
    pub fallback_download_chunks: usize,
    pub upload_bytes: usize,
    pub fallback_upload_bytes: usize,
}

impl Default for SpeedTestConfig {
    fn default() -> Self {
        Self {
            deployment: Deployment::ClientOnly,
            external: ExternalHosts::default(),
            ping_count: DEFAULT_PING_COUNT,
            ping_interval: DEFAULT_PING_INTERVAL,
            download_bytes: DEFAULT_DOWNLOAD_BYTES,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            backend_download_chunks: BACKEND_DOWNLOAD_CHUNKS,
            external_download_chunks: EXTERNAL_DOWNLOAD_CHUNKS,
            fallback_download_chunks: FALLBACK_DOWNLOAD_CHUNKS,
            upload_bytes: DEFAULT_UPLOAD_BYTES,
            fallback_upload_bytes: FALLBACK_UPLOAD_BYTES,
        }
    }
}

impl SpeedTestConfig {
    /// Pick the deployment mode from an optional server origin.
    ///
    /// `http://localhost:3000` resolves to a backend whose routes live under
    /// `http://localhost:3000/api/speedtest/`.
    pub fn resolve(server: Option<&Url>) -> Result<Self, SpeedTestError> {
        let deployment = match server {
            Some(origin) => Deployment::Backend { api_base: api_base(origin)? },
            None => Deployment::ClientOnly,
        };

        Ok(Self { deployment, ..Self::default() })
    }

    pub fn with_external_hosts(mut self, external: ExternalHosts) -> Self {
        self.external = external;
        self
    }

    pub fn with_ping_count(mut self, ping_count: usize) -> Self {
        self.ping_count = ping_count;
        self
    }

    /// Primary ping target, and whether it must answer with a success
    /// status. External hosts only need to answer at all.
    pub fn ping_target(&self) -> Result<(Url, bool), SpeedTestError> {
        match &self.deployment {
            Deployment::Backend { api_base } => {
                Ok((cache_busted(&join(api_base, "ping")?), true))
            }
            Deployment::ClientOnly => Ok((cache_busted(&self.external.ping), false)),
        }
    }

    /// Primary download target and how many chunks to read from it.
    pub fn download_target(&self) -> Result<(Url, usize), SpeedTestError> {
        match &self.deployment {
            Deployment::Backend { api_base } => {
                let mut url = join(api_base, "download")?;
                url.query_pairs_mut()
                    .append_pair("size", &self.download_bytes.to_string());
                Ok((cache_busted(&url), self.backend_download_chunks))
            }
            Deployment::ClientOnly => Ok((
                cache_busted(&self.external.download),
                self.external_download_chunks,
            )),
        }
    }

    pub fn upload_target(&self) -> Result<Url, SpeedTestError> {
        match &self.deployment {
            Deployment::Backend { api_base } => join(api_base, "upload"),
            Deployment::ClientOnly => Ok(self.external.upload.clone()),
        }
    }
}

fn api_base(origin: &Url) -> Result<Url, SpeedTestError> {
    if origin.cannot_be_a_base() {
        return Err(SpeedTestError::config(format!(
            "{} cannot be used as a server address",
            origin
        )));
    }

    let mut base = origin.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    join(&base, API_PREFIX)
}

fn join(base: &Url, path: &str) -> Result<Url, SpeedTestError> {
    base.join(path).map_err(|e| {
        SpeedTestError::config(format!("cannot build {} from {}", path, base))
            .with_source(e)
    })
}

/// Copy of `url` with a `cache=<epoch millis>` query pair appended.
pub fn cache_busted(url: &Url) -> Url {
    let mut url = url.clone();
    url.query_pairs_mut()
        .append_pair("cache", &Utc::now().timestamp_millis().to_string());
    url
}
