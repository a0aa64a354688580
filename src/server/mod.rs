//! Byte source service: random-byte downloads, an upload sink, and a ping
//! endpoint, all stateless.

mod random_body;
pub mod routes;

pub use random_body::RandomBody;

use crate::errors::SpeedTestError;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use log::{debug, info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Default `size` for a download request without one.
pub const DEFAULT_SIZE: u64 = 5 * 1024 * 1024;

/// Upper bound on a single download response.
pub const MAX_SIZE: u64 = 10 * 1024 * 1024;

/// Bytes generated per body frame.
pub const CHUNK_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub default_size: u64,
    pub max_size: u64,
    pub chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { default_size: DEFAULT_SIZE, max_size: MAX_SIZE, chunk_size: CHUNK_SIZE }
    }
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, SpeedTestError> {
    TcpListener::bind(addr).await.map_err(|e| {
        SpeedTestError::from(e)
            .with_suggestion(format!("Is something else already listening on {}?", addr))
    })
}

/// Accept connections until `shutdown` resolves.
///
/// Each connection is served on its own task; requests share nothing but
/// the read-only config.
pub async fn serve<F>(
    listener: TcpListener,
    config: ServerConfig,
    shutdown: F,
) -> Result<(), SpeedTestError>
where
    F: Future<Output = ()>,
{
    let config = Arc::new(config);
    tokio::pin!(shutdown);

    info!("Listening on http://{}", listener.local_addr()?);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
            _ = &mut shutdown => {
                info!("Shutting down");
                return Ok(());
            }
        };

        debug!("Accepted connection from {}", peer);
        let config = config.clone();

        tokio::spawn(async move {
            let service = service_fn(move |request| {
                let config = config.clone();
                async move { routes::handle(request, &config).await }
            });

            if let Err(e) =
                http1::Builder::new().serve_connection(TokioIo::new(stream), service).await
            {
                // Clients abandoning a download mid-stream land here.
                debug!("Connection from {} closed: {}", peer, e);
            }
        });
    }
}
