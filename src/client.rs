//! HTTP transport the estimators time their requests through.

use crate::errors::SpeedTestError;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;
use url::Url;

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Response body of a download, yielded chunk by chunk as it arrives.
///
/// Dropping the stream abandons the rest of the transfer.
pub type ChunkStream = BoxStream<'static, Result<Bytes, SpeedTestError>>;

/// The network operations the estimators time.
///
/// `require_success` distinguishes our own service, whose status codes are
/// meaningful, from third-party hosts that only need to answer.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn ping(&self, url: &Url, require_success: bool) -> Result<(), SpeedTestError>;

    async fn download(&self, url: &Url) -> Result<ChunkStream, SpeedTestError>;

    async fn upload(
        &self,
        url: &Url,
        payload: Bytes,
        require_success: bool,
    ) -> Result<(), SpeedTestError>;
}

impl<T: Transport> Transport for &T {
    async fn ping(&self, url: &Url, require_success: bool) -> Result<(), SpeedTestError> {
        (**self).ping(url, require_success).await
    }

    async fn download(&self, url: &Url) -> Result<ChunkStream, SpeedTestError> {
        (**self).download(url).await
    }

    async fn upload(
        &self,
        url: &Url,
        payload: Bytes,
        require_success: bool,
    ) -> Result<(), SpeedTestError> {
        (**self).upload(url, payload, require_success).await
    }
}

/// [`Transport`] over a shared reqwest connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: ReqwestClient,
}

impl HttpTransport {
    pub fn new() -> Result<Self, SpeedTestError> {
        let client = ReqwestClient::builder()
            .user_agent(format!("{}/{}", NAME, VERSION))
            .default_headers(no_store_headers())
            .build()?;

        Ok(HttpTransport { client })
    }

    /// GET `url` and deserialize its JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, SpeedTestError> {
        let response = self.client.get(url.clone()).send().await?.error_for_status()?;

        Ok(response.json::<T>().await?)
    }
}

impl Transport for HttpTransport {
    async fn ping(&self, url: &Url, require_success: bool) -> Result<(), SpeedTestError> {
        let response = self.client.get(url.clone()).send().await?;

        if require_success {
            response.error_for_status()?;
        }

        Ok(())
    }

    async fn download(&self, url: &Url) -> Result<ChunkStream, SpeedTestError> {
        let response = self.client.get(url.clone()).send().await?.error_for_status()?;

        Ok(response.bytes_stream().map_err(SpeedTestError::from).boxed())
    }

    async fn upload(
        &self,
        url: &Url,
        payload: Bytes,
        require_success: bool,
    ) -> Result<(), SpeedTestError> {
        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"))
            .body(payload)
            .send()
            .await?;

        if require_success {
            response.error_for_status()?;
        }

        Ok(())
    }
}

fn no_store_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

    headers
}
