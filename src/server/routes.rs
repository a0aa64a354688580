//! Request routing for the byte source service.

use crate::server::random_body::RandomBody;
use crate::server::ServerConfig;
use chrono::{SecondsFormat, Utc};
use http::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW, CACHE_CONTROL, CONTENT_DISPOSITION,
    CONTENT_TYPE, EXPIRES, PRAGMA,
};
use http::{Method, Request, Response, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::{Body, Buf, Bytes};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::Display;
use std::num::IntErrorKind;

pub type ServiceBody = BoxBody<Bytes, Infallible>;

pub const DOWNLOAD_PATH: &str = "/api/speedtest/download";
pub const UPLOAD_PATH: &str = "/api/speedtest/upload";
pub const PING_PATH: &str = "/api/speedtest/ping";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct UploadAck {
    pub success: bool,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PingReply {
    pub timestamp: String,
}

/// Route one request. Every outcome is a response; nothing here fails.
pub async fn handle<B>(
    request: Request<B>,
    config: &ServerConfig,
) -> Result<Response<ServiceBody>, Infallible>
where
    B: Body + Unpin,
    B::Error: Display,
{
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let response = match (method, path.as_str()) {
        (Method::OPTIONS, _) => preflight(),
        (Method::GET, DOWNLOAD_PATH) => {
            download(request.uri().query(), config)
        }
        (Method::POST, UPLOAD_PATH) => upload(request.into_body()).await,
        (Method::GET, PING_PATH) => ping(),
        (_, DOWNLOAD_PATH) | (_, PING_PATH) => method_not_allowed("GET, OPTIONS"),
        (_, UPLOAD_PATH) => method_not_allowed("POST, OPTIONS"),
        _ => not_found(),
    };

    Ok(with_cors(response))
}

/// Bytes to send for a `size` query value.
///
/// Missing or unparseable values take the default; negative values send
/// nothing; everything is capped at the configured maximum, including
/// numbers too large to represent.
pub fn requested_size(query: Option<&str>, config: &ServerConfig) -> u64 {
    let size = query
        .into_iter()
        .flat_map(|q| url::form_urlencoded::parse(q.as_bytes()))
        .find(|(key, _)| key == "size")
        .and_then(|(_, value)| parse_size(value.trim()));

    match size {
        None => config.default_size.min(config.max_size),
        Some(n) if n <= 0 => 0,
        Some(n) => (n as u64).min(config.max_size),
    }
}

fn parse_size(value: &str) -> Option<i64> {
    match value.parse::<i64>() {
        Ok(n) => Some(n),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Some(i64::MAX),
            IntErrorKind::NegOverflow => Some(i64::MIN),
            _ => None,
        },
    }
}

fn download(query: Option<&str>, config: &ServerConfig) -> Response<ServiceBody> {
    let size = requested_size(query, config);
    info!("Streaming {} random bytes", size);

    let mut response =
        Response::new(RandomBody::new(size, config.chunk_size).boxed());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"speedtest.bin\""),
    );
    insert_no_cache(headers);

    response
}

async fn upload<B>(mut body: B) -> Response<ServiceBody>
where
    B: Body + Unpin,
    B::Error: Display,
{
    let mut received = 0u64;

    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Some(data) = frame.data_ref() {
                    received += data.remaining() as u64;
                }
            }
            Err(e) => {
                debug!("Upload aborted after {} bytes: {}", received, e);
                break;
            }
        }
    }

    debug!("Upload received: {} bytes", received);

    json(
        StatusCode::OK,
        &UploadAck {
            success: true,
            message: "Upload received".to_string(),
            timestamp: timestamp(),
        },
    )
}

fn ping() -> Response<ServiceBody> {
    let mut response = json(StatusCode::OK, &PingReply { timestamp: timestamp() });
    insert_no_cache(response.headers_mut());
    response
}

fn preflight() -> Response<ServiceBody> {
    let mut response = Response::new(empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

fn method_not_allowed(allow: &'static str) -> Response<ServiceBody> {
    let mut response = text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    response.headers_mut().insert(ALLOW, HeaderValue::from_static(allow));
    response
}

fn not_found() -> Response<ServiceBody> {
    text(StatusCode::NOT_FOUND, "Not Found")
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<ServiceBody> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(full(body));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn text(status: StatusCode, message: &str) -> Response<ServiceBody> {
    let mut response = Response::new(full(message.as_bytes().to_vec()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn with_cors(mut response: Response<ServiceBody>) -> Response<ServiceBody> {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}

fn insert_no_cache(headers: &mut http::HeaderMap) {
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
}

fn full(body: Vec<u8>) -> ServiceBody {
    Full::new(Bytes::from(body)).boxed()
}

fn empty() -> ServiceBody {
    Empty::<Bytes>::new().boxed()
}

/// Current time as ISO-8601 UTC with milliseconds.
fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
