//! Public IP and approximate location of the machine running the test.
//!
//! This is a single lookup against a third-party service. It is independent
//! of the speed test: no retry, and a failure only means there is nothing
//! to show.

use crate::client::HttpTransport;
use crate::errors::SpeedTestError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpInfo {
    pub ip: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub postal: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl IpInfo {
    /// "City, Region", falling back to the country when the region is
    /// unknown.
    pub fn location(&self) -> String {
        let area = self.region.as_deref().or(self.country_name.as_deref());

        match (self.city.as_deref(), area) {
            (Some(city), Some(area)) => format!("{}, {}", city, area),
            (Some(city), None) => city.to_string(),
            (None, Some(area)) => area.to_string(),
            (None, None) => "Unknown".to_string(),
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }

    pub fn map_link(&self) -> Option<String> {
        self.coordinates().map(|(lat, lon)| {
            format!("https://www.google.com/maps/search/?api=1&query={},{}", lat, lon)
        })
    }
}

/// Error payload the lookup service sends with a 200 status.
#[derive(Debug, Deserialize)]
struct ErrorReply {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    reason: Option<String>,
}

pub async fn lookup(client: &HttpTransport, url: &Url) -> Result<IpInfo, SpeedTestError> {
    let body: serde_json::Value = client.get_json(url).await?;
    let info = parse(body)?;

    debug!("IP lookup: {} ({})", info.ip, info.location());
    Ok(info)
}

/// Like [`lookup`], but logs and swallows failures.
pub async fn try_lookup(client: &HttpTransport, url: &Url) -> Option<IpInfo> {
    match lookup(client, url).await {
        Ok(info) => Some(info),
        Err(e) => {
            warn!("Failed to fetch IP info: {}", e);
            None
        }
    }
}

fn parse(body: serde_json::Value) -> Result<IpInfo, SpeedTestError> {
    if let Ok(ErrorReply { error: true, reason }) = ErrorReply::deserialize(&body) {
        return Err(SpeedTestError::api(format!(
            "IP lookup refused: {}",
            reason.unwrap_or_else(|| "no reason given".to_string())
        )));
    }

    IpInfo::deserialize(&body).map_err(|e| {
        SpeedTestError::api("IP lookup returned an unexpected body").with_source(e)
    })
}
