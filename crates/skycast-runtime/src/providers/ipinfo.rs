//! ipinfo.io IP location lookup.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::net::IpAddr;

use super::{endpoint, get_json, IpLocation, IpLookupProvider, UpstreamError};

pub const DEFAULT_BASE_URL: &str = "https://ipinfo.io";

/// ipinfo.io provider. Works keyless within the free rate limit.
#[derive(Debug, Clone)]
pub struct IpInfoProvider {
    client: reqwest::Client,
    base_url: String,
}

impl IpInfoProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Set custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

fn text(data: &JsonValue, key: &str) -> Option<String> {
    data.get(key)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// `"40.7143,-74.0060"` into a pair.
fn parse_loc(loc: &str) -> Option<(f64, f64)> {
    let (lat, lon) = loc.split_once(',')?;
    Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}

pub(crate) fn decode(data: JsonValue) -> Option<IpLocation> {
    if data.get("bogon").and_then(JsonValue::as_bool) == Some(true) {
        return None;
    }

    let coords = text(&data, "loc").as_deref().and_then(parse_loc);
    let country_code = text(&data, "country");

    Some(IpLocation {
        latitude: coords.map(|(lat, _)| lat),
        longitude: coords.map(|(_, lon)| lon),
        city: text(&data, "city"),
        state: text(&data, "region"),
        country: text(&data, "country_name").or_else(|| country_code.clone()),
        country_code,
        data,
    })
}

#[async_trait]
impl IpLookupProvider for IpInfoProvider {
    async fn lookup(&self, ip: IpAddr) -> Result<Option<IpLocation>, UpstreamError> {
        let ip = ip.to_string();
        let url = endpoint(&self.base_url, &[ip.as_str(), "json"])?;
        let data: JsonValue = get_json(self.client.get(url)).await?;
        Ok(decode(data))
    }

    fn name(&self) -> &str {
        "ipinfo"
    }
}
