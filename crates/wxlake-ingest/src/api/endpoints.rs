//! Data categories and request URL builders

use crate::config::ApiConfig;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use wxlake_common::{Result, Timestamp, WxError};

use super::types::Coordinates;

/// Query parameter that carries the API secret
pub const SECRET_PARAM: &str = "appid";

/// A data category served by its own history endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Weather,
    AirPollution,
}

impl Endpoint {
    pub fn all() -> &'static [Endpoint] {
        &[Endpoint::Weather, Endpoint::AirPollution]
    }

    /// Name used for selection and as the top-level storage partition
    pub fn name(self) -> &'static str {
        match self {
            Endpoint::Weather => "weather",
            Endpoint::AirPollution => "air_pollution",
        }
    }

    /// Value of the `_source` stamp
    pub fn source_tag(self) -> String {
        format!("openweather/{}", self.name())
    }

    pub fn base_url(self, config: &ApiConfig) -> &str {
        match self {
            Endpoint::Weather => &config.history_url,
            Endpoint::AirPollution => &config.air_pollution_url,
        }
    }

    /// Category-specific query parameters
    pub fn extra_params(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Endpoint::Weather => &[("type", "hour")],
            Endpoint::AirPollution => &[],
        }
    }

    /// Resolve a selection list; `all` expands to every category, duplicates collapse
    pub fn parse_selection<S: AsRef<str>>(names: &[S]) -> Result<Vec<Endpoint>> {
        let mut selected = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.eq_ignore_ascii_case("all") {
                selected.extend_from_slice(Endpoint::all());
            } else {
                selected.push(name.parse()?);
            }
        }
        selected.sort();
        selected.dedup();

        if selected.is_empty() {
            return Err(WxError::config("No endpoints selected"));
        }
        Ok(selected)
    }
}

impl std::str::FromStr for Endpoint {
    type Err = WxError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weather" => Ok(Endpoint::Weather),
            "air_pollution" | "air-pollution" => Ok(Endpoint::AirPollution),
            _ => Err(WxError::config(format!(
                "Unknown endpoint '{}'. Expected one of: all, weather, air_pollution",
                s
            ))),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Build a history page URL
pub fn history_url(
    config: &ApiConfig,
    endpoint: Endpoint,
    coordinates: Coordinates,
    start: Timestamp,
    end: Timestamp,
) -> Result<Url> {
    let mut url = parse_base(endpoint.base_url(config))?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair(SECRET_PARAM, &config.secret_key)
            .append_pair("start", &start.unix().to_string())
            .append_pair("end", &end.unix().to_string())
            .append_pair("lat", &coordinates.lat.to_string())
            .append_pair("lon", &coordinates.lon.to_string());
        for (key, value) in endpoint.extra_params() {
            query.append_pair(key, value);
        }
    }
    Ok(url)
}

/// Build a geocoding lookup URL
pub fn geocoding_url(config: &ApiConfig, query: &str) -> Result<Url> {
    let mut url = parse_base(&config.geocoding_url)?;
    url.query_pairs_mut()
        .append_pair("q", query)
        .append_pair("limit", "1")
        .append_pair(SECRET_PARAM, &config.secret_key);
    Ok(url)
}

/// Render a URL for logs with the secret replaced
pub fn redacted(url: &Url) -> String {
    let mut shown = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if k == SECRET_PARAM { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), value)
        })
        .collect();
    shown.query_pairs_mut().clear().extend_pairs(pairs);
    shown.to_string()
}

fn parse_base(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| WxError::config(format!("Invalid API URL '{}': {}", raw, e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn coords() -> Coordinates {
        Coordinates { lat: 51.5, lon: -0.12 }
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(Endpoint::parse_selection(&["all"]).unwrap(), Endpoint::all());
        assert_eq!(
            Endpoint::parse_selection(&["air_pollution", "weather", "weather"]).unwrap(),
            vec![Endpoint::Weather, Endpoint::AirPollution]
        );
        assert!(matches!(
            Endpoint::parse_selection(&["uv_index"]).unwrap_err(),
            WxError::Config(_)
        ));
        assert!(Endpoint::parse_selection::<&str>(&[]).is_err());
    }

    #[test]
    fn test_history_url_carries_params() {
        let config = ApiConfig::new("secret");
        let start = Timestamp::parse("2025-01-01").unwrap();
        let end = Timestamp::parse("2025-01-02").unwrap();

        let url = history_url(&config, Endpoint::Weather, coords(), start, end).unwrap();
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(url.as_str().starts_with(crate::config::DEFAULT_HISTORY_URL));
        assert!(query.contains(&("appid".to_string(), "secret".to_string())));
        assert!(query.contains(&("start".to_string(), "1735689600".to_string())));
        assert!(query.contains(&("end".to_string(), "1735776000".to_string())));
        assert!(query.contains(&("type".to_string(), "hour".to_string())));

        let air = history_url(&config, Endpoint::AirPollution, coords(), start, end).unwrap();
        assert!(!air.as_str().contains("type=hour"));
    }

    #[test]
    fn test_redacted_hides_secret() {
        let config = ApiConfig::new("secret");
        let url = geocoding_url(&config, "London,GB").unwrap();
        let shown = redacted(&url);
        assert!(!shown.contains("secret"));
        assert!(shown.contains("appid=***"));
        assert!(shown.contains("limit=1"));
    }

    #[test]
    fn test_source_tag() {
        assert_eq!(Endpoint::AirPollution.source_tag(), "openweather/air_pollution");
    }
}
