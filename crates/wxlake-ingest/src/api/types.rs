//! API response types

use serde::{Deserialize, Serialize};
use wxlake_common::{Record, Result, WxError};

/// A latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// One hit from the geocoding endpoint; extra fields are ignored
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingHit {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl GeocodingHit {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates { lat: self.lat, lon: self.lon }
    }
}

/// Extract the `list` array of a history page as records
pub fn page_records(body: serde_json::Value) -> Result<Vec<Record>> {
    let serde_json::Value::Object(mut page) = body else {
        return Err(WxError::parse("History response is not a JSON object"));
    };

    let list = match page.remove("list") {
        Some(serde_json::Value::Array(list)) => list,
        Some(_) => return Err(WxError::parse("History response 'list' is not an array")),
        None => return Err(WxError::parse("History response has no 'list' array")),
    };

    list.into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            serde_json::Value::Object(record) => Ok(record),
            other => Err(WxError::parse(format!(
                "History record {} is not an object: {}",
                index, other
            ))),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_records() {
        let records = page_records(json!({"cnt": 2, "list": [{"dt": 1}, {"dt": 2}]})).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["dt"], json!(2));
    }

    #[test]
    fn test_page_without_list_is_parse_error() {
        let err = page_records(json!({"message": "nope"})).unwrap_err();
        assert!(matches!(err, WxError::Parse(_)));
        assert!(page_records(json!({"list": [1]})).is_err());
        assert!(page_records(json!([])).is_err());
    }

    #[test]
    fn test_geocoding_hit_ignores_extra_fields() {
        let hits: Vec<GeocodingHit> = serde_json::from_value(json!([
            {"name": "Oslo", "lat": 59.9, "lon": 10.7, "country": "NO", "local_names": {}}
        ]))
        .unwrap();
        assert_eq!(hits[0].coordinates(), Coordinates { lat: 59.9, lon: 10.7 });
    }
}
