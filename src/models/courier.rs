use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::coordinate::{lenient_f64, Coordinate};

/// A delivery person as returned by `/deliveries` and `/deliveries/map`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Courier {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, alias = "lat", deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, alias = "lng", alias = "lon", deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default = "default_available", deserialize_with = "lenient_bool")]
    pub is_available: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(
        default,
        alias = "last_location_update",
        alias = "updated_at",
        deserialize_with = "lenient_timestamp"
    )]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(
        default,
        alias = "assigned_packages",
        alias = "package_ids",
        deserialize_with = "lenient_ids"
    )]
    pub assigned_package_ids: Vec<i64>,
}

impl Courier {
    /// The validated position, or `None` when the backend has no usable fix.
    pub fn coordinate(&self) -> Option<Coordinate> {
        Coordinate::from_parts(self.latitude, self.longitude)
    }

    pub fn availability_label(&self) -> &'static str {
        if self.is_available { "Disponible" } else { "Ocupado" }
    }
}

fn default_available() -> bool {
    true
}

/// MySQL-backed APIs serialize booleans as 0/1.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde_json::Value;

    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(flag)) => flag,
        Some(Value::Number(number)) => number.as_i64().map(|n| n != 0).unwrap_or(true),
        Some(Value::String(text)) => !matches!(text.as_str(), "0" | "false"),
        _ => default_available(),
    })
}

/// Unparseable timestamps are treated as missing rather than failing the whole feed.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(|value| value.as_str()).and_then(|text| {
        DateTime::parse_from_rfc3339(text)
            .map(|parsed| parsed.with_timezone(&Utc))
            .ok()
    }))
}

/// Aggregated joins yield `null` for couriers without packages; entries that
/// are not integer ids are skipped.
fn lenient_ids<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde_json::Value;

    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Number(number) => number.as_i64(),
                Value::String(text) => text.trim().parse().ok(),
                Value::Object(fields) => fields.get("id").and_then(Value::as_i64),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}
