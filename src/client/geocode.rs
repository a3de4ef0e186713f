use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::coordinate::Coordinate;

/// Label used whenever a lookup fails.
pub const UNKNOWN_PLACE: &str = "Unknown location";

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn lookup(&self, coordinate: Coordinate) -> Result<String, AppError>;
}

#[derive(Deserialize)]
struct NominatimResponse {
    display_name: Option<String>,
}

/// Nominatim-compatible reverse geocoder. Results are cached per ~1 m cell
/// since couriers idle in place between reports.
pub struct NominatimGeocoder {
    client: Client,
    url: String,
    cache: DashMap<(i64, i64), String>,
}

impl NominatimGeocoder {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("delivery-tracker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| AppError::Internal(format!("failed to create geocoder client: {err}")))?;

        Ok(Self {
            client,
            url: url.to_string(),
            cache: DashMap::new(),
        })
    }
}

fn cache_key(coordinate: &Coordinate) -> (i64, i64) {
    (
        (coordinate.latitude * 100_000.0).round() as i64,
        (coordinate.longitude * 100_000.0).round() as i64,
    )
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn lookup(&self, coordinate: Coordinate) -> Result<String, AppError> {
        let key = cache_key(&coordinate);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.value().clone());
        }

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", coordinate.latitude.to_string()),
                ("lon", coordinate.longitude.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body = response.json::<NominatimResponse>().await?;
        let label = body
            .display_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| AppError::NotFound(format!("no place known at {coordinate}")))?;

        self.cache.insert(key, label.clone());
        Ok(label)
    }
}
