use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::models::coordinate::Coordinate;

const DEFAULT_API_URL: &str = "http://localhost:3000/api";
const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/reverse";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub http_port: u16,
    pub log_level: String,
    pub report_interval: Duration,
    pub poll_interval: Duration,
    pub geolocation_timeout: Duration,
    pub request_timeout: Duration,
    pub focus_zoom: u8,
    pub home: Coordinate,
    pub home_label: String,
    pub geocoder_url: String,
    pub email: String,
    pub password: String,
    pub device_position: Option<Coordinate>,
    pub event_buffer_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let home = Coordinate::new(
            parse_or_default("HOME_LATITUDE", 20.65636)?,
            parse_or_default("HOME_LONGITUDE", -100.40507)?,
        )?;

        let device_position = match (
            parse_optional::<f64>("DEVICE_LATITUDE")?,
            parse_optional::<f64>("DEVICE_LONGITUDE")?,
        ) {
            (Some(lat), Some(lng)) => Some(Coordinate::new(lat, lng)?),
            (None, None) => None,
            _ => {
                return Err(AppError::Internal(
                    "DEVICE_LATITUDE and DEVICE_LONGITUDE must be set together".to_string(),
                ));
            }
        };

        Ok(Self {
            api_url: string_or_default("TRACKER_API_URL", DEFAULT_API_URL),
            http_port: parse_or_default("HTTP_PORT", 8080)?,
            log_level: string_or_default("LOG_LEVEL", "info"),
            report_interval: millis_or_default("REPORT_INTERVAL_MS", 10_000)?,
            poll_interval: millis_or_default("POLL_INTERVAL_MS", 10_000)?,
            geolocation_timeout: millis_or_default("GEOLOCATION_TIMEOUT_MS", 5_000)?,
            request_timeout: millis_or_default("REQUEST_TIMEOUT_MS", 10_000)?,
            focus_zoom: parse_or_default("FOCUS_ZOOM", 15)?,
            home,
            home_label: string_or_default("HOME_LABEL", "Universidad Tecnológica de Querétaro (UTEQ)"),
            geocoder_url: string_or_default("GEOCODER_URL", DEFAULT_GEOCODER_URL),
            email: string_or_default("TRACKER_EMAIL", ""),
            password: string_or_default("TRACKER_PASSWORD", ""),
            device_position,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
        })
    }
}

fn string_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn millis_or_default(key: &str, default: u64) -> Result<Duration, AppError> {
    let millis: u64 = parse_or_default(key, default)?;
    if millis == 0 {
        return Err(AppError::Internal(format!("invalid {key}: must be > 0")));
    }
    Ok(Duration::from_millis(millis))
}

fn parse_optional<T>(key: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(None),
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional(key)?.unwrap_or(default))
}
