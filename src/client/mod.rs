pub mod geocode;
pub mod geolocation;
pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::courier::Courier;
use crate::models::package::{NewPackage, Package, PackageStatus};
use crate::models::session::{Credentials, Session};

pub use geocode::{NominatimGeocoder, ReverseGeocoder, UNKNOWN_PLACE};
pub use geolocation::{LocationSource, ManualLocation};
pub use http::HttpBackend;

/// Body of `POST /deliveries/{id}/location`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationReport {
    pub delivery_person_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub is_available: bool,
    pub timestamp: DateTime<Utc>,
}

/// Acknowledgement of a location report. Backends echo the courier under
/// either `user` or `delivery_person`, or not at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationAck {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub user: Option<Courier>,
    #[serde(default)]
    pub delivery_person: Option<Courier>,
}

impl LocationAck {
    pub fn into_courier(self) -> Option<Courier> {
        self.user.or(self.delivery_person)
    }
}

/// The remote REST API the tracking core talks to.
#[async_trait]
pub trait TrackingBackend: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<Session, AppError>;

    async fn packages(&self) -> Result<Vec<Package>, AppError>;

    async fn create_package(&self, package: &NewPackage) -> Result<(), AppError>;

    async fn update_package_status(&self, id: i64, status: &PackageStatus)
        -> Result<(), AppError>;

    async fn delete_package(&self, id: i64) -> Result<(), AppError>;

    async fn couriers(&self) -> Result<Vec<Courier>, AppError>;

    /// Couriers enriched with position, status and assigned packages.
    async fn courier_positions(&self) -> Result<Vec<Courier>, AppError>;

    async fn update_courier_availability(&self, id: i64, is_available: bool)
        -> Result<(), AppError>;

    async fn report_location(&self, report: &LocationReport) -> Result<LocationAck, AppError>;
}
