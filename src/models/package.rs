use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::coordinate::{lenient_f64, Coordinate};

/// Delivery status as stored by the backend. Unknown values are kept verbatim
/// so a status added upstream never breaks decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PackageStatus {
    Pending,
    InTransit,
    Delivered,
    Cancelled,
    Other(String),
}

impl PackageStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PackageStatus::Pending => "pending",
            PackageStatus::InTransit => "in_transit",
            PackageStatus::Delivered => "delivered",
            PackageStatus::Cancelled => "cancelled",
            PackageStatus::Other(raw) => raw,
        }
    }

    /// Label shown in the package table.
    pub fn display_label(&self) -> &str {
        match self {
            PackageStatus::Pending => "Pendiente",
            PackageStatus::InTransit => "En tránsito",
            PackageStatus::Delivered => "Entregado",
            PackageStatus::Cancelled => "Cancelado",
            PackageStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for PackageStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "pending" => PackageStatus::Pending,
            "in_transit" => PackageStatus::InTransit,
            "delivered" => PackageStatus::Delivered,
            "cancelled" => PackageStatus::Cancelled,
            _ => PackageStatus::Other(raw),
        }
    }
}

impl From<&str> for PackageStatus {
    fn from(raw: &str) -> Self {
        PackageStatus::from(raw.to_string())
    }
}

impl From<PackageStatus> for String {
    fn from(status: PackageStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Package {
    pub id: i64,
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub address: String,
    pub status: PackageStatus,
    #[serde(default)]
    pub delivery_person_id: Option<i64>,
    #[serde(default)]
    pub delivery_person_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "lat", deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, alias = "lng", alias = "lon", deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
}

impl Package {
    pub fn coordinate(&self) -> Option<Coordinate> {
        Coordinate::from_parts(self.latitude, self.longitude)
    }

    pub fn courier_label(&self) -> &str {
        self.delivery_person_name.as_deref().unwrap_or("No asignado")
    }
}

/// Body for `POST /packages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPackage {
    pub recipient: String,
    pub address: String,
    #[serde(default)]
    pub delivery_person_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}
