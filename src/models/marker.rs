use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::coordinate::Coordinate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Courier,
    Package,
    Device,
    Landmark,
}

impl MarkerKind {
    pub fn label(self) -> &'static str {
        match self {
            MarkerKind::Courier => "courier",
            MarkerKind::Package => "package",
            MarkerKind::Device => "device",
            MarkerKind::Landmark => "landmark",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerKey {
    pub kind: MarkerKind,
    pub id: i64,
}

impl MarkerKey {
    pub fn new(kind: MarkerKind, id: i64) -> Self {
        Self { kind, id }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarkerColor {
    Amber,
    Cyan,
    Green,
    Red,
    Blue,
}

impl MarkerColor {
    pub fn hex(self) -> &'static str {
        match self {
            MarkerColor::Amber => "#ffc107",
            MarkerColor::Cyan => "#17a2b8",
            MarkerColor::Green => "#28a745",
            MarkerColor::Red => "#dc3545",
            MarkerColor::Blue => "#007bff",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Marker {
    pub key: MarkerKey,
    pub coordinate: Coordinate,
    pub label: String,
    /// Raw coordinate text until the reverse-geocoder answers.
    pub place: String,
    pub color: MarkerColor,
    pub popup_open: bool,
    pub revision: u64,
    pub observed_at: Option<DateTime<Utc>>,
}
