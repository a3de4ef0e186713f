use crate::models::marker::MarkerColor;
use crate::models::package::PackageStatus;

/// Status colors used by the package table and package markers.
pub fn package_color(status: &PackageStatus) -> MarkerColor {
    match status {
        PackageStatus::Pending => MarkerColor::Amber,
        PackageStatus::InTransit => MarkerColor::Cyan,
        PackageStatus::Delivered => MarkerColor::Green,
        PackageStatus::Cancelled => MarkerColor::Red,
        PackageStatus::Other(_) => MarkerColor::Blue,
    }
}

pub fn courier_color(is_available: bool) -> MarkerColor {
    if is_available {
        MarkerColor::Green
    } else {
        MarkerColor::Red
    }
}
