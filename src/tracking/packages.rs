use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::client::TrackingBackend;
use crate::error::AppError;
use crate::map::color::package_color;
use crate::map::{MapView, MarkerUpdate};
use crate::models::marker::MarkerKind;
use crate::models::package::{NewPackage, Package, PackageStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageScope {
    All,
    AssignedTo(i64),
}

/// The package table: a snapshot of packages plus their markers.
pub struct PackageDesk {
    backend: Arc<dyn TrackingBackend>,
    map: Option<Arc<MapView>>,
    scope: PackageScope,
    snapshot: Mutex<Arc<Vec<Package>>>,
}

impl PackageDesk {
    pub fn new(backend: Arc<dyn TrackingBackend>, scope: PackageScope) -> Self {
        Self {
            backend,
            map: None,
            scope,
            snapshot: Mutex::new(Arc::new(Vec::new())),
        }
    }

    pub fn with_map(mut self, map: Arc<MapView>) -> Self {
        self.map = Some(map);
        self
    }

    pub fn scope(&self) -> PackageScope {
        self.scope
    }

    pub fn packages(&self) -> Arc<Vec<Package>> {
        self.snapshot
            .lock()
            .map(|snapshot| snapshot.clone())
            .unwrap_or_default()
    }

    /// Reloads packages, replaces the snapshot and syncs package markers.
    /// Unlike couriers, packages that disappear lose their marker.
    pub async fn refresh(&self) -> Result<Arc<Vec<Package>>, AppError> {
        let packages: Vec<Package> = self
            .backend
            .packages()
            .await
            .inspect_err(|err| warn!(error = %err, "failed to load packages"))?
            .into_iter()
            .filter(|package| match self.scope {
                PackageScope::All => true,
                PackageScope::AssignedTo(courier_id) => {
                    package.delivery_person_id == Some(courier_id)
                }
            })
            .collect();

        let packages = Arc::new(packages);
        if let Ok(mut snapshot) = self.snapshot.lock() {
            *snapshot = packages.clone();
        }
        self.sync_markers(&packages);

        Ok(packages)
    }

    pub async fn set_status(&self, id: i64, status: PackageStatus) -> Result<(), AppError> {
        self.backend.update_package_status(id, &status).await?;
        info!(package_id = id, status = %status, "package status updated");
        self.refresh().await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        self.backend.delete_package(id).await?;
        if let Some(map) = &self.map {
            map.remove_marker(MarkerKind::Package, id);
        }
        info!(package_id = id, "package deleted");
        self.refresh().await?;
        Ok(())
    }

    pub async fn create(&self, package: NewPackage) -> Result<(), AppError> {
        if package.recipient.trim().is_empty() || package.address.trim().is_empty() {
            return Err(AppError::BadRequest(
                "recipient and address are required".to_string(),
            ));
        }

        self.backend.create_package(&package).await?;
        info!(recipient = %package.recipient, "package created");
        self.refresh().await?;
        Ok(())
    }

    fn sync_markers(&self, packages: &[Package]) {
        let Some(map) = &self.map else {
            return;
        };

        let mut present = HashSet::new();
        for package in packages {
            let Some(coordinate) = package.coordinate() else {
                continue;
            };
            present.insert(package.id);

            let label = format!(
                "Paquete #{} · {} · {} · {}",
                package.id,
                package.recipient,
                package.address,
                package.status.display_label()
            );
            map.apply(
                MarkerUpdate::new(MarkerKind::Package, package.id, coordinate, label)
                    .color(package_color(&package.status)),
            );
        }

        for id in map.ids_of(MarkerKind::Package) {
            if !present.contains(&id) {
                map.remove_marker(MarkerKind::Package, id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{PackageDesk, PackageScope};
    use crate::error::AppError;
    use crate::map::MapView;
    use crate::models::coordinate::Coordinate;
    use crate::models::marker::{MarkerColor, MarkerKind};
    use crate::models::package::{NewPackage, PackageStatus};
    use crate::testing::{package, FakeBackend};

    fn map() -> Arc<MapView> {
        Arc::new(MapView::new(
            Coordinate::new(20.65636, -100.40507).unwrap(),
            13,
            64,
        ))
    }

    #[tokio::test]
    async fn courier_scope_keeps_only_assigned_packages() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_packages(vec![
            package(1, "pending", Some(7), None),
            package(2, "pending", Some(8), None),
            package(3, "delivered", None, None),
        ]);
        let desk = PackageDesk::new(backend, PackageScope::AssignedTo(7));

        let packages = desk.refresh().await.unwrap();

        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].id, 1);
    }

    #[tokio::test]
    async fn markers_follow_status_and_presence() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_packages(vec![
            package(1, "pending", Some(7), Some((20.66, -100.41))),
            package(2, "in_transit", Some(7), Some((20.65, -100.40))),
            package(3, "delivered", Some(7), None),
        ]);
        let map = map();
        let desk = PackageDesk::new(backend.clone(), PackageScope::All).with_map(map.clone());

        desk.refresh().await.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.marker(MarkerKind::Package, 1).unwrap().color, MarkerColor::Amber);
        assert_eq!(map.marker(MarkerKind::Package, 2).unwrap().color, MarkerColor::Cyan);

        desk.set_status(1, PackageStatus::Delivered).await.unwrap();
        assert_eq!(map.marker(MarkerKind::Package, 1).unwrap().color, MarkerColor::Green);
        assert_eq!(backend.status_updates(), vec![(1, PackageStatus::Delivered)]);

        backend.set_packages(vec![package(1, "delivered", Some(7), Some((20.66, -100.41)))]);
        desk.refresh().await.unwrap();
        assert!(map.marker(MarkerKind::Package, 2).is_none());
        assert_eq!(map.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_marker_and_row() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_packages(vec![package(4, "cancelled", None, Some((20.66, -100.41)))]);
        let map = map();
        let desk = PackageDesk::new(backend.clone(), PackageScope::All).with_map(map.clone());
        desk.refresh().await.unwrap();

        desk.delete(4).await.unwrap();

        assert!(map.is_empty());
        assert!(desk.packages().is_empty());
        assert_eq!(backend.deleted(), vec![4]);
    }

    #[tokio::test]
    async fn create_rejects_blank_fields() {
        let backend = Arc::new(FakeBackend::default());
        let desk = PackageDesk::new(backend.clone(), PackageScope::All);

        let result = desk
            .create(NewPackage {
                recipient: " ".to_string(),
                address: "Calle 5".to_string(),
                delivery_person_id: None,
                latitude: None,
                longitude: None,
            })
            .await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(backend.created().is_empty());
    }
}
