//! In-memory collaborators shared by unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{LocationAck, LocationReport, LocationSource, TrackingBackend};
use crate::error::AppError;
use crate::models::coordinate::Coordinate;
use crate::models::courier::Courier;
use crate::models::package::{NewPackage, Package, PackageStatus};
use crate::models::session::{Credentials, Role, Session, User};

#[derive(Default)]
struct FakeState {
    positions: Vec<Courier>,
    packages: Vec<Package>,
    reports: Vec<LocationReport>,
    status_updates: Vec<(i64, PackageStatus)>,
    deleted: Vec<i64>,
    created: Vec<NewPackage>,
    availability_updates: Vec<(i64, bool)>,
    poll_calls: usize,
    fail_polls: bool,
    fail_reports: bool,
    fail_availability: bool,
    echo_courier: bool,
    poll_delay: Option<Duration>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn set_positions(&self, positions: Vec<Courier>) {
        self.state.lock().unwrap().positions = positions;
    }

    pub fn set_packages(&self, packages: Vec<Package>) {
        self.state.lock().unwrap().packages = packages;
    }

    pub fn fail_polls(&self, fail: bool) {
        self.state.lock().unwrap().fail_polls = fail;
    }

    pub fn fail_reports(&self, fail: bool) {
        self.state.lock().unwrap().fail_reports = fail;
    }

    pub fn fail_availability(&self, fail: bool) {
        self.state.lock().unwrap().fail_availability = fail;
    }

    pub fn echo_courier(&self, echo: bool) {
        self.state.lock().unwrap().echo_courier = echo;
    }

    pub fn delay_polls(&self, delay: Duration) {
        self.state.lock().unwrap().poll_delay = Some(delay);
    }

    pub fn reports(&self) -> Vec<LocationReport> {
        self.state.lock().unwrap().reports.clone()
    }

    pub fn poll_calls(&self) -> usize {
        self.state.lock().unwrap().poll_calls
    }

    pub fn status_updates(&self) -> Vec<(i64, PackageStatus)> {
        self.state.lock().unwrap().status_updates.clone()
    }

    pub fn deleted(&self) -> Vec<i64> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn created(&self) -> Vec<NewPackage> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn availability_updates(&self) -> Vec<(i64, bool)> {
        self.state.lock().unwrap().availability_updates.clone()
    }
}

#[async_trait]
impl TrackingBackend for FakeBackend {
    async fn login(&self, credentials: &Credentials) -> Result<Session, AppError> {
        let role = match credentials.email.as_str() {
            "admin@delivery.com" => Role::Admin,
            "juan@delivery.com" => Role::Delivery,
            _ => return Err(AppError::Unauthorized("Credenciales incorrectas".to_string())),
        };

        Ok(Session {
            user: User {
                id: if role == Role::Admin { 1 } else { 7 },
                role,
                name: None,
                email: Some(credentials.email.clone()),
            },
        })
    }

    async fn packages(&self) -> Result<Vec<Package>, AppError> {
        Ok(self.state.lock().unwrap().packages.clone())
    }

    async fn create_package(&self, package: &NewPackage) -> Result<(), AppError> {
        self.state.lock().unwrap().created.push(package.clone());
        Ok(())
    }

    async fn update_package_status(
        &self,
        id: i64,
        status: &PackageStatus,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.status_updates.push((id, status.clone()));
        if let Some(package) = state.packages.iter_mut().find(|package| package.id == id) {
            package.status = status.clone();
        }
        Ok(())
    }

    async fn delete_package(&self, id: i64) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.deleted.push(id);
        state.packages.retain(|package| package.id != id);
        Ok(())
    }

    async fn couriers(&self) -> Result<Vec<Courier>, AppError> {
        Ok(self.state.lock().unwrap().positions.clone())
    }

    async fn courier_positions(&self) -> Result<Vec<Courier>, AppError> {
        let (delay, fail, positions) = {
            let mut state = self.state.lock().unwrap();
            state.poll_calls += 1;
            (state.poll_delay, state.fail_polls, state.positions.clone())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(AppError::Network("connection refused".to_string()));
        }
        Ok(positions)
    }

    async fn update_courier_availability(
        &self,
        id: i64,
        is_available: bool,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_availability {
            return Err(AppError::Backend {
                status: 500,
                message: "status update rejected".to_string(),
            });
        }
        state.availability_updates.push((id, is_available));
        Ok(())
    }

    async fn report_location(&self, report: &LocationReport) -> Result<LocationAck, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_reports {
            return Err(AppError::Network("connection reset".to_string()));
        }
        state.reports.push(report.clone());

        if !state.echo_courier {
            return Ok(LocationAck::default());
        }

        Ok(LocationAck {
            success: Some(true),
            user: Some(courier(
                report.delivery_person_id,
                "Juan",
                Some((report.latitude, report.longitude)),
            )),
            delivery_person: None,
        })
    }
}

/// A location source that never answers.
pub struct StalledLocation;

#[async_trait]
impl LocationSource for StalledLocation {
    async fn current_position(&self) -> Result<Coordinate, AppError> {
        std::future::pending().await
    }
}

pub fn courier(id: i64, name: &str, position: Option<(f64, f64)>) -> Courier {
    Courier {
        id,
        name: name.to_string(),
        phone: Some("442-000-0000".to_string()),
        latitude: position.map(|(lat, _)| lat),
        longitude: position.map(|(_, lng)| lng),
        is_available: true,
        status: None,
        last_update: None,
        assigned_package_ids: Vec::new(),
    }
}

pub fn package(id: i64, status: &str, courier_id: Option<i64>, position: Option<(f64, f64)>) -> Package {
    Package {
        id,
        recipient: format!("Recipient {id}"),
        address: format!("Calle {id}"),
        status: PackageStatus::from(status),
        delivery_person_id: courier_id,
        delivery_person_name: courier_id.map(|id| format!("Courier {id}")),
        created_at: None,
        latitude: position.map(|(lat, _)| lat),
        longitude: position.map(|(_, lng)| lng),
    }
}
