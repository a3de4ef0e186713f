use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::client::{LocationReport, LocationSource, TrackingBackend};
use crate::error::AppError;
use crate::map::color::courier_color;
use crate::map::{MapView, MarkerUpdate};
use crate::models::coordinate::Coordinate;
use crate::models::courier::Courier;
use crate::models::marker::MarkerKind;
use crate::observability::metrics::Metrics;
use crate::tracking::schedule::PeriodicTask;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    Device,
    LastKnown,
    Manual,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReportOutcome {
    /// Location sharing is off; nothing was sent.
    Disabled,
    Sent {
        coordinate: Coordinate,
        source: PositionSource,
        is_available: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReporterStatus {
    pub courier_id: i64,
    pub is_available: bool,
    pub is_location_sharing: bool,
    pub is_running: bool,
    pub last_known: Coordinate,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub courier: Option<Courier>,
}

struct ReporterState {
    is_available: bool,
    last_known: Coordinate,
    last_sent_at: Option<DateTime<Utc>>,
    courier: Option<Courier>,
}

/// Courier-side loop that keeps the backend's view of this device fresh.
pub struct LocationReporter {
    courier_id: i64,
    backend: Arc<dyn TrackingBackend>,
    location: Arc<dyn LocationSource>,
    map: Option<Arc<MapView>>,
    geolocation_timeout: Duration,
    default_interval: Duration,
    sharing: AtomicBool,
    state: Mutex<ReporterState>,
    task: PeriodicTask,
    metrics: Option<Metrics>,
}

impl LocationReporter {
    pub fn new(
        courier_id: i64,
        backend: Arc<dyn TrackingBackend>,
        location: Arc<dyn LocationSource>,
        fallback: Coordinate,
    ) -> Self {
        Self {
            courier_id,
            backend,
            location,
            map: None,
            geolocation_timeout: Duration::from_secs(5),
            default_interval: Duration::from_secs(10),
            sharing: AtomicBool::new(true),
            state: Mutex::new(ReporterState {
                is_available: true,
                last_known: fallback,
                last_sent_at: None,
                courier: None,
            }),
            task: PeriodicTask::new("location-reporter"),
            metrics: None,
        }
    }

    pub fn with_map(mut self, map: Arc<MapView>) -> Self {
        self.map = Some(map);
        self
    }

    pub fn with_timing(mut self, default_interval: Duration, geolocation_timeout: Duration) -> Self {
        self.default_interval = default_interval;
        self.geolocation_timeout = geolocation_timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.task = PeriodicTask::new("location-reporter").with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    /// Seeds local state from the backend's record of this courier.
    pub fn adopt(&self, courier: Courier) {
        if let Ok(mut state) = self.state.lock() {
            state.is_available = courier.is_available;
            if let Some(coordinate) = courier.coordinate() {
                state.last_known = coordinate;
            }
            state.courier = Some(courier);
        }
    }

    pub fn courier_id(&self) -> i64 {
        self.courier_id
    }

    pub fn start_reporting(self: &Arc<Self>, period: Duration) {
        let reporter = Arc::clone(self);
        self.task.start(period, move || {
            let reporter = reporter.clone();
            async move {
                if let Err(err) = reporter.report_now().await {
                    warn!(courier_id = reporter.courier_id, error = %err, "location report failed");
                }
            }
        });
    }

    pub fn stop_reporting(&self) {
        self.task.stop();
    }

    pub fn is_location_sharing(&self) -> bool {
        self.sharing.load(Ordering::SeqCst)
    }

    /// Turns sharing on (restarting the timer) or off (stopping it).
    pub fn set_location_sharing(self: &Arc<Self>, enabled: bool) {
        self.sharing.store(enabled, Ordering::SeqCst);

        if enabled {
            let period = self.task.period().unwrap_or(self.default_interval);
            self.start_reporting(period);
        } else {
            self.stop_reporting();
        }

        info!(courier_id = self.courier_id, enabled, "location sharing toggled");
    }

    pub fn is_available(&self) -> bool {
        self.state.lock().map(|state| state.is_available).unwrap_or(true)
    }

    /// Stores the new flag, pushes it to the courier's status record and
    /// sends exactly one report carrying it. A failed status update is logged
    /// and does not block the report.
    pub async fn set_available(&self, is_available: bool) -> Result<ReportOutcome, AppError> {
        self.with_state(|state| state.is_available = is_available)?;
        info!(courier_id = self.courier_id, is_available, "availability changed");

        if let Err(err) = self
            .backend
            .update_courier_availability(self.courier_id, is_available)
            .await
        {
            warn!(courier_id = self.courier_id, error = %err, "availability status update failed");
        }

        self.report_now().await
    }

    pub async fn toggle_availability(&self) -> Result<ReportOutcome, AppError> {
        let flipped = !self.is_available();
        self.set_available(flipped).await
    }

    /// Manual relocation: the given coordinate becomes the last known
    /// position and is reported immediately.
    pub async fn relocate(&self, coordinate: Coordinate) -> Result<ReportOutcome, AppError> {
        self.with_state(|state| state.last_known = coordinate)?;
        if !self.is_location_sharing() {
            self.place_device_marker(coordinate);
            return Ok(ReportOutcome::Disabled);
        }
        self.send(coordinate, PositionSource::Manual).await
    }

    /// One report, independent of the timer.
    pub async fn report_now(&self) -> Result<ReportOutcome, AppError> {
        if !self.is_location_sharing() {
            debug!(courier_id = self.courier_id, "location sharing disabled; not reporting");
            self.count("skipped");
            return Ok(ReportOutcome::Disabled);
        }

        let (coordinate, source) = self.acquire_position().await?;
        self.send(coordinate, source).await
    }

    /// A report requested outside the timer. Refused while another report
    /// is in flight.
    pub async fn try_report(&self) -> Result<ReportOutcome, AppError> {
        let Some(_run) = self.task.try_claim() else {
            return Err(AppError::Conflict("a location report is already in flight".to_string()));
        };
        self.report_now().await
    }

    pub fn status(&self) -> Result<ReporterStatus, AppError> {
        let state = self
            .state
            .lock()
            .map_err(|_| AppError::Internal("reporter state poisoned".to_string()))?;

        Ok(ReporterStatus {
            courier_id: self.courier_id,
            is_available: state.is_available,
            is_location_sharing: self.is_location_sharing(),
            is_running: self.task.is_running(),
            last_known: state.last_known,
            last_sent_at: state.last_sent_at,
            courier: state.courier.clone(),
        })
    }

    pub fn courier(&self) -> Option<Courier> {
        self.state.lock().ok().and_then(|state| state.courier.clone())
    }

    async fn acquire_position(&self) -> Result<(Coordinate, PositionSource), AppError> {
        match timeout(self.geolocation_timeout, self.location.current_position()).await {
            Ok(Ok(coordinate)) => {
                self.with_state(|state| state.last_known = coordinate)?;
                Ok((coordinate, PositionSource::Device))
            }
            Ok(Err(err)) => {
                debug!(courier_id = self.courier_id, error = %err, "using last known position");
                Ok((self.last_known()?, PositionSource::LastKnown))
            }
            Err(_) => {
                debug!(
                    courier_id = self.courier_id,
                    timeout_ms = self.geolocation_timeout.as_millis() as u64,
                    "geolocation timed out; using last known position"
                );
                Ok((self.last_known()?, PositionSource::LastKnown))
            }
        }
    }

    async fn send(
        &self,
        coordinate: Coordinate,
        source: PositionSource,
    ) -> Result<ReportOutcome, AppError> {
        let is_available = self.is_available();
        let report = LocationReport {
            delivery_person_id: self.courier_id,
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            is_available,
            timestamp: Utc::now(),
        };

        self.place_device_marker(coordinate);

        let ack = match self.backend.report_location(&report).await {
            Ok(ack) => ack,
            Err(err) => {
                self.count("error");
                return Err(err);
            }
        };

        self.with_state(|state| {
            state.last_sent_at = Some(report.timestamp);
            if let Some(courier) = ack.into_courier() {
                state.courier = Some(courier);
            }
        })?;

        self.count(match source {
            PositionSource::LastKnown => "fallback",
            PositionSource::Device | PositionSource::Manual => "sent",
        });
        info!(
            courier_id = self.courier_id,
            latitude = coordinate.latitude,
            longitude = coordinate.longitude,
            is_available,
            "location shared"
        );

        Ok(ReportOutcome::Sent {
            coordinate,
            source,
            is_available,
        })
    }

    fn place_device_marker(&self, coordinate: Coordinate) {
        let Some(map) = &self.map else {
            return;
        };

        let is_available = self.is_available();
        let name = self
            .courier()
            .map(|courier| courier.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "Mi Ubicación".to_string());
        let label = format!(
            "{name} · {}",
            if is_available { "Disponible" } else { "Ocupado" }
        );

        map.apply(
            MarkerUpdate::new(MarkerKind::Device, self.courier_id, coordinate, label)
                .color(courier_color(is_available)),
        );
    }

    fn last_known(&self) -> Result<Coordinate, AppError> {
        self.state
            .lock()
            .map(|state| state.last_known)
            .map_err(|_| AppError::Internal("reporter state poisoned".to_string()))
    }

    fn with_state<R>(&self, apply: impl FnOnce(&mut ReporterState) -> R) -> Result<R, AppError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| AppError::Internal("reporter state poisoned".to_string()))?;
        Ok(apply(&mut state))
    }

    fn count(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics
                .location_reports_total
                .with_label_values(&[outcome])
                .inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{LocationReporter, PositionSource, ReportOutcome};
    use crate::client::ManualLocation;
    use crate::error::AppError;
    use crate::map::MapView;
    use crate::models::coordinate::Coordinate;
    use crate::models::marker::{MarkerColor, MarkerKind};
    use crate::testing::{courier, FakeBackend, StalledLocation};

    fn home() -> Coordinate {
        Coordinate::new(20.65636, -100.40507).unwrap()
    }

    fn reporter(backend: Arc<FakeBackend>, fix: Option<Coordinate>) -> Arc<LocationReporter> {
        Arc::new(LocationReporter::new(
            7,
            backend,
            Arc::new(ManualLocation::new(fix)),
            home(),
        ))
    }

    #[tokio::test]
    async fn sharing_disabled_sends_nothing() {
        let backend = Arc::new(FakeBackend::default());
        let reporter = reporter(backend.clone(), None);

        reporter.set_location_sharing(false);
        let outcome = reporter.report_now().await.unwrap();

        assert_eq!(outcome, ReportOutcome::Disabled);
        assert!(backend.reports().is_empty());
    }

    #[tokio::test]
    async fn device_fix_is_reported_with_availability() {
        let backend = Arc::new(FakeBackend::default());
        let fix = Coordinate::new(20.66, -100.41).unwrap();
        let reporter = reporter(backend.clone(), Some(fix));

        let outcome = reporter.report_now().await.unwrap();

        assert_eq!(
            outcome,
            ReportOutcome::Sent {
                coordinate: fix,
                source: PositionSource::Device,
                is_available: true
            }
        );
        let reports = backend.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].delivery_person_id, 7);
        assert_eq!(reports[0].latitude, 20.66);
    }

    #[tokio::test]
    async fn missing_fix_falls_back_to_last_known() {
        let backend = Arc::new(FakeBackend::default());
        let reporter = reporter(backend.clone(), None);

        let outcome = reporter.report_now().await.unwrap();

        assert!(matches!(
            outcome,
            ReportOutcome::Sent {
                source: PositionSource::LastKnown,
                ..
            }
        ));
        assert_eq!(backend.reports()[0].latitude, home().latitude);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_geolocation_times_out_and_still_reports() {
        let backend = Arc::new(FakeBackend::default());
        let reporter = Arc::new(
            LocationReporter::new(7, backend.clone(), Arc::new(StalledLocation), home())
                .with_timing(Duration::from_secs(10), Duration::from_secs(5)),
        );

        let outcome = reporter.report_now().await.unwrap();

        assert!(matches!(
            outcome,
            ReportOutcome::Sent {
                source: PositionSource::LastKnown,
                ..
            }
        ));
        assert_eq!(backend.reports().len(), 1);
    }

    #[tokio::test]
    async fn adopted_record_seeds_flag_and_fallback_position() {
        let backend = Arc::new(FakeBackend::default());
        let reporter = reporter(backend.clone(), None);
        let mut record = courier(7, "Juan", Some((20.61, -100.37)));
        record.is_available = false;

        reporter.adopt(record);
        reporter.report_now().await.unwrap();

        let reports = backend.reports();
        assert!(!reports[0].is_available);
        assert_eq!(reports[0].latitude, 20.61);
    }

    #[tokio::test]
    async fn toggling_availability_reports_once_with_new_flag() {
        let backend = Arc::new(FakeBackend::default());
        let reporter = reporter(backend.clone(), None);

        reporter.toggle_availability().await.unwrap();

        let reports = backend.reports();
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].is_available);
        assert!(!reporter.is_available());
    }

    #[tokio::test]
    async fn availability_change_updates_status_record() {
        let backend = Arc::new(FakeBackend::default());
        let reporter = reporter(backend.clone(), None);

        reporter.set_available(false).await.unwrap();
        reporter.toggle_availability().await.unwrap();

        assert_eq!(backend.availability_updates(), vec![(7, false), (7, true)]);
        assert_eq!(backend.reports().len(), 2);
    }

    #[tokio::test]
    async fn failed_status_update_still_reports() {
        let backend = Arc::new(FakeBackend::default());
        backend.fail_availability(true);
        let reporter = reporter(backend.clone(), None);

        let outcome = reporter.set_available(false).await.unwrap();

        assert!(matches!(outcome, ReportOutcome::Sent { is_available: false, .. }));
        assert_eq!(backend.reports().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_mid_interval_adds_exactly_one_report() {
        let backend = Arc::new(FakeBackend::default());
        let reporter = reporter(backend.clone(), None);

        reporter.start_reporting(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(backend.reports().len(), 1);

        reporter.toggle_availability().await.unwrap();
        assert_eq!(backend.reports().len(), 2);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.reports().len(), 2);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let reports = backend.reports();
        assert_eq!(reports.len(), 3);
        assert!(!reports[2].is_available);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_report_is_refused_while_timed_report_runs() {
        let backend = Arc::new(FakeBackend::default());
        let reporter = Arc::new(
            LocationReporter::new(7, backend.clone(), Arc::new(StalledLocation), home())
                .with_timing(Duration::from_secs(10), Duration::from_secs(5)),
        );

        reporter.start_reporting(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(matches!(reporter.try_report().await, Err(AppError::Conflict(_))));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.reports().len(), 1);
        reporter.stop_reporting();
        assert!(reporter.try_report().await.is_ok());
        assert_eq!(backend.reports().len(), 2);
    }

    #[tokio::test]
    async fn send_failure_is_an_error_but_state_survives() {
        let backend = Arc::new(FakeBackend::default());
        backend.fail_reports(true);
        let reporter = reporter(backend.clone(), None);

        assert!(reporter.report_now().await.is_err());
        assert!(reporter.status().unwrap().last_sent_at.is_none());

        backend.fail_reports(false);
        assert!(reporter.report_now().await.is_ok());
        assert!(reporter.status().unwrap().last_sent_at.is_some());
    }

    #[tokio::test]
    async fn acknowledged_courier_overwrites_local_state() {
        let backend = Arc::new(FakeBackend::default());
        backend.echo_courier(true);
        let reporter = reporter(backend.clone(), None);

        reporter.report_now().await.unwrap();

        let courier = reporter.courier().unwrap();
        assert_eq!(courier.id, 7);
        assert_eq!(courier.latitude, Some(home().latitude));
    }

    #[tokio::test]
    async fn relocation_reports_the_given_coordinate_and_moves_device_marker() {
        let backend = Arc::new(FakeBackend::default());
        let map = Arc::new(MapView::new(home(), 15, 16));
        let reporter = Arc::new(
            LocationReporter::new(7, backend.clone(), Arc::new(ManualLocation::new(None)), home())
                .with_map(map.clone()),
        );
        let target = Coordinate::new(20.64, -100.39).unwrap();

        let outcome = reporter.relocate(target).await.unwrap();

        assert!(matches!(
            outcome,
            ReportOutcome::Sent {
                source: PositionSource::Manual,
                ..
            }
        ));
        assert_eq!(backend.reports()[0].longitude, -100.39);
        let marker = map.marker(MarkerKind::Device, 7).unwrap();
        assert_eq!(marker.coordinate, target);
        assert_eq!(marker.color, MarkerColor::Green);
        assert_eq!(reporter.status().unwrap().last_known, target);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_reports_on_cadence_and_stops() {
        let backend = Arc::new(FakeBackend::default());
        let reporter = reporter(backend.clone(), None);

        reporter.start_reporting(Duration::from_secs(10));
        reporter.start_reporting(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(backend.reports().len(), 3);

        reporter.stop_reporting();
        reporter.stop_reporting();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.reports().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_sharing_stops_the_timer() {
        let backend = Arc::new(FakeBackend::default());
        let reporter = reporter(backend.clone(), None);

        reporter.start_reporting(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(5)).await;
        reporter.set_location_sharing(false);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.reports().len(), 1);

        reporter.set_location_sharing(true);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(backend.reports().len(), 2);
        assert!(reporter.status().unwrap().is_running);
    }
}
