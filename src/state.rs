use std::sync::Arc;

use tracing::{info, warn};

use crate::client::{LocationSource, ReverseGeocoder, TrackingBackend};
use crate::config::Config;
use crate::map::MapView;
use crate::models::marker::MarkerKind;
use crate::models::session::{Role, Session};
use crate::observability::metrics::Metrics;
use crate::tracking::aggregator::LocationAggregator;
use crate::tracking::packages::{PackageDesk, PackageScope};
use crate::tracking::reporter::LocationReporter;

/// Everything one logged-in view owns. Admins get an aggregator, couriers a
/// reporter; both share a map and a package desk.
pub struct AppState {
    pub session: Session,
    pub map: Arc<MapView>,
    pub packages: Arc<PackageDesk>,
    pub aggregator: Option<Arc<LocationAggregator>>,
    pub reporter: Option<Arc<LocationReporter>>,
    pub metrics: Metrics,
    backend: Arc<dyn TrackingBackend>,
    config: Config,
}

impl AppState {
    pub fn new(
        config: Config,
        session: Session,
        backend: Arc<dyn TrackingBackend>,
        location: Arc<dyn LocationSource>,
        geocoder: Option<Arc<dyn ReverseGeocoder>>,
    ) -> Self {
        let metrics = Metrics::new();

        let mut map = MapView::new(config.home, config.focus_zoom, config.event_buffer_size)
            .with_metrics(metrics.clone());
        if let Some(geocoder) = geocoder {
            map = map.with_geocoder(geocoder);
        }
        let map = Arc::new(map);
        map.upsert_marker(MarkerKind::Landmark, 0, config.home, config.home_label.clone());

        let (aggregator, reporter, scope) = match session.role() {
            Role::Admin => {
                let aggregator =
                    LocationAggregator::new(backend.clone(), map.clone(), config.focus_zoom)
                        .with_metrics(metrics.clone());
                (Some(Arc::new(aggregator)), None, PackageScope::All)
            }
            Role::Delivery => {
                let courier_id = session.user.id;
                let reporter = LocationReporter::new(courier_id, backend.clone(), location, config.home)
                    .with_map(map.clone())
                    .with_timing(config.report_interval, config.geolocation_timeout)
                    .with_metrics(metrics.clone());
                (None, Some(Arc::new(reporter)), PackageScope::AssignedTo(courier_id))
            }
        };

        let packages = Arc::new(PackageDesk::new(backend.clone(), scope).with_map(map.clone()));

        Self {
            session,
            map,
            packages,
            aggregator,
            reporter,
            metrics,
            backend,
            config,
        }
    }

    /// Starts the role's timer and loads the initial package list.
    pub async fn start(&self) {
        if let Some(aggregator) = &self.aggregator {
            aggregator.start_polling(self.config.poll_interval);
        }
        if let Some(reporter) = &self.reporter {
            match self.backend.couriers().await {
                Ok(couriers) => {
                    if let Some(me) = couriers.into_iter().find(|c| c.id == reporter.courier_id()) {
                        reporter.adopt(me);
                    }
                }
                Err(err) => warn!(error = %err, "failed to load courier record"),
            }
            reporter.start_reporting(self.config.report_interval);
        }

        // failures are logged by the desk; the table stays empty until the next refresh
        let _ = self.packages.refresh().await;

        info!(role = ?self.session.role(), user_id = self.session.user.id, "tracking started");
    }

    pub fn shutdown(&self) {
        if let Some(aggregator) = &self.aggregator {
            aggregator.stop_polling();
        }
        if let Some(reporter) = &self.reporter {
            reporter.stop_reporting();
        }
        self.map.close();

        info!("tracking stopped");
    }
}
