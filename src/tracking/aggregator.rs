use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::client::TrackingBackend;
use crate::error::AppError;
use crate::map::color::courier_color;
use crate::map::{MapView, MarkerUpdate, UpsertOutcome};
use crate::models::courier::Courier;
use crate::models::marker::MarkerKind;
use crate::observability::metrics::Metrics;
use crate::tracking::schedule::PeriodicTask;
use crate::tracking::selection::Selection;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PollSummary {
    pub total: usize,
    pub placed: usize,
    pub without_position: usize,
    pub created: usize,
    pub moved: usize,
    pub unchanged: usize,
    pub stale: usize,
    pub refocused: bool,
}

struct Snapshot {
    sequence: u64,
    couriers: Arc<Vec<Courier>>,
}

/// Admin-side poller that mirrors every courier's last position onto the map.
pub struct LocationAggregator {
    backend: Arc<dyn TrackingBackend>,
    map: Arc<MapView>,
    selection: Selection,
    focus_zoom: u8,
    sequence: AtomicU64,
    snapshot: Mutex<Snapshot>,
    task: PeriodicTask,
    metrics: Option<Metrics>,
}

impl LocationAggregator {
    pub fn new(backend: Arc<dyn TrackingBackend>, map: Arc<MapView>, focus_zoom: u8) -> Self {
        Self {
            backend,
            map,
            selection: Selection::default(),
            focus_zoom,
            sequence: AtomicU64::new(0),
            snapshot: Mutex::new(Snapshot {
                sequence: 0,
                couriers: Arc::new(Vec::new()),
            }),
            task: PeriodicTask::new("location-aggregator"),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.task = PeriodicTask::new("location-aggregator").with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn map(&self) -> &Arc<MapView> {
        &self.map
    }

    pub fn start_polling(self: &Arc<Self>, period: Duration) {
        let aggregator = Arc::clone(self);
        self.task.start(period, move || {
            let aggregator = aggregator.clone();
            async move {
                // failures are logged inside poll and leave the markers alone
                let _ = aggregator.poll().await;
            }
        });
    }

    pub fn stop_polling(&self) {
        self.task.stop();
    }

    pub fn is_polling(&self) -> bool {
        self.task.is_running()
    }

    /// Fetches `/deliveries/map` and reconciles the marker set. On error the
    /// markers and the previous snapshot are left untouched.
    pub async fn poll(&self) -> Result<PollSummary, AppError> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let start = Instant::now();

        let couriers = match self.backend.courier_positions().await {
            Ok(couriers) => couriers,
            Err(err) => {
                self.observe("error", start);
                warn!(error = %err, transient = err.is_transient(), "courier poll failed");
                return Err(err);
            }
        };

        let summary = self.reconcile(&couriers);
        self.store_snapshot(sequence, couriers);
        self.observe("success", start);

        info!(
            total = summary.total,
            placed = summary.placed,
            without_position = summary.without_position,
            created = summary.created,
            moved = summary.moved,
            "courier positions reconciled"
        );

        Ok(summary)
    }

    /// A poll made outside the timer. Refused while another poll is in flight.
    pub async fn try_poll(&self) -> Result<PollSummary, AppError> {
        let Some(_run) = self.task.try_claim() else {
            return Err(AppError::Conflict("a courier poll is already in flight".to_string()));
        };
        self.poll().await
    }

    /// Upserts one marker per courier with a valid position. Couriers missing
    /// from `couriers` keep their last known marker.
    pub fn reconcile(&self, couriers: &[Courier]) -> PollSummary {
        let mut summary = PollSummary {
            total: couriers.len(),
            ..PollSummary::default()
        };
        let selected = self.selection.current();

        for courier in couriers {
            let Some(coordinate) = courier.coordinate() else {
                summary.without_position += 1;
                continue;
            };

            let update = MarkerUpdate::new(MarkerKind::Courier, courier.id, coordinate, courier_label(courier))
                .color(courier_color(courier.is_available))
                .observed_at(courier.last_update);

            match self.map.apply(update) {
                UpsertOutcome::Created => summary.created += 1,
                UpsertOutcome::Moved | UpsertOutcome::Restyled => summary.moved += 1,
                UpsertOutcome::Unchanged => summary.unchanged += 1,
                UpsertOutcome::Stale => summary.stale += 1,
                UpsertOutcome::Ignored => continue,
            }
            summary.placed += 1;

            if selected == Some(courier.id) {
                summary.refocused = self.map.focus(MarkerKind::Courier, courier.id, self.focus_zoom);
            }
        }

        summary
    }

    /// Selects a courier and focuses its marker. Returns whether the map moved.
    pub fn select(&self, courier_id: Option<i64>) -> bool {
        self.selection.select(courier_id);

        match courier_id {
            Some(id) => self.map.focus(MarkerKind::Courier, id, self.focus_zoom),
            None => false,
        }
    }

    pub fn clear_selection(&self) {
        self.selection.select(None);
    }

    pub fn selected(&self) -> Option<i64> {
        self.selection.current()
    }

    /// The most recent successful poll result.
    pub fn couriers(&self) -> Arc<Vec<Courier>> {
        self.snapshot
            .lock()
            .map(|snapshot| snapshot.couriers.clone())
            .unwrap_or_default()
    }

    fn store_snapshot(&self, sequence: u64, couriers: Vec<Courier>) {
        if let Ok(mut snapshot) = self.snapshot.lock() {
            // an older poll that finished late must not replace a newer one
            if sequence > snapshot.sequence {
                *snapshot = Snapshot {
                    sequence,
                    couriers: Arc::new(couriers),
                };
            }
        }
    }

    fn observe(&self, outcome: &str, start: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics
                .courier_poll_latency_seconds
                .with_label_values(&[outcome])
                .observe(start.elapsed().as_secs_f64());
            metrics
                .courier_polls_total
                .with_label_values(&[outcome])
                .inc();
        }
    }
}

pub fn courier_label(courier: &Courier) -> String {
    let mut label = format!("{} · {}", courier.name, courier.availability_label());
    if let Some(phone) = courier.phone.as_deref().filter(|phone| !phone.is_empty()) {
        label.push_str(&format!(" · Tel. {phone}"));
    }
    if !courier.assigned_package_ids.is_empty() {
        label.push_str(&format!(" · {} paquetes", courier.assigned_package_ids.len()));
    }
    label
}
