//! Headless map model: the marker set, the viewport and popup state.
//!
//! The view is the only writer of its markers. Other components drive it
//! through [`MapView::upsert_marker`], [`MapView::remove_marker`] and
//! [`MapView::focus`]; every change is broadcast as a [`MapEvent`] so a
//! front end can mirror it.

pub mod color;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::client::geocode::{ReverseGeocoder, UNKNOWN_PLACE};
use crate::geo::same_position;
use crate::models::coordinate::Coordinate;
use crate::models::marker::{Marker, MarkerColor, MarkerKey, MarkerKind};
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Viewport {
    pub center: Coordinate,
    pub zoom: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapEvent {
    Upserted { marker: Marker },
    Removed { key: MarkerKey },
    Focused { key: MarkerKey, viewport: Viewport },
    Relabeled { key: MarkerKey, place: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Moved,
    /// Same position, new label or color.
    Restyled,
    Unchanged,
    /// The incoming observation is older than what the marker already shows.
    Stale,
    /// The view has been closed.
    Ignored,
}

/// Everything needed to place one marker.
#[derive(Debug, Clone)]
pub struct MarkerUpdate {
    pub kind: MarkerKind,
    pub id: i64,
    pub coordinate: Coordinate,
    pub label: String,
    pub color: MarkerColor,
    pub observed_at: Option<DateTime<Utc>>,
}

impl MarkerUpdate {
    pub fn new(kind: MarkerKind, id: i64, coordinate: Coordinate, label: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            coordinate,
            label: label.into(),
            color: MarkerColor::Blue,
            observed_at: None,
        }
    }

    pub fn color(mut self, color: MarkerColor) -> Self {
        self.color = color;
        self
    }

    pub fn observed_at(mut self, observed_at: Option<DateTime<Utc>>) -> Self {
        self.observed_at = observed_at;
        self
    }
}

pub struct MapView {
    markers: DashMap<MarkerKey, Marker>,
    viewport: Mutex<Viewport>,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    events: broadcast::Sender<MapEvent>,
    closed: AtomicBool,
    revisions: AtomicU64,
    metrics: Option<Metrics>,
}

impl MapView {
    pub fn new(center: Coordinate, zoom: u8, event_buffer_size: usize) -> Self {
        let (events, _unused_rx) = broadcast::channel(event_buffer_size.max(1));

        Self {
            markers: DashMap::new(),
            viewport: Mutex::new(Viewport { center, zoom }),
            geocoder: None,
            events,
            closed: AtomicBool::new(false),
            revisions: AtomicU64::new(0),
            metrics: None,
        }
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MapEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Creates or moves the marker for `(kind, id)`.
    pub fn upsert_marker(
        self: &Arc<Self>,
        kind: MarkerKind,
        id: i64,
        coordinate: Coordinate,
        label: impl Into<String>,
    ) -> UpsertOutcome {
        self.apply(MarkerUpdate::new(kind, id, coordinate, label))
    }

    pub fn apply(self: &Arc<Self>, update: MarkerUpdate) -> UpsertOutcome {
        if self.is_closed() {
            return UpsertOutcome::Ignored;
        }

        let key = MarkerKey::new(update.kind, update.id);
        let coordinate = update.coordinate;

        let (outcome, snapshot) = match self.markers.entry(key) {
            Entry::Occupied(mut entry) => {
                let marker = entry.get_mut();

                if let (Some(incoming), Some(current)) = (update.observed_at, marker.observed_at) {
                    if incoming < current {
                        return UpsertOutcome::Stale;
                    }
                }

                let moved = !same_position(&marker.coordinate, &coordinate);
                let restyled = marker.label != update.label || marker.color != update.color;
                if update.observed_at.is_some() {
                    marker.observed_at = update.observed_at;
                }

                if !moved && !restyled {
                    return UpsertOutcome::Unchanged;
                }

                marker.label = update.label;
                marker.color = update.color;

                let outcome = if moved {
                    marker.coordinate = coordinate;
                    marker.place = coordinate.to_string();
                    marker.revision = self.next_revision();
                    UpsertOutcome::Moved
                } else {
                    UpsertOutcome::Restyled
                };

                (outcome, marker.clone())
            }
            Entry::Vacant(entry) => {
                let marker = Marker {
                    key,
                    coordinate,
                    label: update.label,
                    place: coordinate.to_string(),
                    color: update.color,
                    popup_open: false,
                    revision: self.next_revision(),
                    observed_at: update.observed_at,
                };
                entry.insert(marker.clone());
                (UpsertOutcome::Created, marker)
            }
        };

        let revision = snapshot.revision;
        let _ = self.events.send(MapEvent::Upserted { marker: snapshot });

        if matches!(outcome, UpsertOutcome::Created | UpsertOutcome::Moved) {
            self.spawn_place_lookup(key, coordinate, revision);
        }
        if outcome == UpsertOutcome::Created {
            self.refresh_gauge(key.kind);
        }

        outcome
    }

    /// Returns whether a marker was removed.
    pub fn remove_marker(&self, kind: MarkerKind, id: i64) -> bool {
        let key = MarkerKey::new(kind, id);
        let removed = self.markers.remove(&key).is_some();

        if removed {
            let _ = self.events.send(MapEvent::Removed { key });
            self.refresh_gauge(kind);
        }

        removed
    }

    /// Centers the viewport on the marker and opens its popup. A missing
    /// marker is not an error: focus requests race with marker creation.
    pub fn focus(&self, kind: MarkerKind, id: i64, zoom: u8) -> bool {
        if self.is_closed() {
            return false;
        }

        let key = MarkerKey::new(kind, id);
        let Some(center) = self.markers.get(&key).map(|marker| marker.coordinate) else {
            warn!(kind = kind.label(), id, "focus requested for unknown marker");
            return false;
        };

        for mut entry in self.markers.iter_mut() {
            let open = *entry.key() == key;
            entry.value_mut().popup_open = open;
        }

        let viewport = Viewport { center, zoom };
        if let Ok(mut guard) = self.viewport.lock() {
            *guard = viewport;
        }

        let _ = self.events.send(MapEvent::Focused { key, viewport });
        true
    }

    /// Looks up a human-readable place name, falling back to [`UNKNOWN_PLACE`].
    pub async fn reverse_geocode(&self, coordinate: Coordinate) -> String {
        let Some(geocoder) = &self.geocoder else {
            return UNKNOWN_PLACE.to_string();
        };

        match geocoder.lookup(coordinate).await {
            Ok(place) => place,
            Err(err) => {
                debug!(error = %err, %coordinate, "reverse geocoding failed");
                UNKNOWN_PLACE.to_string()
            }
        }
    }

    pub fn marker(&self, kind: MarkerKind, id: i64) -> Option<Marker> {
        self.markers
            .get(&MarkerKey::new(kind, id))
            .map(|entry| entry.value().clone())
    }

    /// All markers ordered by kind and id.
    pub fn markers(&self) -> Vec<Marker> {
        let mut markers: Vec<Marker> = self
            .markers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        markers.sort_by_key(|marker| marker.key);
        markers
    }

    pub fn ids_of(&self, kind: MarkerKind) -> Vec<i64> {
        self.markers
            .iter()
            .filter(|entry| entry.key().kind == kind)
            .map(|entry| entry.key().id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport.lock().ok().map(|guard| *guard)
    }

    /// Tears the view down. Late results from in-flight requests become no-ops.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.markers.clear();

        if let Some(metrics) = &self.metrics {
            metrics.map_markers.reset();
        }
    }

    fn next_revision(&self) -> u64 {
        self.revisions.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn refresh_gauge(&self, kind: MarkerKind) {
        if let Some(metrics) = &self.metrics {
            let count = self.ids_of(kind).len() as i64;
            metrics.map_markers.with_label_values(&[kind.label()]).set(count);
        }
    }

    fn spawn_place_lookup(self: &Arc<Self>, key: MarkerKey, coordinate: Coordinate, revision: u64) {
        let Some(geocoder) = self.geocoder.clone() else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            debug!("no runtime available; skipping reverse geocoding");
            return;
        };

        let view = Arc::downgrade(self);
        runtime.spawn(async move {
            let place = match geocoder.lookup(coordinate).await {
                Ok(place) => place,
                Err(err) => {
                    debug!(error = %err, %coordinate, "reverse geocoding failed");
                    UNKNOWN_PLACE.to_string()
                }
            };

            if let Some(view) = view.upgrade() {
                view.backfill_place(key, revision, place);
            }
        });
    }

    fn backfill_place(&self, key: MarkerKey, revision: u64, place: String) {
        if self.is_closed() {
            return;
        }

        let updated = match self.markers.get_mut(&key) {
            Some(mut marker) if marker.revision == revision => {
                marker.place = place.clone();
                true
            }
            _ => false,
        };

        if updated {
            let _ = self.events.send(MapEvent::Relabeled { key, place });
        }
    }
}
