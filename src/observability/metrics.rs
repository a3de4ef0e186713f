use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub location_reports_total: IntCounterVec,
    pub courier_polls_total: IntCounterVec,
    pub courier_poll_latency_seconds: HistogramVec,
    pub map_markers: IntGaugeVec,
    pub ticks_skipped_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let location_reports_total = IntCounterVec::new(
            Opts::new("location_reports_total", "Location reports by outcome"),
            &["outcome"],
        )
        .expect("valid location_reports_total metric");

        let courier_polls_total = IntCounterVec::new(
            Opts::new("courier_polls_total", "Courier position polls by outcome"),
            &["outcome"],
        )
        .expect("valid courier_polls_total metric");

        let courier_poll_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "courier_poll_latency_seconds",
                "Latency of courier position polls in seconds",
            ),
            &["outcome"],
        )
        .expect("valid courier_poll_latency_seconds metric");

        let map_markers = IntGaugeVec::new(
            Opts::new("map_markers", "Markers currently on the map"),
            &["kind"],
        )
        .expect("valid map_markers metric");

        let ticks_skipped_total = IntCounterVec::new(
            Opts::new(
                "ticks_skipped_total",
                "Timer ticks dropped because the previous run was still in flight",
            ),
            &["task"],
        )
        .expect("valid ticks_skipped_total metric");

        registry
            .register(Box::new(location_reports_total.clone()))
            .expect("register location_reports_total");
        registry
            .register(Box::new(courier_polls_total.clone()))
            .expect("register courier_polls_total");
        registry
            .register(Box::new(courier_poll_latency_seconds.clone()))
            .expect("register courier_poll_latency_seconds");
        registry
            .register(Box::new(map_markers.clone()))
            .expect("register map_markers");
        registry
            .register(Box::new(ticks_skipped_total.clone()))
            .expect("register ticks_skipped_total");

        Self {
            registry,
            location_reports_total,
            courier_polls_total,
            courier_poll_latency_seconds,
            map_markers,
            ticks_skipped_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
