use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub zone_events_total: IntCounterVec,
    pub location_samples_total: IntCounterVec,
    pub evaluation_latency_seconds: HistogramVec,
    pub alerts_pending: IntGauge,
    pub active_orders: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let zone_events_total = IntCounterVec::new(
            Opts::new("zone_events_total", "Zone entry events emitted by zone kind"),
            &["zone"],
        )
        .expect("valid zone_events_total metric");

        let location_samples_total = IntCounterVec::new(
            Opts::new(
                "location_samples_total",
                "Location samples by source and acceptance outcome",
            ),
            &["source", "outcome"],
        )
        .expect("valid location_samples_total metric");

        let evaluation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "evaluation_latency_seconds",
                "Latency of a proximity evaluation pass in seconds",
            ),
            &["trigger"],
        )
        .expect("valid evaluation_latency_seconds metric");

        let alerts_pending = IntGauge::new("alerts_pending", "Zone events waiting behind the active alert")
            .expect("valid alerts_pending metric");

        let active_orders = IntGauge::new("active_orders", "Active orders seen in the last evaluation pass")
            .expect("valid active_orders metric");

        registry
            .register(Box::new(zone_events_total.clone()))
            .expect("register zone_events_total");
        registry
            .register(Box::new(location_samples_total.clone()))
            .expect("register location_samples_total");
        registry
            .register(Box::new(evaluation_latency_seconds.clone()))
            .expect("register evaluation_latency_seconds");
        registry
            .register(Box::new(alerts_pending.clone()))
            .expect("register alerts_pending");
        registry
            .register(Box::new(active_orders.clone()))
            .expect("register active_orders");

        Self {
            registry,
            zone_events_total,
            location_samples_total,
            evaluation_latency_seconds,
            alerts_pending,
            active_orders,
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
