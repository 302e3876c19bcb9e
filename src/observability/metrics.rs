use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub matching_runs_total: IntCounterVec,
    pub matching_latency_seconds: HistogramVec,
    pub match_candidates_evaluated: IntGauge,
    pub cache_lookups_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let matching_runs_total = IntCounterVec::new(
            Opts::new("matching_runs_total", "Matching runs by operation and outcome"),
            &["operation", "outcome"],
        )
        .expect("valid matching_runs_total metric");

        let matching_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "matching_latency_seconds",
                "Latency of matching operations in seconds",
            ),
            &["operation"],
        )
        .expect("valid matching_latency_seconds metric");

        let match_candidates_evaluated = IntGauge::new(
            "match_candidates_evaluated",
            "Job/vehicle pairs scored by the last scan",
        )
        .expect("valid match_candidates_evaluated metric");

        let cache_lookups_total = IntCounterVec::new(
            Opts::new("cache_lookups_total", "Source cache lookups by cache and result"),
            &["cache", "result"],
        )
        .expect("valid cache_lookups_total metric");

        registry
            .register(Box::new(matching_runs_total.clone()))
            .expect("register matching_runs_total");
        registry
            .register(Box::new(matching_latency_seconds.clone()))
            .expect("register matching_latency_seconds");
        registry
            .register(Box::new(match_candidates_evaluated.clone()))
            .expect("register match_candidates_evaluated");
        registry
            .register(Box::new(cache_lookups_total.clone()))
            .expect("register cache_lookups_total");

        Self {
            registry,
            matching_runs_total,
            matching_latency_seconds,
            match_candidates_evaluated,
            cache_lookups_total,
        }
    }

    pub fn record_run(&self, operation: &str, outcome: &str, elapsed_secs: f64) {
        self.matching_runs_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.matching_latency_seconds
            .with_label_values(&[operation])
            .observe(elapsed_secs);
    }

    pub fn record_cache_lookup(&self, cache: &str, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups_total
            .with_label_values(&[cache, result])
            .inc();
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
