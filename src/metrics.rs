use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Process-wide counters for the session subsystem
pub struct Metrics {
    pub registry: Registry,

    // Backend metrics
    pub backend_requests_total: CounterVec,

    // Session metrics
    pub validations_total: CounterVec,
    pub superseded_validations_total: Counter,
    pub logouts_total: Counter,

    // OAuth metrics
    pub oauth_callbacks_total: CounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let backend_requests_total = CounterVec::new(
            Opts::new(
                "maintdash_backend_requests_total",
                "Total number of backend requests",
            ),
            &["endpoint", "method", "outcome"],
        )?;

        let validations_total = CounterVec::new(
            Opts::new(
                "maintdash_session_validations_total",
                "Session token validations by result",
            ),
            &["result"], // authenticated, cleared, kept
        )?;

        let superseded_validations_total = Counter::new(
            "maintdash_session_superseded_validations_total",
            "Validation results discarded because a newer request superseded them",
        )?;

        let logouts_total = Counter::new(
            "maintdash_session_logouts_total",
            "Total number of explicit logouts",
        )?;

        let oauth_callbacks_total = CounterVec::new(
            Opts::new(
                "maintdash_oauth_callbacks_total",
                "OAuth callback invocations by outcome",
            ),
            &["outcome"],
        )?;

        // Register all metrics
        registry.register(Box::new(backend_requests_total.clone()))?;
        registry.register(Box::new(validations_total.clone()))?;
        registry.register(Box::new(superseded_validations_total.clone()))?;
        registry.register(Box::new(logouts_total.clone()))?;
        registry.register(Box::new(oauth_callbacks_total.clone()))?;

        Ok(Self {
            registry,
            backend_requests_total,
            validations_total,
            superseded_validations_total,
            logouts_total,
            oauth_callbacks_total,
        })
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

/// Global metrics instance
pub static METRICS: once_cell::sync::Lazy<Arc<Metrics>> =
    once_cell::sync::Lazy::new(|| Arc::new(Metrics::default()));
