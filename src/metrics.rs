//! Metrics sink for healing counters.
//!
//! Components record through the [`MetricsSink`] trait rather than a global
//! registry so they stay testable with a recording fake. The production sink
//! accumulates into a local Prometheus registry and pushes once at the end
//! of the run; a failed push is logged and never fails the job.

use std::collections::HashMap;

use async_trait::async_trait;
use prometheus::{CounterVec, Gauge, Opts, Registry};
use tracing::{info, warn};

use crate::config::JOB_NAME;

/// Total healing actions, labeled by `type`, `namespace`, `resource`.
pub const ACTIONS_TOTAL: &str = "auto_healer_actions_total";
/// Number of unhealthy pods detected in the current cycle.
pub const UNHEALTHY_PODS: &str = "auto_healer_unhealthy_pods";
/// Total healing errors, labeled by `error_type`.
pub const ERRORS_TOTAL: &str = "auto_healer_errors_total";

/// Counter/gauge sink injected into every component.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    fn inc_counter(&self, name: &str, labels: &[(&str, &str)]);

    fn set_gauge(&self, name: &str, value: f64);

    /// End-of-run flush. Failures are logged, never raised.
    async fn flush(&self);
}

/// Sink that drops everything. Used by the read-only CLI paths.
pub struct NullSink;

#[async_trait]
impl MetricsSink for NullSink {
    fn inc_counter(&self, _name: &str, _labels: &[(&str, &str)]) {}

    fn set_gauge(&self, _name: &str, _value: f64) {}

    async fn flush(&self) {}
}

/// Prometheus pushgateway sink.
///
/// All healer metrics are registered up front; incrementing an unknown
/// metric or mismatched label set is a soft failure that logs and drops the
/// sample.
pub struct PushSink {
    registry: Registry,
    counters: HashMap<&'static str, CounterVec>,
    gauges: HashMap<&'static str, Gauge>,
    gateway: String,
}

impl PushSink {
    /// Build the sink with the healer metric families registered.
    ///
    /// # Errors
    /// Returns an error if metric registration fails.
    pub fn new(gateway: &str) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let actions = CounterVec::new(
            Opts::new(ACTIONS_TOTAL, "Total healing actions"),
            &["type", "namespace", "resource"],
        )?;
        registry.register(Box::new(actions.clone()))?;

        let errors = CounterVec::new(
            Opts::new(ERRORS_TOTAL, "Total healing errors"),
            &["error_type"],
        )?;
        registry.register(Box::new(errors.clone()))?;

        let unhealthy = Gauge::new(UNHEALTHY_PODS, "Number of unhealthy pods detected")?;
        registry.register(Box::new(unhealthy.clone()))?;

        let mut counters = HashMap::new();
        counters.insert(ACTIONS_TOTAL, actions);
        counters.insert(ERRORS_TOTAL, errors);

        let mut gauges = HashMap::new();
        gauges.insert(UNHEALTHY_PODS, unhealthy);

        Ok(Self {
            registry,
            counters,
            gauges,
            gateway: gateway.to_string(),
        })
    }
}

#[async_trait]
impl MetricsSink for PushSink {
    fn inc_counter(&self, name: &str, labels: &[(&str, &str)]) {
        let Some(counter) = self.counters.get(name) else {
            warn!(metric = name, "Unknown counter, dropping increment");
            return;
        };
        let label_map: HashMap<&str, &str> = labels.iter().copied().collect();
        match counter.get_metric_with(&label_map) {
            Ok(metric) => metric.inc(),
            Err(e) => warn!(metric = name, error = %e, "Label mismatch, dropping increment"),
        }
    }

    fn set_gauge(&self, name: &str, value: f64) {
        if let Some(gauge) = self.gauges.get(name) {
            gauge.set(value);
        } else {
            warn!(metric = name, "Unknown gauge, dropping sample");
        }
    }

    async fn flush(&self) {
        let families = self.registry.gather();
        let gateway = self.gateway.clone();

        // prometheus' push client is blocking
        let result = tokio::task::spawn_blocking(move || {
            prometheus::push_metrics(JOB_NAME, HashMap::new(), &gateway, families, None)
        })
        .await;

        match result {
            Ok(Ok(())) => info!("Metrics pushed successfully"),
            Ok(Err(e)) => warn!(error = %e, "Failed to push metrics"),
            Err(e) => warn!(error = %e, "Metrics push task panicked"),
        }
    }
}
