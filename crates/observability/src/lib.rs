use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    rejected_total: AtomicU64,
    ml_inference_total: AtomicU64,
    classifier_fallback_total: AtomicU64,
    cluster_requests_total: AtomicU64,
    cluster_fallback_total: AtomicU64,
    total_latency_micros: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub rejected_total: u64,
    pub ml_inference_total: u64,
    pub classifier_fallback_total: u64,
    pub cluster_requests_total: u64,
    pub cluster_fallback_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self, operation: &'static str) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pulse_requests_total", "operation" => operation).increment(1);
    }

    pub fn inc_rejected(&self, operation: &'static str) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pulse_rejected_total", "operation" => operation).increment(1);
    }

    pub fn inc_ml_inference(&self) {
        self.ml_inference_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pulse_ml_inference_total").increment(1);
    }

    /// A trained model was loaded but the rule strategy answered.
    pub fn inc_classifier_fallback(&self) {
        self.classifier_fallback_total
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pulse_classifier_fallback_total").increment(1);
    }

    pub fn inc_cluster_request(&self, fallback_used: bool) {
        self.cluster_requests_total.fetch_add(1, Ordering::Relaxed);
        if fallback_used {
            self.cluster_fallback_total.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("pulse_cluster_fallback_total").increment(1);
        }
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        metrics::histogram!("pulse_request_latency_seconds").record(duration.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_micros.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: requests,
            rejected_total: self.rejected_total.load(Ordering::Relaxed),
            ml_inference_total: self.ml_inference_total.load(Ordering::Relaxed),
            classifier_fallback_total: self.classifier_fallback_total.load(Ordering::Relaxed),
            cluster_requests_total: self.cluster_requests_total.load(Ordering::Relaxed),
            cluster_fallback_total: self.cluster_fallback_total.load(Ordering::Relaxed),
            avg_latency_millis: if requests == 0 {
                0.0
            } else {
                latency as f64 / requests as f64 / 1000.0
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,pulse_api=info,pulse_agents=info,pulse_ml=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}
