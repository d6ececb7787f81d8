use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Process counters, mirrored to the `metrics` facade for any installed recorder.
#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    plans_generated_total: AtomicU64,
    plan_failures_total: AtomicU64,
    plan_warnings_total: AtomicU64,
    engine_calls_total: AtomicU64,
    recipe_search_degraded_total: AtomicU64,
    context_cache_hits_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub plans_generated_total: u64,
    pub plan_failures_total: u64,
    pub plan_warnings_total: u64,
    pub engine_calls_total: u64,
    pub recipe_search_degraded_total: u64,
    pub context_cache_hits_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        counter!("hearth_requests_total").increment(1);
    }

    pub fn inc_plan_generated(&self, warnings: usize) {
        self.plans_generated_total.fetch_add(1, Ordering::Relaxed);
        self.plan_warnings_total
            .fetch_add(warnings as u64, Ordering::Relaxed);
        counter!("hearth_plans_generated_total").increment(1);
        counter!("hearth_plan_warnings_total").increment(warnings as u64);
    }

    pub fn inc_plan_failure(&self, kind: &'static str) {
        self.plan_failures_total.fetch_add(1, Ordering::Relaxed);
        counter!("hearth_plan_failures_total", "kind" => kind).increment(1);
    }

    pub fn inc_engine_call(&self) {
        self.engine_calls_total.fetch_add(1, Ordering::Relaxed);
        counter!("hearth_engine_calls_total").increment(1);
    }

    pub fn inc_recipe_search_degraded(&self) {
        self.recipe_search_degraded_total
            .fetch_add(1, Ordering::Relaxed);
        counter!("hearth_recipe_search_degraded_total").increment(1);
    }

    pub fn inc_cache_hit(&self) {
        self.context_cache_hits_total.fetch_add(1, Ordering::Relaxed);
        counter!("hearth_context_cache_hits_total").increment(1);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: requests,
            plans_generated_total: self.plans_generated_total.load(Ordering::Relaxed),
            plan_failures_total: self.plan_failures_total.load(Ordering::Relaxed),
            plan_warnings_total: self.plan_warnings_total.load(Ordering::Relaxed),
            engine_calls_total: self.engine_calls_total.load(Ordering::Relaxed),
            recipe_search_degraded_total: self
                .recipe_search_degraded_total
                .load(Ordering::Relaxed),
            context_cache_hits_total: self.context_cache_hits_total.load(Ordering::Relaxed),
            avg_latency_millis: if requests == 0 {
                0.0
            } else {
                latency as f64 / requests as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,hearth_api=info,hearth_agents=info,hearth_recipes=info",
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
