use std::{fmt, sync::Arc, time::Duration};

use tokio::time::Instant;

use crate::types::{Model, TaskKind};

/// User-provided callbacks for emitting metrics without taking on a tracing dependency.
#[derive(Clone, Default)]
pub struct MetricsCallbacks {
    pub dispatch: Option<Arc<dyn Fn(DispatchMetrics) + Send + Sync>>,
    pub fallback: Option<Arc<dyn Fn(FallbackMetrics) + Send + Sync>>,
}

impl MetricsCallbacks {
    pub fn on_dispatch(mut self, cb: impl Fn(DispatchMetrics) + Send + Sync + 'static) -> Self {
        self.dispatch = Some(Arc::new(cb));
        self
    }

    pub fn on_fallback(mut self, cb: impl Fn(FallbackMetrics) + Send + Sync + 'static) -> Self {
        self.fallback = Some(Arc::new(cb));
        self
    }
}

impl fmt::Debug for MetricsCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCallbacks")
            .field("dispatch", &self.dispatch.as_ref().map(|_| "callback"))
            .field("fallback", &self.fallback.as_ref().map(|_| "callback"))
            .finish()
    }
}

/// One call taken off the queue and handed to the gateway.
#[derive(Clone, Debug)]
pub struct DispatchMetrics {
    pub task: TaskKind,
    /// Position in submission order, starting at 0.
    pub sequence: u64,
    pub model: Option<Model>,
    /// When the gateway call started.
    pub started_at: Instant,
    /// Time spent queued, including the spacing delay.
    pub queued_for: Duration,
    pub latency: Duration,
    /// HTTP status of a failed call, when the endpoint answered.
    pub status: Option<u16>,
    pub error: Option<String>,
}

/// A generation operation that returned its deterministic fallback.
#[derive(Clone, Debug)]
pub struct FallbackMetrics {
    pub task: TaskKind,
    pub reason: &'static str,
}

/// Internal helper that owns the registered callbacks (if any).
#[derive(Clone, Default)]
pub(crate) struct Telemetry {
    callbacks: MetricsCallbacks,
}

impl Telemetry {
    pub(crate) fn new(callbacks: Option<MetricsCallbacks>) -> Self {
        Self {
            callbacks: callbacks.unwrap_or_default(),
        }
    }

    pub(crate) fn record_dispatch(&self, metrics: DispatchMetrics) {
        if let Some(cb) = &self.callbacks.dispatch {
            cb(metrics);
        }
    }

    pub(crate) fn record_fallback(&self, metrics: FallbackMetrics) {
        if let Some(cb) = &self.callbacks.fallback {
            cb(metrics);
        }
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.callbacks.fmt(f)
    }
}
