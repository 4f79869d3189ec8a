//! Serialized, rate-spaced dispatch of model calls.
//!
//! Every submission becomes a [`QueuedCall`] on one unbounded channel drained
//! by a single worker task, so calls reach the gateway strictly in the order
//! they were enqueued and never overlap. Before each dispatch the worker waits
//! until `min_interval` has passed since the previous dispatch started. A
//! failed or timed-out call settles its own handle and the worker moves on.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use tokio::{
    sync::{mpsc, oneshot},
    time::{sleep_until, timeout, Instant},
};

use crate::{
    errors::{Error, Result, TransportError, TransportErrorKind},
    gateway::ChatGateway,
    telemetry::{DispatchMetrics, Telemetry},
    types::TaskRequest,
};

struct QueuedCall {
    sequence: u64,
    request: TaskRequest,
    enqueued_at: Instant,
    reply: oneshot::Sender<Result<String>>,
}

/// Pending result of one enqueued call. Dropping it does not cancel the call.
#[derive(Debug)]
pub struct QueuedResponse {
    sequence: u64,
    rx: oneshot::Receiver<Result<String>>,
}

impl QueuedResponse {
    /// Position of the call in submission order, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub async fn wait(self) -> Result<String> {
        self.rx.await.unwrap_or_else(|_| {
            Err(TransportError::new(
                TransportErrorKind::QueueClosed,
                "scheduler worker stopped before settling the call",
            )
            .into())
        })
    }
}

/// Single-lane queue in front of a [`ChatGateway`].
#[derive(Clone)]
pub struct RequestScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    worker: WorkerContext,
    next_sequence: AtomicU64,
    sender: Mutex<Option<mpsc::UnboundedSender<QueuedCall>>>,
}

#[derive(Clone)]
struct WorkerContext {
    gateway: Arc<dyn ChatGateway>,
    min_interval: Duration,
    call_timeout: Duration,
    telemetry: Telemetry,
}

impl RequestScheduler {
    pub fn new(gateway: Arc<dyn ChatGateway>, min_interval: Duration, call_timeout: Duration) -> Self {
        Self::with_telemetry(gateway, min_interval, call_timeout, Telemetry::default())
    }

    pub(crate) fn with_telemetry(
        gateway: Arc<dyn ChatGateway>,
        min_interval: Duration,
        call_timeout: Duration,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                worker: WorkerContext {
                    gateway,
                    min_interval,
                    call_timeout,
                    telemetry,
                },
                next_sequence: AtomicU64::new(0),
                sender: Mutex::new(None),
            }),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.inner.worker.min_interval
    }

    /// Append a call to the queue. Order is fixed when this returns.
    ///
    /// Must be called from within a Tokio runtime; the worker task is spawned
    /// on first use.
    pub fn enqueue(&self, request: TaskRequest) -> Result<QueuedResponse> {
        request.validate()?;
        let (reply, rx) = oneshot::channel();
        let mut guard = self.inner.sender.lock().unwrap_or_else(|e| e.into_inner());
        // Sequence is taken under the lock so it matches channel order.
        let sequence = self.inner.next_sequence.fetch_add(1, Ordering::Relaxed);
        let mut call = QueuedCall {
            sequence,
            request,
            enqueued_at: Instant::now(),
            reply,
        };

        if let Some(sender) = guard.as_ref() {
            match sender.send(call) {
                Ok(()) => return Ok(QueuedResponse { sequence, rx }),
                Err(mpsc::error::SendError(returned)) => call = returned,
            }
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Config("request scheduler requires a Tokio runtime".into()))?;
        let (sender, receiver) = mpsc::unbounded_channel();
        // Cannot fail: the receiver is still held here.
        let _ = sender.send(call);
        runtime.spawn(run_worker(self.inner.worker.clone(), receiver));
        *guard = Some(sender);
        Ok(QueuedResponse { sequence, rx })
    }

    /// Enqueue and wait for the result.
    pub async fn submit(&self, request: TaskRequest) -> Result<String> {
        self.enqueue(request)?.wait().await
    }
}

impl std::fmt::Debug for RequestScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScheduler")
            .field("min_interval", &self.inner.worker.min_interval)
            .field("call_timeout", &self.inner.worker.call_timeout)
            .finish_non_exhaustive()
    }
}

async fn run_worker(ctx: WorkerContext, mut rx: mpsc::UnboundedReceiver<QueuedCall>) {
    let mut last_start: Option<Instant> = None;

    while let Some(call) = rx.recv().await {
        if let Some(prev) = last_start {
            let ready_at = prev + ctx.min_interval;
            if Instant::now() < ready_at {
                sleep_until(ready_at).await;
            }
        }

        let started_at = Instant::now();
        last_start = Some(started_at);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            task = %call.request.kind,
            sequence = call.sequence,
            queued_ms = started_at.duration_since(call.enqueued_at).as_millis() as u64,
            "dispatching queued call"
        );

        let result = match timeout(ctx.call_timeout, ctx.gateway.send(&call.request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::new(
                TransportErrorKind::Timeout,
                format!("call exceeded {}ms", ctx.call_timeout.as_millis()),
            )
            .into()),
        };

        let (status, error) = match &result {
            Ok(_) => (None, None),
            Err(Error::Api(api)) => (Some(api.status), Some(api.to_string())),
            Err(err) => (None, Some(err.to_string())),
        };
        #[cfg(feature = "tracing")]
        if let Some(error) = &error {
            tracing::warn!(
                task = %call.request.kind,
                sequence = call.sequence,
                error = %error,
                "queued call failed"
            );
        }
        ctx.telemetry.record_dispatch(DispatchMetrics {
            task: call.request.kind,
            sequence: call.sequence,
            model: call.request.model.clone(),
            started_at,
            queued_for: started_at.duration_since(call.enqueued_at),
            latency: started_at.elapsed(),
            status,
            error,
        });

        // The caller may have stopped waiting.
        let _ = call.reply.send(result);
    }
}
