//! Built-in telemetry sinks.

use super::events::{PolicyEvent, RateLimitEvent, RetryEvent, SagaEvent};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// A telemetry sink that consumes policy events.
///
/// Any cloneable `tower::Service<PolicyEvent>` with a boxed `Send` future qualifies.
pub trait TelemetrySink:
    Service<
        PolicyEvent,
        Response = (),
        Error = Self::SinkError,
        Future = BoxFuture<'static, Result<(), Self::SinkError>>,
    > + Clone
    + Send
    + Sync
    + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + 'static;
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
///
/// If a sink is not ready or returns an error, the event is dropped.
pub async fn emit_best_effort<S: TelemetrySink>(sink: S, event: PolicyEvent) {
    use tower::ServiceExt;

    if let Ok(mut ready_sink) = sink.ready_oneshot().await {
        let _ = ready_sink.call(event).await;
    }
}

/// A no-op telemetry sink that discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<PolicyEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: PolicyEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for NullSink {
    type SinkError = Infallible;
}

/// A telemetry sink that logs events through `tracing`.
///
/// Severity follows the event: rejections and retries at WARN, store faults, exhausted retries
/// and failed compensations at ERROR, everything else at INFO.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<PolicyEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: PolicyEvent) -> Self::Future {
        match &event {
            PolicyEvent::RateLimit(RateLimitEvent::Rejected { .. })
            | PolicyEvent::Retry(RetryEvent::Attempt { .. }) => {
                tracing::warn!(event = %event, "policy_event")
            }
            PolicyEvent::RateLimit(RateLimitEvent::FailedOpen { .. })
            | PolicyEvent::RateLimit(RateLimitEvent::FailedClosed { .. })
            | PolicyEvent::Retry(RetryEvent::Exhausted { .. })
            | PolicyEvent::Saga(SagaEvent::CompensationFailed { .. }) => {
                tracing::error!(event = %event, "policy_event")
            }
            _ => tracing::info!(event = %event, "policy_event"),
        }
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

/// A bounded in-memory sink. Oldest events are evicted when full.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<VecDeque<PolicyEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    /// Creates a bounded memory sink (default cap: 10,000).
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn events(&self) -> Vec<PolicyEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<PolicyEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: PolicyEvent) -> Self::Future {
        let mut guard = self.events.lock();
        if guard.len() >= self.capacity {
            guard.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push_back(event);
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn attempt(n: u32) -> PolicyEvent {
        PolicyEvent::Retry(RetryEvent::Attempt {
            attempt: n,
            delay: Duration::from_secs(1),
            cause: "40P01".into(),
        })
    }

    #[tokio::test]
    async fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        emit_best_effort(sink.clone(), attempt(1)).await;
        emit_best_effort(sink.clone(), attempt(2)).await;
        assert_eq!(sink.events(), vec![attempt(1), attempt(2)]);
        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn memory_sink_evicts_oldest_when_full() {
        let sink = MemorySink::with_capacity(2);
        for n in 1..=3 {
            emit_best_effort(sink.clone(), attempt(n)).await;
        }
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.evicted(), 1);
        assert_eq!(sink.events()[0], attempt(2));
    }

    #[tokio::test]
    async fn null_and_log_sinks_accept_everything() {
        emit_best_effort(NullSink, attempt(1)).await;
        emit_best_effort(
            LogSink,
            PolicyEvent::Saga(SagaEvent::CompensationFailed {
                step: "charge".into(),
                index: 1,
                error: "boom".into(),
            }),
        )
        .await;
    }
}
