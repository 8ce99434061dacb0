//! Telemetry for the resilience layer.
//!
//! The limiter, the transaction executor and the saga runner emit structured
//! [`PolicyEvent`]s into a [`TelemetrySink`]. A sink is a `tower::Service<PolicyEvent>`, so sinks
//! compose with ordinary tower combinators. Emission is best-effort: a slow or failing sink
//! never affects the request it is reporting on.
//!
//! # Event Types
//!
//! - **RateLimit**: `Rejected`, `FailedOpen`, `FailedClosed`
//! - **Retry**: `Attempt`, `Exhausted`
//! - **Saga**: `StepCommitted`, `Compensated`, `CompensationFailed`

pub mod events;
pub mod sinks;

pub use events::{PolicyEvent, RateLimitEvent, RetryEvent, SagaEvent};
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, TelemetrySink};
