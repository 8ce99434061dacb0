//! Tower middleware applying an [`AdmissionGuard`] in front of a service.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

use crate::error::ResilienceError;
use crate::rate_limit::guard::{Admission, AdmissionGuard, CallerIdentity, RouteRateLimit};
use crate::rate_limit::store::WindowStore;
use crate::rate_limit::RateLimitHeaders;
use crate::telemetry::TelemetrySink;

/// Requests that can describe their caller.
pub trait IdentifyCaller {
    fn caller_identity(&self) -> CallerIdentity;
}

/// Responses that can carry the `X-RateLimit-*` headers.
pub trait RateLimitHeaderSink {
    fn insert_rate_limit_headers(&mut self, headers: &RateLimitHeaders);
}

/// A layer that admits requests through an [`AdmissionGuard`].
#[derive(Debug)]
pub struct AdmissionLayer<S, T> {
    guard: AdmissionGuard<S, T>,
    route: Option<Arc<RouteRateLimit>>,
}

impl<S, T> Clone for AdmissionLayer<S, T> {
    fn clone(&self) -> Self {
        Self { guard: self.guard.clone(), route: self.route.clone() }
    }
}

impl<S, T> AdmissionLayer<S, T> {
    pub fn new(guard: AdmissionGuard<S, T>) -> Self {
        Self { guard, route: None }
    }

    /// Descriptor applied to every request through this layer. Without one the layer admits
    /// everything and adds no headers.
    pub fn with_route(mut self, route: RouteRateLimit) -> Self {
        self.route = Some(Arc::new(route));
        self
    }
}

impl<Svc, S, T> Layer<Svc> for AdmissionLayer<S, T> {
    type Service = AdmissionService<Svc, S, T>;

    fn layer(&self, service: Svc) -> Self::Service {
        AdmissionService { inner: service, guard: self.guard.clone(), route: self.route.clone() }
    }
}

/// Middleware service produced by [`AdmissionLayer`].
#[derive(Debug)]
pub struct AdmissionService<Svc, S, T> {
    inner: Svc,
    guard: AdmissionGuard<S, T>,
    route: Option<Arc<RouteRateLimit>>,
}

impl<Svc: Clone, S, T> Clone for AdmissionService<Svc, S, T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), guard: self.guard.clone(), route: self.route.clone() }
    }
}

impl<Svc, S, T, Req> Service<Req> for AdmissionService<Svc, S, T>
where
    Svc: Service<Req> + Clone + Send + 'static,
    Svc::Future: Send + 'static,
    Svc::Response: RateLimitHeaderSink + Send + 'static,
    Svc::Error: Send + 'static,
    S: WindowStore + 'static,
    T: TelemetrySink,
    Req: IdentifyCaller + Send + 'static,
{
    type Response = Svc::Response;
    type Error = ResilienceError<Svc::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(ResilienceError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let guard = self.guard.clone();
        let route = self.route.clone();
        // Take the instance that was driven to readiness and leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let caller = req.caller_identity();

        Box::pin(async move {
            match guard.admit(route.as_deref(), &caller).await {
                Admission::Unlimited => inner.call(req).await.map_err(ResilienceError::Inner),
                Admission::Allowed { headers, .. } => {
                    let mut response = inner.call(req).await.map_err(ResilienceError::Inner)?;
                    response.insert_rate_limit_headers(&headers);
                    Ok(response)
                }
                Admission::Rejected { retry_after, headers } => {
                    Err(ResilienceError::RateLimited { retry_after, headers })
                }
            }
        })
    }
}
