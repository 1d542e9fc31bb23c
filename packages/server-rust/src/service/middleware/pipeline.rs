//! Caller pipeline: identification, document fetch, rate limiting, and
//! header decoration around every resource handler.
//!
//! Runs as a single Tower layer so the headers computed by the rate
//! limiter are in hand on every exit path, including rejections:
//!
//! 1. identify the caller
//! 2. get-or-create its document
//! 3. count the request and decide admission
//! 4. call the handler with [`Admitted`](crate::service::Admitted) in the
//!    request extensions
//! 5. decorate the response
//!
//! Storage failures short-circuit with 503 before any headers exist.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use saturn_core::{CallerIdentity, RateLimitHeaders};
use tower::{Layer, Service};
use tracing::{debug, error};

use crate::network::ShutdownController;
use crate::service::context::Identified;
use crate::service::headers::decorate;
use crate::service::identify::Identifier;
use crate::service::rate_limit::RateLimiter;
use crate::storage::StoreError;

/// Stage of the pipeline an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Count,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetch => "document fetch",
            Self::Count => "rate limit",
        })
    }
}

/// Ways the pipeline ends a request without reaching the handler.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("storage unavailable during {stage}: {source}")]
    StorageUnavailable {
        stage: Stage,
        #[source]
        source: StoreError,
    },
    #[error("rate limited")]
    RateLimited { headers: RateLimitHeaders },
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        match self {
            Self::StorageUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "storage unavailable").into_response()
            }
            Self::RateLimited { headers } => {
                let mut response =
                    (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response();
                decorate(&mut response, &headers);
                response
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CallerPipelineLayer
// ---------------------------------------------------------------------------

/// Tower layer wrapping resource handlers in the caller pipeline.
#[derive(Clone)]
pub struct CallerPipelineLayer {
    identifier: Arc<Identifier>,
    limiter: Arc<RateLimiter>,
    shutdown: Arc<ShutdownController>,
}

impl CallerPipelineLayer {
    #[must_use]
    pub fn new(
        identifier: Arc<Identifier>,
        limiter: Arc<RateLimiter>,
        shutdown: Arc<ShutdownController>,
    ) -> Self {
        Self {
            identifier,
            limiter,
            shutdown,
        }
    }
}

impl<S> Layer<S> for CallerPipelineLayer {
    type Service = CallerPipelineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CallerPipelineService {
            inner,
            identifier: Arc::clone(&self.identifier),
            limiter: Arc::clone(&self.limiter),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

// ---------------------------------------------------------------------------
// CallerPipelineService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CallerPipelineService<S> {
    inner: S,
    identifier: Arc<Identifier>,
    limiter: Arc<RateLimiter>,
    shutdown: Arc<ShutdownController>,
}

impl<S> Service<Request<Body>> for CallerPipelineService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // Call the instance that was driven ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let identifier = Arc::clone(&self.identifier);
        let limiter = Arc::clone(&self.limiter);
        let guard = self.shutdown.in_flight_guard();

        Box::pin(async move {
            let _guard = guard;
            let identified = Identified::new(identifier.identify(&req));

            let document = match limiter.fetch(&identified.identity).await {
                Ok(document) => document,
                Err(source) => {
                    return Ok(storage_failure(&identified.identity, Stage::Fetch, source));
                }
            };
            let fetched = identified.fetched(document);

            let decision = match limiter.check(&fetched.document).await {
                Ok(decision) => decision,
                Err(source) => {
                    return Ok(storage_failure(&fetched.identity, Stage::Count, source));
                }
            };

            let admitted = match fetched.counted(decision).admit() {
                Ok(admitted) => admitted,
                Err(rejected) => {
                    metrics::counter!("saturn_rate_limited_total").increment(1);
                    debug!(
                        caller = %rejected.identity,
                        count = rejected.decision.count,
                        limit = rejected.decision.enforced_limit,
                        "request rate limited"
                    );
                    let headers = rejected.headers();
                    return Ok(PipelineError::RateLimited { headers }.into_response());
                }
            };

            let headers = admitted.headers();
            req.extensions_mut().insert(admitted);
            let mut response = inner.call(req).await?;
            decorate(&mut response, &headers);
            Ok(response)
        })
    }
}

fn storage_failure(caller: &CallerIdentity, stage: Stage, source: StoreError) -> Response {
    let err = PipelineError::StorageUnavailable { stage, source };
    error!(%caller, %stage, error = %err, "request failed");
    err.into_response()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::ConnectInfo;
    use saturn_core::{ManualClock, RateLimitPolicy, USERS_COLLECTION};
    use tower::{service_fn, ServiceExt};

    use super::*;
    use crate::service::context::Admitted;
    use crate::storage::testing::UnavailableStore;
    use crate::storage::{DocumentStore, MemoryDocumentStore};

    fn layer(
        store: Arc<dyn DocumentStore>,
        shutdown: Arc<ShutdownController>,
    ) -> CallerPipelineLayer {
        CallerPipelineLayer::new(
            Arc::new(Identifier::new(None)),
            Arc::new(RateLimiter::new(
                store,
                Arc::new(ManualClock::new(0)),
                RateLimitPolicy {
                    enforced_limit_default: 2,
                    ..RateLimitPolicy::default()
                },
            )),
            shutdown,
        )
    }

    fn request() -> Request<Body> {
        let mut req = Request::builder().uri("/42.vcf").body(Body::empty()).unwrap();
        let peer: SocketAddr = "192.0.2.1:4000".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        req
    }

    /// Handler that echoes the admitted caller identity.
    async fn echo(req: Request<Body>) -> Result<Response, Infallible> {
        let caller = req
            .extensions()
            .get::<Admitted>()
            .map(|a| a.identity().to_string())
            .unwrap_or_default();
        Ok(caller.into_response())
    }

    #[tokio::test]
    async fn admitted_request_reaches_handler_with_context() {
        let store = Arc::new(MemoryDocumentStore::new());
        let svc = layer(store.clone(), Arc::new(ShutdownController::new())).layer(service_fn(echo));

        let resp = svc.oneshot(request()).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-ratelimit-limit"], "1");
        assert_eq!(resp.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(resp.headers()["x-ratelimit-reset"], "120");
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"192.0.2.1");
        assert_eq!(store.count(USERS_COLLECTION).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rejected_request_never_reaches_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let svc = layer(Arc::new(MemoryDocumentStore::new()), Arc::new(ShutdownController::new()))
            .layer(service_fn(move |_req: Request<Body>| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, Infallible>(StatusCode::OK.into_response()) }
            }));

        for _ in 0..4 {
            svc.clone().oneshot(request()).await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn third_request_is_rejected_with_headers() {
        let store = Arc::new(MemoryDocumentStore::new());
        let svc = layer(store, Arc::new(ShutdownController::new())).layer(service_fn(echo));

        for _ in 0..2 {
            let resp = svc.clone().oneshot(request()).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }
        let resp = svc.oneshot(request()).await.unwrap();

        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()["x-ratelimit-limit"], "1");
        assert_eq!(resp.headers()["x-ratelimit-remaining"], "-2");
        assert_eq!(resp.headers()["x-ratelimit-reset"], "120");
    }

    #[tokio::test]
    async fn handler_errors_are_decorated_too() {
        let store = Arc::new(MemoryDocumentStore::new());
        let svc = layer(store, Arc::new(ShutdownController::new())).layer(service_fn(
            |_req: Request<Body>| async {
                Ok::<_, Infallible>((StatusCode::BAD_REQUEST, "nope").into_response())
            },
        ));

        let resp = svc.oneshot(request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(resp.headers().contains_key("x-ratelimit-remaining"));
    }

    #[tokio::test]
    async fn storage_outage_is_503_without_calling_handler() {
        let svc = layer(Arc::new(UnavailableStore), Arc::new(ShutdownController::new()))
            .layer(service_fn(|_req: Request<Body>| async {
                Ok::<_, Infallible>(StatusCode::IM_A_TEAPOT.into_response())
            }));

        let resp = svc.oneshot(request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!resp.headers().contains_key("x-ratelimit-limit"));
    }

    #[tokio::test]
    async fn request_is_tracked_in_flight() {
        let shutdown = Arc::new(ShutdownController::new());
        let observed = Arc::clone(&shutdown);
        let svc = layer(Arc::new(MemoryDocumentStore::new()), Arc::clone(&shutdown)).layer(
            service_fn(move |_req: Request<Body>| {
                let in_flight = observed.in_flight_count();
                async move { Ok::<_, Infallible>(in_flight.to_string().into_response()) }
            }),
        );

        let resp = svc.oneshot(request()).await.unwrap();
        let body = axum::body::to_bytes(resp.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"1");
        assert_eq!(shutdown.in_flight_count(), 0);
    }
}
