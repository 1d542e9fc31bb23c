//! HTTP transport middleware for the Saturn gateway.
//!
//! [`build_http_layers`] wraps every route, health probes included. The
//! caller pipeline (identification and rate limiting) sits inside those
//! layers and only wraps the resource routes. [`handler_timeout`] sits
//! inside the pipeline, so a timed-out request was already counted and its
//! 408 still carries the rate-limit headers.

use axum::http::header::HeaderName;
use axum::http::StatusCode;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::config::NetworkConfig;

const REQUEST_ID: &str = "x-request-id";

type Trace = TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
>;

/// Composed layer type, outermost last.
type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        CompressionLayer,
        tower::layer::util::Stack<
            Trace,
            tower::layer::util::Stack<
                SetRequestIdLayer<MakeRequestUuid>,
                tower::layer::util::Identity,
            >,
        >,
    >,
>;

/// Builds the transport layers.
///
/// **Ordering (outermost to innermost):**
/// 1. `SetRequestId` -- UUID `X-Request-Id` when the client sent none
/// 2. `Trace` -- one span per request, carrying the request id header
/// 3. `Compression` -- gzip for calendar and contact bodies
/// 4. `PropagateRequestId` -- echoes `X-Request-Id` on the response
#[must_use]
pub fn build_http_layers() -> HttpLayers {
    let request_id = HeaderName::from_static(REQUEST_ID);

    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(trace)
        .layer(CompressionLayer::new())
        .layer(PropagateRequestIdLayer::new(request_id))
        .into_inner()
}

/// 408 once `request_timeout` elapses in a resource handler, cancelling
/// the render call still pending.
#[must_use]
pub fn handler_timeout(config: &NetworkConfig) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, config.request_timeout)
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, Response};
    use tower::{service_fn, Layer, ServiceExt};

    use super::*;

    #[tokio::test]
    async fn responses_carry_request_id() {
        let svc = build_http_layers().layer(service_fn(
            |_req: Request<Body>| async { Ok::<_, Infallible>(Response::new(Body::empty())) },
        ));

        let resp = svc
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.headers().contains_key(REQUEST_ID));
    }

    #[tokio::test]
    async fn client_request_id_is_echoed() {
        let svc = build_http_layers().layer(service_fn(
            |_req: Request<Body>| async { Ok::<_, Infallible>(Response::new(Body::empty())) },
        ));

        let req = Request::builder()
            .uri("/")
            .header(REQUEST_ID, "abc-123")
            .body(Body::empty())
            .unwrap();
        let resp = svc.oneshot(req).await.unwrap();
        assert_eq!(resp.headers()[REQUEST_ID], "abc-123");
    }

    #[tokio::test]
    async fn slow_requests_time_out_with_408() {
        let config = NetworkConfig {
            request_timeout: Duration::from_millis(10),
            ..NetworkConfig::default()
        };
        let svc = handler_timeout(&config).layer(service_fn(|_req: Request<Body>| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Infallible>(Response::new(Body::empty()))
        }));

        let resp = svc
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
