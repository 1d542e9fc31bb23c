//! Network module with deferred startup lifecycle.
//!
//! `new()` takes the assembled application state, `start()` binds the TCP
//! listener, and `serve()` accepts connections until the shutdown future
//! resolves, then drains in-flight requests and closes the upstream
//! session.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::handlers::{
    calendar_handler, contact_handler, health_handler, liveness_handler, readiness_handler,
    AppState,
};
use super::middleware::{build_http_layers, handler_timeout};
use super::shutdown::ShutdownController;
use crate::service::CallerPipelineLayer;

/// Assembles the axum router.
///
/// Routes behind the caller pipeline:
/// - `GET /{school_id}/{student_id}.ics` -- calendar
/// - `GET /{student_id}.vcf` -- contact
///
/// Routes outside it, never rate limited:
/// - `GET /health`, `GET /health/live`, `GET /health/ready`
///
/// Peer addresses reach the pipeline only when the router is served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn build_router(state: AppState) -> Router {
    let pipeline = CallerPipelineLayer::new(
        Arc::clone(&state.identifier),
        Arc::clone(&state.limiter),
        Arc::clone(&state.shutdown),
    );
    let timeout = handler_timeout(&state.config);

    Router::new()
        .route("/{school_id}/{file}", get(calendar_handler))
        .route("/{file}", get(contact_handler))
        .route_layer(timeout)
        .route_layer(pipeline)
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .layer(build_http_layers())
        .with_state(state)
}

/// Manages the HTTP server lifecycle.
pub struct NetworkModule {
    state: AppState,
    listener: Option<TcpListener>,
}

impl NetworkModule {
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            listener: None,
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.state.shutdown)
    }

    /// Binds the TCP listener and returns the bound port, which differs
    /// from the configured one when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = self.state.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let port = listener.local_addr()?.port();

        info!(host = %self.state.config.host, port, "listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains and closes the
    /// upstream session.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server
    /// hits a fatal I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .context("start() must be called before serve()")?;
        let state = self.state;
        let router = build_router(state.clone());

        state.shutdown.set_ready();
        info!("serving requests");

        let controller = Arc::clone(&state.shutdown);
        let served = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            controller.trigger_shutdown();
        })
        .await;

        drain(&state).await;
        served.context("server terminated")
    }
}

/// Waits for in-flight requests, then closes the upstream session.
async fn drain(state: &AppState) {
    state.shutdown.trigger_shutdown();

    if state.shutdown.wait_for_drain(state.config.drain_timeout).await {
        info!("all requests drained");
    } else {
        warn!(
            in_flight = state.shutdown.in_flight_count(),
            "drain timeout expired with requests remaining"
        );
    }
    state.session.close();
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, Response, StatusCode};
    use saturn_core::{ManualClock, USERS_COLLECTION};
    use tower::ServiceExt;

    use super::*;
    use crate::network::handlers::testing::{state_with, test_state, T0};
    use crate::network::{HealthState, NetworkConfig};
    use crate::render::{FixtureRenderer, RenderError, ResourceRenderer};
    use crate::storage::testing::UnavailableStore;
    use crate::storage::{DocumentStore, MemoryDocumentStore};

    fn get(uri: &str, peer: &str) -> Request<Body> {
        let mut req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let addr: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    async fn text(resp: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn rate_headers(resp: &Response<Body>) -> (String, String, String) {
        let h = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        (
            h("x-ratelimit-limit"),
            h("x-ratelimit-remaining"),
            h("x-ratelimit-reset"),
        )
    }

    #[tokio::test]
    async fn calendar_served_with_rate_headers() {
        let router = build_router(test_state());

        let resp = router
            .oneshot(get("/north-ridge/42.ics", "192.0.2.1:5000"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/calendar; charset=utf-8");
        assert_eq!(
            rate_headers(&resp),
            ("1".into(), "0".into(), "120".into())
        );
        assert!(text(resp).await.contains("Saturn North Ridge Schedule"));
    }

    #[tokio::test]
    async fn contact_served_as_vcard() {
        let resp = build_router(test_state())
            .oneshot(get("/42.vcf", "192.0.2.1:5000"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/vcard; charset=utf-8");
        assert!(text(resp).await.starts_with("BEGIN:VCARD"));
    }

    #[tokio::test]
    async fn self_contact_is_400_with_headers() {
        let resp = build_router(test_state())
            .oneshot(get("/me.vcf", "192.0.2.1:5000"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(rate_headers(&resp).0, "1");
        assert_eq!(text(resp).await, "You cannot access me");
    }

    #[tokio::test]
    async fn wrong_suffix_is_404() {
        let router = build_router(test_state());
        let resp = router
            .clone()
            .oneshot(get("/42.ics", "192.0.2.1:5000"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = router
            .oneshot(get("/school/42.vcf", "192.0.2.1:5000"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_student_is_404() {
        let state = state_with(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(ManualClock::new(T0)),
            FixtureRenderer::new().without_student("404"),
        );
        let resp = build_router(state)
            .oneshot(get("/404.vcf", "192.0.2.1:5000"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn success_then_rejection_both_carry_headers() {
        let router = build_router(test_state());

        for n in 1..=90 {
            let resp = router
                .clone()
                .oneshot(get("/42.vcf", "198.51.100.3:1"))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "request {n}");
            assert_eq!(rate_headers(&resp).1, (1 - n).to_string());
        }

        let resp = router
            .oneshot(get("/42.vcf", "198.51.100.3:1"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            rate_headers(&resp),
            ("1".into(), "-90".into(), "120".into())
        );
    }

    #[tokio::test]
    async fn window_expiry_readmits_caller() {
        let clock = Arc::new(ManualClock::new(T0));
        let state = state_with(
            Arc::new(MemoryDocumentStore::new()),
            Arc::clone(&clock),
            FixtureRenderer::new(),
        );
        let router = build_router(state);

        for _ in 0..91 {
            router.clone().oneshot(get("/1.vcf", "10.0.0.9:1")).await.unwrap();
        }
        clock.advance(119_500);
        let resp = router.clone().oneshot(get("/1.vcf", "10.0.0.9:1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(rate_headers(&resp).2, "0.5");

        clock.advance(500);
        let resp = router.oneshot(get("/1.vcf", "10.0.0.9:1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(rate_headers(&resp).1, "0");
    }

    #[tokio::test]
    async fn proxy_header_selects_bucket() {
        let state = test_state();
        let store = Arc::clone(&state.store);
        let router = build_router(state);

        let mut req = get("/42.vcf", "10.0.0.1:1");
        req.headers_mut()
            .insert("x-real-ip", "203.0.113.5".parse().unwrap());
        router.oneshot(req).await.unwrap();

        let doc = store.find_one(USERS_COLLECTION).await.unwrap().unwrap();
        assert_eq!(doc.id, "203.0.113.5");
    }

    #[tokio::test]
    async fn storage_outage_is_503() {
        let state = state_with(
            Arc::new(UnavailableStore),
            Arc::new(ManualClock::new(T0)),
            FixtureRenderer::new(),
        );
        let resp = build_router(state)
            .oneshot(get("/42.vcf", "192.0.2.1:5000"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    struct StalledRenderer;

    #[async_trait::async_trait]
    impl ResourceRenderer for StalledRenderer {
        async fn calendar(&self, _school: &str, _student: &str) -> Result<String, RenderError> {
            std::future::pending().await
        }

        async fn contact(&self, _student: &str) -> Result<String, RenderError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn handler_timeout_is_counted_and_decorated() {
        let mut state = test_state();
        state.renderer = Arc::new(StalledRenderer);
        state.config = Arc::new(NetworkConfig {
            request_timeout: std::time::Duration::from_millis(20),
            ..NetworkConfig::default()
        });
        let store = Arc::clone(&state.store);

        let resp = build_router(state)
            .oneshot(get("/north-ridge/42.ics", "192.0.2.1:5000"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            rate_headers(&resp),
            ("1".into(), "0".into(), "120".into())
        );
        assert_eq!(store.count(USERS_COLLECTION).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn health_routes_skip_pipeline() {
        let state = state_with(
            Arc::new(UnavailableStore),
            Arc::new(ManualClock::new(T0)),
            FixtureRenderer::new(),
        );
        state.shutdown.set_ready();
        let router = build_router(state);

        for path in ["/health", "/health/live", "/health/ready"] {
            let resp = router.clone().oneshot(get(path, "192.0.2.1:5000")).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "{path}");
            assert!(!resp.headers().contains_key("x-ratelimit-limit"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_create_one_document() {
        let state = test_state();
        let store = Arc::clone(&state.store);
        let router = build_router(state);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let router = router.clone();
                tokio::spawn(async move { router.oneshot(get("/7.vcf", "192.0.2.50:1")).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().status(), StatusCode::OK);
        }

        assert_eq!(store.count(USERS_COLLECTION).await.unwrap(), 1);
    }

    #[test]
    fn shutdown_controller_is_shared() {
        let module = NetworkModule::new(test_state());
        assert!(Arc::ptr_eq(
            &module.shutdown_controller(),
            &module.shutdown_controller()
        ));
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let module = NetworkModule::new(test_state());
        assert!(module.serve(std::future::pending::<()>()).await.is_err());
    }

    #[tokio::test]
    async fn serve_drains_and_closes_session_on_shutdown() {
        let mut state = test_state();
        state.config = Arc::new(NetworkConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..NetworkConfig::default()
        });
        let session = Arc::clone(&state.session);
        let controller = Arc::clone(&state.shutdown);

        let mut module = NetworkModule::new(state);
        let port = module.start().await.unwrap();
        assert!(port > 0);

        module.serve(async {}).await.unwrap();

        assert_eq!(controller.health_state(), HealthState::Stopped);
        assert!(session.is_closed());
    }
}
