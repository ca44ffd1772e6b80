//! The HTTP server.
//!
//! [`BookshelfApp`] wires the route table and the middleware pipeline
//! into an axum router. Every request, including unknown paths and bodies
//! that are too large, goes through the full pipeline so the security
//! headers are always applied.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::Request;
use axum::response::IntoResponse;
use axum::routing::any;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use tower_http::catch_panic::{CatchPanicLayer, ResponseForPanic};
use tracing::Instrument;

use bookshelf_core::logging::request_span;
use bookshelf_core::{BookshelfError, Settings};
use bookshelf_db::SqliteStore;
use bookshelf_http::urls::URLResolver;
use bookshelf_http::{BoxFuture, HttpRequest, HttpResponse, RouteHandler};

use crate::middleware::auth::AuthenticationMiddleware;
use crate::middleware::csrf::CsrfMiddleware;
use crate::middleware::security::{SecurityHeadersMiddleware, SecurityMiddleware};
use crate::middleware::MiddlewarePipeline;
use crate::state::AppState;
use crate::urls::url_patterns;

/// Largest request body accepted, in bytes.
pub const MAX_BODY_BYTES: usize = 2_621_440;

/// The application: state, routes and middleware.
pub struct BookshelfApp {
    state: AppState,
    resolver: Arc<URLResolver>,
    middleware: Arc<MiddlewarePipeline>,
    security_headers: Arc<SecurityHeadersMiddleware>,
}

impl BookshelfApp {
    /// Builds the application over `store`.
    ///
    /// Middleware runs in this order, outermost first: security headers,
    /// host validation and HTTPS redirect, authentication, CSRF.
    pub fn new(settings: Settings, store: SqliteStore) -> Result<Self, BookshelfError> {
        let state = AppState::new(settings, store)?;
        let resolver = url_patterns(&state)?;

        let security_headers = SecurityHeadersMiddleware::from_settings(&state.settings)?;
        let mut middleware = MiddlewarePipeline::new();
        middleware.add(security_headers.clone());
        middleware.add(SecurityMiddleware::from_settings(&state.settings)?);
        middleware.add(AuthenticationMiddleware::new(state.auth_store(), &state.settings));
        middleware.add(CsrfMiddleware::from_settings(&state.settings));

        Ok(Self {
            state,
            resolver: Arc::new(resolver),
            middleware: Arc::new(middleware),
            security_headers: Arc::new(security_headers),
        })
    }

    /// Returns the shared state.
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Returns the application settings.
    pub fn settings(&self) -> &Settings {
        &self.state.settings
    }

    /// Returns the number of middleware in the pipeline.
    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    /// Converts the application into an axum router.
    ///
    /// A panicking handler answers 500 with the same security headers as
    /// every other response.
    pub fn into_axum_router(self) -> axum::Router {
        let dispatch = dispatcher(Arc::clone(&self.resolver));
        let middleware = self.middleware;
        let settings = Arc::clone(&self.state.settings);

        let handler = move |req: Request<Body>| {
            let dispatch = Arc::clone(&dispatch);
            let middleware = Arc::clone(&middleware);
            let settings = Arc::clone(&settings);
            let request_id = uuid::Uuid::new_v4().to_string();
            let span = request_span(&request_id, req.method().as_str(), req.uri().path());

            async move {
                let started = Instant::now();
                let (parts, body) = req.into_parts();
                let (body, handler) = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
                    Ok(bytes) => (bytes.to_vec(), dispatch),
                    Err(e) => {
                        tracing::warn!(error = %e, "request body rejected");
                        (Vec::new(), payload_too_large())
                    }
                };

                let mut request = HttpRequest::from_axum(parts, body);
                apply_proxy_ssl_header(&settings, &mut request);

                let response = middleware.process(request, &handler).await;
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "request completed"
                );
                response.into_response()
            }
            .instrument(span)
        };

        axum::Router::new()
            .route("/{*path}", any(handler.clone()))
            .route("/", any(handler))
            .layer(CatchPanicLayer::custom(ServerErrorResponse::new(
                self.security_headers,
            )))
    }

    /// Serves the application on `addr` until Ctrl+C or SIGTERM.
    pub async fn run(self, addr: &str) -> Result<(), BookshelfError> {
        let debug = self.settings().debug;
        let router = self.into_axum_router();
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            BookshelfError::ImproperlyConfigured(format!("Failed to bind to {addr}: {e}"))
        })?;

        if debug {
            tracing::warn!("debug mode is on; do not use it in production");
        }
        tracing::info!(addr = %addr, "serving bookshelf");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| BookshelfError::InternalServerError(format!("Server error: {e}")))?;

        tracing::info!("server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for BookshelfApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookshelfApp")
            .field("routes", &self.resolver.patterns().len())
            .field("middleware_count", &self.middleware.len())
            .field("debug", &self.state.settings.debug)
            .finish()
    }
}

/// Builds the 500 answer for a handler that panicked. The middleware
/// pipeline never sees that response, so the security headers are added
/// here.
#[derive(Debug, Clone)]
pub struct ServerErrorResponse {
    security_headers: Arc<SecurityHeadersMiddleware>,
}

impl ServerErrorResponse {
    /// A responder adding the headers of `security_headers`.
    pub const fn new(security_headers: Arc<SecurityHeadersMiddleware>) -> Self {
        Self { security_headers }
    }
}

impl ResponseForPanic for ServerErrorResponse {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> http::Response<Body> {
        let message = err
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| err.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<non-string panic payload>");
        tracing::error!(panic = %message, "handler panicked");

        let mut response = http::Response::new(Body::from("<h1>Server Error (500)</h1>"));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        for (name, value) in self.security_headers.headers() {
            headers.insert(name.clone(), value.clone());
        }
        response
    }
}

/// Marks the request secure when the configured proxy header carries the
/// configured value.
fn apply_proxy_ssl_header(settings: &Settings, request: &mut HttpRequest) {
    let Some((header, expected)) = &settings.secure_proxy_ssl_header else {
        return;
    };
    let forwarded = request
        .header(header)
        .and_then(|v| v.split(',').next())
        .map(str::trim);
    if forwarded == Some(expected.as_str()) {
        request.set_scheme("https");
    }
}

fn dispatcher(resolver: Arc<URLResolver>) -> RouteHandler {
    Arc::new(move |mut request: HttpRequest| -> BoxFuture {
        let resolver = Arc::clone(&resolver);
        Box::pin(async move {
            match resolver.resolve(request.path()) {
                Ok(matched) => {
                    request.set_resolved(matched.url_name, matched.kwargs);
                    (matched.handler)(request).await
                }
                Err(_) => {
                    tracing::info!(path = %request.path(), "no route");
                    HttpResponse::not_found(
                        "<h1>Not Found</h1><p>The requested resource was not found on this server.</p>",
                    )
                }
            }
        })
    })
}

fn payload_too_large() -> RouteHandler {
    Arc::new(|_request: HttpRequest| -> BoxFuture {
        Box::pin(async {
            HttpResponse::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "<h1>Payload Too Large (413)</h1>",
            )
        })
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Ctrl+C received, shutting down"),
        () = terminate => tracing::info!("SIGTERM received, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(settings: Settings) -> BookshelfApp {
        BookshelfApp::new(settings, SqliteStore::memory().unwrap()).unwrap()
    }

    #[test]
    fn test_pipeline_order_and_routes() {
        let app = app(Settings::development());
        assert_eq!(app.middleware_count(), 4);
        assert!(format!("{app:?}").contains("routes: 14"));
    }

    // ── Panics ──────────────────────────────────────────────────────────

    async fn explode() -> &'static str {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_panic_response_carries_security_headers() {
        use tower::ServiceExt;

        let headers = SecurityHeadersMiddleware::from_settings(&Settings::default()).unwrap();
        let expected = headers.headers().to_vec();
        assert!(!expected.is_empty());
        let router = axum::Router::new()
            .route("/", axum::routing::get(explode))
            .layer(CatchPanicLayer::custom(ServerErrorResponse::new(Arc::new(headers))));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );
        for (name, value) in &expected {
            assert_eq!(response.headers().get(name), Some(value), "{name}");
        }
        assert!(response.headers().contains_key("content-security-policy"));
        assert!(response.headers().contains_key("strict-transport-security"));
    }

    #[test]
    fn test_panic_payload_kinds() {
        let headers = SecurityHeadersMiddleware::from_settings(&Settings::development()).unwrap();
        let mut responder = ServerErrorResponse::new(Arc::new(headers));
        let from_string = responder.response_for_panic(Box::new(String::from("owned")));
        assert_eq!(from_string.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let opaque = responder.response_for_panic(Box::new(7_u8));
        assert!(opaque.headers().contains_key("x-frame-options"));
    }

    #[test]
    fn test_proxy_ssl_header() {
        let settings = Settings::default();
        let mut request = HttpRequest::builder()
            .header("x-forwarded-proto", "https")
            .build();
        apply_proxy_ssl_header(&settings, &mut request);
        assert!(request.is_secure());

        let mut plain = HttpRequest::builder().header("x-forwarded-proto", "http").build();
        apply_proxy_ssl_header(&settings, &mut plain);
        assert!(!plain.is_secure());

        let no_proxy = Settings {
            secure_proxy_ssl_header: None,
            ..Settings::default()
        };
        let mut spoofed = HttpRequest::builder()
            .header("x-forwarded-proto", "https")
            .build();
        apply_proxy_ssl_header(&no_proxy, &mut spoofed);
        assert!(!spoofed.is_secure());
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let state = AppState::new(Settings::development(), SqliteStore::memory().unwrap()).unwrap();
        let dispatch = dispatcher(Arc::new(url_patterns(&state).unwrap()));
        let response = dispatch(HttpRequest::builder().path("/nowhere/").build()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
