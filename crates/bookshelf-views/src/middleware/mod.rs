//! Middleware framework.
//!
//! A [`Middleware`] can inspect or short-circuit a request before it
//! reaches the view (`process_request`) and rewrite the response on the
//! way out (`process_response`). [`MiddlewarePipeline`] runs requests
//! through the stack in order and responses in reverse order, so the
//! first middleware added is the outermost layer.
//!
//! The application stack, outermost first:
//!
//! 1. [`security::SecurityHeadersMiddleware`] - static security headers on every response
//! 2. [`security::SecurityMiddleware`] - host validation and the HTTPS redirect
//! 3. [`auth::AuthenticationMiddleware`] - token and session authentication
//! 4. [`csrf::CsrfMiddleware`] - CSRF cookie and token validation

pub mod auth;
pub mod csrf;
pub mod security;

use async_trait::async_trait;

use bookshelf_http::{HttpRequest, HttpResponse, RouteHandler};

/// A middleware component.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use bookshelf_views::middleware::{Middleware, MiddlewarePipeline};
/// use bookshelf_http::{HttpRequest, HttpResponse};
///
/// struct PoweredBy;
///
/// #[async_trait]
/// impl Middleware for PoweredBy {
///     async fn process_response(&self, _request: &HttpRequest, mut response: HttpResponse) -> HttpResponse {
///         response.set_header(http::header::SERVER, "bookshelf");
///         response
///     }
/// }
///
/// let mut pipeline = MiddlewarePipeline::new();
/// pipeline.add(PoweredBy);
/// assert_eq!(pipeline.len(), 1);
/// ```
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Processes an incoming request before it reaches the view.
    ///
    /// Returning `Some(response)` short-circuits the pipeline: the view is
    /// skipped and only the middleware that already ran see the response.
    async fn process_request(&self, _request: &mut HttpRequest) -> Option<HttpResponse> {
        None
    }

    /// Processes the response on its way out.
    async fn process_response(
        &self,
        _request: &HttpRequest,
        response: HttpResponse,
    ) -> HttpResponse {
        response
    }
}

/// An ordered middleware stack.
#[derive(Default)]
pub struct MiddlewarePipeline {
    middlewares: Vec<Box<dyn Middleware>>,
}

impl std::fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewarePipeline")
            .field("len", &self.middlewares.len())
            .finish()
    }
}

impl MiddlewarePipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a middleware inside the ones already added.
    pub fn add(&mut self, middleware: impl Middleware + 'static) {
        self.middlewares.push(Box::new(middleware));
    }

    /// Returns the number of middleware.
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns `true` if the pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs `request` through the middleware and `handler`.
    pub async fn process(&self, mut request: HttpRequest, handler: &RouteHandler) -> HttpResponse {
        for (i, mw) in self.middlewares.iter().enumerate() {
            if let Some(mut response) = mw.process_request(&mut request).await {
                for done in self.middlewares[..=i].iter().rev() {
                    response = done.process_response(&request, response).await;
                }
                return response;
            }
        }

        let mut response = handler(request.clone()).await;

        for mw in self.middlewares.iter().rev() {
            response = mw.process_response(&request, response).await;
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use bookshelf_http::BoxFuture;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        block: bool,
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn process_request(&self, _request: &mut HttpRequest) -> Option<HttpResponse> {
            self.log.lock().unwrap().push(format!("req:{}", self.name));
            self.block.then(|| HttpResponse::forbidden("blocked"))
        }

        async fn process_response(
            &self,
            _request: &HttpRequest,
            response: HttpResponse,
        ) -> HttpResponse {
            self.log.lock().unwrap().push(format!("resp:{}", self.name));
            response
        }
    }

    fn view(log: Arc<Mutex<Vec<String>>>) -> RouteHandler {
        Arc::new(move |_req: HttpRequest| -> BoxFuture {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().unwrap().push("view".into());
                HttpResponse::ok("ok")
            })
        })
    }

    fn pipeline(log: &Arc<Mutex<Vec<String>>>, block_second: bool) -> MiddlewarePipeline {
        let mut p = MiddlewarePipeline::new();
        p.add(Recorder { name: "a", log: Arc::clone(log), block: false });
        p.add(Recorder { name: "b", log: Arc::clone(log), block: block_second });
        p.add(Recorder { name: "c", log: Arc::clone(log), block: false });
        p
    }

    #[tokio::test]
    async fn test_onion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let response = pipeline(&log, false)
            .process(HttpRequest::builder().build(), &view(Arc::clone(&log)))
            .await;
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["req:a", "req:b", "req:c", "view", "resp:c", "resp:b", "resp:a"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_inner_layers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let response = pipeline(&log, true)
            .process(HttpRequest::builder().build(), &view(Arc::clone(&log)))
            .await;
        assert_eq!(response.status(), http::StatusCode::FORBIDDEN);
        assert_eq!(*log.lock().unwrap(), vec!["req:a", "req:b", "resp:b", "resp:a"]);
    }

    #[test]
    fn test_len() {
        let p = MiddlewarePipeline::new();
        assert!(p.is_empty());
        assert!(format!("{p:?}").contains("len"));
    }
}
