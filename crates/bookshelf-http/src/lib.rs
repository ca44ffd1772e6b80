//! # bookshelf-http
//!
//! The HTTP vocabulary shared by middleware and views: [`HttpRequest`],
//! [`HttpResponse`] and its helpers, [`QueryDict`] for form and query
//! parameters, cookies, and named URL routing.

pub mod cookies;
pub mod querydict;
pub mod request;
pub mod response;
pub mod urls;

pub use querydict::QueryDict;
pub use request::HttpRequest;
pub use response::{
    HttpResponse, HttpResponsePermanentRedirect, HttpResponseRedirect, JsonResponse,
};
pub use urls::{BoxFuture, RouteHandler};
