//! # bookshelf-views
//!
//! The web layer of bookshelf: middleware, access-control decorators, HTML
//! and JSON views, the route table, templates and the axum server.
//!
//! ## Modules
//!
//! - [`middleware`] - Security headers, host/HTTPS checks, authentication, CSRF
//! - [`decorators`] - Method, permission and API authentication gates
//! - [`views`] - Book pages, accounts and the JSON API
//! - [`urls`] - Named routes and reversal
//! - [`templates`] - Tera templates compiled into the binary
//! - [`state`] - Shared application state
//! - [`server`] - [`BookshelfApp`] and the axum router

pub mod decorators;
pub mod middleware;
pub mod server;
pub mod state;
pub mod templates;
pub mod urls;
pub mod views;

pub use middleware::{Middleware, MiddlewarePipeline};
pub use server::BookshelfApp;
pub use state::AppState;
pub use templates::Templates;
