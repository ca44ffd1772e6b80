//! # bookshelf
//!
//! A library management web application: a book catalogue behind
//! group-based permissions, a token-authenticated JSON API, and
//! production-hardened transport and browser security.
//!
//! This crate re-exports the workspace crates and ships the `bookshelf`
//! binary, which runs the management commands:
//!
//! ```text
//! bookshelf migrate
//! bookshelf setup_groups
//! bookshelf createsuperuser --username admin
//! bookshelf check --deploy
//! bookshelf proxyconf --output /etc/nginx/conf.d/bookshelf.conf
//! bookshelf runserver 127.0.0.1:8000
//! ```

/// Settings, errors, logging and system checks.
pub use bookshelf_core as core;

/// Request, response, cookies and query parsing.
pub use bookshelf_http as http;

/// Users, groups, permissions, password hashing, sessions and tokens.
pub use bookshelf_auth as auth;

/// SQLite storage, migrations and the book model.
pub use bookshelf_db as db;

/// Form fields, validation and the book/account forms.
pub use bookshelf_forms as forms;

/// Middleware, views, routes, templates and the server.
pub use bookshelf_views as views;

/// Management commands.
pub use bookshelf_cli as cli;

/// In-process test client and fixtures.
#[cfg(feature = "testing")]
pub use bookshelf_test as test;
