//! # bookshelf-test
//!
//! Test support for bookshelf: an in-process [`client::TestClient`] that
//! drives the real router and middleware, and [`fixtures`] that build a
//! migrated database with the default groups, users and books.
//!
//! The end-to-end suites live in this crate's `tests/` directory.

pub mod client;
pub mod fixtures;

pub use client::{TestClient, TestResponse};
pub use fixtures::{development_settings, hardened_settings, login, TestApp, PASSWORD};
