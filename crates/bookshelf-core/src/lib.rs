//! # bookshelf-core
//!
//! Foundation shared by every bookshelf crate: the error type, settings and
//! their loader, tracing setup, and the system checks run by `check`.
//!
//! ## Modules
//!
//! - [`error`] - [`BookshelfError`], [`ValidationError`] and the result alias
//! - [`settings`] - [`Settings`] with hardened defaults
//! - [`settings_loader`] - TOML files and `BOOKSHELF_*` environment overrides
//! - [`logging`] - tracing subscriber setup and request spans
//! - [`checks`] - security and deployment checks

pub mod checks;
pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

pub use error::{BookshelfError, BookshelfResult, ValidationError};
pub use settings::Settings;
