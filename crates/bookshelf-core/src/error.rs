//! Error types shared by every bookshelf crate.
//!
//! [`BookshelfError`] covers HTTP-level failures, data access failures,
//! validation, configuration and I/O. Each variant maps onto an HTTP status
//! through [`BookshelfError::status_code`], so views can turn any error into
//! a response without inspecting it.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// A validation failure, either a single message or a set of per-field
/// messages.
///
/// # Examples
///
/// ```
/// use bookshelf_core::error::ValidationError;
///
/// let mut err = ValidationError::default();
/// err.add("title", "This field is required.");
/// err.add("title", "Ensure this value has at most 200 characters.");
/// assert_eq!(err.messages_for("title").len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    /// Errors not tied to a single field.
    pub non_field_errors: Vec<String>,
    /// Per-field error messages, keyed by field name.
    pub field_errors: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    /// Creates a validation error with a single non-field message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            non_field_errors: vec![message.into()],
            field_errors: BTreeMap::new(),
        }
    }

    /// Creates a validation error with a single message for `field`.
    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::default();
        err.add(field, message);
        err
    }

    /// Appends a message for `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.field_errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Appends a non-field message.
    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.non_field_errors.push(message.into());
    }

    /// Merges another set of errors into this one.
    pub fn extend(&mut self, other: Self) {
        self.non_field_errors.extend(other.non_field_errors);
        for (field, messages) in other.field_errors {
            self.field_errors.entry(field).or_default().extend(messages);
        }
    }

    /// Returns the messages recorded for `field`.
    pub fn messages_for(&self, field: &str) -> &[String] {
        self.field_errors.get(field).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` when no messages were recorded.
    pub fn is_empty(&self) -> bool {
        self.non_field_errors.is_empty() && self.field_errors.values().all(Vec::is_empty)
    }

    /// Renders the errors as a JSON object: `{"field": ["msg", ...]}` with
    /// non-field errors under `non_field_errors`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (field, messages) in &self.field_errors {
            map.insert(field.clone(), serde_json::json!(messages));
        }
        if !self.non_field_errors.is_empty() {
            map.insert(
                "non_field_errors".to_string(),
                serde_json::json!(self.non_field_errors),
            );
        }
        serde_json::Value::Object(map)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for message in &self.non_field_errors {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{message}")?;
            first = false;
        }
        for (field, messages) in &self.field_errors {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// The error type used throughout bookshelf.
#[derive(Error, Debug)]
pub enum BookshelfError {
    // ── HTTP errors ──────────────────────────────────────────────────

    /// HTTP 400 Bad Request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// HTTP 401 Unauthorized.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// HTTP 403 Forbidden.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// HTTP 404 Not Found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP 405 Method Not Allowed.
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// HTTP 500 Internal Server Error.
    #[error("Internal server error: {0}")]
    InternalServerError(String),

    // ── Data errors ──────────────────────────────────────────────────

    /// A lookup expected a row and found none.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    /// A generic database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A uniqueness or foreign key constraint was violated.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    // ── Validation ───────────────────────────────────────────────────

    /// One or more fields failed validation.
    #[error("Validation error: {0}")]
    ValidationError(ValidationError),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value could not be read or parsed.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The settings are syntactically valid but unusable.
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    // ── Rendering and serialization ──────────────────────────────────

    /// A template failed to render.
    #[error("Template error: {0}")]
    TemplateError(String),

    /// JSON or form (de)serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    // ── Security ─────────────────────────────────────────────────────

    /// A request looked malicious (bad host header, forged token).
    #[error("Suspicious operation: {0}")]
    SuspiciousOperation(String),
}

impl BookshelfError {
    /// Returns the HTTP status code for this error.
    ///
    /// - `BadRequest`, `ValidationError`, `SuspiciousOperation` -> 400
    /// - `Unauthorized` -> 401
    /// - `PermissionDenied` -> 403
    /// - `NotFound`, `DoesNotExist` -> 404
    /// - `MethodNotAllowed` -> 405
    /// - `IntegrityError` -> 409
    /// - Everything else -> 500
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) | Self::ValidationError(_) | Self::SuspiciousOperation(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::PermissionDenied(_) => 403,
            Self::NotFound(_) | Self::DoesNotExist(_) => 404,
            Self::MethodNotAllowed(_) => 405,
            Self::IntegrityError(_) => 409,
            Self::InternalServerError(_)
            | Self::DatabaseError(_)
            | Self::ConfigurationError(_)
            | Self::ImproperlyConfigured(_)
            | Self::TemplateError(_)
            | Self::SerializationError(_)
            | Self::IoError(_) => 500,
        }
    }

    /// Returns `true` for errors caused by the client rather than the server.
    pub const fn is_client_error(&self) -> bool {
        let code = self.status_code();
        code >= 400 && code < 500
    }
}

impl From<ValidationError> for BookshelfError {
    fn from(err: ValidationError) -> Self {
        Self::ValidationError(err)
    }
}

impl From<serde_json::Error> for BookshelfError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Shorthand for `Result<T, BookshelfError>`.
pub type BookshelfResult<T> = Result<T, BookshelfError>;
