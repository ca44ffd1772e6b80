//! Tracing setup and per-request spans.

use crate::settings::Settings;

/// Installs the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise from
/// `settings.log_level`. Debug mode logs in a pretty, human-readable
/// format; otherwise each event is one JSON object per line. Calling this
/// twice is harmless: the second install is ignored.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates the span every request is handled in.
///
/// # Examples
///
/// ```
/// use bookshelf_core::logging::request_span;
///
/// let span = request_span("5f0c", "GET", "/bookshelf/");
/// let _guard = span.enter();
/// tracing::info!("handling request");
/// ```
pub fn request_span(request_id: &str, method: &str, path: &str) -> tracing::Span {
    tracing::info_span!("http_request", id = request_id, method = method, path = path)
}
