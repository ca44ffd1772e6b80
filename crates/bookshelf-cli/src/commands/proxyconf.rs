//! The `proxyconf` management command.
//!
//! Renders the nginx configuration that terminates TLS in front of the
//! application: plain HTTP is redirected with a 301, HTTPS is served with
//! the configured certificate, protocols and ciphers, and requests are
//! forwarded to the upstream with the header the security middleware reads
//! to recognise them as secure.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bookshelf_core::{BookshelfError, Settings};
use bookshelf_views::server::MAX_BODY_BYTES;

use crate::command::ManagementCommand;

const NGINX_TEMPLATE: &str = include_str!("../../templates/nginx.conf");

/// Writes the nginx TLS termination config.
pub struct ProxyconfCommand;

fn require_file(label: &str, path: Option<&PathBuf>) -> Result<String, BookshelfError> {
    let path = path.ok_or_else(|| {
        BookshelfError::ImproperlyConfigured(format!(
            "tls.{label} is not set; the proxy cannot serve HTTPS without it."
        ))
    })?;
    if !path.is_file() {
        return Err(BookshelfError::ImproperlyConfigured(format!(
            "tls.{label} '{}' does not exist.",
            path.display()
        )));
    }
    Ok(path.display().to_string())
}

/// The header line forwarded to the upstream, as `(name, value)`.
///
/// The value is the literal the security middleware compares against, so
/// requests arriving over HTTPS pass its redirect check. Without a
/// configured header the proxy cannot mark requests secure, which only
/// works when the redirect is off.
fn proxy_ssl_header(settings: &Settings) -> Result<Option<(&str, &str)>, BookshelfError> {
    let Some((name, value)) = settings.secure_proxy_ssl_header.as_ref() else {
        if settings.secure_ssl_redirect {
            return Err(BookshelfError::ImproperlyConfigured(
                "secure_proxy_ssl_header must be set when secure_ssl_redirect is on; \
                 otherwise every proxied request is redirected to HTTPS again."
                    .to_string(),
            ));
        }
        return Ok(None);
    };
    let unsafe_token =
        |s: &str| s.is_empty() || s.chars().any(|c| c.is_whitespace() || ";\"'{}$".contains(c));
    if unsafe_token(name) || unsafe_token(value) {
        return Err(BookshelfError::ImproperlyConfigured(format!(
            "secure_proxy_ssl_header ({name:?}, {value:?}) cannot be written as an nginx directive."
        )));
    }
    Ok(Some((name.as_str(), value.as_str())))
}

/// Renders the config for `settings`.
///
/// Fails if the certificate or key path is unset or missing on disk, if
/// the protocol or cipher list is empty, or if the proxy SSL header is
/// missing while HTTPS redirection is on or cannot be written safely.
pub fn render(settings: &Settings) -> Result<String, BookshelfError> {
    let tls = &settings.tls;
    let certificate = require_file("certificate_path", tls.certificate_path.as_ref())?;
    let key = require_file("certificate_key_path", tls.certificate_key_path.as_ref())?;
    if tls.protocols.is_empty() || tls.ciphers.is_empty() {
        return Err(BookshelfError::ImproperlyConfigured(
            "tls.protocols and tls.ciphers must not be empty.".to_string(),
        ));
    }
    let proto = proxy_ssl_header(settings)?;

    let mut context = tera::Context::new();
    context.insert("server_name", &tls.server_name);
    context.insert("upstream", &tls.upstream);
    context.insert("http_port", &tls.http_port);
    context.insert("https_port", &tls.https_port);
    context.insert("certificate_path", &certificate);
    context.insert("certificate_key_path", &key);
    context.insert("protocols", &tls.protocols);
    context.insert("ciphers", &tls.ciphers);
    context.insert("proto_header", &proto.map(|(name, _)| name));
    context.insert("proto_value", &proto.map(|(_, value)| value));
    context.insert("max_body_kib", &(MAX_BODY_BYTES / 1024));

    tera::Tera::one_off(NGINX_TEMPLATE, &context, false)
        .map_err(|e| BookshelfError::TemplateError(format!("nginx.conf: {e}")))
}

fn write_output(config: &str, output: Option<&Path>) -> Result<(), BookshelfError> {
    match output {
        Some(path) => {
            std::fs::write(path, config)?;
            tracing::info!(path = %path.display(), "wrote proxy configuration");
            println!("Wrote {}", path.display());
        }
        None => print!("{config}"),
    }
    Ok(())
}

#[async_trait]
impl ManagementCommand for ProxyconfCommand {
    fn name(&self) -> &'static str {
        "proxyconf"
    }

    fn help(&self) -> &'static str {
        "Render the nginx TLS termination config"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("output")
                .long("output")
                .short('o')
                .value_name("PATH")
                .help("Write to PATH instead of stdout"),
        )
    }

    async fn handle(
        &self,
        matches: &clap::ArgMatches,
        settings: &Settings,
    ) -> Result<(), BookshelfError> {
        let config = render(settings)?;
        write_output(&config, matches.get_one::<String>("output").map(Path::new))
    }
}
