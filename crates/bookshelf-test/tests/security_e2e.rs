//! Transport and browser security through the full pipeline: HTTPS
//! redirect, host validation, response headers on every status, cookie
//! flags, CSRF and output escaping.

use bookshelf_auth::DefaultGroup;
use bookshelf_test::{hardened_settings, TestApp, TestResponse, PASSWORD};
use http::Method;

const SECURITY_HEADERS: &[(&str, Option<&str>)] = &[
    ("content-security-policy", None),
    (
        "strict-transport-security",
        Some("max-age=31536000; includeSubDomains; preload"),
    ),
    ("x-frame-options", Some("DENY")),
    ("x-content-type-options", Some("nosniff")),
    ("referrer-policy", Some("same-origin")),
    ("cross-origin-opener-policy", Some("same-origin")),
    ("x-xss-protection", Some("1; mode=block")),
];

fn assert_security_headers(response: &TestResponse) {
    for (name, expected) in SECURITY_HEADERS {
        let value = response.header(name);
        assert!(
            value.is_some(),
            "{name} missing on {} response",
            response.status_code()
        );
        if let Some(expected) = expected {
            assert_eq!(value, Some(*expected), "{name} on {}", response.status_code());
        }
    }
}

async fn app() -> TestApp {
    TestApp::new(hardened_settings()).await.unwrap()
}

// ============================================================================
// HTTPS redirect and host validation
// ============================================================================

#[tokio::test]
async fn test_plain_http_is_redirected_permanently() {
    let app = app().await;
    let mut client = app.client().unwrap();
    client.set_secure(false);

    let response = client.get("/bookshelf/?q=dune").await;
    assert_eq!(response.status_code(), 301);
    assert_eq!(response.location(), Some("https://localhost/bookshelf/?q=dune"));
    assert_security_headers(&response);
}

#[tokio::test]
async fn test_proxied_https_is_not_redirected() {
    let app = app().await;
    let mut client = app.client().unwrap();
    let response = client.get("/accounts/login/").await;
    assert_eq!(response.status_code(), 200);
    assert_security_headers(&response);
}

#[tokio::test]
async fn test_generated_proxy_header_passes_redirect() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = hardened_settings();
    settings.secure_proxy_ssl_header = Some(("X-Forwarded-Ssl".to_string(), "on".to_string()));
    let (cert, key) = (dir.path().join("fullchain.pem"), dir.path().join("privkey.pem"));
    std::fs::write(&cert, "cert").unwrap();
    std::fs::write(&key, "key").unwrap();
    settings.tls.certificate_path = Some(cert);
    settings.tls.certificate_key_path = Some(key);

    let config = bookshelf_cli::commands::proxyconf::render(&settings).unwrap();
    let directive = config
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("proxy_set_header X-Forwarded-Ssl "))
        .unwrap();
    let mut parts = directive.trim_end_matches(';').split_whitespace().skip(1);
    let (name, value) = (parts.next().unwrap(), parts.next().unwrap());
    assert_eq!((name, value), ("X-Forwarded-Ssl", "on"));

    let app = TestApp::new(settings).await.unwrap();
    let mut client = app.client().unwrap();
    client.set_secure(false);
    assert_eq!(client.get("/accounts/login/").await.status_code(), 301);

    client.set_header(name, value);
    let response = client.get("/accounts/login/").await;
    assert_eq!(response.status_code(), 200);
    assert!(response.location().is_none());
}

#[tokio::test]
async fn test_disallowed_host_is_rejected_before_redirect() {
    let app = app().await;
    let mut client = app.client().unwrap();
    client.set_secure(false);
    client.set_host("evil.example.com");

    let response = client.get("/bookshelf/").await;
    assert_eq!(response.status_code(), 400);
    assert!(response.location().is_none());
    assert_security_headers(&response);
}

#[tokio::test]
async fn test_host_port_is_ignored() {
    let app = app().await;
    let mut client = app.client().unwrap();
    client.set_host("localhost:8443");
    assert_eq!(client.get("/accounts/login/").await.status_code(), 200);
}

// ============================================================================
// Headers on every kind of response
// ============================================================================

#[tokio::test]
async fn test_security_headers_on_every_status() {
    let app = app().await;
    let mut client = app.client().unwrap();

    let cases = [
        (client.get("/accounts/login/").await, 200),
        (client.get("/").await, 302),
        (client.get("/bookshelf/").await, 403),
        (client.get("/nowhere/").await, 404),
        (client.get("/accounts/logout/").await, 405),
        (client.get("/api/books/").await, 401),
    ];
    for (response, status) in &cases {
        assert_eq!(response.status_code(), *status);
        assert_security_headers(response);
    }
}

#[tokio::test]
async fn test_method_not_allowed_lists_methods() {
    let app = app().await;
    let mut client = app.client().unwrap();
    let response = client.get("/accounts/logout/").await;
    assert_eq!(response.status_code(), 405);
    assert_eq!(response.header("allow"), Some("POST"));
}

#[tokio::test]
async fn test_oversized_body_is_rejected_with_headers() {
    let app = app().await;
    let mut client = app.client().unwrap();
    let body = vec![b'a'; bookshelf_views::server::MAX_BODY_BYTES + 1];
    let response = client
        .request(
            Method::POST,
            "/api/books_all/",
            body,
            Some("application/json"),
            &[],
        )
        .await;
    assert_eq!(response.status_code(), 413);
    assert_security_headers(&response);
}

// ============================================================================
// Cookies
// ============================================================================

#[tokio::test]
async fn test_cookie_flags() {
    let app = app().await;
    app.create_user("reader", &[DefaultGroup::Viewers]).await.unwrap();
    let mut client = app.client().unwrap();

    let page = client.get("/accounts/login/").await;
    let csrf = page.header("set-cookie").unwrap();
    assert!(csrf.starts_with("csrftoken="));
    assert!(csrf.contains("Secure"));
    assert!(csrf.contains("SameSite=Lax"));
    assert!(!csrf.contains("HttpOnly"));

    let response = client
        .post_form("/accounts/login/", &[("username", "reader"), ("password", PASSWORD)])
        .await;
    assert_eq!(response.status_code(), 302);
    let session = response.header("set-cookie").unwrap();
    assert!(session.starts_with("sessionid="));
    assert!(session.contains("Secure"));
    assert!(session.contains("HttpOnly"));
    assert!(session.contains("SameSite=Lax"));
}

// ============================================================================
// CSRF
// ============================================================================

#[tokio::test]
async fn test_csrf_required_for_session_posts() {
    let app = app().await;
    let mut client = app
        .login_as("editor", &[DefaultGroup::Editors])
        .await
        .unwrap();
    let book = [("title", "Dune"), ("author", "Frank Herbert"), ("publication_year", "1965")];

    let rejected = client.post_form_without_csrf("/bookshelf/create/", &book).await;
    assert_eq!(rejected.status_code(), 403);
    assert!(rejected.contains("CSRF verification failed"));
    assert_security_headers(&rejected);
    assert_eq!(app.store.count_books().await.unwrap(), 0);

    let accepted = client.post_form("/bookshelf/create/", &book).await;
    assert_eq!(accepted.status_code(), 302);
    assert_eq!(app.store.count_books().await.unwrap(), 1);
}

#[tokio::test]
async fn test_csrf_required_for_session_api_writes() {
    let app = app().await;
    let mut client = app
        .login_as("editor", &[DefaultGroup::Editors])
        .await
        .unwrap();
    let response = client
        .post_json(
            "/api/books_all/",
            &serde_json::json!({"title": "Dune", "author": "Frank Herbert", "publication_year": 1965}),
        )
        .await;
    assert_eq!(response.status_code(), 403);
    assert_eq!(app.store.count_books().await.unwrap(), 0);
}

#[tokio::test]
async fn test_login_requires_csrf_cookie() {
    let app = app().await;
    app.create_user("reader", &[]).await.unwrap();
    let mut client = app.client().unwrap();
    let response = client
        .post_form("/accounts/login/", &[("username", "reader"), ("password", PASSWORD)])
        .await;
    assert_eq!(response.status_code(), 403);
    assert!(response.header("set-cookie").map_or(true, |c| !c.starts_with("sessionid=")));
}

// ============================================================================
// Escaping
// ============================================================================

#[tokio::test]
async fn test_titles_are_escaped() {
    let app = app().await;
    app.create_book("<script>alert(1)</script>", "Mallory", 2020)
        .await
        .unwrap();
    let mut client = app
        .login_as("reader", &[DefaultGroup::Viewers])
        .await
        .unwrap();

    let response = client.get("/bookshelf/").await;
    assert_eq!(response.status_code(), 200);
    assert!(!response.contains("<script>alert(1)</script>"));
    assert!(response.contains("&lt;script&gt;"));
}
