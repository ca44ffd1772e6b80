//! The HTML book pages and accounts, driven through the router with each
//! default group.

use bookshelf_auth::user::prepare_superuser;
use bookshelf_auth::{AuthStore, DefaultGroup, NewUser};
use bookshelf_test::{development_settings, login, TestApp, PASSWORD};

async fn app() -> TestApp {
    TestApp::new(development_settings()).await.unwrap()
}

const DUNE: &[(&str, &str)] = &[
    ("title", "Dune"),
    ("author", "Frank Herbert"),
    ("publication_year", "1965"),
];

// ============================================================================
// Group permissions
// ============================================================================

#[tokio::test]
async fn test_anonymous_users_are_denied() {
    let app = app().await;
    let mut client = app.client().unwrap();
    assert_eq!(client.get("/bookshelf/").await.status_code(), 403);
    assert_eq!(client.get("/bookshelf/create/").await.status_code(), 403);
}

#[tokio::test]
async fn test_viewers_can_list_but_not_create() {
    let app = app().await;
    app.create_book("Dune", "Frank Herbert", 1965).await.unwrap();
    let mut client = app
        .login_as("viewer", &[DefaultGroup::Viewers])
        .await
        .unwrap();

    let list = client.get("/bookshelf/").await;
    assert_eq!(list.status_code(), 200);
    assert!(list.contains("Dune"));

    assert_eq!(client.get("/bookshelf/create/").await.status_code(), 403);
    assert_eq!(
        client.post_form("/bookshelf/create/", DUNE).await.status_code(),
        403
    );
    assert_eq!(app.store.count_books().await.unwrap(), 1);
}

#[tokio::test]
async fn test_editors_create_and_edit_but_not_delete() {
    let app = app().await;
    let mut client = app
        .login_as("editor", &[DefaultGroup::Editors])
        .await
        .unwrap();

    let created = client.post_form("/bookshelf/create/", DUNE).await;
    assert_eq!(created.status_code(), 302);
    assert_eq!(created.location(), Some("/bookshelf/"));

    let book = app.store.list_books(&Default::default()).await.unwrap().remove(0);
    let edit = format!("/bookshelf/{}/edit/", book.id);
    let form = client.get(&edit).await;
    assert_eq!(form.status_code(), 200);
    assert!(form.contains("value=\"Dune\""));

    let saved = client
        .post_form(
            &edit,
            &[("title", "Dune"), ("author", "Frank Herbert"), ("publication_year", "1966")],
        )
        .await;
    assert_eq!(saved.status_code(), 302);
    assert_eq!(app.store.get_book(book.id).await.unwrap().publication_year, 1966);

    let delete = format!("/bookshelf/{}/delete/", book.id);
    assert_eq!(client.get(&delete).await.status_code(), 403);
    assert_eq!(client.post_form(&delete, &[]).await.status_code(), 403);
    assert_eq!(app.store.count_books().await.unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_book_form_is_redisplayed() {
    let app = app().await;
    let mut client = app
        .login_as("editor", &[DefaultGroup::Editors])
        .await
        .unwrap();
    let response = client
        .post_form(
            "/bookshelf/create/",
            &[("title", ""), ("author", "Frank Herbert"), ("publication_year", "soon")],
        )
        .await;
    assert_eq!(response.status_code(), 200);
    assert!(response.contains("class=\"error\""));
    assert_eq!(app.store.count_books().await.unwrap(), 0);
}

#[tokio::test]
async fn test_admins_confirm_then_delete() {
    let app = app().await;
    let book = app.create_book("Dune", "Frank Herbert", 1965).await.unwrap();
    let mut client = app
        .login_as("admin", &[DefaultGroup::Admins])
        .await
        .unwrap();
    let delete = format!("/bookshelf/{}/delete/", book.id);

    let confirm = client.get(&delete).await;
    assert_eq!(confirm.status_code(), 200);
    assert!(confirm.contains("Are you sure"));
    assert_eq!(app.store.count_books().await.unwrap(), 1);

    let deleted = client.post_form(&delete, &[]).await;
    assert_eq!(deleted.status_code(), 302);
    assert_eq!(deleted.location(), Some("/bookshelf/"));
    assert_eq!(app.store.count_books().await.unwrap(), 0);

    assert_eq!(client.get(&delete).await.status_code(), 404);
}

#[tokio::test]
async fn test_superusers_hold_every_permission() {
    let app = app().await;
    let root = prepare_superuser(NewUser::new("root", PASSWORD)).await.unwrap();
    app.store.insert_user(&root).await.unwrap();

    let mut client = app.client().unwrap();
    login(&mut client, "root", PASSWORD).await.unwrap();
    assert_eq!(client.get("/bookshelf/create/").await.status_code(), 200);
}

// ============================================================================
// Filters
// ============================================================================

#[tokio::test]
async fn test_list_filters() {
    let app = app().await;
    app.create_book("Dune", "Frank Herbert", 1965).await.unwrap();
    app.create_book("Emma", "Jane Austen", 1815).await.unwrap();
    app.create_book("Persuasion", "Jane Austen", 1817).await.unwrap();
    let mut client = app
        .login_as("viewer", &[DefaultGroup::Viewers])
        .await
        .unwrap();

    let by_author = client.get("/bookshelf/?author=Jane%20Austen").await;
    assert!(by_author.contains("Emma"));
    assert!(by_author.contains("Persuasion"));
    assert!(!by_author.contains("Dune"));

    let by_year = client.get("/bookshelf/?publication_year=1815").await;
    assert!(by_year.contains("Emma"));
    assert!(!by_year.contains("Persuasion"));

    let search = client.get("/bookshelf/?q=dun").await;
    assert!(search.contains("Dune"));
    assert!(!search.contains("Emma"));
}

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn test_register_logs_in() {
    let app = app().await;
    let mut client = app.client().unwrap();
    assert_eq!(client.get("/accounts/register/").await.status_code(), 200);

    let response = client
        .post_form(
            "/accounts/register/",
            &[
                ("username", "newcomer"),
                ("email", "newcomer@example.com"),
                ("password1", PASSWORD),
                ("password2", PASSWORD),
            ],
        )
        .await;
    assert_eq!(response.status_code(), 302);
    assert_eq!(response.location(), Some("/"));
    assert!(client.cookie("sessionid").is_some());

    // New accounts belong to no group yet.
    assert_eq!(client.get("/bookshelf/").await.status_code(), 403);
    assert!(app
        .store
        .get_user_by_username("newcomer")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_failed_login_redisplays_form() {
    let app = app().await;
    app.create_user("reader", &[]).await.unwrap();
    let mut client = app.client().unwrap();
    client.get("/accounts/login/").await;
    let response = client
        .post_form("/accounts/login/", &[("username", "reader"), ("password", "nope")])
        .await;
    assert_eq!(response.status_code(), 200);
    assert!(response.contains("Please enter a correct username and password."));
    assert!(client.cookie("sessionid").is_none());
}

#[tokio::test]
async fn test_login_next_and_logout() {
    let app = app().await;
    app.create_user("viewer", &[DefaultGroup::Viewers]).await.unwrap();
    let mut client = app.client().unwrap();
    client.get("/accounts/login/").await;

    let response = client
        .post_form(
            "/accounts/login/",
            &[("username", "viewer"), ("password", PASSWORD), ("next", "/bookshelf/?q=x")],
        )
        .await;
    assert_eq!(response.location(), Some("/bookshelf/?q=x"));
    assert_eq!(client.get("/bookshelf/").await.status_code(), 200);

    let logout = client.post_form("/accounts/logout/", &[]).await;
    assert_eq!(logout.status_code(), 302);
    assert_eq!(logout.location(), Some("/accounts/login/"));
    assert!(client.cookie("sessionid").is_none());
    assert_eq!(client.get("/bookshelf/").await.status_code(), 403);
}

#[tokio::test]
async fn test_profile_edit_persists() {
    let app = app().await;
    let mut anonymous = app.client().unwrap();
    let redirect = anonymous.get("/accounts/profile/").await;
    assert_eq!(redirect.status_code(), 302);
    assert_eq!(
        redirect.location(),
        Some("/accounts/login/?next=%2Faccounts%2Fprofile%2F")
    );

    let mut client = app.login_as("reader", &[DefaultGroup::Viewers]).await.unwrap();
    let page = client.get("/accounts/profile/").await;
    assert_eq!(page.status_code(), 200);
    assert!(page.contains("Profile of reader"));
    assert!(page.contains("name=\"date_of_birth\""));

    let changes = [
        ("email", "reader@Example.com"),
        ("last_name", "Reed"),
        ("date_of_birth", "1990-04-01"),
        ("profile_photo", "me.jpg"),
    ];
    let forged = client.post_form_without_csrf("/accounts/profile/", &changes).await;
    assert_eq!(forged.status_code(), 403);

    let saved = client.post_form("/accounts/profile/", &changes).await;
    assert_eq!(saved.status_code(), 302);
    assert_eq!(saved.location(), Some("/accounts/profile/"));

    let user = app.store.get_user_by_username("reader").await.unwrap().unwrap();
    assert_eq!(user.email, "reader@example.com");
    assert_eq!(user.last_name, "Reed");
    assert_eq!(user.date_of_birth.map(|d| d.to_string()).as_deref(), Some("1990-04-01"));
    assert_eq!(user.profile_photo.as_deref(), Some("profile_photos/me.jpg"));
    assert_eq!(user.groups, vec!["Viewers".to_string()]);

    let page = client.get("/accounts/profile/").await;
    assert!(page.contains("profile_photos/me.jpg"));
    assert!(page.contains("value=\"1990-04-01\""));

    let cleared = client
        .post_form(
            "/accounts/profile/",
            &[("email", "reader@example.com"), ("profile_photo-clear", "on")],
        )
        .await;
    assert_eq!(cleared.status_code(), 302);
    let user = app.store.get_user_by_username("reader").await.unwrap().unwrap();
    assert!(user.profile_photo.is_none());
    assert!(user.date_of_birth.is_none());
    assert!(login(&mut app.client().unwrap(), "reader", PASSWORD).await.is_ok());
}

#[tokio::test]
async fn test_form_example() {
    let app = app().await;
    let mut client = app.client().unwrap();
    client.get("/bookshelf/form-example/").await;
    let response = client
        .post_form("/bookshelf/form-example/", &[("example_field", "hello")])
        .await;
    assert_eq!(response.status_code(), 200);
    assert!(response.contains("You submitted: hello"));
}
