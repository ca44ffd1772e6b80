//! The JSON API: token login and book endpoints.

use std::sync::Arc;

use http::{Method, StatusCode};
use serde_json::{json, Value};

use bookshelf_auth::backends::{authenticate, Credentials, ModelBackend};
use bookshelf_auth::AuthBackend;
use bookshelf_core::{BookshelfError, ValidationError};
use bookshelf_db::Book;
use bookshelf_forms::BookForm;
use bookshelf_http::{HttpRequest, HttpResponse, JsonResponse};

use super::books::filter_from_query;
use super::ViewResult;
use crate::state::AppState;

const NOT_FOUND_DETAIL: &str = "No Book matches the given query.";

/// Parses the request body as a JSON object, or as form data when the
/// content type is not JSON.
fn body_object(request: &HttpRequest) -> Result<Value, BookshelfError> {
    if !request.is_json() {
        let map = request
            .post()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        return Ok(Value::Object(map));
    }
    let value: Value = serde_json::from_slice(request.body())
        .map_err(|e| BookshelfError::BadRequest(format!("JSON parse error - {e}")))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(BookshelfError::BadRequest(
            "Invalid data. Expected a dictionary.".into(),
        ))
    }
}

async fn find_book(state: &AppState, request: &HttpRequest) -> Result<Book, BookshelfError> {
    let pk: i64 = request
        .kwarg_as("pk")
        .map_err(|_| BookshelfError::NotFound(NOT_FOUND_DETAIL.into()))?;
    state.store.get_book(pk).await.map_err(|e| match e {
        BookshelfError::DoesNotExist(_) => BookshelfError::NotFound(NOT_FOUND_DETAIL.into()),
        other => other,
    })
}

/// Validates `body` into a book, saving it with `save` on success.
async fn save_book<F, Fut>(
    mut form: BookForm,
    body: &Value,
    partial: Option<&Book>,
    save: F,
) -> Result<Book, BookshelfError>
where
    F: FnOnce(bookshelf_db::BookData) -> Fut,
    Fut: std::future::Future<Output = Result<Book, BookshelfError>>,
{
    form.bind_json(body, partial);
    if !form.is_valid() {
        return Err(form.form().errors().clone().into());
    }
    let data = form
        .cleaned()
        .ok_or_else(|| BookshelfError::ValidationError(ValidationError::new("Invalid book data.")))?;
    save(data).await
}

/// `POST /api/api-token-auth/`: exchanges credentials for the user's token.
pub async fn obtain_token(state: AppState, request: HttpRequest) -> ViewResult {
    let body = body_object(&request)?;
    let field = |name: &str| body.get(name).and_then(Value::as_str).unwrap_or("").to_string();
    let (username, password) = (field("username"), field("password"));

    let mut errors = ValidationError::default();
    for (name, value) in [("username", &username), ("password", &password)] {
        if value.is_empty() {
            errors.add(name, "This field is required.");
        }
    }
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let store = state.auth_store();
    let backends: Vec<Box<dyn AuthBackend>> = vec![Box::new(ModelBackend::new(Arc::clone(&store)))];
    let Some(user) = authenticate(&Credentials::new(username, password), &backends).await? else {
        return Err(ValidationError::new("Unable to log in with provided credentials.").into());
    };
    let token = store.get_or_create_token(user.id).await?;
    tracing::info!(username = %user.username, "API token issued");
    Ok(JsonResponse::new(&json!({ "token": token })))
}

/// `GET /api/books/`: the filtered book list.
pub async fn book_list(state: AppState, request: HttpRequest) -> ViewResult {
    let books = state.store.list_books(&filter_from_query(&request)).await?;
    Ok(JsonResponse::new(&books))
}

/// `GET|POST /api/books_all/`: list, or create with 201.
pub async fn book_collection(state: AppState, request: HttpRequest) -> ViewResult {
    if request.method() != Method::POST {
        return book_list(state, request).await;
    }
    let body = body_object(&request)?;
    let store = state.store.clone();
    let book = save_book(BookForm::new(), &body, None, |data| async move {
        store.create_book(&data).await
    })
    .await?;
    tracing::info!(book_id = book.id, title = %book.title, "book created via API");
    Ok(JsonResponse::with_status(StatusCode::CREATED, &book))
}

/// `GET|PUT|PATCH|DELETE /api/books_all/<pk>/`.
pub async fn book_detail(state: AppState, request: HttpRequest) -> ViewResult {
    let book = find_book(&state, &request).await?;
    let method = request.method().clone();
    if method == Method::GET {
        return Ok(JsonResponse::new(&book));
    }
    if method == Method::DELETE {
        state.store.delete_book(book.id).await?;
        tracing::info!(book_id = book.id, "book deleted via API");
        return Ok(HttpResponse::new(StatusCode::NO_CONTENT, ""));
    }

    let body = body_object(&request)?;
    let partial = (method == Method::PATCH).then_some(&book);
    let store = state.store.clone();
    let id = book.id;
    let updated = save_book(BookForm::new(), &body, partial, |data| async move {
        store.update_book(id, &data).await
    })
    .await?;
    tracing::info!(book_id = id, "book updated via API");
    Ok(JsonResponse::new(&updated))
}
