//! HTML book pages and the example form.

use http::Method;
use serde::Serialize;

use bookshelf_db::{Book, BookFilter};
use bookshelf_forms::{BookForm, ExampleForm};
use bookshelf_http::{HttpRequest, HttpResponseRedirect};

use super::{base_context, insert_form, render, ViewResult};
use crate::state::AppState;
use crate::urls::reverse;

/// `/` sends visitors to the book list.
pub async fn home(_state: AppState, _request: HttpRequest) -> ViewResult {
    Ok(HttpResponseRedirect::new(&reverse("book_list", &[])?))
}

#[derive(Debug, Serialize)]
struct BookRow {
    #[serde(flatten)]
    book: Book,
    edit_url: String,
    delete_url: String,
}

/// Reads the list filters from the query string. Blank values and a
/// non-numeric year are ignored.
pub fn filter_from_query(request: &HttpRequest) -> BookFilter {
    let text = |name: &str| {
        request
            .get()
            .get(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    BookFilter {
        q: text("q"),
        author: text("author"),
        publication_year: text("publication_year").and_then(|y| y.parse().ok()),
    }
}

/// Lists books, optionally filtered.
pub async fn book_list(state: AppState, request: HttpRequest) -> ViewResult {
    let filter = filter_from_query(&request);
    let books = state.store.list_books(&filter).await?;
    let rows = books
        .into_iter()
        .map(|book| {
            let pk = book.id.to_string();
            Ok(BookRow {
                edit_url: reverse("book_edit", &[("pk", &pk)])?,
                delete_url: reverse("book_delete", &[("pk", &pk)])?,
                book,
            })
        })
        .collect::<bookshelf_core::BookshelfResult<Vec<_>>>()?;

    let mut context = base_context(&request);
    context.insert("books", &rows);
    context.insert("q", filter.q.as_deref().unwrap_or(""));
    render(&state, "bookshelf/book_list.html", &context)
}

fn render_book_form(
    state: &AppState,
    request: &HttpRequest,
    form: &BookForm,
    action: &str,
    form_action: &str,
) -> ViewResult {
    let mut context = base_context(request);
    insert_form(&mut context, form.form());
    context.insert("action", action);
    context.insert("form_action", form_action);
    render(state, "bookshelf/book_form.html", &context)
}

/// Shows the empty book form; on a valid POST creates the book.
pub async fn book_create(state: AppState, request: HttpRequest) -> ViewResult {
    let form_action = reverse("book_create", &[])?;
    let mut form = BookForm::new();
    if request.method() == Method::POST {
        form.bind(request.post());
        if form.is_valid() {
            if let Some(data) = form.cleaned() {
                let book = state.store.create_book(&data).await?;
                tracing::info!(book_id = book.id, title = %book.title, "book created");
                return Ok(HttpResponseRedirect::new(&reverse("book_list", &[])?));
            }
        }
    }
    render_book_form(&state, &request, &form, "Add", &form_action)
}

/// Shows the form for an existing book; on a valid POST saves it.
pub async fn book_edit(state: AppState, request: HttpRequest) -> ViewResult {
    let pk: i64 = request.kwarg_as("pk")?;
    let book = state.store.get_book(pk).await?;
    let form_action = reverse("book_edit", &[("pk", &pk.to_string())])?;
    let mut form = BookForm::for_book(&book);
    if request.method() == Method::POST {
        form = BookForm::new();
        form.bind(request.post());
        if form.is_valid() {
            if let Some(data) = form.cleaned() {
                state.store.update_book(pk, &data).await?;
                tracing::info!(book_id = pk, "book updated");
                return Ok(HttpResponseRedirect::new(&reverse("book_list", &[])?));
            }
        }
    }
    render_book_form(&state, &request, &form, "Edit", &form_action)
}

/// GET asks for confirmation; POST deletes.
pub async fn book_delete(state: AppState, request: HttpRequest) -> ViewResult {
    let pk: i64 = request.kwarg_as("pk")?;
    let book = state.store.get_book(pk).await?;
    if request.method() == Method::POST {
        state.store.delete_book(pk).await?;
        tracing::info!(book_id = pk, title = %book.title, "book deleted");
        return Ok(HttpResponseRedirect::new(&reverse("book_list", &[])?));
    }
    let mut context = base_context(&request);
    context.insert("book", &book);
    context.insert("form_action", &reverse("book_delete", &[("pk", &pk.to_string())])?);
    render(&state, "bookshelf/book_delete.html", &context)
}

/// A single validated text field, echoed back once valid.
pub async fn form_example(state: AppState, request: HttpRequest) -> ViewResult {
    let mut form = ExampleForm::new();
    let mut submitted = None;
    if request.method() == Method::POST {
        form.bind(request.post());
        if form.is_valid() {
            submitted = Some(form.example_field().to_string());
            form = ExampleForm::new();
        }
    }
    let mut context = base_context(&request);
    insert_form(&mut context, form.form());
    context.insert("submitted", &submitted);
    render(&state, "bookshelf/form_example.html", &context)
}
