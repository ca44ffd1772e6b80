//! HTML templates, compiled into the binary and rendered with Tera.

use tera::{Context, Tera};

use bookshelf_core::BookshelfError;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("form_fields.html", include_str!("../templates/form_fields.html")),
    (
        "bookshelf/book_list.html",
        include_str!("../templates/bookshelf/book_list.html"),
    ),
    (
        "bookshelf/book_form.html",
        include_str!("../templates/bookshelf/book_form.html"),
    ),
    (
        "bookshelf/book_delete.html",
        include_str!("../templates/bookshelf/book_delete.html"),
    ),
    (
        "bookshelf/form_example.html",
        include_str!("../templates/bookshelf/form_example.html"),
    ),
    ("users/register.html", include_str!("../templates/users/register.html")),
    ("users/login.html", include_str!("../templates/users/login.html")),
    ("users/profile.html", include_str!("../templates/users/profile.html")),
];

/// The compiled template set. Output is HTML-escaped.
#[derive(Debug)]
pub struct Templates {
    tera: Tera,
}

impl Templates {
    /// Parses every bundled template.
    pub fn new() -> Result<Self, BookshelfError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())
            .map_err(|e| BookshelfError::TemplateError(format!("{e:?}")))?;
        Ok(Self { tera })
    }

    /// Renders `name` with `context`.
    pub fn render(&self, name: &str, context: &Context) -> Result<String, BookshelfError> {
        self.tera.render(name, context).map_err(|e| {
            tracing::error!(template = name, error = ?e, "template rendering failed");
            BookshelfError::TemplateError(format!("{name}: {e}"))
        })
    }
}
