//! Forms for books and the example form page.

use bookshelf_db::books::{AUTHOR_MAX_LENGTH, TITLE_MAX_LENGTH};
use bookshelf_db::{Book, BookData};
use bookshelf_http::QueryDict;

use crate::fields::{FieldValue, FormField};
use crate::form::BaseForm;

/// Create and edit form for a [`Book`].
#[derive(Debug, Clone)]
pub struct BookForm {
    form: BaseForm,
}

impl Default for BookForm {
    fn default() -> Self {
        Self::new()
    }
}

impl BookForm {
    /// An empty form.
    pub fn new() -> Self {
        Self {
            form: BaseForm::new(vec![
                FormField::char("title", TITLE_MAX_LENGTH),
                FormField::char("author", AUTHOR_MAX_LENGTH),
                FormField::integer(
                    "publication_year",
                    i64::from(i32::MIN),
                    i64::from(i32::MAX),
                ),
            ]),
        }
    }

    fn initial_pairs(book: &Book) -> [(&'static str, String); 3] {
        [
            ("title", book.title.clone()),
            ("author", book.author.clone()),
            ("publication_year", book.publication_year.to_string()),
        ]
    }

    /// A form pre-filled from `book`.
    pub fn for_book(book: &Book) -> Self {
        let mut form = Self::new();
        form.form = form.form.with_initial(Self::initial_pairs(book));
        form
    }

    /// Binds submitted form data.
    pub fn bind(&mut self, data: &QueryDict) {
        self.form.bind(data);
    }

    /// Binds a JSON body. With `partial` set to an existing book, missing
    /// fields keep that book's values.
    pub fn bind_json(&mut self, body: &serde_json::Value, partial: Option<&Book>) {
        self.form.bind_json(body);
        if let Some(book) = partial {
            self.form.merge_missing(Self::initial_pairs(book));
        }
    }

    /// Validates the bound data.
    pub fn is_valid(&mut self) -> bool {
        self.form.full_clean()
    }

    /// The cleaned book fields, once valid.
    pub fn cleaned(&self) -> Option<BookData> {
        let year = self
            .form
            .cleaned("publication_year")
            .and_then(FieldValue::as_int)
            .and_then(|y| i32::try_from(y).ok())?;
        Some(BookData {
            title: self.form.cleaned("title")?.as_str()?.to_string(),
            author: self.form.cleaned("author")?.as_str()?.to_string(),
            publication_year: year,
        })
    }

    /// The underlying form, for rendering and error reporting.
    pub const fn form(&self) -> &BaseForm {
        &self.form
    }
}

/// Maximum length of `example_field`.
pub const EXAMPLE_FIELD_MAX_LENGTH: usize = 100;

/// The demonstration form: one required text field.
#[derive(Debug, Clone)]
pub struct ExampleForm {
    form: BaseForm,
}

impl Default for ExampleForm {
    fn default() -> Self {
        Self::new()
    }
}

impl ExampleForm {
    /// An empty form.
    pub fn new() -> Self {
        Self {
            form: BaseForm::new(vec![FormField::char(
                "example_field",
                EXAMPLE_FIELD_MAX_LENGTH,
            )
            .label("Example field")
            .help_text("Enter up to 100 characters.")]),
        }
    }

    /// Binds submitted form data.
    pub fn bind(&mut self, data: &QueryDict) {
        self.form.bind(data);
    }

    /// Validates the bound data.
    pub fn is_valid(&mut self) -> bool {
        self.form.full_clean()
    }

    /// The cleaned value, once valid.
    pub fn example_field(&self) -> &str {
        self.form.cleaned_str("example_field")
    }

    /// The underlying form.
    pub const fn form(&self) -> &BaseForm {
        &self.form
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> Book {
        Book {
            id: 3,
            title: "Kindred".into(),
            author: "Octavia E. Butler".into(),
            publication_year: 1979,
        }
    }

    #[test]
    fn test_book_form_valid() {
        let mut form = BookForm::new();
        form.bind(&QueryDict::parse(
            "title=Parable+of+the+Sower&author=Octavia+E.+Butler&publication_year=1993",
        ));
        assert!(form.is_valid());
        let data = form.cleaned().unwrap();
        assert_eq!(data.title, "Parable of the Sower");
        assert_eq!(data.publication_year, 1993);
    }

    #[test]
    fn test_book_form_limits() {
        let long_title = "t".repeat(201);
        let long_author = "a".repeat(101);
        let mut form = BookForm::new();
        form.bind(&QueryDict::from_pairs([
            ("title", long_title.as_str()),
            ("author", long_author.as_str()),
            ("publication_year", "nineteen"),
        ]));
        assert!(!form.is_valid());
        let errors = form.form().errors();
        assert_eq!(errors.field_errors.len(), 3);
        assert!(errors.messages_for("title")[0].contains("at most 200"));
        assert!(errors.messages_for("author")[0].contains("at most 100"));
        assert!(form.cleaned().is_none());
    }

    #[test]
    fn test_book_form_exact_limits_pass() {
        let title = "t".repeat(200);
        let author = "a".repeat(100);
        let mut form = BookForm::new();
        form.bind(&QueryDict::from_pairs([
            ("title", title.as_str()),
            ("author", author.as_str()),
            ("publication_year", "-44"),
        ]));
        assert!(form.is_valid());
        assert_eq!(form.cleaned().unwrap().publication_year, -44);
    }

    #[test]
    fn test_year_out_of_i32_range() {
        let mut form = BookForm::new();
        form.bind(&QueryDict::parse("title=x&author=y&publication_year=99999999999"));
        assert!(!form.is_valid());
    }

    #[test]
    fn test_for_book_prefills() {
        let form = BookForm::for_book(&book());
        let fields = form.form().bound_fields();
        assert_eq!(fields[0].value, "Kindred");
        assert_eq!(fields[2].value, "1979");
    }

    #[test]
    fn test_partial_json_update() {
        let mut form = BookForm::new();
        form.bind_json(&serde_json::json!({"publication_year": 2004}), Some(&book()));
        assert!(form.is_valid());
        let data = form.cleaned().unwrap();
        assert_eq!(data.title, "Kindred");
        assert_eq!(data.publication_year, 2004);

        let mut full = BookForm::new();
        full.bind_json(&serde_json::json!({"publication_year": 2004}), None);
        assert!(!full.is_valid());
        assert_eq!(full.form().errors().messages_for("title"), ["This field is required."]);
    }

    #[test]
    fn test_example_form() {
        let mut form = ExampleForm::new();
        form.bind(&QueryDict::parse("example_field=hello"));
        assert!(form.is_valid());
        assert_eq!(form.example_field(), "hello");

        let mut empty = ExampleForm::new();
        empty.bind(&QueryDict::new());
        assert!(!empty.is_valid());

        let long = "x".repeat(101);
        let mut too_long = ExampleForm::new();
        too_long.bind(&QueryDict::from_pairs([("example_field", long.as_str())]));
        assert!(!too_long.is_valid());
    }
}
