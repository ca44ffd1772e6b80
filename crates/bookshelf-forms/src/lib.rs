//! # bookshelf-forms
//!
//! Form binding and validation for the bookshelf views.
//!
//! ## Modules
//!
//! - [`fields`] - Field types and per-field cleaning
//! - [`form`] - `BaseForm`, binding from form data or JSON
//! - [`books`] - `BookForm` and `ExampleForm`
//! - [`accounts`] - `UserCreationForm` and `LoginForm`

pub mod accounts;
pub mod books;
pub mod fields;
pub mod form;

pub use accounts::{LoginForm, UserChangeForm, UserCreationForm};
pub use books::{BookForm, ExampleForm};
pub use fields::{FieldType, FieldValue, FormField};
pub use form::{BaseForm, BoundField};
