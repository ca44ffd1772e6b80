//! [`BaseForm`]: binding, cleaning and rendering data for a list of fields.

use std::collections::HashMap;

use serde::Serialize;

use bookshelf_core::ValidationError;
use bookshelf_http::QueryDict;

use crate::fields::{clean_field_value, FieldType, FieldValue, FormField};

/// A form field with its submitted value and errors, ready for a template.
#[derive(Debug, Clone, Serialize)]
pub struct BoundField {
    /// The HTML `name`.
    pub name: String,
    /// Label text.
    pub label: String,
    /// `<input type>`.
    pub input_type: &'static str,
    /// Current value; always empty for passwords.
    pub value: String,
    /// Validation messages.
    pub errors: Vec<String>,
    /// Whether the field is required.
    pub required: bool,
    /// Help text.
    pub help_text: String,
    /// `maxlength`, for text fields.
    pub max_length: Option<usize>,
}

/// A set of fields plus the data bound to them.
#[derive(Debug, Clone)]
pub struct BaseForm {
    fields: Vec<FormField>,
    data: HashMap<String, String>,
    bound: bool,
    errors: ValidationError,
    cleaned_data: HashMap<String, FieldValue>,
}

impl BaseForm {
    /// Creates an unbound form.
    pub fn new(fields: Vec<FormField>) -> Self {
        Self {
            fields,
            data: HashMap::new(),
            bound: false,
            errors: ValidationError::default(),
            cleaned_data: HashMap::new(),
        }
    }

    /// Pre-fills values shown by an unbound form.
    #[must_use]
    pub fn with_initial<'a>(mut self, initial: impl IntoIterator<Item = (&'a str, String)>) -> Self {
        for (name, value) in initial {
            self.data.insert(name.to_string(), value);
        }
        self
    }

    /// Returns the field definitions.
    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    /// Binds submitted form data. Unknown keys are ignored.
    pub fn bind(&mut self, data: &QueryDict) {
        self.reset();
        for field in &self.fields {
            if let Some(value) = data.get(&field.name) {
                self.data.insert(field.name.clone(), value.to_string());
            }
        }
    }

    /// Binds a JSON object. Strings are taken as-is, numbers and booleans
    /// are converted to their text form, and `null` counts as missing. A
    /// non-object body becomes a non-field error.
    pub fn bind_json(&mut self, body: &serde_json::Value) {
        self.reset();
        let Some(object) = body.as_object() else {
            self.errors
                .add_non_field("Invalid data. Expected a dictionary.");
            return;
        };
        for field in &self.fields {
            let value = match object.get(&field.name) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                Some(serde_json::Value::Bool(b)) => b.to_string(),
                Some(serde_json::Value::Null) | None => continue,
                Some(_) => {
                    self.errors.add(&field.name, "Not a valid value.");
                    continue;
                }
            };
            self.data.insert(field.name.clone(), value);
        }
    }

    /// Overlays values on already-bound data (for partial updates).
    pub fn merge_missing<'a>(&mut self, defaults: impl IntoIterator<Item = (&'a str, String)>) {
        for (name, value) in defaults {
            self.data.entry(name.to_string()).or_insert(value);
        }
    }

    fn reset(&mut self) {
        self.bound = true;
        self.data.clear();
        self.errors = ValidationError::default();
        self.cleaned_data.clear();
    }

    /// Returns `true` once data has been bound.
    pub const fn is_bound(&self) -> bool {
        self.bound
    }

    /// Cleans every field, collecting all errors. Returns `true` if the
    /// form is bound and valid.
    pub fn full_clean(&mut self) -> bool {
        if !self.bound {
            return false;
        }
        self.cleaned_data.clear();
        for field in &self.fields {
            if !self.errors.messages_for(&field.name).is_empty() {
                continue;
            }
            match clean_field_value(field, self.data.get(&field.name).map(String::as_str)) {
                Ok(value) => {
                    self.cleaned_data.insert(field.name.clone(), value);
                }
                Err(messages) => {
                    for message in messages {
                        self.errors.add(&field.name, message);
                    }
                }
            }
        }
        self.errors.is_empty()
    }

    /// Records an error for `field`, or a non-field error when `field` is
    /// `None`.
    pub fn add_error(&mut self, field: Option<&str>, message: impl Into<String>) {
        match field {
            Some(name) => {
                self.cleaned_data.remove(name);
                self.errors.add(name, message);
            }
            None => self.errors.add_non_field(message),
        }
    }

    /// Returns the errors found by the last clean.
    pub const fn errors(&self) -> &ValidationError {
        &self.errors
    }

    /// Returns the cleaned value of `name`.
    pub fn cleaned(&self, name: &str) -> Option<&FieldValue> {
        self.cleaned_data.get(name)
    }

    /// Returns the cleaned text of `name`, or `""`.
    pub fn cleaned_str(&self, name: &str) -> &str {
        self.cleaned(name).and_then(FieldValue::as_str).unwrap_or("")
    }

    /// Returns the raw bound value of `name`.
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.data.get(name).map(String::as_str)
    }

    /// Returns the fields paired with their values and errors.
    pub fn bound_fields(&self) -> Vec<BoundField> {
        self.fields
            .iter()
            .map(|field| BoundField {
                name: field.name.clone(),
                label: field.label.clone(),
                input_type: field.input_type(),
                value: if field.field_type == FieldType::Password {
                    String::new()
                } else {
                    self.data.get(&field.name).cloned().unwrap_or_default()
                },
                errors: self.errors.messages_for(&field.name).to_vec(),
                required: field.required,
                help_text: field.help_text.clone(),
                max_length: field.max_length(),
            })
            .collect()
    }

    /// Returns the non-field errors.
    pub fn non_field_errors(&self) -> &[String] {
        &self.errors.non_field_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> BaseForm {
        BaseForm::new(vec![
            FormField::char("title", 10),
            FormField::integer("year", 0, 3000),
            FormField::new("secret", FieldType::Password).required(false),
        ])
    }

    #[test]
    fn test_unbound_form_is_invalid() {
        let mut f = form();
        assert!(!f.is_bound());
        assert!(!f.full_clean());
    }

    #[test]
    fn test_bind_and_clean() {
        let mut f = form();
        f.bind(&QueryDict::parse("title=Dune&year=1965&extra=ignored"));
        assert!(f.full_clean());
        assert_eq!(f.cleaned_str("title"), "Dune");
        assert_eq!(f.cleaned("year").and_then(FieldValue::as_int), Some(1965));
        assert_eq!(f.cleaned("secret"), Some(&FieldValue::Null));
        assert!(f.raw("extra").is_none());
    }

    #[test]
    fn test_errors_accumulate_across_fields() {
        let mut f = form();
        f.bind(&QueryDict::parse("title=A+very+long+title&year=soon"));
        assert!(!f.full_clean());
        assert_eq!(f.errors().field_errors.len(), 2);
        assert!(f.cleaned("title").is_none());
    }

    #[test]
    fn test_bind_json() {
        let mut f = form();
        f.bind_json(&serde_json::json!({"title": "Dune", "year": 1965, "secret": null}));
        assert!(f.full_clean());
        assert_eq!(f.cleaned("year").and_then(FieldValue::as_int), Some(1965));

        f.bind_json(&serde_json::json!({"title": ["Dune"], "year": 1}));
        assert!(!f.full_clean());
        assert_eq!(f.errors().messages_for("title"), ["Not a valid value."]);

        f.bind_json(&serde_json::json!([1, 2]));
        assert!(!f.full_clean());
        assert_eq!(f.non_field_errors().len(), 1);
    }

    #[test]
    fn test_merge_missing_keeps_submitted_values() {
        let mut f = form();
        f.bind_json(&serde_json::json!({"year": 2000}));
        f.merge_missing([("title", "Old".to_string()), ("year", "1".to_string())]);
        assert!(f.full_clean());
        assert_eq!(f.cleaned_str("title"), "Old");
        assert_eq!(f.cleaned("year").and_then(FieldValue::as_int), Some(2000));
    }

    #[test]
    fn test_bound_fields_hide_passwords() {
        let mut f = form();
        f.bind(&QueryDict::parse("title=&secret=hunter2"));
        f.full_clean();
        let fields = f.bound_fields();
        assert_eq!(fields[0].errors, vec!["This field is required.".to_string()]);
        assert_eq!(fields[0].max_length, Some(10));
        assert_eq!(fields[2].value, "");
        assert_eq!(fields[2].input_type, "password");
    }

    #[test]
    fn test_add_error_removes_cleaned_value() {
        let mut f = form();
        f.bind(&QueryDict::parse("title=Dune&year=1965"));
        assert!(f.full_clean());
        f.add_error(Some("title"), "Taken.");
        f.add_error(None, "Whole form is wrong.");
        assert!(f.cleaned("title").is_none());
        assert_eq!(f.errors().messages_for("title"), ["Taken."]);
        assert_eq!(f.non_field_errors(), ["Whole form is wrong."]);
    }
}
