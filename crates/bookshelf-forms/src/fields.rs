//! Form field definitions and per-field cleaning.
//!
//! A [`FormField`] describes one input: its type, whether it is required,
//! and its label. [`clean_field_value`] turns the raw submitted string
//! into a typed [`FieldValue`] or a list of error messages.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use bookshelf_auth::user::normalize_profile_photo;

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// The type of a form field, with its type-specific limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Free text.
    Char {
        /// Minimum length in characters.
        min_length: Option<usize>,
        /// Maximum length in characters.
        max_length: Option<usize>,
        /// Trim surrounding whitespace before validating.
        strip: bool,
    },
    /// A whole number.
    Integer {
        /// Smallest accepted value.
        min_value: Option<i64>,
        /// Largest accepted value.
        max_value: Option<i64>,
    },
    /// A `YYYY-MM-DD` date.
    Date,
    /// An email address.
    Email,
    /// A password; never echoed back when the form is re-rendered.
    Password,
    /// An uploaded image file name, stored under `profile_photos/`.
    Image,
}

/// A cleaned field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// An empty optional field.
    Null,
    /// Text.
    Str(String),
    /// An integer.
    Int(i64),
    /// A date.
    Date(NaiveDate),
}

impl FieldValue {
    /// Returns the text, if this is a non-empty text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer, if any.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the date, if any.
    pub const fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }
}

/// One input of a form.
#[derive(Debug, Clone)]
pub struct FormField {
    /// The HTML `name`.
    pub name: String,
    /// Human-readable label.
    pub label: String,
    /// Type and limits.
    pub field_type: FieldType,
    /// Whether an empty value is an error.
    pub required: bool,
    /// Help text shown under the input.
    pub help_text: String,
}

fn label_for(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

impl FormField {
    /// Creates a required field labelled after its name.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            label: label_for(&name),
            name,
            field_type,
            required: true,
            help_text: String::new(),
        }
    }

    /// A stripped text field with a maximum length.
    pub fn char(name: impl Into<String>, max_length: usize) -> Self {
        Self::new(
            name,
            FieldType::Char {
                min_length: None,
                max_length: Some(max_length),
                strip: true,
            },
        )
    }

    /// An integer field bounded to `min..=max`.
    pub fn integer(name: impl Into<String>, min: i64, max: i64) -> Self {
        Self::new(
            name,
            FieldType::Integer {
                min_value: Some(min),
                max_value: Some(max),
            },
        )
    }

    /// Sets whether the field is required.
    #[must_use]
    pub const fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Sets the label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the help text.
    #[must_use]
    pub fn help_text(mut self, text: impl Into<String>) -> Self {
        self.help_text = text.into();
        self
    }

    /// The HTML `<input type>` for this field.
    pub const fn input_type(&self) -> &'static str {
        match self.field_type {
            FieldType::Char { .. } => "text",
            FieldType::Integer { .. } => "number",
            FieldType::Date => "date",
            FieldType::Email => "email",
            FieldType::Password => "password",
            FieldType::Image => "file",
        }
    }

    /// The maximum length, for the `maxlength` attribute.
    pub const fn max_length(&self) -> Option<usize> {
        match self.field_type {
            FieldType::Char { max_length, .. } => max_length,
            _ => None,
        }
    }
}

/// Cleans one raw value.
///
/// Missing and empty (after stripping, for text) values are an error for
/// required fields and [`FieldValue::Null`] otherwise. All errors for the
/// field are returned together.
pub fn clean_field_value(field: &FormField, raw: Option<&str>) -> Result<FieldValue, Vec<String>> {
    let raw = raw.unwrap_or("");
    let raw = match field.field_type {
        FieldType::Password => raw,
        _ => raw.trim(),
    };
    if raw.is_empty() {
        return if field.required {
            Err(vec!["This field is required.".to_string()])
        } else {
            Ok(FieldValue::Null)
        };
    }

    let mut errors = Vec::new();
    let value = match &field.field_type {
        FieldType::Char {
            min_length,
            max_length,
            ..
        } => {
            let count = raw.chars().count();
            if let Some(min) = min_length.filter(|min| count < *min) {
                errors.push(format!(
                    "Ensure this value has at least {min} characters (it has {count})."
                ));
            }
            if let Some(max) = max_length.filter(|max| count > *max) {
                errors.push(format!(
                    "Ensure this value has at most {max} characters (it has {count})."
                ));
            }
            FieldValue::Str(raw.to_string())
        }
        FieldType::Integer {
            min_value,
            max_value,
        } => match raw.parse::<i64>() {
            Ok(n) => {
                if let Some(min) = min_value.filter(|min| n < *min) {
                    errors.push(format!("Ensure this value is greater than or equal to {min}."));
                }
                if let Some(max) = max_value.filter(|max| n > *max) {
                    errors.push(format!("Ensure this value is less than or equal to {max}."));
                }
                FieldValue::Int(n)
            }
            Err(_) => {
                errors.push("Enter a whole number.".to_string());
                FieldValue::Null
            }
        },
        FieldType::Date => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(d) => FieldValue::Date(d),
            Err(_) => {
                errors.push("Enter a valid date.".to_string());
                FieldValue::Null
            }
        },
        FieldType::Email => {
            if EMAIL_RE.as_ref().is_some_and(|re| re.is_match(raw)) {
                FieldValue::Str(raw.to_string())
            } else {
                errors.push("Enter a valid email address.".to_string());
                FieldValue::Null
            }
        }
        FieldType::Password => FieldValue::Str(raw.to_string()),
        FieldType::Image => match normalize_profile_photo(raw) {
            Ok(path) => FieldValue::Str(path),
            Err(msg) => {
                errors.push(msg);
                FieldValue::Null
            }
        },
    };

    if errors.is_empty() {
        Ok(value)
    } else {
        Err(errors)
    }
}
