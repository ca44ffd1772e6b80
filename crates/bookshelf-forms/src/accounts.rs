//! Registration, profile and login forms.

use once_cell::sync::Lazy;
use regex::Regex;

use bookshelf_auth::hashers::{default_validators, validate_password, UserAttributes};
use bookshelf_auth::{NewUser, ProfileUpdate, User};
use bookshelf_http::QueryDict;

use crate::fields::{FieldType, FieldValue, FormField};
use crate::form::BaseForm;

/// Maximum username length.
pub const USERNAME_MAX_LENGTH: usize = 150;

static USERNAME_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[\w.@+-]+$").ok());

fn username_field() -> FormField {
    FormField::char("username", USERNAME_MAX_LENGTH).help_text(
        "Required. 150 characters or fewer. Letters, digits and @/./+/-/_ only.",
    )
}

/// The sign-up form: account details, the two extra profile fields and a
/// confirmed password.
#[derive(Debug, Clone)]
pub struct UserCreationForm {
    form: BaseForm,
    password_min_length: usize,
}

impl UserCreationForm {
    /// An empty form enforcing `password_min_length`.
    pub fn new(password_min_length: usize) -> Self {
        Self {
            form: BaseForm::new(vec![
                username_field(),
                FormField::new("email", FieldType::Email).required(false),
                FormField::char("first_name", 150).required(false),
                FormField::char("last_name", 150).required(false),
                FormField::new("date_of_birth", FieldType::Date).required(false),
                FormField::new("profile_photo", FieldType::Image).required(false),
                FormField::new("password1", FieldType::Password).label("Password"),
                FormField::new("password2", FieldType::Password)
                    .label("Password confirmation")
                    .help_text("Enter the same password as before, for verification."),
            ]),
            password_min_length,
        }
    }

    /// Binds submitted form data.
    pub fn bind(&mut self, data: &QueryDict) {
        self.form.bind(data);
    }

    /// Validates the fields, then the username format, the password
    /// confirmation and the password strength.
    pub fn is_valid(&mut self) -> bool {
        self.form.full_clean();

        let username = self.form.cleaned_str("username").to_string();
        if !username.is_empty()
            && !USERNAME_RE.as_ref().is_some_and(|re| re.is_match(&username))
        {
            self.form.add_error(
                Some("username"),
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }

        let password1 = self.form.cleaned_str("password1").to_string();
        let password2 = self.form.cleaned_str("password2").to_string();
        if !password1.is_empty() && !password2.is_empty() {
            if password1 == password2 {
                let attrs = UserAttributes {
                    username: &username,
                    email: self.form.cleaned_str("email"),
                    first_name: self.form.cleaned_str("first_name"),
                    last_name: self.form.cleaned_str("last_name"),
                };
                let validators = default_validators(self.password_min_length);
                if let Err(messages) = validate_password(&password2, &attrs, &validators) {
                    for message in messages {
                        self.form.add_error(Some("password2"), message);
                    }
                }
            } else {
                self.form
                    .add_error(Some("password2"), "The two password fields didn't match.");
            }
        }

        self.form.is_bound() && self.form.errors().is_empty()
    }

    /// The account to create, once valid.
    pub fn new_user(&self) -> Option<NewUser> {
        if !self.form.is_bound() || !self.form.errors().is_empty() {
            return None;
        }
        let optional_str = |name: &str| {
            self.form
                .cleaned(name)
                .and_then(FieldValue::as_str)
                .map(str::to_string)
        };
        Some(NewUser {
            username: self.form.cleaned_str("username").to_string(),
            email: self.form.cleaned_str("email").to_string(),
            password: optional_str("password1"),
            first_name: self.form.cleaned_str("first_name").to_string(),
            last_name: self.form.cleaned_str("last_name").to_string(),
            date_of_birth: self.form.cleaned("date_of_birth").and_then(FieldValue::as_date),
            profile_photo: optional_str("profile_photo"),
            is_staff: None,
            is_superuser: None,
        })
    }

    /// Reports a failure found after validation, such as a taken username.
    pub fn add_error(&mut self, field: Option<&str>, message: impl Into<String>) {
        self.form.add_error(field, message);
    }

    /// The underlying form.
    pub const fn form(&self) -> &BaseForm {
        &self.form
    }
}

/// Name of the checkbox that removes the current profile photo.
pub const CLEAR_PHOTO_FIELD: &str = "profile_photo-clear";

/// The profile edit form. Username and password are changed elsewhere.
#[derive(Debug, Clone)]
pub struct UserChangeForm {
    form: BaseForm,
    clear_photo: bool,
}

impl Default for UserChangeForm {
    fn default() -> Self {
        Self::new()
    }
}

impl UserChangeForm {
    /// An empty form.
    pub fn new() -> Self {
        Self {
            form: BaseForm::new(vec![
                FormField::new("email", FieldType::Email).required(false),
                FormField::char("first_name", 150).required(false),
                FormField::char("last_name", 150).required(false),
                FormField::new("date_of_birth", FieldType::Date)
                    .required(false)
                    .help_text("YYYY-MM-DD"),
                FormField::new("profile_photo", FieldType::Image)
                    .required(false)
                    .help_text("Leave empty to keep the current photo."),
            ]),
            clear_photo: false,
        }
    }

    /// A form pre-filled from `user`. The photo input starts empty.
    pub fn for_user(user: &User) -> Self {
        let mut initial = vec![
            ("email", user.email.clone()),
            ("first_name", user.first_name.clone()),
            ("last_name", user.last_name.clone()),
        ];
        if let Some(dob) = user.date_of_birth {
            initial.push(("date_of_birth", dob.format("%Y-%m-%d").to_string()));
        }
        let mut form = Self::new();
        form.form = form.form.with_initial(initial);
        form
    }

    /// Binds submitted form data, including the clear-photo checkbox.
    pub fn bind(&mut self, data: &QueryDict) {
        self.form.bind(data);
        self.clear_photo = data
            .get(CLEAR_PHOTO_FIELD)
            .is_some_and(|v| matches!(v, "on" | "true" | "1"));
    }

    /// Validates the bound data.
    pub fn is_valid(&mut self) -> bool {
        self.form.full_clean()
    }

    /// The changes to apply, once valid.
    pub fn profile_update(&self) -> Option<ProfileUpdate> {
        if !self.form.is_bound() || !self.form.errors().is_empty() {
            return None;
        }
        Some(ProfileUpdate {
            email: self.form.cleaned_str("email").to_string(),
            first_name: self.form.cleaned_str("first_name").to_string(),
            last_name: self.form.cleaned_str("last_name").to_string(),
            date_of_birth: self.form.cleaned("date_of_birth").and_then(FieldValue::as_date),
            profile_photo: self
                .form
                .cleaned("profile_photo")
                .and_then(FieldValue::as_str)
                .map(str::to_string),
            clear_profile_photo: self.clear_photo,
        })
    }

    /// Reports a failure found after validation.
    pub fn add_error(&mut self, field: Option<&str>, message: impl Into<String>) {
        self.form.add_error(field, message);
    }

    /// The underlying form.
    pub const fn form(&self) -> &BaseForm {
        &self.form
    }
}

/// Username and password.
#[derive(Debug, Clone)]
pub struct LoginForm {
    form: BaseForm,
}

impl Default for LoginForm {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginForm {
    /// An empty form.
    pub fn new() -> Self {
        Self {
            form: BaseForm::new(vec![
                username_field().help_text(""),
                FormField::new("password", FieldType::Password),
            ]),
        }
    }

    /// Binds submitted form data.
    pub fn bind(&mut self, data: &QueryDict) {
        self.form.bind(data);
    }

    /// Validates that both fields are present.
    pub fn is_valid(&mut self) -> bool {
        self.form.full_clean()
    }

    /// The submitted username.
    pub fn username(&self) -> &str {
        self.form.cleaned_str("username")
    }

    /// The submitted password.
    pub fn password(&self) -> &str {
        self.form.cleaned_str("password")
    }

    /// Marks the credentials as rejected.
    pub fn reject(&mut self) {
        self.form.add_error(
            None,
            "Please enter a correct username and password. Note that both fields may be case-sensitive.",
        );
    }

    /// The underlying form.
    pub const fn form(&self) -> &BaseForm {
        &self.form
    }
}
