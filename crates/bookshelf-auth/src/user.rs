//! The user model and the rules for creating and editing users.
//!
//! [`NewUser`] carries registration input; [`prepare_user`] and
//! [`prepare_superuser`] validate it and produce a [`User`] ready to be
//! inserted by an [`AuthStore`](crate::store::AuthStore). [`ProfileUpdate`]
//! carries the fields a user may change on their own profile.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use bookshelf_core::{BookshelfError, ValidationError};

use crate::hashers;
use crate::permissions::{self, Group, Permission};

/// Directory under the media root that profile photos live in.
pub const PROFILE_PHOTO_DIR: &str = "profile_photos";

/// File extensions accepted for profile photos.
pub const PROFILE_PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// A user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Primary key; `0` until stored.
    pub id: i64,
    /// Unique login name.
    pub username: String,
    /// Email address with a lower-cased domain.
    pub email: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Encoded password hash. Starts with `!` when unusable.
    #[serde(skip_serializing)]
    pub password: String,
    /// Inactive accounts cannot log in and hold no permissions.
    pub is_active: bool,
    /// Staff flag.
    pub is_staff: bool,
    /// Superusers hold every permission.
    pub is_superuser: bool,
    /// Account creation time.
    pub date_joined: DateTime<Utc>,
    /// Last successful login.
    pub last_login: Option<DateTime<Utc>>,
    /// Optional date of birth.
    pub date_of_birth: Option<NaiveDate>,
    /// Media-relative path of the profile photo.
    pub profile_photo: Option<String>,
    /// Names of the groups the user belongs to.
    pub groups: Vec<String>,
    /// Permissions granted directly.
    pub user_permissions: BTreeSet<Permission>,
}

impl Default for User {
    fn default() -> Self {
        Self {
            id: 0,
            username: String::new(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            password: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            date_joined: Utc::now(),
            last_login: None,
            date_of_birth: None,
            profile_photo: None,
            groups: Vec::new(),
            user_permissions: BTreeSet::new(),
        }
    }
}

impl User {
    /// Creates an active user with no password.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    /// Returns `true` if the user belongs to the group called `name`.
    pub fn is_member_of(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g == name)
    }

    /// Returns first and last name separated by a space, trimmed.
    pub fn get_full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Returns the first name, or the username if that is empty.
    pub fn get_short_name(&self) -> &str {
        if self.first_name.is_empty() {
            &self.username
        } else {
            &self.first_name
        }
    }

    /// Hashes and stores `raw_password`.
    pub async fn set_password(&mut self, raw_password: &str) -> Result<(), BookshelfError> {
        self.password = hashers::make_password(raw_password).await?;
        Ok(())
    }

    /// Checks `raw_password` against the stored hash.
    pub async fn check_password(&self, raw_password: &str) -> Result<bool, BookshelfError> {
        hashers::check_password(raw_password, &self.password).await
    }

    /// Replaces the password with one that never matches.
    pub fn set_unusable_password(&mut self) {
        self.password = hashers::make_unusable_password();
    }

    /// Returns `true` if a password can match.
    pub fn has_usable_password(&self) -> bool {
        hashers::is_password_usable(&self.password)
    }
}

/// How a request's user was authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Session cookie with the given session key.
    Session(String),
    /// `Authorization: Token` header.
    Token,
}

/// A user resolved for the current request, with the groups needed to
/// answer permission questions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// The user.
    pub user: User,
    /// The groups the user belongs to.
    pub groups: Vec<Group>,
    /// How the user was authenticated.
    pub method: AuthMethod,
}

impl AuthenticatedUser {
    /// Returns `true` if the user holds `perm`.
    pub fn has_perm(&self, perm: Permission) -> bool {
        permissions::has_perm(&self.user, perm, &self.groups)
    }

    /// Returns `true` if the request was authenticated with an API token.
    pub fn is_token_authenticated(&self) -> bool {
        self.method == AuthMethod::Token
    }
}

/// Input for creating a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    /// Login name (required).
    pub username: String,
    /// Email address.
    pub email: String,
    /// Raw password; `None` leaves the account with an unusable password.
    pub password: Option<String>,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Optional date of birth.
    pub date_of_birth: Option<NaiveDate>,
    /// Profile photo file name or media-relative path.
    pub profile_photo: Option<String>,
    /// Explicit staff flag.
    pub is_staff: Option<bool>,
    /// Explicit superuser flag.
    pub is_superuser: Option<bool>,
}

impl NewUser {
    /// Creates input with a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    /// Sets the email address.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }
}

/// Lower-cases the domain part of an email address.
///
/// # Examples
///
/// ```
/// use bookshelf_auth::user::normalize_email;
///
/// assert_eq!(normalize_email(" Reader@Example.COM "), "Reader@example.com");
/// assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
/// ```
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Maps an uploaded photo name to its path under [`PROFILE_PHOTO_DIR`].
///
/// Only the final path component is kept. Names without an accepted image
/// extension are rejected.
pub fn normalize_profile_photo(name: &str) -> Result<String, String> {
    let file_name = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if file_name.is_empty() || file_name.starts_with('.') {
        return Err("Upload a valid image file name.".to_string());
    }
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !PROFILE_PHOTO_EXTENSIONS.contains(&extension.as_str()) {
        return Err(format!(
            "File extension \"{extension}\" is not allowed. Allowed extensions are: {}.",
            PROFILE_PHOTO_EXTENSIONS.join(", ")
        ));
    }
    Ok(format!("{PROFILE_PHOTO_DIR}/{file_name}"))
}

/// Validates `new` and builds an unsaved regular user.
pub async fn prepare_user(new: NewUser) -> Result<User, BookshelfError> {
    let mut errors = ValidationError::default();
    let username = new.username.trim().to_string();
    if username.is_empty() {
        errors.add("username", "The given username must be set.");
    }
    let profile_photo = match new.profile_photo.as_deref().filter(|p| !p.is_empty()) {
        Some(name) => match normalize_profile_photo(name) {
            Ok(path) => Some(path),
            Err(msg) => {
                errors.add("profile_photo", msg);
                None
            }
        },
        None => None,
    };
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let mut user = User {
        username,
        email: normalize_email(&new.email),
        first_name: new.first_name,
        last_name: new.last_name,
        is_staff: new.is_staff.unwrap_or(false),
        is_superuser: new.is_superuser.unwrap_or(false),
        date_of_birth: new.date_of_birth,
        profile_photo,
        ..User::default()
    };
    match new.password.as_deref() {
        Some(raw) => user.set_password(raw).await?,
        None => user.set_unusable_password(),
    }
    Ok(user)
}

/// Profile fields a user may edit. Username, password and flags are not
/// part of it.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    /// Email address; the domain is lower-cased.
    pub email: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Date of birth; `None` clears it.
    pub date_of_birth: Option<NaiveDate>,
    /// A newly uploaded photo name. `None` keeps the current photo.
    pub profile_photo: Option<String>,
    /// Removes the current photo when no new one is uploaded.
    pub clear_profile_photo: bool,
}

/// Applies `update` to a copy of `user`.
///
/// A new photo wins over the clear flag. Invalid photo names are a
/// `ValidationError` on `profile_photo`.
pub fn update_profile(user: &User, update: ProfileUpdate) -> Result<User, BookshelfError> {
    let profile_photo = match update.profile_photo.as_deref().filter(|p| !p.is_empty()) {
        Some(name) => Some(
            normalize_profile_photo(name)
                .map_err(|msg| ValidationError::for_field("profile_photo", msg))?,
        ),
        None if update.clear_profile_photo => None,
        None => user.profile_photo.clone(),
    };
    Ok(User {
        email: normalize_email(&update.email),
        first_name: update.first_name.trim().to_string(),
        last_name: update.last_name.trim().to_string(),
        date_of_birth: update.date_of_birth,
        profile_photo,
        ..user.clone()
    })
}

/// Validates `new` and builds an unsaved superuser.
///
/// Staff and superuser flags are forced on; an explicit `false` for either
/// is an error.
pub async fn prepare_superuser(mut new: NewUser) -> Result<User, BookshelfError> {
    if new.is_staff == Some(false) {
        return Err(ValidationError::for_field("is_staff", "Superuser must have is_staff=True.").into());
    }
    if new.is_superuser == Some(false) {
        return Err(
            ValidationError::for_field("is_superuser", "Superuser must have is_superuser=True.")
                .into(),
        );
    }
    new.is_staff = Some(true);
    new.is_superuser = Some(true);
    prepare_user(new).await
}
