//! Password hashing and password strength validation.
//!
//! New passwords are hashed with Argon2id. Stored bcrypt hashes are still
//! verified so accounts imported from older deployments keep working, and
//! [`must_update`] tells the caller when to rehash. Hashing runs on the
//! blocking thread pool.

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;

use bookshelf_core::BookshelfError;

/// Prefix marking a password that can never match.
const UNUSABLE_PASSWORD_PREFIX: &str = "!";

/// A password hashing algorithm.
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    /// Algorithm identifier.
    fn algorithm(&self) -> &'static str;

    /// Hashes `password` into a self-describing encoded string.
    async fn hash(&self, password: &str) -> Result<String, BookshelfError>;

    /// Returns `true` if `password` matches `encoded`.
    async fn verify(&self, password: &str, encoded: &str) -> Result<bool, BookshelfError>;
}

/// Argon2id with the crate's default parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

#[async_trait]
impl PasswordHasher for Argon2Hasher {
    fn algorithm(&self) -> &'static str {
        "argon2"
    }

    async fn hash(&self, password: &str) -> Result<String, BookshelfError> {
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            use argon2::password_hash::{rand_core::OsRng, PasswordHasher as _, SaltString};

            let salt = SaltString::generate(&mut OsRng);
            argon2::Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| BookshelfError::InternalServerError(format!("Argon2 hash error: {e}")))
        })
        .await
        .map_err(|e| BookshelfError::InternalServerError(format!("Task join error: {e}")))?
    }

    async fn verify(&self, password: &str, encoded: &str) -> Result<bool, BookshelfError> {
        let password = password.to_string();
        let encoded = encoded.to_string();
        tokio::task::spawn_blocking(move || {
            use argon2::password_hash::{PasswordHash, PasswordVerifier};

            let parsed = PasswordHash::new(&encoded)
                .map_err(|e| BookshelfError::InternalServerError(format!("Invalid hash: {e}")))?;
            Ok(argon2::Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|e| BookshelfError::InternalServerError(format!("Task join error: {e}")))?
    }
}

/// bcrypt, verification only in practice.
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    /// Cost factor used when hashing.
    pub cost: u32,
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self { cost: 12 }
    }
}

#[async_trait]
impl PasswordHasher for BcryptHasher {
    fn algorithm(&self) -> &'static str {
        "bcrypt"
    }

    async fn hash(&self, password: &str) -> Result<String, BookshelfError> {
        let password = password.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || {
            bcrypt::hash(password, cost)
                .map_err(|e| BookshelfError::InternalServerError(format!("Bcrypt hash error: {e}")))
        })
        .await
        .map_err(|e| BookshelfError::InternalServerError(format!("Task join error: {e}")))?
    }

    async fn verify(&self, password: &str, encoded: &str) -> Result<bool, BookshelfError> {
        let password = password.to_string();
        let encoded = encoded.to_string();
        tokio::task::spawn_blocking(move || {
            bcrypt::verify(password, &encoded).map_err(|e| {
                BookshelfError::InternalServerError(format!("Bcrypt verify error: {e}"))
            })
        })
        .await
        .map_err(|e| BookshelfError::InternalServerError(format!("Task join error: {e}")))?
    }
}

fn identify_hasher(encoded: &str) -> Option<Box<dyn PasswordHasher>> {
    if encoded.starts_with("$argon2") {
        Some(Box::new(Argon2Hasher))
    } else if encoded.starts_with("$2b$") || encoded.starts_with("$2a$") || encoded.starts_with("$2y$") {
        Some(Box::new(BcryptHasher::default()))
    } else {
        None
    }
}

/// Hashes a password with the preferred hasher.
pub async fn make_password(password: &str) -> Result<String, BookshelfError> {
    Argon2Hasher.hash(password).await
}

/// Returns an encoded value that never matches any password.
pub fn make_unusable_password() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect();
    format!("{UNUSABLE_PASSWORD_PREFIX}{suffix}")
}

/// Checks `password` against `encoded`. Unusable and unrecognised hashes
/// never match.
pub async fn check_password(password: &str, encoded: &str) -> Result<bool, BookshelfError> {
    if !is_password_usable(encoded) {
        return Ok(false);
    }
    match identify_hasher(encoded) {
        Some(hasher) => hasher.verify(password, encoded).await,
        None => {
            tracing::warn!(
                prefix = %encoded.chars().take(8).collect::<String>(),
                "unknown password hash format"
            );
            Ok(false)
        }
    }
}

/// Returns `true` if `encoded` can match a password.
pub fn is_password_usable(encoded: &str) -> bool {
    !encoded.is_empty() && !encoded.starts_with(UNUSABLE_PASSWORD_PREFIX)
}

/// Returns `true` if `encoded` was produced by a non-preferred hasher.
pub fn must_update(encoded: &str) -> bool {
    is_password_usable(encoded) && !encoded.starts_with("$argon2id$")
}

// ── Password validators ──────────────────────────────────────────────

/// User attributes a password must not resemble.
#[derive(Debug, Clone, Default)]
pub struct UserAttributes<'a> {
    /// Username.
    pub username: &'a str,
    /// Email address.
    pub email: &'a str,
    /// First name.
    pub first_name: &'a str,
    /// Last name.
    pub last_name: &'a str,
}

/// A password strength rule.
pub trait PasswordValidator: Send + Sync {
    /// Returns an error message if `password` breaks the rule.
    fn validate(&self, password: &str, user: &UserAttributes<'_>) -> Result<(), String>;

    /// Describes the rule for form help text.
    fn help_text(&self) -> String;
}

/// Rejects passwords shorter than `min_length` characters.
#[derive(Debug, Clone)]
pub struct MinimumLengthValidator {
    /// Minimum number of characters.
    pub min_length: usize,
}

impl Default for MinimumLengthValidator {
    fn default() -> Self {
        Self { min_length: 8 }
    }
}

impl PasswordValidator for MinimumLengthValidator {
    fn validate(&self, password: &str, _user: &UserAttributes<'_>) -> Result<(), String> {
        if password.chars().count() < self.min_length {
            Err(format!(
                "This password is too short. It must contain at least {} characters.",
                self.min_length
            ))
        } else {
            Ok(())
        }
    }

    fn help_text(&self) -> String {
        format!(
            "Your password must contain at least {} characters.",
            self.min_length
        )
    }
}

/// Rejects passwords from a list of commonly used ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonPasswordValidator;

const COMMON_PASSWORDS: &[&str] = &[
    "123456", "12345678", "123456789", "1234567890", "password", "password1",
    "qwerty", "qwerty123", "abc123", "111111", "letmein", "iloveyou", "admin",
    "welcome", "monkey", "dragon", "football", "baseball", "sunshine", "princess",
    "master", "shadow", "trustno1", "passw0rd", "superman", "starwars",
    "library", "bookshelf", "books123", "reading",
];

impl PasswordValidator for CommonPasswordValidator {
    fn validate(&self, password: &str, _user: &UserAttributes<'_>) -> Result<(), String> {
        let lowered = password.trim().to_lowercase();
        if COMMON_PASSWORDS.contains(&lowered.as_str()) {
            Err("This password is too common.".to_string())
        } else {
            Ok(())
        }
    }

    fn help_text(&self) -> String {
        "Your password can't be a commonly used password.".to_string()
    }
}

/// Rejects passwords made only of digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericPasswordValidator;

impl PasswordValidator for NumericPasswordValidator {
    fn validate(&self, password: &str, _user: &UserAttributes<'_>) -> Result<(), String> {
        if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
            Err("This password is entirely numeric.".to_string())
        } else {
            Ok(())
        }
    }

    fn help_text(&self) -> String {
        "Your password can't be entirely numeric.".to_string()
    }
}

/// Rejects passwords that contain, or are contained in, a user attribute
/// (case-insensitive; attributes shorter than 3 characters are ignored).
#[derive(Debug, Clone, Copy, Default)]
pub struct UserAttributeSimilarityValidator;

impl PasswordValidator for UserAttributeSimilarityValidator {
    fn validate(&self, password: &str, user: &UserAttributes<'_>) -> Result<(), String> {
        let password = password.to_lowercase();
        let local_part = user.email.split('@').next().unwrap_or("");
        let attributes = [
            ("username", user.username),
            ("email address", local_part),
            ("first name", user.first_name),
            ("last name", user.last_name),
        ];
        for (label, value) in attributes {
            let value = value.to_lowercase();
            if value.chars().count() < 3 {
                continue;
            }
            if password.contains(&value) || value.contains(&password) {
                return Err(format!("The password is too similar to the {label}."));
            }
        }
        Ok(())
    }

    fn help_text(&self) -> String {
        "Your password can't be too similar to your other personal information.".to_string()
    }
}

/// The validators applied at registration.
pub fn default_validators(min_length: usize) -> Vec<Box<dyn PasswordValidator>> {
    vec![
        Box::new(UserAttributeSimilarityValidator),
        Box::new(MinimumLengthValidator { min_length }),
        Box::new(CommonPasswordValidator),
        Box::new(NumericPasswordValidator),
    ]
}

/// Runs every validator and collects all failures.
pub fn validate_password(
    password: &str,
    user: &UserAttributes<'_>,
    validators: &[Box<dyn PasswordValidator>],
) -> Result<(), Vec<String>> {
    let errors: Vec<String> = validators
        .iter()
        .filter_map(|v| v.validate(password, user).err())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Hashing ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_make_and_check_password() {
        let encoded = make_password("correct horse battery").await.unwrap();
        assert!(encoded.starts_with("$argon2id$"));
        assert!(check_password("correct horse battery", &encoded).await.unwrap());
        assert!(!check_password("wrong", &encoded).await.unwrap());
        assert!(!must_update(&encoded));
    }

    #[tokio::test]
    async fn test_hashes_are_salted() {
        let a = make_password("same").await.unwrap();
        let b = make_password("same").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_bcrypt_legacy_hash_verifies() {
        let hasher = BcryptHasher { cost: 4 };
        let encoded = hasher.hash("legacy-pass").await.unwrap();
        assert!(check_password("legacy-pass", &encoded).await.unwrap());
        assert!(!check_password("other", &encoded).await.unwrap());
        assert!(must_update(&encoded));
    }

    #[tokio::test]
    async fn test_unusable_password_never_matches() {
        let encoded = make_unusable_password();
        assert!(!is_password_usable(&encoded));
        assert!(!check_password("", &encoded).await.unwrap());
        assert!(!check_password(&encoded, &encoded).await.unwrap());
        assert!(!must_update(&encoded));
    }

    #[tokio::test]
    async fn test_unknown_format_never_matches() {
        assert!(!check_password("x", "md5$abc$def").await.unwrap());
        assert!(!check_password("", "").await.unwrap());
    }

    // ── Validators ──────────────────────────────────────────────────

    fn attrs() -> UserAttributes<'static> {
        UserAttributes {
            username: "margaret",
            email: "m.atwood@example.com",
            first_name: "Margaret",
            last_name: "Atwood",
        }
    }

    #[test]
    fn test_validate_password_accepts_strong() {
        let validators = default_validators(8);
        assert!(validate_password("tangerine-Orbit-42", &attrs(), &validators).is_ok());
    }

    #[test]
    fn test_validate_password_collects_all_failures() {
        let validators = default_validators(8);
        let errors = validate_password("123456", &attrs(), &validators).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("too short")));
        assert!(errors.iter().any(|e| e.contains("too common")));
        assert!(errors.iter().any(|e| e.contains("entirely numeric")));
    }

    #[test]
    fn test_similarity_validator() {
        let v = UserAttributeSimilarityValidator;
        assert!(v.validate("margaret2024", &attrs()).unwrap_err().contains("username"));
        assert!(v.validate("ATWOOD!!", &attrs()).unwrap_err().contains("last name"));
        assert!(v.validate("m.atwood-x", &attrs()).unwrap_err().contains("email"));
        assert!(v.validate("unrelated-words", &attrs()).is_ok());
    }

    #[test]
    fn test_minimum_length_counts_chars() {
        let v = MinimumLengthValidator { min_length: 4 };
        assert!(v.validate("ééé", &UserAttributes::default()).is_err());
        assert!(v.validate("éééé", &UserAttributes::default()).is_ok());
        assert!(v.help_text().contains('4'));
    }
}
