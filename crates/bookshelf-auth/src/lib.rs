//! # bookshelf-auth
//!
//! Users, the static book permissions and default groups, password hashing
//! and validation, API tokens, sessions, CSRF secrets, and the
//! authentication backends.
//!
//! ## Modules
//!
//! - [`permissions`] - `Permission`, `Group`, `DefaultGroup` and the authorization check
//! - [`user`] - The `User` model and creation rules
//! - [`hashers`] - Argon2/bcrypt hashing and password validators
//! - [`backends`] - Credential checks plus token and session resolution
//! - [`store`] - The `AuthStore` persistence trait
//! - [`tokens`] - Token and session keys
//! - [`csrf`] - CSRF secrets and masking
//! - [`setup`] - Seeding of the default groups

pub mod backends;
pub mod csrf;
pub mod hashers;
pub mod permissions;
pub mod setup;
pub mod store;
pub mod tokens;
pub mod user;

pub use backends::{authenticate, AuthBackend, Credentials, ModelBackend};
pub use permissions::{authorized, has_perm, DefaultGroup, Group, Permission};
pub use store::{AuthStore, MemoryStore};
pub use user::{AuthMethod, AuthenticatedUser, NewUser, ProfileUpdate, User};
