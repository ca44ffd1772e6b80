//! Account creation shared by `createsuperuser` and `adduser`.

use bookshelf_auth::hashers::{default_validators, validate_password, UserAttributes};
use bookshelf_auth::user::{prepare_superuser, prepare_user};
use bookshelf_auth::{AuthStore, DefaultGroup, NewUser, User};
use bookshelf_core::{BookshelfError, Settings, ValidationError};

/// What an operator asked for on the command line.
#[derive(Debug, Clone, Default)]
pub struct AccountRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub superuser: bool,
    pub groups: Vec<DefaultGroup>,
}

/// Reads `--username`, `--email` and `--password`, falling back to
/// `password_env` for the password.
pub fn request_from_matches<F>(
    matches: &clap::ArgMatches,
    password_env: &str,
    lookup: F,
) -> Result<AccountRequest, BookshelfError>
where
    F: Fn(&str) -> Option<String>,
{
    let arg = |name: &str| {
        matches
            .get_one::<String>(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let username = arg("username").ok_or_else(|| {
        BookshelfError::ConfigurationError("--username is required.".to_string())
    })?;
    let password = matches
        .get_one::<String>("password")
        .cloned()
        .or_else(|| lookup(password_env))
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            BookshelfError::ConfigurationError(format!(
                "--password is required (or set {password_env})."
            ))
        })?;
    Ok(AccountRequest {
        username,
        email: arg("email").unwrap_or_default(),
        password,
        ..AccountRequest::default()
    })
}

/// Validates the request and stores the account with its groups.
///
/// The password must pass the registration validators. Every group must
/// already exist; the user and the memberships are written together.
pub async fn create_account(
    store: &dyn AuthStore,
    settings: &Settings,
    request: AccountRequest,
) -> Result<User, BookshelfError> {
    if store.get_user_by_username(&request.username).await?.is_some() {
        return Err(ValidationError::for_field(
            "username",
            "A user with that username already exists.",
        )
        .into());
    }

    let attributes = UserAttributes {
        username: &request.username,
        email: &request.email,
        ..UserAttributes::default()
    };
    let validators = default_validators(settings.password_min_length);
    if let Err(messages) = validate_password(&request.password, &attributes, &validators) {
        let mut errors = ValidationError::default();
        for message in messages {
            errors.add("password", message);
        }
        return Err(errors.into());
    }

    let new = NewUser::new(request.username, request.password).email(request.email);
    let mut user = if request.superuser {
        prepare_superuser(new).await?
    } else {
        prepare_user(new).await?
    };
    user.groups = request.groups.iter().map(|g| g.name().to_string()).collect();

    let user = store.insert_user(&user).await.map_err(|e| match e {
        BookshelfError::DoesNotExist(msg) => BookshelfError::ConfigurationError(format!(
            "{msg} Run `bookshelf setup_groups` first."
        )),
        other => other,
    })?;
    tracing::info!(
        username = %user.username,
        superuser = user.is_superuser,
        groups = ?user.groups,
        "account created"
    );
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookshelf_auth::setup::setup_groups;
    use bookshelf_auth::{MemoryStore, Permission};

    fn request(username: &str, password: &str) -> AccountRequest {
        AccountRequest {
            username: username.to_string(),
            email: "Ops@Example.COM".to_string(),
            password: password.to_string(),
            ..AccountRequest::default()
        }
    }

    #[tokio::test]
    async fn test_create_superuser() {
        let store = MemoryStore::new();
        let mut req = request("root", "correct horse battery");
        req.superuser = true;
        let user = create_account(&store, &Settings::development(), req).await.unwrap();
        assert!(user.is_superuser);
        assert!(user.is_staff);
        assert_eq!(user.email, "Ops@example.com");
        assert!(user.check_password("correct horse battery").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_weak_password_and_duplicates() {
        let store = MemoryStore::new();
        let settings = Settings::development();

        let err = create_account(&store, &settings, request("ops", "12345678"))
            .await
            .unwrap_err();
        let BookshelfError::ValidationError(errors) = err else {
            panic!("expected a validation error");
        };
        assert!(!errors.messages_for("password").is_empty());

        create_account(&store, &settings, request("ops", "correct horse battery"))
            .await
            .unwrap();
        let err = create_account(&store, &settings, request("ops", "correct horse battery"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_groups_are_assigned() {
        let store = MemoryStore::new();
        setup_groups(&store).await.unwrap();
        let mut req = request("editor", "correct horse battery");
        req.groups = vec![DefaultGroup::Editors];
        let user = create_account(&store, &Settings::development(), req).await.unwrap();

        let groups = store.groups_for_user(user.id).await.unwrap();
        let stored = store.get_user(user.id).await.unwrap().unwrap();
        assert!(bookshelf_auth::authorized(&stored, Permission::CanEdit, &groups));
        assert!(!bookshelf_auth::authorized(&stored, Permission::CanDelete, &groups));
    }
}
