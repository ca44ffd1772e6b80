//! Persistence seam for users, groups, tokens and sessions.
//!
//! [`AuthStore`] is implemented by the SQLite store in `bookshelf-db`.
//! [`MemoryStore`] keeps everything in process and backs unit tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use bookshelf_core::BookshelfError;

use crate::permissions::{Group, Permission};
use crate::tokens;
use crate::user::User;

/// Storage operations needed by authentication and group seeding.
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Inserts a new user and returns it with its id set. A duplicate
    /// username is an `IntegrityError`.
    async fn insert_user(&self, user: &User) -> Result<User, BookshelfError>;

    /// Looks a user up by id.
    async fn get_user(&self, id: i64) -> Result<Option<User>, BookshelfError>;

    /// Looks a user up by username.
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, BookshelfError>;

    /// Saves the stored fields of an existing user and returns it as
    /// stored. Username, groups and permissions are left untouched. An
    /// unknown id is `DoesNotExist`.
    async fn update_user(&self, user: &User) -> Result<User, BookshelfError>;

    /// Returns the groups `user_id` belongs to, with their permissions.
    async fn groups_for_user(&self, user_id: i64) -> Result<Vec<Group>, BookshelfError>;

    /// Returns the group called `name`, creating it if needed. The flag is
    /// `true` when the group was created by this call.
    async fn get_or_create_group(&self, name: &str) -> Result<(Group, bool), BookshelfError>;

    /// Grants `permissions` to the group and returns how many were newly
    /// granted. A permission missing from the store is `DoesNotExist`.
    async fn assign_group_permissions(
        &self,
        group: &str,
        permissions: &[Permission],
    ) -> Result<usize, BookshelfError>;

    /// Adds a user to an existing group. Unknown groups are `DoesNotExist`.
    async fn add_user_to_group(&self, user_id: i64, group: &str) -> Result<(), BookshelfError>;

    /// Records a successful login.
    async fn touch_last_login(&self, user_id: i64) -> Result<(), BookshelfError>;

    /// Returns the user's API token key, creating one if needed.
    async fn get_or_create_token(&self, user_id: i64) -> Result<String, BookshelfError>;

    /// Looks up the owner of an API token key.
    async fn user_for_token(&self, key: &str) -> Result<Option<User>, BookshelfError>;

    /// Stores a session under `digest` until `expires_at`.
    async fn create_session(
        &self,
        digest: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), BookshelfError>;

    /// Looks up the owner of an unexpired session.
    async fn user_for_session(&self, digest: &str) -> Result<Option<User>, BookshelfError>;

    /// Deletes a session. Deleting a missing session is not an error.
    async fn delete_session(&self, digest: &str) -> Result<(), BookshelfError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<User>,
    groups: Vec<Group>,
    tokens: HashMap<String, i64>,
    sessions: HashMap<String, (i64, DateTime<Utc>)>,
}

impl MemoryState {
    fn user(&self, id: i64) -> Option<User> {
        self.users.iter().find(|u| u.id == id).cloned()
    }
}

/// An in-process [`AuthStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<User, BookshelfError> {
        let mut state = self.state.write().await;
        if state.users.iter().any(|u| u.username == user.username) {
            return Err(BookshelfError::IntegrityError(format!(
                "A user with username '{}' already exists.",
                user.username
            )));
        }
        let mut stored = user.clone();
        stored.id = state.users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        state.users.push(stored.clone());
        Ok(stored)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, BookshelfError> {
        Ok(self.state.read().await.user(id))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, BookshelfError> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.username == username).cloned())
    }

    async fn update_user(&self, user: &User) -> Result<User, BookshelfError> {
        let mut state = self.state.write().await;
        let stored = state
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| BookshelfError::DoesNotExist(format!("User {} does not exist.", user.id)))?;
        *stored = User {
            id: stored.id,
            username: stored.username.clone(),
            groups: std::mem::take(&mut stored.groups),
            user_permissions: std::mem::take(&mut stored.user_permissions),
            ..user.clone()
        };
        Ok(stored.clone())
    }

    async fn groups_for_user(&self, user_id: i64) -> Result<Vec<Group>, BookshelfError> {
        let state = self.state.read().await;
        let Some(user) = state.user(user_id) else {
            return Ok(Vec::new());
        };
        Ok(state
            .groups
            .iter()
            .filter(|g| user.is_member_of(&g.name))
            .cloned()
            .collect())
    }

    async fn get_or_create_group(&self, name: &str) -> Result<(Group, bool), BookshelfError> {
        let mut state = self.state.write().await;
        if let Some(group) = state.groups.iter().find(|g| g.name == name) {
            return Ok((group.clone(), false));
        }
        let group = Group::new(name);
        state.groups.push(group.clone());
        Ok((group, true))
    }

    async fn assign_group_permissions(
        &self,
        group: &str,
        permissions: &[Permission],
    ) -> Result<usize, BookshelfError> {
        let mut state = self.state.write().await;
        let group = state
            .groups
            .iter_mut()
            .find(|g| g.name == group)
            .ok_or_else(|| BookshelfError::DoesNotExist(format!("Group '{group}' does not exist.")))?;
        Ok(permissions
            .iter()
            .filter(|p| group.add_permission(**p))
            .count())
    }

    async fn add_user_to_group(&self, user_id: i64, group: &str) -> Result<(), BookshelfError> {
        let mut state = self.state.write().await;
        if !state.groups.iter().any(|g| g.name == group) {
            return Err(BookshelfError::DoesNotExist(format!(
                "Group '{group}' does not exist."
            )));
        }
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| BookshelfError::DoesNotExist(format!("User {user_id} does not exist.")))?;
        if !user.is_member_of(group) {
            user.groups.push(group.to_string());
        }
        Ok(())
    }

    async fn touch_last_login(&self, user_id: i64) -> Result<(), BookshelfError> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.iter_mut().find(|u| u.id == user_id) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_or_create_token(&self, user_id: i64) -> Result<String, BookshelfError> {
        let mut state = self.state.write().await;
        if let Some((key, _)) = state.tokens.iter().find(|(_, owner)| **owner == user_id) {
            return Ok(key.clone());
        }
        let key = tokens::generate_token_key();
        state.tokens.insert(key.clone(), user_id);
        Ok(key)
    }

    async fn user_for_token(&self, key: &str) -> Result<Option<User>, BookshelfError> {
        let state = self.state.read().await;
        Ok(state.tokens.get(key).and_then(|id| state.user(*id)))
    }

    async fn create_session(
        &self,
        digest: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), BookshelfError> {
        self.state
            .write()
            .await
            .sessions
            .insert(digest.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn user_for_session(&self, digest: &str) -> Result<Option<User>, BookshelfError> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .get(digest)
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .and_then(|(id, _)| state.user(*id)))
    }

    async fn delete_session(&self, digest: &str) -> Result<(), BookshelfError> {
        self.state.write().await.sessions.remove(digest);
        Ok(())
    }
}
