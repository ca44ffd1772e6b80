//! [`AuthStore`] over SQLite.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use bookshelf_auth::{AuthStore, Group, Permission, User};
use bookshelf_core::BookshelfError;

use crate::sqlite::{db_error, SqliteStore};

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, password, is_active, \
     is_staff, is_superuser, date_joined, last_login, date_of_birth, profile_photo";

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, BookshelfError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BookshelfError::DatabaseError(format!("bad timestamp '{value}': {e}")))
}

fn parse_permission(codename: &str) -> Result<Permission, BookshelfError> {
    Permission::from_codename(codename).ok_or_else(|| {
        BookshelfError::DatabaseError(format!("unknown permission codename '{codename}'"))
    })
}

/// Raw `users` row before its text columns are parsed.
struct UserRow {
    user: User,
    date_joined: String,
    last_login: Option<String>,
    date_of_birth: Option<String>,
}

fn read_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        user: User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            first_name: row.get(3)?,
            last_name: row.get(4)?,
            password: row.get(5)?,
            is_active: row.get(6)?,
            is_staff: row.get(7)?,
            is_superuser: row.get(8)?,
            profile_photo: row.get(12)?,
            ..User::default()
        },
        date_joined: row.get(9)?,
        last_login: row.get(10)?,
        date_of_birth: row.get(11)?,
    })
}

/// Loads one user, with group names and direct permissions, matching
/// `column = value`.
fn load_user(
    conn: &Connection,
    column: &str,
    value: &dyn rusqlite::ToSql,
) -> Result<Option<User>, BookshelfError> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"),
            &[value],
            read_user_row,
        )
        .optional()
        .map_err(db_error)?;
    let Some(row) = row else {
        return Ok(None);
    };

    let mut user = row.user;
    user.date_joined = parse_timestamp(&row.date_joined)?;
    user.last_login = row.last_login.as_deref().map(parse_timestamp).transpose()?;
    user.date_of_birth = row
        .date_of_birth
        .as_deref()
        .map(|d| {
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|e| BookshelfError::DatabaseError(format!("bad date '{d}': {e}")))
        })
        .transpose()?;

    let mut stmt = conn
        .prepare(
            "SELECT g.name FROM auth_group g JOIN user_groups ug ON ug.group_id = g.id \
             WHERE ug.user_id = ?1 ORDER BY g.name",
        )
        .map_err(db_error)?;
    user.groups = stmt
        .query_map([user.id], |r| r.get(0))
        .map_err(db_error)?
        .collect::<Result<Vec<String>, _>>()
        .map_err(db_error)?;

    let mut stmt = conn
        .prepare(
            "SELECT p.codename FROM auth_permission p JOIN user_permissions up \
             ON up.permission_id = p.id WHERE up.user_id = ?1",
        )
        .map_err(db_error)?;
    let codenames = stmt
        .query_map([user.id], |r| r.get::<_, String>(0))
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;
    user.user_permissions = codenames
        .iter()
        .map(|c| parse_permission(c))
        .collect::<Result<BTreeSet<_>, _>>()?;

    Ok(Some(user))
}

fn group_id(conn: &Connection, name: &str) -> Result<Option<i64>, BookshelfError> {
    conn.query_row("SELECT id FROM auth_group WHERE name = ?1", [name], |r| r.get(0))
        .optional()
        .map_err(db_error)
}

fn permission_id(conn: &Connection, perm: Permission) -> Result<i64, BookshelfError> {
    conn.query_row(
        "SELECT id FROM auth_permission WHERE codename = ?1",
        [perm.codename()],
        |r| r.get(0),
    )
    .optional()
    .map_err(db_error)?
    .ok_or_else(|| {
        BookshelfError::DoesNotExist(format!(
            "Permission '{}' does not exist. Run migrate first.",
            perm.full_codename()
        ))
    })
}

fn group_permissions(conn: &Connection, group_id: i64) -> Result<BTreeSet<Permission>, BookshelfError> {
    let mut stmt = conn
        .prepare(
            "SELECT p.codename FROM auth_permission p JOIN auth_group_permissions gp \
             ON gp.permission_id = p.id WHERE gp.group_id = ?1",
        )
        .map_err(db_error)?;
    let codenames = stmt
        .query_map([group_id], |r| r.get::<_, String>(0))
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;
    codenames.iter().map(|c| parse_permission(c)).collect()
}

impl SqliteStore {
    /// Grants a permission directly to a user; returns `false` if it was
    /// already granted.
    pub async fn grant_user_permission(
        &self,
        user_id: i64,
        perm: Permission,
    ) -> Result<bool, BookshelfError> {
        self.call(move |conn| {
            let permission_id = permission_id(conn, perm)?;
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO user_permissions (user_id, permission_id) VALUES (?1, ?2)",
                    [user_id, permission_id],
                )
                .map_err(db_error)?;
            Ok(inserted > 0)
        })
        .await
    }

    /// Counts the rows in a table. Used by commands and tests to show what
    /// a run changed.
    pub async fn count_rows(&self, table: &'static str) -> Result<i64, BookshelfError> {
        self.call(move |conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
                .map_err(db_error)
        })
        .await
    }

    /// Deletes expired sessions and returns how many were removed.
    pub async fn clear_expired_sessions(&self) -> Result<usize, BookshelfError> {
        let now = Utc::now().timestamp();
        self.call(move |conn| {
            conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [now])
                .map_err(db_error)
        })
        .await
    }
}

#[async_trait]
impl AuthStore for SqliteStore {
    async fn insert_user(&self, user: &User) -> Result<User, BookshelfError> {
        let mut user = user.clone();
        self.call(move |conn| {
            let tx = conn.transaction().map_err(db_error)?;
            tx.execute(
                "INSERT INTO users (username, email, first_name, last_name, password, is_active, \
                 is_staff, is_superuser, date_joined, last_login, date_of_birth, profile_photo) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    user.username,
                    user.email,
                    user.first_name,
                    user.last_name,
                    user.password,
                    user.is_active,
                    user.is_staff,
                    user.is_superuser,
                    user.date_joined.to_rfc3339(),
                    user.last_login.map(|t| t.to_rfc3339()),
                    user.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string()),
                    user.profile_photo,
                ],
            )
            .map_err(|e| match db_error(e) {
                BookshelfError::IntegrityError(_) => BookshelfError::IntegrityError(format!(
                    "A user with username '{}' already exists.",
                    user.username
                )),
                other => other,
            })?;
            user.id = tx.last_insert_rowid();

            for name in &user.groups {
                let gid = group_id(&tx, name)?.ok_or_else(|| {
                    BookshelfError::DoesNotExist(format!("Group '{name}' does not exist."))
                })?;
                tx.execute(
                    "INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES (?1, ?2)",
                    [user.id, gid],
                )
                .map_err(db_error)?;
            }
            for perm in &user.user_permissions {
                let pid = permission_id(&tx, *perm)?;
                tx.execute(
                    "INSERT OR IGNORE INTO user_permissions (user_id, permission_id) VALUES (?1, ?2)",
                    [user.id, pid],
                )
                .map_err(db_error)?;
            }
            tx.commit().map_err(db_error)?;
            tracing::info!(user_id = user.id, username = %user.username, "user created");
            Ok(user)
        })
        .await
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, BookshelfError> {
        self.call(move |conn| load_user(conn, "id", &id)).await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, BookshelfError> {
        let username = username.to_string();
        self.call(move |conn| load_user(conn, "username", &username))
            .await
    }

    async fn update_user(&self, user: &User) -> Result<User, BookshelfError> {
        let user = user.clone();
        self.call(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE users SET email = ?1, first_name = ?2, last_name = ?3, password = ?4, \
                     is_active = ?5, is_staff = ?6, is_superuser = ?7, last_login = ?8, \
                     date_of_birth = ?9, profile_photo = ?10 WHERE id = ?11",
                    params![
                        user.email,
                        user.first_name,
                        user.last_name,
                        user.password,
                        user.is_active,
                        user.is_staff,
                        user.is_superuser,
                        user.last_login.map(|t| t.to_rfc3339()),
                        user.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string()),
                        user.profile_photo,
                        user.id,
                    ],
                )
                .map_err(db_error)?;
            if updated == 0 {
                return Err(BookshelfError::DoesNotExist(format!(
                    "User {} does not exist.",
                    user.id
                )));
            }
            tracing::info!(user_id = user.id, "user updated");
            load_user(conn, "id", &user.id)?.ok_or_else(|| {
                BookshelfError::DoesNotExist(format!("User {} does not exist.", user.id))
            })
        })
        .await
    }

    async fn groups_for_user(&self, user_id: i64) -> Result<Vec<Group>, BookshelfError> {
        self.call(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT g.id, g.name FROM auth_group g JOIN user_groups ug \
                     ON ug.group_id = g.id WHERE ug.user_id = ?1 ORDER BY g.name",
                )
                .map_err(db_error)?;
            let rows = stmt
                .query_map([user_id], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))
                .map_err(db_error)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_error)?;
            rows.into_iter()
                .map(|(id, name)| -> Result<Group, BookshelfError> {
                    Ok(Group {
                        name,
                        permissions: group_permissions(conn, id)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn get_or_create_group(&self, name: &str) -> Result<(Group, bool), BookshelfError> {
        let name = name.to_string();
        self.call(move |conn| {
            let created = conn
                .execute("INSERT OR IGNORE INTO auth_group (name) VALUES (?1)", [&name])
                .map_err(db_error)?
                > 0;
            let id = group_id(conn, &name)?.ok_or_else(|| {
                BookshelfError::DatabaseError(format!("group '{name}' vanished after insert"))
            })?;
            let permissions = group_permissions(conn, id)?;
            Ok((Group { name, permissions }, created))
        })
        .await
    }

    async fn assign_group_permissions(
        &self,
        group: &str,
        permissions: &[Permission],
    ) -> Result<usize, BookshelfError> {
        let group = group.to_string();
        let permissions = permissions.to_vec();
        self.call(move |conn| {
            let tx = conn.transaction().map_err(db_error)?;
            let gid = group_id(&tx, &group)?.ok_or_else(|| {
                BookshelfError::DoesNotExist(format!("Group '{group}' does not exist."))
            })?;
            let mut added = 0;
            for perm in permissions {
                let pid = permission_id(&tx, perm)?;
                added += tx
                    .execute(
                        "INSERT OR IGNORE INTO auth_group_permissions (group_id, permission_id) \
                         VALUES (?1, ?2)",
                        [gid, pid],
                    )
                    .map_err(db_error)?;
            }
            tx.commit().map_err(db_error)?;
            Ok(added)
        })
        .await
    }

    async fn add_user_to_group(&self, user_id: i64, group: &str) -> Result<(), BookshelfError> {
        let group = group.to_string();
        self.call(move |conn| {
            let gid = group_id(conn, &group)?.ok_or_else(|| {
                BookshelfError::DoesNotExist(format!("Group '{group}' does not exist."))
            })?;
            conn.execute(
                "INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES (?1, ?2)",
                [user_id, gid],
            )
            .map_err(|e| match db_error(e) {
                BookshelfError::IntegrityError(_) => {
                    BookshelfError::DoesNotExist(format!("User {user_id} does not exist."))
                }
                other => other,
            })?;
            Ok(())
        })
        .await
    }

    async fn touch_last_login(&self, user_id: i64) -> Result<(), BookshelfError> {
        let now = Utc::now().to_rfc3339();
        self.call(move |conn| {
            conn.execute(
                "UPDATE users SET last_login = ?1 WHERE id = ?2",
                params![now, user_id],
            )
            .map_err(db_error)?;
            Ok(())
        })
        .await
    }

    async fn get_or_create_token(&self, user_id: i64) -> Result<String, BookshelfError> {
        let candidate = bookshelf_auth::tokens::generate_token_key();
        self.call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO auth_token (key, user_id, created) VALUES (?1, ?2, ?3)",
                params![candidate, user_id, Utc::now().to_rfc3339()],
            )
            .map_err(db_error)?;
            conn.query_row(
                "SELECT key FROM auth_token WHERE user_id = ?1",
                [user_id],
                |r| r.get(0),
            )
            .map_err(db_error)
        })
        .await
    }

    async fn user_for_token(&self, key: &str) -> Result<Option<User>, BookshelfError> {
        let key = key.to_string();
        self.call(move |conn| {
            let user_id: Option<i64> = conn
                .query_row("SELECT user_id FROM auth_token WHERE key = ?1", [&key], |r| {
                    r.get(0)
                })
                .optional()
                .map_err(db_error)?;
            match user_id {
                Some(id) => load_user(conn, "id", &id),
                None => Ok(None),
            }
        })
        .await
    }

    async fn create_session(
        &self,
        digest: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), BookshelfError> {
        let digest = digest.to_string();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO sessions (digest, user_id, expires_at) VALUES (?1, ?2, ?3)",
                params![digest, user_id, expires_at.timestamp()],
            )
            .map_err(db_error)?;
            Ok(())
        })
        .await
    }

    async fn user_for_session(&self, digest: &str) -> Result<Option<User>, BookshelfError> {
        let digest = digest.to_string();
        let now = Utc::now().timestamp();
        self.call(move |conn| {
            let user_id: Option<i64> = conn
                .query_row(
                    "SELECT user_id FROM sessions WHERE digest = ?1 AND expires_at > ?2",
                    params![digest, now],
                    |r| r.get(0),
                )
                .optional()
                .map_err(db_error)?;
            match user_id {
                Some(id) => load_user(conn, "id", &id),
                None => Ok(None),
            }
        })
        .await
    }

    async fn delete_session(&self, digest: &str) -> Result<(), BookshelfError> {
        let digest = digest.to_string();
        self.call(move |conn| {
            conn.execute("DELETE FROM sessions WHERE digest = ?1", [&digest])
                .map_err(db_error)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::migrate;
    use bookshelf_auth::setup::setup_groups;
    use bookshelf_auth::user::{prepare_user, update_profile, NewUser, ProfileUpdate};

    async fn store() -> SqliteStore {
        let store = SqliteStore::memory().unwrap();
        migrate(&store).await.unwrap();
        store
    }

    // ── Users ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_insert_and_load_user() {
        let store = store().await;
        let mut new = NewUser::new("octavia", "tangerine-Orbit-42").email("ob@Example.com");
        new.date_of_birth = NaiveDate::from_ymd_opt(1947, 6, 22);
        new.profile_photo = Some("portrait.jpg".into());
        let user = prepare_user(new).await.unwrap();
        let stored = store.insert_user(&user).await.unwrap();
        assert!(stored.id > 0);

        let loaded = store.get_user_by_username("octavia").await.unwrap().unwrap();
        assert_eq!(loaded.id, stored.id);
        assert_eq!(loaded.email, "ob@example.com");
        assert_eq!(loaded.date_of_birth, NaiveDate::from_ymd_opt(1947, 6, 22));
        assert_eq!(loaded.profile_photo.as_deref(), Some("profile_photos/portrait.jpg"));
        assert!(loaded.check_password("tangerine-Orbit-42").await.unwrap());
        assert_eq!(
            loaded.date_joined.timestamp(),
            user.date_joined.timestamp()
        );
        assert!(store.get_user(loaded.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_user_persists_profile() {
        let store = store().await;
        let user = prepare_user(NewUser::new("octavia", "tangerine-Orbit-42"))
            .await
            .unwrap();
        let stored = store.insert_user(&user).await.unwrap();
        assert!(stored.date_of_birth.is_none());

        let changed = update_profile(
            &stored,
            ProfileUpdate {
                email: "ob@Example.com".into(),
                last_name: "Butler".into(),
                date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 1),
                profile_photo: Some("me.jpg".into()),
                ..ProfileUpdate::default()
            },
        )
        .unwrap();
        let saved = store.update_user(&changed).await.unwrap();
        assert_eq!(saved.id, stored.id);

        let loaded = store.get_user_by_username("octavia").await.unwrap().unwrap();
        assert_eq!(loaded.email, "ob@example.com");
        assert_eq!(loaded.last_name, "Butler");
        assert_eq!(loaded.date_of_birth, NaiveDate::from_ymd_opt(1990, 4, 1));
        assert_eq!(loaded.profile_photo.as_deref(), Some("profile_photos/me.jpg"));
        assert!(loaded.check_password("tangerine-Orbit-42").await.unwrap());

        let cleared = update_profile(
            &loaded,
            ProfileUpdate {
                email: loaded.email.clone(),
                clear_profile_photo: true,
                ..ProfileUpdate::default()
            },
        )
        .unwrap();
        store.update_user(&cleared).await.unwrap();
        let loaded = store.get_user(stored.id).await.unwrap().unwrap();
        assert!(loaded.profile_photo.is_none());
        assert!(loaded.date_of_birth.is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_user() {
        let store = store().await;
        let mut ghost = User::new("ghost");
        ghost.id = 42;
        let err = store.update_user(&ghost).await.unwrap_err();
        assert!(matches!(err, BookshelfError::DoesNotExist(_)));
        assert_eq!(store.count_rows("users").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let store = store().await;
        store.insert_user(&User::new("dup")).await.unwrap();
        let err = store.insert_user(&User::new("dup")).await.unwrap_err();
        assert!(matches!(err, BookshelfError::IntegrityError(ref m) if m.contains("dup")));
        assert_eq!(store.count_rows("users").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_user_with_unknown_group_rolls_back() {
        let store = store().await;
        let mut user = User::new("lost");
        user.groups = vec!["Nowhere".into()];
        assert!(store.insert_user(&user).await.is_err());
        assert_eq!(store.count_rows("users").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_direct_permissions() {
        let store = store().await;
        let user = store.insert_user(&User::new("p")).await.unwrap();
        assert!(store.grant_user_permission(user.id, Permission::CanDelete).await.unwrap());
        assert!(!store.grant_user_permission(user.id, Permission::CanDelete).await.unwrap());
        let loaded = store.get_user(user.id).await.unwrap().unwrap();
        assert!(loaded.user_permissions.contains(&Permission::CanDelete));
    }

    // ── Groups ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_setup_groups_twice_creates_no_duplicates() {
        let store = store().await;
        let first = setup_groups(&store).await.unwrap();
        assert_eq!(first.created(), 3);
        let second = setup_groups(&store).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(store.count_rows("auth_group").await.unwrap(), 3);
        assert_eq!(store.count_rows("auth_group_permissions").await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_setup_groups_requires_permissions() {
        let store = SqliteStore::memory().unwrap();
        migrate(&store).await.unwrap();
        store
            .call(|conn| conn.execute("DELETE FROM auth_permission", []).map_err(db_error))
            .await
            .unwrap();
        let err = setup_groups(&store).await.unwrap_err();
        assert!(matches!(err, BookshelfError::DoesNotExist(_)));
    }

    #[tokio::test]
    async fn test_groups_for_user() {
        let store = store().await;
        setup_groups(&store).await.unwrap();
        let user = store.insert_user(&User::new("ed")).await.unwrap();
        store.add_user_to_group(user.id, "Editors").await.unwrap();
        store.add_user_to_group(user.id, "Editors").await.unwrap();

        let groups = store.groups_for_user(user.id).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Editors");
        assert_eq!(groups[0].permissions.len(), 3);

        let loaded = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(loaded.groups, vec!["Editors".to_string()]);
        assert!(store.add_user_to_group(user.id, "Nope").await.is_err());
        assert!(store.add_user_to_group(999, "Editors").await.is_err());
    }

    // ── Tokens and sessions ─────────────────────────────────────────

    #[tokio::test]
    async fn test_token_get_or_create() {
        let store = store().await;
        let user = store.insert_user(&User::new("t")).await.unwrap();
        let a = store.get_or_create_token(user.id).await.unwrap();
        let b = store.get_or_create_token(user.id).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.count_rows("auth_token").await.unwrap(), 1);
        assert_eq!(store.user_for_token(&a).await.unwrap().unwrap().id, user.id);
        assert!(store.user_for_token("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sessions() {
        let store = store().await;
        let user = store.insert_user(&User::new("s")).await.unwrap();
        let past = Utc::now() - chrono::Duration::seconds(10);
        let future = Utc::now() + chrono::Duration::hours(1);
        store.create_session("old", user.id, past).await.unwrap();
        store.create_session("new", user.id, future).await.unwrap();

        assert!(store.user_for_session("old").await.unwrap().is_none());
        assert_eq!(store.user_for_session("new").await.unwrap().unwrap().id, user.id);

        assert_eq!(store.clear_expired_sessions().await.unwrap(), 1);
        store.delete_session("new").await.unwrap();
        assert!(store.user_for_session("new").await.unwrap().is_none());
        assert_eq!(store.count_rows("sessions").await.unwrap(), 0);
    }
}
