//! Book permissions and the groups that bundle them.
//!
//! Both are closed, static sets. [`Permission`] enumerates the four
//! capabilities on books and [`DefaultGroup`] the three bundles seeded by
//! `setup_groups`:
//!
//! | Group   | Permissions |
//! |---------|-------------|
//! | Viewers | `can_view` |
//! | Editors | `can_view`, `can_create`, `can_edit` |
//! | Admins  | `can_view`, `can_create`, `can_edit`, `can_delete` |
//!
//! A user's effective permissions are their direct permissions plus the
//! permissions of every group they belong to. [`authorized`] is that
//! membership test and nothing else; [`has_perm`] layers the account flags
//! on top (inactive accounts hold nothing, active superusers hold
//! everything).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::user::User;

/// A capability on the book collection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// List and read books.
    CanView,
    /// Add books.
    CanCreate,
    /// Change existing books.
    CanEdit,
    /// Remove books.
    CanDelete,
}

impl Permission {
    /// Every permission, in display order.
    pub const ALL: [Self; 4] = [Self::CanView, Self::CanCreate, Self::CanEdit, Self::CanDelete];

    /// The app label prefixing full permission names.
    pub const APP_LABEL: &'static str = "bookshelf";

    /// The content type the permissions are attached to.
    pub const CONTENT_TYPE: &'static str = "bookshelf.book";

    /// Returns the codename, e.g. `can_view`.
    pub const fn codename(self) -> &'static str {
        match self {
            Self::CanView => "can_view",
            Self::CanCreate => "can_create",
            Self::CanEdit => "can_edit",
            Self::CanDelete => "can_delete",
        }
    }

    /// Returns the human-readable name, e.g. `Can view book`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::CanView => "Can view book",
            Self::CanCreate => "Can create book",
            Self::CanEdit => "Can edit book",
            Self::CanDelete => "Can delete book",
        }
    }

    /// Returns `bookshelf.<codename>`.
    pub fn full_codename(self) -> String {
        format!("{}.{}", Self::APP_LABEL, self.codename())
    }

    /// Looks a permission up by bare codename.
    pub fn from_codename(codename: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.codename() == codename)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", Self::APP_LABEL, self.codename())
    }
}

/// Error for a permission name that is not one of the four book permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPermission(pub String);

impl fmt::Display for UnknownPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown permission '{}'", self.0)
    }
}

impl std::error::Error for UnknownPermission {}

impl FromStr for Permission {
    type Err = UnknownPermission;

    /// Accepts `can_view` or `bookshelf.can_view`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let codename = match s.split_once('.') {
            Some((label, codename)) if label == Self::APP_LABEL => codename,
            Some(_) => return Err(UnknownPermission(s.to_string())),
            None => s,
        };
        Self::from_codename(codename).ok_or_else(|| UnknownPermission(s.to_string()))
    }
}

/// A named bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique group name.
    pub name: String,
    /// Permissions granted to members.
    pub permissions: BTreeSet<Permission>,
}

impl Group {
    /// Creates a group with no permissions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permissions: BTreeSet::new(),
        }
    }

    /// Grants `permission`; returns `false` if it was already granted.
    pub fn add_permission(&mut self, permission: Permission) -> bool {
        self.permissions.insert(permission)
    }

    /// Returns `true` if members are granted `permission`.
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

/// The three groups seeded at install time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefaultGroup {
    /// Read-only access.
    Viewers,
    /// Read, create and edit.
    Editors,
    /// Full access.
    Admins,
}

impl DefaultGroup {
    /// All default groups, smallest permission set first.
    pub const ALL: [Self; 3] = [Self::Viewers, Self::Editors, Self::Admins];

    /// Returns the group name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Viewers => "Viewers",
            Self::Editors => "Editors",
            Self::Admins => "Admins",
        }
    }

    /// Returns the fixed permission set.
    pub const fn permissions(self) -> &'static [Permission] {
        match self {
            Self::Viewers => &[Permission::CanView],
            Self::Editors => &[
                Permission::CanView,
                Permission::CanCreate,
                Permission::CanEdit,
            ],
            Self::Admins => &Permission::ALL,
        }
    }

    /// Looks a default group up by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.name() == name)
    }

    /// Builds the in-memory [`Group`].
    pub fn to_group(self) -> Group {
        Group {
            name: self.name().to_string(),
            permissions: self.permissions().iter().copied().collect(),
        }
    }
}

/// Returns the user's direct permissions plus those of every group in
/// `groups` the user is a member of.
pub fn effective_permissions(user: &User, groups: &[Group]) -> BTreeSet<Permission> {
    let mut perms = user.user_permissions.clone();
    for group in groups.iter().filter(|g| user.is_member_of(&g.name)) {
        perms.extend(group.permissions.iter().copied());
    }
    perms
}

/// The authorization test: `true` iff `perm` is held directly by `user` or
/// by any group in `groups` the user belongs to.
pub fn authorized(user: &User, perm: Permission, groups: &[Group]) -> bool {
    user.user_permissions.contains(&perm)
        || groups
            .iter()
            .any(|g| user.is_member_of(&g.name) && g.has_permission(perm))
}

/// [`authorized`] with account flags applied: inactive users are denied,
/// active superusers are allowed.
pub fn has_perm(user: &User, perm: Permission, groups: &[Group]) -> bool {
    if !user.is_active {
        return false;
    }
    if user.is_superuser {
        return true;
    }
    authorized(user, perm, groups)
}

/// Returns `true` if the user holds every permission in `perms`.
pub fn has_perms(user: &User, perms: &[Permission], groups: &[Group]) -> bool {
    perms.iter().all(|p| has_perm(user, *p, groups))
}
