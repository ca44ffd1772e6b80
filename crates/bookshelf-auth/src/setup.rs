//! Seeding of the default groups.

use bookshelf_core::BookshelfError;

use crate::permissions::DefaultGroup;
use crate::store::AuthStore;

/// What happened to one default group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOutcome {
    /// The group.
    pub group: DefaultGroup,
    /// `true` if the group did not exist before.
    pub created: bool,
    /// Permissions granted by this run.
    pub permissions_added: usize,
}

impl GroupOutcome {
    /// The line printed for this group.
    pub fn message(&self) -> String {
        if self.created {
            format!("Created {} group", self.group.name())
        } else {
            format!("{} group already exists", self.group.name())
        }
    }
}

/// The result of [`setup_groups`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupReport {
    /// One entry per default group, in [`DefaultGroup::ALL`] order.
    pub groups: Vec<GroupOutcome>,
}

impl SetupReport {
    /// Number of groups created.
    pub fn created(&self) -> usize {
        self.groups.iter().filter(|g| g.created).count()
    }

    /// Number of permissions granted.
    pub fn permissions_added(&self) -> usize {
        self.groups.iter().map(|g| g.permissions_added).sum()
    }

    /// Returns `true` if the run changed nothing.
    pub fn is_noop(&self) -> bool {
        self.created() == 0 && self.permissions_added() == 0
    }

    /// The closing summary line.
    pub fn summary(&self) -> String {
        if self.is_noop() {
            "Groups and permissions are already up to date.".to_string()
        } else {
            format!(
                "Groups and permissions set up successfully ({} groups created, {} permissions assigned).",
                self.created(),
                self.permissions_added()
            )
        }
    }
}

/// Gets or creates Viewers, Editors and Admins and grants each its
/// permission set. Running it again changes nothing.
///
/// Fails with `DoesNotExist` if the permission rows have not been
/// migrated.
pub async fn setup_groups(store: &dyn AuthStore) -> Result<SetupReport, BookshelfError> {
    let mut report = SetupReport::default();
    for group in DefaultGroup::ALL {
        let (_, created) = store.get_or_create_group(group.name()).await?;
        let permissions_added = store
            .assign_group_permissions(group.name(), group.permissions())
            .await?;
        tracing::info!(
            group = group.name(),
            created,
            permissions_added,
            "default group ready"
        );
        report.groups.push(GroupOutcome {
            group,
            created,
            permissions_added,
        });
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Permission;
    use crate::store::MemoryStore;
    use crate::user::User;

    #[tokio::test]
    async fn test_setup_groups_first_run() {
        let store = MemoryStore::new();
        let report = setup_groups(&store).await.unwrap();
        assert_eq!(report.created(), 3);
        assert_eq!(report.permissions_added(), 1 + 3 + 4);
        let messages: Vec<_> = report.groups.iter().map(GroupOutcome::message).collect();
        assert_eq!(
            messages,
            vec!["Created Viewers group", "Created Editors group", "Created Admins group"]
        );
        assert!(report.summary().contains("successfully"));
    }

    #[tokio::test]
    async fn test_setup_groups_is_idempotent() {
        let store = MemoryStore::new();
        setup_groups(&store).await.unwrap();
        let again = setup_groups(&store).await.unwrap();
        assert!(again.is_noop());
        assert_eq!(again.groups[1].message(), "Editors group already exists");
        assert_eq!(again.summary(), "Groups and permissions are already up to date.");
    }

    #[tokio::test]
    async fn test_setup_groups_repairs_missing_permissions() {
        let store = MemoryStore::new();
        store.get_or_create_group("Editors").await.unwrap();
        store
            .assign_group_permissions("Editors", &[Permission::CanView])
            .await
            .unwrap();

        let report = setup_groups(&store).await.unwrap();
        let editors = &report.groups[1];
        assert!(!editors.created);
        assert_eq!(editors.permissions_added, 2);

        let user = store.insert_user(&User::new("e")).await.unwrap();
        store.add_user_to_group(user.id, "Editors").await.unwrap();
        let groups = store.groups_for_user(user.id).await.unwrap();
        assert!(groups[0].has_permission(Permission::CanEdit));
        assert!(!groups[0].has_permission(Permission::CanDelete));
    }
}
