//! Role resolution over file ancestry. Explicit grants never reduce an
//! inherited `owner`: a user's effective role on a file is the highest
//! role granted to them anywhere along its ancestor chain.

use crate::model::{File, Permission, PermissionType, Role};

/// Resolves the strongest role `user` holds on `file`, given every
/// permission attached along the ancestor chain (nearest-first, ending at
/// the root). `permissions_for` looks up a file's attached permissions by
/// the ids on that file.
pub fn resolve<'a>(
    user: &str,
    file: &File,
    ancestor_chain: impl Iterator<Item = &'a File>,
    now_unix_ms: i64,
) -> Option<Role> {
    let mut best: Option<Role> = None;

    let mut consider = |f: &File| {
        if let Some(role) = strongest_direct_role(user, f, now_unix_ms) {
            best = Some(best.map_or(role, |b| b.max(role)));
        }
    };

    consider(file);
    for ancestor in ancestor_chain {
        consider(ancestor);
    }
    best
}

/// The strongest role any of `file`'s own attached permissions grant
/// `user` directly (no inheritance), preferring user grants, then group,
/// then `anyone`, and skipping expired ones.
fn strongest_direct_role(user: &str, file: &File, now_unix_ms: i64) -> Option<Role> {
    let mut best: Option<Role> = None;
    for perm in file_permissions(file) {
        if perm.is_expired(now_unix_ms) {
            continue;
        }
        let applies = match perm.perm_type {
            PermissionType::User => perm.id.as_deref() == Some(user),
            PermissionType::Group => false, // groups are not modeled; no grant applies
            PermissionType::Anyone => true,
        };
        if applies {
            best = Some(best.map_or(perm.role, |b: Role| b.max(perm.role)));
        }
    }
    best
}

/// Permissions are resolved by id elsewhere and passed in already attached
/// to the file object in this crate's in-memory representation.
fn file_permissions(file: &File) -> &[Permission] {
    file.attached_permissions.as_slice()
}

/// ok iff `required <= resolve(...)`.
pub fn check<'a>(
    user: &str,
    file: &File,
    ancestor_chain: impl Iterator<Item = &'a File>,
    required: Role,
    now_unix_ms: i64,
) -> bool {
    resolve(user, file, ancestor_chain, now_unix_ms)
        .map(|r| r >= required)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn file(key: &str, owner: &str, parents: &[&str], perms: Vec<Permission>) -> File {
        File {
            key: key.to_string(),
            kind: "Folder".to_string(),
            parents: parents.iter().map(|s| s.to_string()).collect(),
            owner: owner.to_string(),
            permission_ids: perms.iter().map(|p| p.key.clone()).collect(),
            created: 0,
            updated: 0,
            deleted: false,
            info: json!({}),
            attached_permissions: perms,
        }
    }

    fn perm(id: &str, role: Role) -> Permission {
        Permission {
            key: format!("perm-{id}"),
            perm_type: PermissionType::User,
            id: Some(id.to_string()),
            role,
            adding_user: "owner".to_string(),
            owner: None,
            expiration_time: None,
        }
    }

    #[test]
    fn direct_grant_resolves() {
        let f = file("F1", "owner", &[], vec![perm("u2", Role::Reader)]);
        assert_eq!(resolve("u2", &f, std::iter::empty(), 0), Some(Role::Reader));
    }

    #[test]
    fn inherited_owner_beats_explicit_narrower_grant() {
        let root = file("root", "owner", &[], vec![perm("u2", Role::Owner)]);
        let child = file("child", "owner", &["root"], vec![perm("u2", Role::Reader)]);
        let resolved = resolve("u2", &child, std::iter::once(&root), 0);
        assert_eq!(resolved, Some(Role::Owner));
    }

    #[test]
    fn expired_permission_is_ignored() {
        let mut p = perm("u2", Role::Writer);
        p.expiration_time = Some(100);
        let f = file("F1", "owner", &[], vec![p]);
        assert_eq!(resolve("u2", &f, std::iter::empty(), 200), None);
    }

    proptest! {
        #[test]
        fn monotonic_with_respect_to_parent(parent_role_idx in 0..4usize) {
            let roles = [Role::Reader, Role::Commenter, Role::Writer, Role::Owner];
            let parent_role = roles[parent_role_idx];
            let root = file("root", "owner", &[], vec![perm("u2", parent_role)]);
            let child = file("child", "owner", &["root"], vec![]);
            let child_role = resolve("u2", &child, std::iter::once(&root), 0);
            prop_assert!(child_role.unwrap() >= parent_role);
        }
    }
}
