//! In-memory reconciliation of entry lists. Nothing here touches the store.

use crate::{
  request::UpsertOptions,
  types::{same_groups, AuthMap, AwsAuthData, RolesAuthMap, UsersAuthMap},
};

/// Updates every entry with the ARN of `resource`, or appends `resource` when
/// there is none. Returns whether the list changed.
pub fn upsert<T: AuthMap>(entries: &mut Vec<T>, resource: &T, opts: &UpsertOptions) -> bool {
  let mut found = false;
  let mut changed = false;

  for existing in entries.iter_mut().filter(|e| e.arn() == resource.arn()) {
    found = true;

    if !same_groups(existing.groups(), resource.groups()) {
      if opts.append {
        changed |= existing.append_groups(resource.groups());
      } else {
        existing.set_groups(resource.groups());
        changed = true;
      }
    }

    if opts.update_username && existing.username() != resource.username() {
      existing.set_username(resource.username());
      changed = true;
    }
  }

  if !found {
    entries.push(resource.clone());
    changed = true;
  }
  changed
}

/// Applies [`upsert`] for each resource in turn.
pub fn upsert_all<T: AuthMap>(entries: &mut Vec<T>, resources: &[T], opts: &UpsertOptions) -> bool {
  resources
    .iter()
    .fold(false, |changed, resource| upsert(entries, resource, opts) | changed)
}

/// Drops every entry matching `target` and returns how many were dropped.
pub fn remove<T: AuthMap>(entries: &mut Vec<T>, target: &T) -> usize {
  let before = entries.len();
  entries.retain(|e| !e.matches(target));
  before - entries.len()
}

/// Drops entries of both kinds whose username is exactly `username`.
pub fn remove_by_username(auth_data: &mut AwsAuthData, username: &str) -> usize {
  let before = auth_data.map_roles.len() + auth_data.map_users.len();
  auth_data.map_roles.retain(|e| e.username() != username);
  auth_data.map_users.retain(|e| e.username() != username);
  before - auth_data.map_roles.len() - auth_data.map_users.len()
}

/// Batch upsert of both kinds with default options.
pub fn upsert_multiple(
  auth_data: &mut AwsAuthData,
  roles: &[RolesAuthMap],
  users: &[UsersAuthMap],
) -> bool {
  let opts = UpsertOptions::default();
  let roles_changed = upsert_all(&mut auth_data.map_roles, roles, &opts);
  let users_changed = upsert_all(&mut auth_data.map_users, users, &opts);
  roles_changed || users_changed
}

#[cfg(test)]
mod tests {
  use super::*;

  fn role(arn: &str, username: &str, groups: &[&str]) -> RolesAuthMap {
    RolesAuthMap {
      rolearn: arn.to_string(),
      username: username.to_string(),
      groups: groups.iter().map(|g| g.to_string()).collect(),
    }
  }

  fn user(arn: &str, username: &str, groups: &[&str]) -> UsersAuthMap {
    UsersAuthMap {
      userarn: arn.to_string(),
      username: username.to_string(),
      groups: groups.iter().map(|g| g.to_string()).collect(),
    }
  }

  #[test]
  fn upsert_inserts_new_arn() {
    let mut entries = vec![role("role/node-1", "node", &["g1"])];
    assert!(upsert(&mut entries, &role("role/node-2", "node", &["g1"]), &UpsertOptions::default()));
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].rolearn, "role/node-2");
  }

  #[test]
  fn upsert_is_idempotent() {
    let resource = role("role/node-1", "node", &["g1", "g2"]);
    let mut entries = vec![];
    assert!(upsert(&mut entries, &resource, &UpsertOptions::default()));
    let snapshot = entries.clone();
    assert!(!upsert(&mut entries, &resource, &UpsertOptions::default()));
    assert_eq!(entries, snapshot);
  }

  #[test]
  fn upsert_replaces_groups_and_username_by_default() {
    let mut entries = vec![role("role/node-1", "node", &["g1", "g2"])];
    assert!(upsert(&mut entries, &role("role/node-1", "other", &["g2", "g1"]), &UpsertOptions::default()));
    assert_eq!(entries, vec![role("role/node-1", "other", &["g2", "g1"])]);
  }

  #[test]
  fn upsert_append_keeps_existing_groups() {
    let opts = UpsertOptions {
      append: true,
      update_username: true,
    };
    let mut entries = vec![user("user/a", "admin", &["g1"])];
    assert!(upsert(&mut entries, &user("user/a", "admin", &["g2"]), &opts));
    assert_eq!(entries[0].groups, vec!["g1", "g2"]);

    // the whole request list is appended, overlap included
    let mut entries = vec![user("user/a", "admin", &["g1"])];
    assert!(upsert(&mut entries, &user("user/a", "admin", &["g1", "g2"]), &opts));
    assert_eq!(entries[0].groups, vec!["g1", "g1", "g2"]);

    // identical groups are left alone
    assert!(!upsert(&mut entries, &user("user/a", "admin", &["g1", "g1", "g2"]), &opts));
    assert_eq!(entries[0].groups.len(), 3);
  }

  #[test]
  fn upsert_preserves_username_when_asked() {
    let opts = UpsertOptions {
      append: false,
      update_username: false,
    };
    let mut entries = vec![user("user/a", "admin", &["g1"])];
    assert!(!upsert(&mut entries, &user("user/a", "someone", &["g1"]), &opts));
    assert_eq!(entries[0].username, "admin");
  }

  #[test]
  fn upsert_updates_every_duplicate() {
    let mut entries = vec![
      role("role/dup", "a", &["g1"]),
      role("role/other", "b", &["g1"]),
      role("role/dup", "c", &["g2"]),
    ];
    assert!(upsert(&mut entries, &role("role/dup", "d", &["g3"]), &UpsertOptions::default()));
    assert_eq!(entries[0], role("role/dup", "d", &["g3"]));
    assert_eq!(entries[1], role("role/other", "b", &["g1"]));
    assert_eq!(entries[2], role("role/dup", "d", &["g3"]));
  }

  #[test]
  fn remove_by_arn_only() {
    let mut entries = vec![role("A", "u1", &["g1"]), role("B", "u2", &["g2"])];
    assert_eq!(remove(&mut entries, &role("A", "", &[])), 1);
    assert_eq!(entries, vec![role("B", "u2", &["g2"])]);
  }

  #[test]
  fn remove_respects_constraints() {
    let mut entries = vec![role("A", "u1", &["g1", "g2"])];
    assert_eq!(remove(&mut entries, &role("A", "u2", &[])), 0);
    assert_eq!(remove(&mut entries, &role("A", "", &["g2", "g1"])), 0);
    assert_eq!(remove(&mut entries, &role("A", "u1", &["g1", "g2"])), 1);
    assert!(entries.is_empty());
  }

  #[test]
  fn upsert_then_remove_leaves_no_entry() {
    let mut entries = vec![role("A", "u1", &["g1"])];
    upsert(&mut entries, &role("A", "u2", &["g2"]), &UpsertOptions::default());
    remove(&mut entries, &role("A", "", &[]));
    assert!(entries.iter().all(|e| e.rolearn != "A"));
  }

  #[test]
  fn remove_by_username_spans_both_kinds() {
    let mut auth = AwsAuthData {
      map_roles: vec![role("role/node-1", "sys:node:X", &["g1", "g2"])],
      map_users: vec![user("user/user-1", "admin", &["g3"])],
    };
    assert_eq!(remove_by_username(&mut auth, "sys:node:X"), 1);
    assert!(auth.map_roles.is_empty());
    assert_eq!(auth.map_users, vec![user("user/user-1", "admin", &["g3"])]);

    assert_eq!(remove_by_username(&mut auth, "nobody"), 0);
  }

  #[test]
  fn upsert_multiple_reports_no_change_for_identical_input() {
    let mut auth = AwsAuthData {
      map_roles: vec![role("role/node-1", "node", &["g1"])],
      map_users: vec![user("user/user-1", "admin", &["g3"])],
    };
    let roles = auth.map_roles.clone();
    let users = auth.map_users.clone();
    assert!(!upsert_multiple(&mut auth, &roles, &users));
    assert!(upsert_multiple(&mut auth, &[role("role/node-2", "node", &[])], &[]));
    assert_eq!(auth.map_roles.len(), 2);
  }
}
