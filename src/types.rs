use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

/// Common shape of a `mapRoles` / `mapUsers` entry.
///
/// Both kinds carry the same fields and differ only in the name of their
/// identity key, so the reconciliation algorithms are written once against
/// this trait.
pub trait AuthMap: Clone + fmt::Debug + Serialize + DeserializeOwned {
  /// Human readable kind, used in log lines and errors.
  const KIND: &'static str;

  fn new(arn: &str, username: &str, groups: &[String]) -> Self;
  fn arn(&self) -> &str;
  fn username(&self) -> &str;
  fn groups(&self) -> &[String];
  fn set_username(&mut self, username: &str);
  fn set_groups(&mut self, groups: &[String]);

  /// Appends `groups` after the existing ones, duplicates included.
  /// Returns whether anything was added.
  fn append_groups(&mut self, groups: &[String]) -> bool;

  /// Asymmetric match: the ARN must be equal, while an empty `target`
  /// username or group list matches anything.
  fn matches(&self, target: &Self) -> bool {
    if self.arn() != target.arn() {
      return false;
    }
    if !target.groups().is_empty() && !same_groups(self.groups(), target.groups()) {
      return false;
    }
    if !target.username().is_empty() && self.username() != target.username() {
      return false;
    }
    true
  }
}

/// Order- and length-sensitive group comparison.
pub fn same_groups(a: &[String], b: &[String]) -> bool {
  a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}

/// Map a role in AWS IAM to a Kubernetes username and groups
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RolesAuthMap {
  /// ARN of the AWS Role
  pub rolearn: String,
  /// Username inside kube
  #[serde(default)]
  pub username: String,
  /// Groups in kube
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub groups: Vec<String>,
}

/// Map a user in AWS IAM to a Kubernetes username and groups
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UsersAuthMap {
  /// ARN of the AWS User
  pub userarn: String,
  /// Username inside kube
  #[serde(default)]
  pub username: String,
  /// Groups in kube
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub groups: Vec<String>,
}

macro_rules! impl_auth_map {
  ($ty:ident, $arn:ident, $kind:literal) => {
    impl AuthMap for $ty {
      const KIND: &'static str = $kind;

      fn new(arn: &str, username: &str, groups: &[String]) -> Self {
        $ty {
          $arn: arn.to_string(),
          username: username.to_string(),
          groups: groups.to_vec(),
        }
      }

      fn arn(&self) -> &str {
        &self.$arn
      }

      fn username(&self) -> &str {
        &self.username
      }

      fn groups(&self) -> &[String] {
        &self.groups
      }

      fn set_username(&mut self, username: &str) {
        self.username = username.to_string();
      }

      fn set_groups(&mut self, groups: &[String]) {
        self.groups = groups.to_vec();
      }

      fn append_groups(&mut self, groups: &[String]) -> bool {
        self.groups.extend_from_slice(groups);
        !groups.is_empty()
      }
    }

    impl fmt::Display for $ty {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, concat!("- ", stringify!($arn), ": {}"), self.$arn)?;
        if !self.username.is_empty() {
          writeln!(f, "  username: {}", self.username)?;
        }
        if !self.groups.is_empty() {
          writeln!(f, "  groups:")?;
        }
        for group in &self.groups {
          writeln!(f, "    - {}", group)?;
        }
        Ok(())
      }
    }
  };
}

impl_auth_map!(RolesAuthMap, rolearn, "mapRoles");
impl_auth_map!(UsersAuthMap, userarn, "mapUsers");

/// Decoded content of the aws-auth ConfigMap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwsAuthData {
  pub map_roles: Vec<RolesAuthMap>,
  pub map_users: Vec<UsersAuthMap>,
}

impl AwsAuthData {
  pub fn is_empty(&self) -> bool {
    self.map_roles.is_empty() && self.map_users.is_empty()
  }
}
