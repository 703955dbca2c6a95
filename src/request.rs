use crate::{error::MapperError, retry::RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  Get,
  Upsert,
  Remove,
  RemoveByUsername,
}

/// Options applied when an upsert hits an existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOptions {
  /// Append the requested groups instead of replacing them.
  pub append: bool,
  /// Overwrite the username of an existing entry.
  pub update_username: bool,
}

impl Default for UpsertOptions {
  fn default() -> Self {
    UpsertOptions {
      append: false,
      update_username: true,
    }
  }
}

/// A caller's intent against the aws-auth ConfigMap.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
  pub operation: Operation,
  pub map_roles: bool,
  pub map_users: bool,
  pub role_arn: String,
  pub user_arn: String,
  pub username: String,
  pub groups: Vec<String>,
  pub force: bool,
  pub options: UpsertOptions,
  pub retry: Option<RetryPolicy>,
}

impl Request {
  pub fn new(operation: Operation) -> Self {
    Request {
      operation,
      map_roles: false,
      map_users: false,
      role_arn: String::new(),
      user_arn: String::new(),
      username: String::new(),
      groups: Vec::new(),
      force: false,
      options: UpsertOptions::default(),
      retry: None,
    }
  }

  pub fn get() -> Self {
    Request::new(Operation::Get)
  }

  pub fn upsert_role(rolearn: &str, username: &str, groups: &[&str]) -> Self {
    Request::new(Operation::Upsert).role(rolearn, username, groups)
  }

  pub fn upsert_user(userarn: &str, username: &str, groups: &[&str]) -> Self {
    Request::new(Operation::Upsert).user(userarn, username, groups)
  }

  /// Removal target; an empty `username` or `groups` matches any value.
  pub fn remove_role(rolearn: &str, username: &str, groups: &[&str]) -> Self {
    Request::new(Operation::Remove).role(rolearn, username, groups)
  }

  pub fn remove_user(userarn: &str, username: &str, groups: &[&str]) -> Self {
    Request::new(Operation::Remove).user(userarn, username, groups)
  }

  pub fn remove_by_username(username: &str) -> Self {
    Request {
      username: username.to_string(),
      ..Request::new(Operation::RemoveByUsername)
    }
  }

  fn role(mut self, rolearn: &str, username: &str, groups: &[&str]) -> Self {
    self.map_roles = true;
    self.role_arn = rolearn.to_string();
    self.username = username.to_string();
    self.groups = groups.iter().map(|g| g.to_string()).collect();
    self
  }

  fn user(mut self, userarn: &str, username: &str, groups: &[&str]) -> Self {
    self.map_users = true;
    self.user_arn = userarn.to_string();
    self.username = username.to_string();
    self.groups = groups.iter().map(|g| g.to_string()).collect();
    self
  }

  pub fn force(mut self) -> Self {
    self.force = true;
    self
  }

  pub fn append_groups(mut self) -> Self {
    self.options.append = true;
    self
  }

  pub fn preserve_username(mut self) -> Self {
    self.options.update_username = false;
    self
  }

  pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
    self.retry = Some(policy);
    self
  }

  /// Rejects malformed requests before any store access.
  pub fn validate(&self) -> Result<(), MapperError> {
    let invalid = |msg: &str| Err(MapperError::Validation(msg.to_string()));

    if let Some(policy) = &self.retry {
      if policy.max_attempts < 1 {
        return invalid("--retry-max-count is invalid, must be greater than zero");
      }
    }

    if self.map_roles && self.map_users {
      return invalid("--mapusers and --maproles are mutually exclusive");
    }

    match self.operation {
      Operation::Get => return Ok(()),
      Operation::RemoveByUsername => {
        if self.username.is_empty() {
          return invalid("--username not provided");
        }
        return Ok(());
      }
      Operation::Upsert | Operation::Remove => {}
    }

    if !self.map_roles && !self.map_users {
      return invalid("must select --mapusers or --maproles");
    }
    if self.map_roles && self.role_arn.is_empty() {
      return invalid("--rolearn not provided");
    }
    if self.map_users && self.user_arn.is_empty() {
      return invalid("--userarn not provided");
    }

    if self.operation == Operation::Upsert {
      if self.username.is_empty() {
        return invalid("--username not provided");
      }
      if self.groups.is_empty() {
        return invalid("--groups not provided");
      }
    }
    Ok(())
  }
}
