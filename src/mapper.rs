use k8s_openapi::api::core::v1::ConfigMap;
use std::future::Future;

use crate::{
  configmap::{read_auth_map, update_auth_map, AWS_AUTH_NAME, AWS_AUTH_NAMESPACE},
  error::{MapperError, Result},
  logging::Sink,
  reconcile,
  request::{Operation, Request},
  retry::with_retry,
  store::ConfigMapStore,
  types::{AuthMap, AwsAuthData, RolesAuthMap, UsersAuthMap},
};

/// Maintains the entries of the aws-auth ConfigMap.
///
/// Every operation reads the ConfigMap fresh, reconciles in memory and writes
/// it back only if something changed. With a retry policy on the request the
/// whole cycle is repeated on conflicts.
#[derive(Debug)]
pub struct AuthMapper<S> {
  store: S,
  namespace: String,
  name: String,
  log: Sink,
}

impl<S: ConfigMapStore> AuthMapper<S> {
  pub fn new(store: S) -> Self {
    AuthMapper {
      store,
      namespace: AWS_AUTH_NAMESPACE.to_string(),
      name: AWS_AUTH_NAME.to_string(),
      log: Sink::discard(),
    }
  }

  pub fn with_logger(mut self, log: Sink) -> Self {
    self.log = log;
    self
  }

  /// Points the mapper at a ConfigMap other than `kube-system/aws-auth`.
  pub fn with_target(mut self, namespace: &str, name: &str) -> Self {
    self.namespace = namespace.to_string();
    self.name = name.to_string();
    self
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  pub async fn get(&self, req: &Request) -> Result<AwsAuthData> {
    self.check(req, Operation::Get)?;
    self.run(req, || self.get_auth()).await
  }

  /// Updates or inserts the entry by ARN.
  pub async fn upsert(&self, req: &Request) -> Result<()> {
    self.check(req, Operation::Upsert)?;
    self.run(req, || self.upsert_auth(req)).await
  }

  /// Upserts many entries of both kinds with a single write, skipped
  /// entirely when the stored entries already match.
  pub async fn upsert_multiple(&self, roles: &[RolesAuthMap], users: &[UsersAuthMap]) -> Result<()> {
    let (mut auth_data, cm) = self.read().await?;
    if !reconcile::upsert_multiple(&mut auth_data, roles, users) {
      self.log.info(format_args!("{} is up to date", self.name));
      return Ok(());
    }
    update_auth_map(&self.store, &auth_data, cm).await?;
    Ok(())
  }

  /// Removes the entries matching the request's ARN, narrowed by username
  /// and groups when given.
  pub async fn remove(&self, req: &Request) -> Result<()> {
    self.check(req, Operation::Remove)?;
    self.run(req, || self.remove_auth(req)).await
  }

  /// Removes every role and user mapping with the request's username.
  pub async fn remove_by_username(&self, req: &Request) -> Result<()> {
    self.check(req, Operation::RemoveByUsername)?;
    self.run(req, || self.remove_auth_by_username(req)).await
  }

  fn check(&self, req: &Request, operation: Operation) -> Result<()> {
    if req.operation != operation {
      return Err(MapperError::Validation(format!(
        "{:?} request passed to {:?}",
        req.operation, operation
      )));
    }
    req.validate()
  }

  async fn run<T, F, Fut>(&self, req: &Request, mut op: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    match &req.retry {
      Some(policy) => with_retry(policy, &self.log, op).await,
      None => op().await,
    }
  }

  async fn read(&self) -> Result<(AwsAuthData, ConfigMap)> {
    read_auth_map(&self.store, &self.namespace, &self.name, &self.log).await
  }

  async fn get_auth(&self) -> Result<AwsAuthData> {
    let (auth_data, _) = self.read().await?;
    Ok(auth_data)
  }

  async fn upsert_auth(&self, req: &Request) -> Result<()> {
    let (mut auth_data, cm) = self.read().await?;

    let changed = if req.map_roles {
      let resource = RolesAuthMap::new(&req.role_arn, &req.username, &req.groups);
      reconcile::upsert(&mut auth_data.map_roles, &resource, &req.options)
    } else {
      let resource = UsersAuthMap::new(&req.user_arn, &req.username, &req.groups);
      reconcile::upsert(&mut auth_data.map_users, &resource, &req.options)
    };

    if !changed {
      self.log.info(format_args!("{} is up to date", self.arn(req)));
      return Ok(());
    }
    update_auth_map(&self.store, &auth_data, cm).await?;
    self.log.info(format_args!("upserted {} in {}", self.arn(req), self.name));
    Ok(())
  }

  async fn remove_auth(&self, req: &Request) -> Result<()> {
    let (mut auth_data, cm) = self.read().await?;

    let removed = if req.map_roles {
      let target = RolesAuthMap::new(&req.role_arn, &req.username, &req.groups);
      reconcile::remove(&mut auth_data.map_roles, &target)
    } else {
      let target = UsersAuthMap::new(&req.user_arn, &req.username, &req.groups);
      reconcile::remove(&mut auth_data.map_users, &target)
    };

    if removed == 0 {
      return self.not_found(req, self.arn(req).to_string());
    }
    update_auth_map(&self.store, &auth_data, cm).await?;
    self.log.info(format_args!("removed {} from {}", self.arn(req), self.name));
    Ok(())
  }

  async fn remove_auth_by_username(&self, req: &Request) -> Result<()> {
    let (mut auth_data, cm) = self.read().await?;

    let removed = reconcile::remove_by_username(&mut auth_data, &req.username);
    if removed == 0 {
      return self.not_found(req, format!("based on username {}", req.username));
    }
    update_auth_map(&self.store, &auth_data, cm).await?;
    self.log.info(format_args!(
      "removed {} entries with username {} from {}",
      removed, req.username, self.name
    ));
    Ok(())
  }

  fn arn<'a>(&self, req: &'a Request) -> &'a str {
    if req.map_roles {
      &req.role_arn
    } else {
      &req.user_arn
    }
  }

  fn not_found(&self, req: &Request, target: String) -> Result<()> {
    self.log.warn(format_args!("failed to remove {}, could not find a match", target));
    if req.force {
      return Ok(());
    }
    Err(MapperError::NotFound(target))
  }
}
