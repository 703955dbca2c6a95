use k8s_openapi::api::core::v1::ConfigMap;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
  error::{MapperError, Result},
  logging::Sink,
  store::ConfigMapStore,
  types::AwsAuthData,
};

pub const AWS_AUTH_NAMESPACE: &str = "kube-system";
pub const AWS_AUTH_NAME: &str = "aws-auth";
pub const MAP_ROLES_KEY: &str = "mapRoles";
pub const MAP_USERS_KEY: &str = "mapUsers";

/// Reads the aws-auth ConfigMap, creating it empty when absent.
///
/// Returns the decoded entries along with the ConfigMap they came from, which
/// carries the `resourceVersion` the following write is checked against.
pub async fn read_auth_map<S: ConfigMapStore>(
  store: &S,
  namespace: &str,
  name: &str,
  log: &Sink,
) -> Result<(AwsAuthData, ConfigMap)> {
  let cm = match store.fetch(namespace, name).await? {
    Some(cm) => cm,
    None => {
      log.info(format_args!("{}/{} not found, creating it", namespace, name));
      store.create(namespace, name).await?
    }
  };

  let auth_data = AwsAuthData {
    map_roles: decode(&cm, MAP_ROLES_KEY)?,
    map_users: decode(&cm, MAP_USERS_KEY)?,
  };
  if auth_data.is_empty() {
    log.debug(format_args!("{}/{} has no mappings", namespace, name));
  } else {
    log.debug(format_args!(
      "{}/{} has {} role and {} user mappings",
      namespace,
      name,
      auth_data.map_roles.len(),
      auth_data.map_users.len()
    ));
  }
  Ok((auth_data, cm))
}

/// Writes both entry lists back into `cm` and updates it in the store.
///
/// Data keys other than `mapRoles` and `mapUsers` are kept.
pub async fn update_auth_map<S: ConfigMapStore>(
  store: &S,
  auth_data: &AwsAuthData,
  mut cm: ConfigMap,
) -> Result<ConfigMap> {
  let map_roles = encode(&auth_data.map_roles, MAP_ROLES_KEY)?;
  let map_users = encode(&auth_data.map_users, MAP_USERS_KEY)?;

  let data = cm.data.get_or_insert_with(Default::default);
  data.insert(MAP_ROLES_KEY.to_string(), map_roles);
  data.insert(MAP_USERS_KEY.to_string(), map_users);

  let namespace = cm.metadata.namespace.clone().unwrap_or_default();
  let name = cm.metadata.name.clone().unwrap_or_default();
  store.update(&namespace, &name, &cm).await
}

fn decode<T: DeserializeOwned>(cm: &ConfigMap, key: &'static str) -> Result<Vec<T>> {
  let raw = match cm.data.as_ref().and_then(|data| data.get(key)) {
    Some(raw) if !raw.trim().is_empty() => raw,
    _ => return Ok(Vec::new()),
  };
  let entries: Option<Vec<T>> =
    serde_yaml::from_str(raw).map_err(|source| MapperError::Decode { key, source })?;
  Ok(entries.unwrap_or_default())
}

fn encode<T: Serialize>(entries: &[T], key: &'static str) -> Result<String> {
  serde_yaml::to_string(entries).map_err(|source| MapperError::Encode { key, source })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    store::MemoryStore,
    types::{RolesAuthMap, UsersAuthMap},
  };
  use log::{Log, Metadata, Record};
  use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
  };

  #[derive(Default)]
  struct Capture(Mutex<Vec<String>>);

  impl Log for Capture {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
      true
    }

    fn log(&self, record: &Record<'_>) {
      self.0.lock().unwrap().push(record.args().to_string());
    }

    fn flush(&self) {}
  }

  const MAP_ROLES: &str = "- rolearn: arn:aws:iam::00000000000:role/node-1
  username: system:node:{{EC2PrivateDNSName}}
  groups:
    - system:bootstrappers
    - system:nodes
";

  fn seeded(data: &[(&str, &str)]) -> MemoryStore {
    let store = MemoryStore::new();
    let mut cm = crate::store::empty_config_map(AWS_AUTH_NAMESPACE, AWS_AUTH_NAME);
    cm.data = Some(
      data
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>(),
    );
    store.insert(AWS_AUTH_NAMESPACE, AWS_AUTH_NAME, cm);
    store
  }

  #[tokio::test]
  async fn reads_existing_entries() {
    let store = seeded(&[(MAP_ROLES_KEY, MAP_ROLES)]);
    let (auth, _) = read_auth_map(&store, AWS_AUTH_NAMESPACE, AWS_AUTH_NAME, &Sink::discard())
      .await
      .unwrap();
    assert_eq!(auth.map_roles.len(), 1);
    assert_eq!(auth.map_roles[0].rolearn, "arn:aws:iam::00000000000:role/node-1");
    assert_eq!(auth.map_roles[0].username, "system:node:{{EC2PrivateDNSName}}");
    assert_eq!(auth.map_roles[0].groups, vec!["system:bootstrappers", "system:nodes"]);
    assert!(auth.map_users.is_empty());
  }

  #[tokio::test]
  async fn creates_missing_config_map() {
    let store = MemoryStore::new();
    let (auth, cm) = read_auth_map(&store, AWS_AUTH_NAMESPACE, AWS_AUTH_NAME, &Sink::discard())
      .await
      .unwrap();
    assert!(auth.is_empty());
    assert_eq!(cm.metadata.name.as_deref(), Some(AWS_AUTH_NAME));
    assert_eq!(store.create_count(), 1);
  }

  #[tokio::test]
  async fn logs_what_was_read() {
    let capture = Arc::new(Capture::default());
    let log = Sink::new(capture.clone());

    let store = MemoryStore::new();
    read_auth_map(&store, AWS_AUTH_NAMESPACE, AWS_AUTH_NAME, &log)
      .await
      .unwrap();
    let store = seeded(&[(MAP_ROLES_KEY, MAP_ROLES)]);
    read_auth_map(&store, AWS_AUTH_NAMESPACE, AWS_AUTH_NAME, &log)
      .await
      .unwrap();

    assert_eq!(
      *capture.0.lock().unwrap(),
      vec![
        "kube-system/aws-auth not found, creating it".to_string(),
        "kube-system/aws-auth has no mappings".to_string(),
        "kube-system/aws-auth has 1 role and 0 user mappings".to_string(),
      ]
    );
  }

  #[tokio::test]
  async fn malformed_data_is_a_decode_error() {
    let store = seeded(&[(MAP_USERS_KEY, "userarn: [not a list")]);
    let err = read_auth_map(&store, AWS_AUTH_NAMESPACE, AWS_AUTH_NAME, &Sink::discard())
      .await
      .unwrap_err();
    assert!(matches!(err, MapperError::Decode { key: MAP_USERS_KEY, .. }));
  }

  #[tokio::test]
  async fn update_keeps_unrelated_keys() {
    let store = seeded(&[(MAP_ROLES_KEY, MAP_ROLES), ("mapAccounts", "- \"000000000000\"\n")]);
    let (mut auth, cm) = read_auth_map(&store, AWS_AUTH_NAMESPACE, AWS_AUTH_NAME, &Sink::discard())
      .await
      .unwrap();
    auth.map_users.push(UsersAuthMap {
      userarn: "arn:aws:iam::00000000000:user/user-2".to_string(),
      username: "ops-user".to_string(),
      groups: vec!["system:masters".to_string()],
    });
    auth.map_roles.push(RolesAuthMap {
      rolearn: "arn:aws:iam::00000000000:role/node-2".to_string(),
      username: "system:node:{{EC2PrivateDNSName}}".to_string(),
      groups: vec![],
    });
    update_auth_map(&store, &auth, cm).await.unwrap();

    let stored = store.get(AWS_AUTH_NAMESPACE, AWS_AUTH_NAME).unwrap();
    assert!(stored.data.as_ref().unwrap().contains_key("mapAccounts"));

    let (reread, _) = read_auth_map(&store, AWS_AUTH_NAMESPACE, AWS_AUTH_NAME, &Sink::discard())
      .await
      .unwrap();
    assert_eq!(reread, auth);
  }
}
