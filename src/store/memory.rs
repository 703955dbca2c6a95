use k8s_openapi::api::core::v1::ConfigMap;
use kube::error::ErrorResponse;
use std::{
  collections::BTreeMap,
  sync::{Mutex, MutexGuard},
};

use super::{empty_config_map, ConfigMapStore};
use crate::error::{MapperError, Result};

/// In-process [`ConfigMapStore`] with apiserver-like optimistic concurrency.
///
/// Every successful write bumps `metadata.resourceVersion`; an update
/// carrying a different version than the stored one is a conflict.
#[derive(Debug, Default)]
pub struct MemoryStore {
  inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
  objects: BTreeMap<(String, String), ConfigMap>,
  version: u64,
  fetches: usize,
  creates: usize,
  updates: usize,
  pending_conflicts: usize,
  hidden_fetches: usize,
}

impl Inner {
  fn store(&mut self, namespace: &str, name: &str, mut cm: ConfigMap) -> ConfigMap {
    self.version += 1;
    cm.metadata.name = Some(name.to_string());
    cm.metadata.namespace = Some(namespace.to_string());
    cm.metadata.resource_version = Some(self.version.to_string());
    self
      .objects
      .insert((namespace.to_string(), name.to_string()), cm.clone());
    cm
  }
}

fn key(namespace: &str, name: &str) -> (String, String) {
  (namespace.to_string(), name.to_string())
}

fn api_error(code: u16, reason: &str, message: String) -> MapperError {
  MapperError::Kube(kube::Error::Api(ErrorResponse {
    status: "Failure".to_string(),
    message,
    reason: reason.to_string(),
    code,
  }))
}

impl MemoryStore {
  pub fn new() -> Self {
    MemoryStore::default()
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    // a panic while holding the lock leaves the map itself consistent
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Stores `cm` as is, overwriting any existing object.
  pub fn insert(&self, namespace: &str, name: &str, cm: ConfigMap) -> ConfigMap {
    self.lock().store(namespace, name, cm)
  }

  pub fn get(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
    self.lock().objects.get(&key(namespace, name)).cloned()
  }

  /// The next `n` updates fail with a conflict, as if another writer won.
  pub fn inject_conflicts(&self, n: usize) {
    self.lock().pending_conflicts = n;
  }

  /// The next `n` fetches report the object as missing even when it exists,
  /// as if another writer created it right after the read.
  pub fn hide_next_fetches(&self, n: usize) {
    self.lock().hidden_fetches = n;
  }

  pub fn fetch_count(&self) -> usize {
    self.lock().fetches
  }

  pub fn create_count(&self) -> usize {
    self.lock().creates
  }

  pub fn update_count(&self) -> usize {
    self.lock().updates
  }
}

impl ConfigMapStore for MemoryStore {
  async fn fetch(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
    let mut inner = self.lock();
    inner.fetches += 1;
    if inner.hidden_fetches > 0 {
      inner.hidden_fetches -= 1;
      return Ok(None);
    }
    Ok(inner.objects.get(&key(namespace, name)).cloned())
  }

  async fn create(&self, namespace: &str, name: &str) -> Result<ConfigMap> {
    let mut inner = self.lock();
    if inner.objects.contains_key(&key(namespace, name)) {
      return Err(MapperError::Conflict {
        namespace: namespace.to_string(),
        name: name.to_string(),
        message: format!("configmaps \"{}\" already exists", name),
      });
    }
    inner.creates += 1;
    Ok(inner.store(namespace, name, empty_config_map(namespace, name)))
  }

  async fn update(&self, namespace: &str, name: &str, cm: &ConfigMap) -> Result<ConfigMap> {
    let mut inner = self.lock();
    let current = match inner.objects.get(&key(namespace, name)) {
      Some(current) => current.metadata.resource_version.clone(),
      None => {
        return Err(api_error(
          404,
          "NotFound",
          format!("configmaps \"{}\" not found", name),
        ))
      }
    };

    let conflict = |message: String| MapperError::Conflict {
      namespace: namespace.to_string(),
      name: name.to_string(),
      message,
    };
    if inner.pending_conflicts > 0 {
      inner.pending_conflicts -= 1;
      return Err(conflict("the object has been modified".to_string()));
    }
    if cm.metadata.resource_version.is_some() && cm.metadata.resource_version != current {
      return Err(conflict(format!(
        "resourceVersion {:?} is stale, current is {:?}",
        cm.metadata.resource_version, current
      )));
    }

    inner.updates += 1;
    Ok(inner.store(namespace, name, cm.clone()))
  }
}
