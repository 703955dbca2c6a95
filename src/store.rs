//! Access to the Kubernetes object backing the mappings.

use k8s_openapi::{api::core::v1::ConfigMap, apimachinery::pkg::apis::meta::v1::ObjectMeta};
use kube::{
  api::{Api, PostParams},
  Client,
};

use crate::error::{MapperError, Result};

pub mod memory;
pub use memory::MemoryStore;

/// Key-value configuration store holding ConfigMaps.
///
/// `update` must reject a write whose `resourceVersion` is stale with
/// [`MapperError::Conflict`], and `create` must do the same when the object
/// already exists.
#[allow(async_fn_in_trait)]
pub trait ConfigMapStore {
  async fn fetch(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;
  async fn create(&self, namespace: &str, name: &str) -> Result<ConfigMap>;
  async fn update(&self, namespace: &str, name: &str, cm: &ConfigMap) -> Result<ConfigMap>;
}

impl<T: ConfigMapStore> ConfigMapStore for &T {
  async fn fetch(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
    (**self).fetch(namespace, name).await
  }

  async fn create(&self, namespace: &str, name: &str) -> Result<ConfigMap> {
    (**self).create(namespace, name).await
  }

  async fn update(&self, namespace: &str, name: &str, cm: &ConfigMap) -> Result<ConfigMap> {
    (**self).update(namespace, name, cm).await
  }
}

pub(crate) fn empty_config_map(namespace: &str, name: &str) -> ConfigMap {
  ConfigMap {
    metadata: ObjectMeta {
      name: Some(name.to_string()),
      namespace: Some(namespace.to_string()),
      ..ObjectMeta::default()
    },
    ..ConfigMap::default()
  }
}

impl ConfigMapStore for Client {
  async fn fetch(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
    let api = Api::<ConfigMap>::namespaced(self.clone(), namespace);
    match api.get(name).await {
      Ok(cm) => Ok(Some(cm)),
      Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  async fn create(&self, namespace: &str, name: &str) -> Result<ConfigMap> {
    let api = Api::<ConfigMap>::namespaced(self.clone(), namespace);
    api
      .create(&PostParams::default(), &empty_config_map(namespace, name))
      .await
      .map_err(|e| conflict_on_409(e, namespace, name))
  }

  async fn update(&self, namespace: &str, name: &str, cm: &ConfigMap) -> Result<ConfigMap> {
    let api = Api::<ConfigMap>::namespaced(self.clone(), namespace);
    api
      .replace(name, &PostParams::default(), cm)
      .await
      .map_err(|e| conflict_on_409(e, namespace, name))
  }
}

fn conflict_on_409(err: kube::Error, namespace: &str, name: &str) -> MapperError {
  match err {
    kube::Error::Api(resp) if resp.code == 409 => MapperError::Conflict {
      namespace: namespace.to_string(),
      name: name.to_string(),
      message: resp.message,
    },
    e => e.into(),
  }
}
