//! Maintains the `mapRoles` and `mapUsers` entries of an EKS cluster's
//! `kube-system/aws-auth` ConfigMap.

pub mod client;
pub mod configmap;
pub mod error;
pub mod logging;
mod mapper;
pub mod reconcile;
pub mod request;
pub mod retry;
pub mod store;
pub mod types;

pub use error::MapperError;
pub use logging::Sink;
pub use mapper::AuthMapper;
pub use request::{Operation, Request, UpsertOptions};
pub use retry::RetryPolicy;
pub use store::{ConfigMapStore, MemoryStore};
pub use types::{AuthMap, AwsAuthData, RolesAuthMap, UsersAuthMap};
