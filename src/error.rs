use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapperError {
  #[error("invalid request: {0}")]
  Validation(String),
  #[error("failed to remove {0}, found zero matches")]
  NotFound(String),
  #[error("cannot decode {key}: {source}")]
  Decode {
    key: &'static str,
    #[source]
    source: serde_yaml::Error,
  },
  #[error("cannot encode {key}: {source}")]
  Encode {
    key: &'static str,
    #[source]
    source: serde_yaml::Error,
  },
  #[error("conflict updating {namespace}/{name}: {message}")]
  Conflict {
    namespace: String,
    name: String,
    message: String,
  },
  #[error("Kube error: {0}")]
  Kube(#[from] kube::Error),
  #[error("waiter timed out after {attempts} attempts: {source}")]
  RetryExhausted {
    attempts: u32,
    #[source]
    source: Box<MapperError>,
  },
}

impl MapperError {
  /// Whether another full fetch-mutate-persist cycle may succeed.
  pub fn is_retryable(&self) -> bool {
    match self {
      MapperError::Conflict { .. } => true,
      MapperError::Kube(kube::Error::Api(resp)) => resp.code == 429 || resp.code >= 500,
      MapperError::Kube(_) => true,
      MapperError::Validation(_)
      | MapperError::NotFound(_)
      | MapperError::Decode { .. }
      | MapperError::Encode { .. }
      | MapperError::RetryExhausted { .. } => false,
    }
  }
}

pub type Result<T, E = MapperError> = std::result::Result<T, E>;
