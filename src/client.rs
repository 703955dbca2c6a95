use anyhow::{bail, Context as _};
use kube::{
  config::{KubeConfigOptions, Kubeconfig},
  Client, Config,
};
use std::path::PathBuf;

/// How to reach the cluster and whom to act as.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
  pub kubeconfig: Option<PathBuf>,
  pub context: Option<String>,
  pub as_user: Option<String>,
  pub as_groups: Vec<String>,
}

/// Builds a client from the explicit kubeconfig if given, else from the
/// default kubeconfig when a context is named, else from the environment,
/// falling back to the context named by `KUBE_CTX`.
pub async fn build_client(opts: &ClientOptions) -> anyhow::Result<Client> {
  let mut config = match &opts.kubeconfig {
    Some(path) => {
      let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
      Config::from_custom_kubeconfig(kubeconfig, &kube_options(opts.context.clone())).await?
    }
    None if opts.context.is_some() => Config::from_kubeconfig(&kube_options(opts.context.clone()))
      .await
      .context("Failed to load kubeconfig context")?,
    None => match Config::infer().await {
      Ok(c) => c,
      _ => match std::env::var("KUBE_CTX") {
        Ok(ctx) => Config::from_kubeconfig(&kube_options(Some(ctx)))
          .await
          .context("Failed to load KUBE_CTX context")?,
        _ => bail!("Failed to create client"),
      },
    },
  };

  if let Some(user) = &opts.as_user {
    config.auth_info.impersonate = Some(user.clone());
  }
  if !opts.as_groups.is_empty() {
    config.auth_info.impersonate_groups = Some(opts.as_groups.clone());
  }

  Client::try_from(config).context("Failed to create client")
}

fn kube_options(context: Option<String>) -> KubeConfigOptions {
  KubeConfigOptions {
    context,
    ..KubeConfigOptions::default()
  }
}
