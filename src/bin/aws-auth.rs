use anyhow::Context as _;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use comfy_table::{presets::NOTHING, Table};
use serde::Serialize;
use std::{path::PathBuf, time::Duration};

use aws_auth::{
  client::{build_client, ClientOptions},
  AuthMapper, AwsAuthData, Operation, Request, RetryPolicy, Sink, UpsertOptions,
};

/// aws-auth modifies the aws-auth configmap on eks clusters
#[derive(Parser, Debug)]
#[command(name = "aws-auth", version)]
struct Cli {
  /// Path to kubeconfig
  #[arg(long, global = true)]
  kubeconfig: Option<PathBuf>,

  /// Name of the kubeconfig context to use
  #[arg(long, global = true)]
  context: Option<String>,

  /// Username to impersonate for the operation
  #[arg(long = "as", global = true)]
  as_user: Option<String>,

  /// Group to impersonate for the operation, can be repeated
  #[arg(long = "as-group", global = true)]
  as_groups: Vec<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print a summary of the configmap entries
  Get {
    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Table)]
    format: Format,

    #[command(flatten)]
    retry: RetryArgs,
  },
  /// Update or insert an entry in mapRoles or mapUsers
  Upsert {
    #[command(flatten)]
    entry: EntryArgs,

    /// Append groups to an existing entry instead of replacing them
    #[arg(long)]
    append: bool,

    /// Overwrite the username of an existing entry
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    update_username: bool,

    #[command(flatten)]
    retry: RetryArgs,
  },
  /// Remove entries from mapRoles or mapUsers
  Remove {
    #[command(flatten)]
    entry: EntryArgs,

    /// Succeed even when nothing matches
    #[arg(long)]
    force: bool,

    #[command(flatten)]
    retry: RetryArgs,
  },
  /// Remove all mapRoles and mapUsers entries with a username
  RemoveByUsername {
    /// Username to remove
    #[arg(long)]
    username: String,

    /// Succeed even when nothing matches
    #[arg(long)]
    force: bool,

    #[command(flatten)]
    retry: RetryArgs,
  },
  /// Print the version of aws-auth
  Version,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Format {
  Table,
}

#[derive(Args, Debug)]
struct EntryArgs {
  /// Select mapRoles
  #[arg(long)]
  maproles: bool,

  /// Select mapUsers
  #[arg(long)]
  mapusers: bool,

  /// Role ARN
  #[arg(long, default_value = "")]
  rolearn: String,

  /// User ARN
  #[arg(long, default_value = "")]
  userarn: String,

  /// Username inside kube
  #[arg(long, default_value = "")]
  username: String,

  /// Groups inside kube, comma separated
  #[arg(long, value_delimiter = ',')]
  groups: Vec<String>,
}

#[derive(Args, Debug)]
struct RetryArgs {
  /// Retry with exponential backoff on failure
  #[arg(long = "retry")]
  enabled: bool,

  /// Minimum wait between retries, e.g. 200ms, 2s, 1m
  #[arg(long = "retry-min-time", default_value = "200ms", value_parser = parse_duration)]
  min: Duration,

  /// Maximum wait between retries
  #[arg(long = "retry-max-time", default_value = "30s", value_parser = parse_duration)]
  max: Duration,

  /// Maximum number of attempts
  #[arg(long = "retry-max-count", default_value_t = 12)]
  count: u32,
}

impl Cli {
  fn client_options(&self) -> ClientOptions {
    ClientOptions {
      kubeconfig: self.kubeconfig.clone(),
      context: self.context.clone(),
      as_user: self.as_user.clone(),
      as_groups: self.as_groups.clone(),
    }
  }
}

impl RetryArgs {
  fn policy(&self) -> Option<RetryPolicy> {
    self
      .enabled
      .then(|| RetryPolicy::new(self.min, self.max, self.count))
  }
}

impl EntryArgs {
  fn request(self, operation: Operation) -> Request {
    Request {
      map_roles: self.maproles,
      map_users: self.mapusers,
      role_arn: self.rolearn,
      user_arn: self.userarn,
      username: self.username,
      groups: self.groups,
      ..Request::new(operation)
    }
  }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
  let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
  let (value, unit) = s.split_at(split);
  let value: u64 = value
    .parse()
    .map_err(|_| format!("invalid duration {:?}", s))?;
  match unit {
    "ms" => Ok(Duration::from_millis(value)),
    "s" | "" => Ok(Duration::from_secs(value)),
    "m" => Ok(Duration::from_secs(value * 60)),
    _ => Err(format!("unknown duration unit {:?} in {:?}", unit, s)),
  }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Info {
  pkg_version: &'static str,
  git_commit: &'static str,
  build_date: &'static str,
  platform: String,
}

impl Info {
  fn get() -> Self {
    Info {
      pkg_version: env!("CARGO_PKG_VERSION"),
      git_commit: option_env!("GIT_COMMIT").unwrap_or(""),
      build_date: option_env!("BUILD_DATE").unwrap_or(""),
      platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
    }
  }
}

fn render(auth: &AwsAuthData) -> Table {
  let mut table = Table::new();
  table.load_preset(NOTHING);
  table.set_header(vec!["TYPE", "ARN", "USERNAME", "GROUPS"]);
  for row in &auth.map_roles {
    table.add_row(vec![
      "Role Mapping".to_string(),
      row.rolearn.clone(),
      row.username.clone(),
      row.groups.join(", "),
    ]);
  }
  for row in &auth.map_users {
    table.add_row(vec![
      "User Mapping".to_string(),
      row.userarn.clone(),
      row.username.clone(),
      row.groups.join(", "),
    ]);
  }
  table
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let cli = Cli::parse();
  let client_options = cli.client_options();

  let req = match cli.command {
    Command::Version => {
      println!("{}", serde_json::to_string_pretty(&Info::get())?);
      return Ok(());
    }
    Command::Get { format: Format::Table, retry } => Request {
      retry: retry.policy(),
      ..Request::get()
    },
    Command::Upsert {
      entry,
      append,
      update_username,
      retry,
    } => Request {
      options: UpsertOptions {
        append,
        update_username,
      },
      retry: retry.policy(),
      ..entry.request(Operation::Upsert)
    },
    Command::Remove { entry, force, retry } => Request {
      force,
      retry: retry.policy(),
      ..entry.request(Operation::Remove)
    },
    Command::RemoveByUsername {
      username,
      force,
      retry,
    } => Request {
      force,
      retry: retry.policy(),
      ..Request::remove_by_username(&username)
    },
  };

  // reject bad flags before touching the cluster
  req.validate()?;

  let client = build_client(&client_options).await?;
  let mapper = AuthMapper::new(client).with_logger(Sink::global());

  match req.operation {
    Operation::Get => {
      let auth = mapper.get(&req).await.context("Failed to read aws-auth")?;
      println!("{}", render(&auth));
    }
    Operation::Upsert => mapper.upsert(&req).await.context("Failed to upsert")?,
    Operation::Remove => mapper.remove(&req).await.context("Failed to remove")?,
    Operation::RemoveByUsername => mapper
      .remove_by_username(&req)
      .await
      .context("Failed to remove by username")?,
  }

  Ok(())
}
