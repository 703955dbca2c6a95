use rand::Rng;
use std::{future::Future, time::Duration};

use crate::{error::MapperError, logging::Sink};

pub const BACKOFF_FACTOR: f64 = 2.0;
pub const BACKOFF_JITTER: bool = true;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
  pub min_wait: Duration,
  pub max_wait: Duration,
  pub max_attempts: u32,
}

impl RetryPolicy {
  pub fn new(min_wait: Duration, max_wait: Duration, max_attempts: u32) -> Self {
    RetryPolicy {
      min_wait,
      max_wait,
      max_attempts,
    }
  }

  pub fn backoff(&self) -> Backoff {
    Backoff {
      min: self.min_wait,
      max: self.max_wait,
      factor: BACKOFF_FACTOR,
      jitter: BACKOFF_JITTER,
      attempt: 0,
    }
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    RetryPolicy::new(Duration::from_millis(200), Duration::from_secs(30), 12)
  }
}

/// Exponential backoff: `min * factor^attempt`, capped at `max`. With
/// jitter the wait is drawn uniformly from `[min, computed)`.
#[derive(Debug, Clone)]
pub struct Backoff {
  min: Duration,
  max: Duration,
  factor: f64,
  jitter: bool,
  attempt: u32,
}

impl Backoff {
  pub fn next_delay(&mut self) -> Duration {
    let min = self.min.as_secs_f64();
    let max = self.max.as_secs_f64().max(min);

    let mut secs = min * self.factor.powi(self.attempt.min(i32::MAX as u32) as i32);
    if !secs.is_finite() || secs >= max {
      // capped, the exponent stops growing
      secs = max;
    } else {
      self.attempt += 1;
    }

    if self.jitter && secs > min {
      secs = rand::thread_rng().gen_range(min..secs);
    }
    Duration::from_secs_f64(secs)
  }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` attempts have been made.
///
/// Every attempt is a fresh call of `op`, so callers put the whole
/// read-modify-write cycle inside it.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, log: &Sink, mut op: F) -> Result<T, MapperError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, MapperError>>,
{
  if policy.max_attempts < 1 {
    return Err(MapperError::Validation(
      "retry max count is invalid, must be greater than zero".to_string(),
    ));
  }

  let mut backoff = policy.backoff();
  let mut attempts = 0;
  loop {
    attempts += 1;
    let err = match op().await {
      Ok(out) => return Ok(out),
      Err(err) if !err.is_retryable() => return Err(err),
      Err(err) => err,
    };

    if attempts >= policy.max_attempts {
      return Err(MapperError::RetryExhausted {
        attempts,
        source: Box::new(err),
      });
    }

    let delay = backoff.next_delay();
    log.warn(format_args!("error: {}: will retry after {:?}", err, delay));
    tokio::time::sleep(delay).await;
  }
}
