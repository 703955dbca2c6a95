use log::{Level, Log, Metadata, Record};
use std::{fmt, sync::Arc};

/// Logger handed to an [`AuthMapper`](crate::AuthMapper).
///
/// The mapper never touches the process-wide logger configuration; a
/// command line caller passes [`Sink::global`] after installing its logger,
/// a library caller keeps the silent default.
#[derive(Clone)]
pub struct Sink(Arc<dyn Log>);

impl Sink {
  pub fn new(logger: Arc<dyn Log>) -> Self {
    Sink(logger)
  }

  pub fn discard() -> Self {
    Sink(Arc::new(Discard))
  }

  /// Forwards to the logger installed with `log::set_logger`.
  pub fn global() -> Self {
    Sink(Arc::new(Global))
  }

  pub fn debug(&self, args: fmt::Arguments<'_>) {
    self.emit(Level::Debug, args)
  }

  pub fn info(&self, args: fmt::Arguments<'_>) {
    self.emit(Level::Info, args)
  }

  pub fn warn(&self, args: fmt::Arguments<'_>) {
    self.emit(Level::Warn, args)
  }

  fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
    let record = Record::builder()
      .level(level)
      .target("aws_auth")
      .args(args)
      .build();
    if self.0.enabled(record.metadata()) {
      self.0.log(&record);
    }
  }
}

impl Default for Sink {
  fn default() -> Self {
    Sink::discard()
  }
}

impl fmt::Debug for Sink {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Sink")
  }
}

struct Discard;

impl Log for Discard {
  fn enabled(&self, _: &Metadata<'_>) -> bool {
    false
  }

  fn log(&self, _: &Record<'_>) {}

  fn flush(&self) {}
}

struct Global;

impl Log for Global {
  fn enabled(&self, metadata: &Metadata<'_>) -> bool {
    metadata.level() <= log::max_level() && log::logger().enabled(metadata)
  }

  fn log(&self, record: &Record<'_>) {
    log::logger().log(record)
  }

  fn flush(&self) {
    log::logger().flush()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;

  #[derive(Default)]
  struct Capture(Mutex<Vec<String>>);

  impl Log for Capture {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
      metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record<'_>) {
      self.0.lock().unwrap().push(record.args().to_string());
    }

    fn flush(&self) {}
  }

  #[test]
  fn forwards_enabled_levels_only() {
    let capture = Arc::new(Capture::default());
    let sink = Sink::new(capture.clone());
    sink.info(format_args!("removed {}", "x"));
    sink.debug(format_args!("hidden"));
    assert_eq!(*capture.0.lock().unwrap(), vec!["removed x".to_string()]);
  }
}
