use std::fmt;

/// Log verbosity. `None` disables the channel entirely rather than filtering per-message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
  Debug,
  Info,
  Warning,
  Error,
  None,
}

impl fmt::Display for LogLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      LogLevel::Debug => "DEBUG",
      LogLevel::Info => "INFO",
      LogLevel::Warning => "WARNING",
      LogLevel::Error => "ERROR",
      LogLevel::None => "NONE",
    };
    write!(f, "{s}")
  }
}

#[derive(Debug, Clone)]
pub struct LogMessage {
  pub level: LogLevel,
  pub message: String,
}

/// A cheap-to-clone handle background tasks and request paths log through.
///
/// When the configured level is `None` the sender is absent and every call is a single
/// comparison away from a no-op.
#[derive(Debug, Clone)]
pub struct ErrorLogger {
  level: LogLevel,
  sender: Option<async_channel::Sender<LogMessage>>,
}

impl ErrorLogger {
  pub fn new(level: LogLevel, sender: Option<async_channel::Sender<LogMessage>>) -> Self {
    Self { level, sender }
  }

  pub fn level(&self) -> LogLevel {
    self.level
  }

  pub fn disabled() -> Self {
    Self {
      level: LogLevel::None,
      sender: None,
    }
  }

  fn emit(&self, level: LogLevel, message: String) {
    if self.level == LogLevel::None || level < self.level {
      return;
    }
    if let Some(sender) = &self.sender {
      sender.send_blocking(LogMessage { level, message }).unwrap_or_default();
    }
  }

  pub fn debug(&self, message: impl Into<String>) {
    self.emit(LogLevel::Debug, message.into());
  }

  pub fn info(&self, message: impl Into<String>) {
    self.emit(LogLevel::Info, message.into());
  }

  pub fn warning(&self, message: impl Into<String>) {
    self.emit(LogLevel::Warning, message.into());
  }

  pub fn error(&self, message: impl Into<String>) {
    self.emit(LogLevel::Error, message.into());
  }
}

/// Builds a logger channel and its receiver, the way a caller wires up where log
/// messages ultimately go (stderr, a file, an observability backend).
pub fn build_logger(level: LogLevel) -> (ErrorLogger, Option<async_channel::Receiver<LogMessage>>) {
  if level == LogLevel::None {
    return (ErrorLogger::disabled(), None);
  }
  let (tx, rx) = async_channel::unbounded();
  (ErrorLogger::new(level, Some(tx)), Some(rx))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn disabled_logger_has_no_sender() {
    let (logger, rx) = build_logger(LogLevel::None);
    assert!(rx.is_none());
    logger.error("should not panic or send");
  }

  #[tokio::test]
  async fn level_filtering_drops_below_threshold() {
    let (logger, rx) = build_logger(LogLevel::Warning);
    let rx = rx.unwrap();
    logger.debug("dropped");
    logger.info("dropped");
    logger.warning("kept");
    logger.error("kept");
    drop(logger);
    let mut messages = Vec::new();
    while let Ok(msg) = rx.try_recv() {
      messages.push(msg);
    }
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].message, "kept");
    assert_eq!(messages[1].message, "kept");
  }
}
