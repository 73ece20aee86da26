use std::fmt;

/// Error categories surfaced across the certificate lifecycle engine.
#[derive(Debug)]
pub enum EngineError {
  /// Server name was empty, malformed, or is itself a public suffix.
  BadName(String),
  /// The name (or its effective registrable domain) is not present in the allow-list.
  NotAuthorized(String),
  /// No record exists yet for this key.
  NotFound,
  /// A record exists but is too old to salvage.
  Expired,
  /// Another task is already issuing or renewing; not a failure.
  Contended,
  /// The ACME order failed terminally.
  IssuanceFailed(String),
  /// The storage backend failed.
  StoreError(String),
  /// Configuration was invalid at construction time.
  Config(String),
}

impl fmt::Display for EngineError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EngineError::BadName(name) => write!(f, "bad server name: {name}"),
      EngineError::NotAuthorized(name) => write!(f, "not authorized: {name}"),
      EngineError::NotFound => write!(f, "certificate record not found"),
      EngineError::Expired => write!(f, "certificate record expired"),
      EngineError::Contended => write!(f, "issuance already in progress"),
      EngineError::IssuanceFailed(reason) => write!(f, "issuance failed: {reason}"),
      EngineError::StoreError(reason) => write!(f, "store error: {reason}"),
      EngineError::Config(reason) => write!(f, "configuration error: {reason}"),
    }
  }
}

impl std::error::Error for EngineError {}

impl From<anyhow::Error> for EngineError {
  fn from(err: anyhow::Error) -> Self {
    EngineError::StoreError(err.to_string())
  }
}

pub type Result<T> = std::result::Result<T, EngineError>;
