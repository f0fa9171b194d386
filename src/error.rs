//! Error types shared by the feed controller and the offline layer.

use thiserror::Error;

/// Failure reported by the content service.
///
/// A fetch either yields a whole page or one of these, never a partial page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ServiceError {
  pub message: String,
  /// Backend-provided code (HTTP status for the REST client), if any
  pub code: Option<String>,
}

impl ServiceError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      code: None,
    }
  }

  pub fn with_code(mut self, code: impl Into<String>) -> Self {
    self.code = Some(code.into());
    self
  }
}

/// Failure of the persistent key-value store.
#[derive(Debug, Error)]
pub enum PersistenceError {
  #[error("store unavailable: {0}")]
  Unavailable(String),
  #[error("corrupt value under '{key}': {reason}")]
  Corrupt { key: String, reason: String },
}

/// A queued action that could not be resynchronized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("replay of action {action_id} failed: {source}")]
pub struct ReplayError {
  pub action_id: String,
  pub source: ServiceError,
}
