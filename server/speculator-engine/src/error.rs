//! Structured error types for the speculator engine.

use thiserror::Error;

/// Failures while reading changes out of a repository. None of these abort an
/// analysis; they turn into a degraded outcome.
#[derive(Debug, Error)]
pub enum ExtractError {
  #[error("repository unavailable at {path}: {reason}")]
  RepositoryUnavailable { path: String, reason: String },

  #[error("commit not found: {reference}")]
  CommitNotFound { reference: String },

  #[error("git: {0}")]
  Git(#[from] git2::Error),
}

/// Misconfiguration detected at construction time. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid weights: {field}: {reason}")]
  InvalidWeights { field: String, reason: String },
}

impl ConfigError {
  pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
    Self::InvalidWeights {
      field: field.to_string(),
      reason: reason.into(),
    }
  }
}

/// Input validation and decoding errors.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },

  #[error("config: {0}")]
  Config(#[from] ConfigError),

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

impl EngineError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }
}
