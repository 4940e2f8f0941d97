//! Structured error types for the relay.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),

  #[error("config: {key}: {reason}")]
  Config { key: String, reason: String },

  #[error("broker is no longer running")]
  BrokerClosed,
}

impl RelayError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn config(key: &str, reason: impl Into<String>) -> Self {
    Self::Config {
      key: key.to_string(),
      reason: reason.into(),
    }
  }

  /// The payload field this error points at, if any.
  ///
  /// Any frame serde cannot decode is attributed to the `event` envelope,
  /// including a known event whose payload holds a value of the wrong type
  /// (`"lat": "19"`). Only decoded payloads get per-field attribution.
  pub fn field(&self) -> Option<&str> {
    match self {
      Self::Validation { field, .. } => Some(field),
      Self::Json(_) => Some("event"),
      _ => None,
    }
  }
}
