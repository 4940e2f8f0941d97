//! Core types for the relay (wire contract + incident model).

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Incident model
// ---------------------------------------------------------------------------

/// Coordinate pair in floating point degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
  pub lat: f64,
  pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
  Active,
  Acknowledged,
  /// Modelled for clients that display it; nothing in the broker produces it.
  Resolved,
}

/// One SOS and its lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
  pub id: String,
  pub tourist_id: String,
  pub name: String,
  pub location: Location,
  /// Server receipt time, RFC3339 with millisecond precision.
  pub timestamp: String,
  pub message: String,
  pub status: IncidentStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub acknowledged_by: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub acknowledged_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Inbound types (JSON contract: what clients send)
// ---------------------------------------------------------------------------

/// One inbound text frame: `{"event": "...", "data": {...}}`.
///
/// Payload fields are optional here so validation can name what is missing.
/// Unknown fields are silently ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundMessage {
  SendSos(InboundSos),
  AcknowledgeSos(InboundAck),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundSos {
  #[serde(default)]
  pub tourist_id: Option<String>,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub location: Option<InboundLocation>,
  #[serde(default)]
  pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundLocation {
  #[serde(default)]
  pub lat: Option<f64>,
  #[serde(default)]
  pub lng: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundAck {
  #[serde(default)]
  pub incident_id: Option<String>,
  #[serde(default)]
  pub admin_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Validated commands (what the engine accepts)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SosReport {
  pub tourist_id: String,
  pub name: String,
  pub location: Location,
  pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
  pub incident_id: String,
  pub admin_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
  SubmitSos(SosReport),
  AcknowledgeSos(Acknowledgement),
}

// ---------------------------------------------------------------------------
// Outbound types (JSON contract: what we emit)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckNotice {
  pub incident_id: String,
  pub acknowledged_by: String,
}

/// Rejection sent back to the sender of a malformed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorOutput {
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
}

impl ErrorOutput {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      field: None,
    }
  }

  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundEvent {
  NewSosIncident(Incident),
  SosAcknowledged(AckNotice),
  SosError(ErrorOutput),
}

impl OutboundEvent {
  /// Wire name of the event, for logging.
  pub fn name(&self) -> &'static str {
    match self {
      Self::NewSosIncident(_) => "NEW_SOS_INCIDENT",
      Self::SosAcknowledged(_) => "SOS_ACKNOWLEDGED",
      Self::SosError(_) => "SOS_ERROR",
    }
  }
}
