//! Validate inbound frames into typed commands.

use crate::error::RelayError;
use crate::types::*;

/// Decode one text frame and validate it.
pub fn parse_frame(frame: &str) -> Result<Command, RelayError> {
  let raw: InboundMessage = serde_json::from_str(frame)?;
  normalize(raw)
}

/// Turn a decoded inbound message into a command the engine accepts.
pub fn normalize(raw: InboundMessage) -> Result<Command, RelayError> {
  match raw {
    InboundMessage::SendSos(sos) => normalize_sos(sos).map(Command::SubmitSos),
    InboundMessage::AcknowledgeSos(ack) => normalize_ack(ack).map(Command::AcknowledgeSos),
  }
}

fn normalize_sos(raw: InboundSos) -> Result<SosReport, RelayError> {
  let tourist_id = required("touristId", raw.tourist_id)?;
  let name = required("name", raw.name)?;

  let location = raw
    .location
    .ok_or_else(|| RelayError::validation("location", "must be present"))?;
  let lat = coordinate("location.lat", location.lat, 90.0)?;
  let lng = coordinate("location.lng", location.lng, 180.0)?;

  // Blank messages fall back to the default like absent ones.
  let message = raw.message.filter(|m| !m.trim().is_empty());

  Ok(SosReport {
    tourist_id,
    name,
    location: Location { lat, lng },
    message,
  })
}

fn normalize_ack(raw: InboundAck) -> Result<Acknowledgement, RelayError> {
  Ok(Acknowledgement {
    incident_id: required("incidentId", raw.incident_id)?,
    admin_id: required("adminId", raw.admin_id)?,
  })
}

fn required(field: &str, value: Option<String>) -> Result<String, RelayError> {
  match value {
    Some(v) if !v.trim().is_empty() => Ok(v),
    Some(_) => Err(RelayError::validation(field, "must not be empty")),
    None => Err(RelayError::validation(field, "must be present")),
  }
}

fn coordinate(field: &str, value: Option<f64>, bound: f64) -> Result<f64, RelayError> {
  let v = value.ok_or_else(|| RelayError::validation(field, "must be present"))?;
  if !v.is_finite() || v.abs() > bound {
    return Err(RelayError::validation(
      field,
      &format!("must be within [-{bound}, {bound}]"),
    ));
  }
  Ok(v)
}
