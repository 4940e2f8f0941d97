//! Core engine: owns the incident table and applies commands to it.
//!
//! Pure state transitions with an injected clock; no I/O, no runtime. The
//! broker task is the only caller in production.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::config::BrokerConfig;
use crate::id::IdGenerator;
use crate::types::*;

/// In-memory incident table. Entries are never removed.
pub struct Engine {
  config: BrokerConfig,
  ids: IdGenerator,
  incidents: HashMap<String, Incident>,
  /// Ids in creation order (also ascending, since ids are monotonic).
  order: Vec<String>,
}

impl Engine {
  pub fn new(config: BrokerConfig) -> Self {
    let ids = IdGenerator::new(config.id_prefix.clone());
    Self {
      config,
      ids,
      incidents: HashMap::new(),
      order: Vec::new(),
    }
  }

  pub fn with_defaults() -> Self {
    Self::new(BrokerConfig::default())
  }

  /// Apply one validated command.
  ///
  /// Returns the event to broadcast to every connection, or `None` when the
  /// command changed nothing (acknowledging an unknown incident).
  pub fn process(&mut self, cmd: Command, now: DateTime<Utc>) -> Option<OutboundEvent> {
    match cmd {
      Command::SubmitSos(report) => {
        Some(OutboundEvent::NewSosIncident(self.submit_sos(report, now)))
      }
      Command::AcknowledgeSos(ack) => self.acknowledge(ack, now).map(OutboundEvent::SosAcknowledged),
    }
  }

  /// Create a new `active` incident and return a copy of it.
  pub fn submit_sos(&mut self, report: SosReport, now: DateTime<Utc>) -> Incident {
    let id = self.ids.next(now);
    let incident = Incident {
      id: id.clone(),
      tourist_id: report.tourist_id,
      name: report.name,
      location: report.location,
      timestamp: iso(now),
      message: report
        .message
        .unwrap_or_else(|| self.config.default_message.clone()),
      status: IncidentStatus::Active,
      acknowledged_by: None,
      acknowledged_at: None,
    };

    tracing::info!(
      incident_id = %incident.id,
      tourist_id = %incident.tourist_id,
      lat = incident.location.lat,
      lng = incident.location.lng,
      "SOS incident created"
    );

    self.incidents.insert(id.clone(), incident.clone());
    self.order.push(id);
    incident
  }

  /// Mark an incident acknowledged.
  ///
  /// Re-acknowledging overwrites `acknowledged_by`/`acknowledged_at` and
  /// yields a fresh notice. Unknown ids are dropped with a warning.
  pub fn acknowledge(&mut self, ack: Acknowledgement, now: DateTime<Utc>) -> Option<AckNotice> {
    let incident = match self.incidents.get_mut(&ack.incident_id) {
      Some(incident) => incident,
      None => {
        tracing::warn!(
          incident_id = %ack.incident_id,
          admin_id = %ack.admin_id,
          "acknowledgment for unknown incident ignored"
        );
        return None;
      }
    };

    if let Some(previous) = &incident.acknowledged_by {
      tracing::info!(
        incident_id = %incident.id,
        previous = %previous,
        admin_id = %ack.admin_id,
        "incident re-acknowledged"
      );
    } else {
      tracing::info!(incident_id = %incident.id, admin_id = %ack.admin_id, "incident acknowledged");
    }

    incident.status = IncidentStatus::Acknowledged;
    incident.acknowledged_by = Some(ack.admin_id.clone());
    incident.acknowledged_at = Some(iso(now));

    Some(AckNotice {
      incident_id: ack.incident_id,
      acknowledged_by: ack.admin_id,
    })
  }

  pub fn get(&self, id: &str) -> Option<&Incident> {
    self.incidents.get(id)
  }

  /// Copy of the whole table, oldest first.
  pub fn snapshot(&self) -> Vec<Incident> {
    self
      .order
      .iter()
      .filter_map(|id| self.incidents.get(id).cloned())
      .collect()
  }

  pub fn len(&self) -> usize {
    self.incidents.len()
  }

  pub fn is_empty(&self) -> bool {
    self.incidents.is_empty()
  }
}

fn iso(ts: DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
