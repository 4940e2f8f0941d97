//! Broker task: the single writer over the incident table and connection set.
//!
//! Socket tasks never touch state directly. They talk to the broker through a
//! [`BrokerHandle`], which posts [`BrokerMessage`]s into a bounded mailbox. The
//! broker handles one message to completion before taking the next, so SOS
//! submission and acknowledgment never interleave.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::BrokerConfig;
use crate::engine::Engine;
use crate::error::RelayError;
use crate::normalize;
use crate::types::{ErrorOutput, Incident, OutboundEvent};

/// Ephemeral per-socket identifier, used for routing and logs only.
pub type ConnectionId = Uuid;

/// Serialized frames queued for one connection.
///
/// Unbounded: a client that stops reading keeps accumulating broadcasts until
/// its socket closes and it is disconnected.
pub type Outbox = mpsc::UnboundedReceiver<String>;

/// Mailbox protocol of the broker task.
#[derive(Debug)]
pub enum BrokerMessage {
  Connected {
    id: ConnectionId,
    outbox: mpsc::UnboundedSender<String>,
  },
  Disconnected {
    id: ConnectionId,
  },
  /// Raw text frame; parsed and validated inside the broker.
  Inbound {
    from: ConnectionId,
    frame: String,
  },
  Snapshot {
    reply: oneshot::Sender<Vec<Incident>>,
  },
  ConnectionCount {
    reply: oneshot::Sender<usize>,
  },
  Shutdown,
}

/// Cloneable front door to the broker task.
#[derive(Debug, Clone)]
pub struct BrokerHandle {
  tx: mpsc::Sender<BrokerMessage>,
}

impl BrokerHandle {
  /// Join the broadcast group. Returns the connection id and its outbox.
  pub async fn connect(&self) -> Result<(ConnectionId, Outbox), RelayError> {
    let id = Uuid::new_v4();
    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    self
      .send(BrokerMessage::Connected {
        id,
        outbox: outbox_tx,
      })
      .await?;
    Ok((id, outbox_rx))
  }

  pub async fn disconnect(&self, id: ConnectionId) -> Result<(), RelayError> {
    self.send(BrokerMessage::Disconnected { id }).await
  }

  /// Hand an inbound text frame to the broker.
  pub async fn inbound(&self, from: ConnectionId, frame: impl Into<String>) -> Result<(), RelayError> {
    self
      .send(BrokerMessage::Inbound {
        from,
        frame: frame.into(),
      })
      .await
  }

  /// Read-only copy of the incident table, oldest first.
  pub async fn incidents(&self) -> Result<Vec<Incident>, RelayError> {
    let (reply, rx) = oneshot::channel();
    self.send(BrokerMessage::Snapshot { reply }).await?;
    rx.await.map_err(|_| RelayError::BrokerClosed)
  }

  /// Number of connections currently in the broadcast group.
  pub async fn connection_count(&self) -> Result<usize, RelayError> {
    let (reply, rx) = oneshot::channel();
    self.send(BrokerMessage::ConnectionCount { reply }).await?;
    rx.await.map_err(|_| RelayError::BrokerClosed)
  }

  /// Ask the broker to stop. Already-queued messages are handled first.
  pub async fn shutdown(&self) {
    // A closed mailbox means it has already stopped.
    let _ = self.tx.send(BrokerMessage::Shutdown).await;
  }

  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }

  async fn send(&self, msg: BrokerMessage) -> Result<(), RelayError> {
    self.tx.send(msg).await.map_err(|_| RelayError::BrokerClosed)
  }
}

/// Owns the engine and the connection set; runs as one tokio task.
pub struct Broker {
  engine: Engine,
  connections: HashMap<ConnectionId, mpsc::UnboundedSender<String>>,
  rx: mpsc::Receiver<BrokerMessage>,
}

impl Broker {
  /// Start the broker task. It stops on [`BrokerHandle::shutdown`] or once
  /// every handle has been dropped.
  pub fn spawn(config: BrokerConfig) -> (BrokerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));
    let broker = Broker {
      engine: Engine::new(config),
      connections: HashMap::new(),
      rx,
    };
    let task = tokio::spawn(broker.run());
    (BrokerHandle { tx }, task)
  }

  async fn run(mut self) {
    tracing::info!("broker started");

    while let Some(msg) = self.rx.recv().await {
      if matches!(msg, BrokerMessage::Shutdown) {
        break;
      }
      self.handle(msg);
    }

    tracing::info!(
      incidents = self.engine.len(),
      connections = self.connections.len(),
      "broker stopped"
    );
    // Dropping the outbox senders ends every socket's send loop.
  }

  fn handle(&mut self, msg: BrokerMessage) {
    match msg {
      BrokerMessage::Connected { id, outbox } => {
        self.connections.insert(id, outbox);
        tracing::info!(connection_id = %id, clients = self.connections.len(), "client connected");
      }
      BrokerMessage::Disconnected { id } => {
        if self.connections.remove(&id).is_some() {
          tracing::info!(connection_id = %id, clients = self.connections.len(), "client disconnected");
        }
      }
      BrokerMessage::Inbound { from, frame } => self.handle_frame(from, &frame),
      BrokerMessage::Snapshot { reply } => {
        let _ = reply.send(self.engine.snapshot());
      }
      BrokerMessage::ConnectionCount { reply } => {
        let _ = reply.send(self.connections.len());
      }
      BrokerMessage::Shutdown => {}
    }
  }

  fn handle_frame(&mut self, from: ConnectionId, frame: &str) {
    let cmd = match normalize::parse_frame(frame) {
      Ok(cmd) => cmd,
      Err(e) => {
        tracing::warn!(connection_id = %from, error = %e, "rejected inbound frame");
        let mut output = ErrorOutput::new(e.to_string());
        if let Some(field) = e.field() {
          output = output.with_field(field);
        }
        self.send_to(from, &OutboundEvent::SosError(output));
        return;
      }
    };

    if let Some(event) = self.engine.process(cmd, Utc::now()) {
      self.broadcast(&event);
    }
  }

  /// Deliver to every connection, sender included. No role filtering.
  fn broadcast(&self, event: &OutboundEvent) {
    let json = match serde_json::to_string(event) {
      Ok(j) => j,
      Err(e) => {
        tracing::error!(error = %e, "failed to serialize event");
        return;
      }
    };

    tracing::info!(
      event_name = event.name(),
      clients = self.connections.len(),
      "broadcasting"
    );

    for (id, outbox) in &self.connections {
      if let Err(e) = outbox.send(json.clone()) {
        tracing::warn!(connection_id = %id, error = %e, "failed to queue event");
      }
    }
  }

  fn send_to(&self, id: ConnectionId, event: &OutboundEvent) {
    let Some(outbox) = self.connections.get(&id) else {
      tracing::debug!(connection_id = %id, "reply target already gone");
      return;
    };
    match serde_json::to_string(event) {
      Ok(json) => {
        if let Err(e) = outbox.send(json) {
          tracing::warn!(connection_id = %id, error = %e, "failed to queue reply");
        }
      }
      Err(e) => tracing::error!(error = %e, "failed to serialize reply"),
    }
  }
}
