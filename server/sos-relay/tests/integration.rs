//! Integration tests for the SOS relay: broker handle + router, no network.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use sos_relay::broker::Outbox;
use sos_relay::{router, Broker, BrokerConfig, BrokerHandle, ConnectionId, RelayConfig};
use tower::ServiceExt;

fn sos_frame(tourist: &str, name: &str, message: Option<&str>) -> String {
  let mut data = json!({
    "touristId": tourist,
    "name": name,
    "location": {"lat": 19.076, "lng": 72.8777}
  });
  if let Some(m) = message {
    data["message"] = json!(m);
  }
  json!({"event": "SEND_SOS", "data": data}).to_string()
}

fn ack_frame(incident_id: &str, admin_id: &str) -> String {
  json!({
    "event": "ACKNOWLEDGE_SOS",
    "data": {"incidentId": incident_id, "adminId": admin_id}
  })
  .to_string()
}

async fn connect_many(broker: &BrokerHandle, n: usize) -> Vec<(ConnectionId, Outbox)> {
  let mut clients = Vec::with_capacity(n);
  for _ in 0..n {
    clients.push(broker.connect().await.unwrap());
  }
  clients
}

/// Wait until the broker has handled everything queued so far.
async fn settle(broker: &BrokerHandle) {
  broker.incidents().await.unwrap();
}

fn drain(outbox: &mut Outbox) -> Vec<Value> {
  let mut frames = Vec::new();
  while let Ok(frame) = outbox.try_recv() {
    frames.push(serde_json::from_str(&frame).unwrap());
  }
  frames
}

async fn get_incidents(broker: BrokerHandle) -> Vec<Value> {
  let app = router(&RelayConfig::default(), broker).unwrap();
  let res = app
    .oneshot(Request::get("/incidents").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(res.status(), StatusCode::OK);
  let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn tourist_sos_then_admin_ack_scenario() {
  let (broker, _task) = Broker::spawn(BrokerConfig::default());
  let (tourist, mut tourist_box) = broker.connect().await.unwrap();
  let (admin, mut admin_box) = broker.connect().await.unwrap();

  broker.inbound(tourist, sos_frame("t1", "Alice", None)).await.unwrap();
  settle(&broker).await;

  let to_tourist = drain(&mut tourist_box);
  let to_admin = drain(&mut admin_box);
  assert_eq!(to_tourist, to_admin, "sender gets the same echo as everyone else");
  assert_eq!(to_admin.len(), 1);

  let created = &to_admin[0];
  assert_eq!(created["event"], "NEW_SOS_INCIDENT");
  let id = created["data"]["id"].as_str().unwrap().to_string();
  assert!(id.starts_with("sos_"));
  assert!(id["sos_".len()..].chars().all(|c| c.is_ascii_digit()));
  assert_eq!(created["data"]["status"], "active");
  assert_eq!(created["data"]["message"], "Emergency SOS triggered");
  assert_eq!(created["data"]["touristId"], "t1");
  assert_eq!(created["data"]["name"], "Alice");
  assert!(created["data"].get("acknowledgedBy").is_none());

  broker.inbound(admin, ack_frame(&id, "admin_001")).await.unwrap();
  settle(&broker).await;

  for outbox in [&mut tourist_box, &mut admin_box] {
    let frames = drain(outbox);
    assert_eq!(frames.len(), 1);
    assert_eq!(
      frames[0],
      json!({"event": "SOS_ACKNOWLEDGED", "data": {"incidentId": id, "acknowledgedBy": "admin_001"}})
    );
  }

  let table = get_incidents(broker.clone()).await;
  assert_eq!(table.len(), 1);
  assert_eq!(table[0]["id"], id.as_str());
  assert_eq!(table[0]["status"], "acknowledged");
  assert_eq!(table[0]["acknowledgedBy"], "admin_001");
  assert!(!table[0]["acknowledgedAt"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn every_event_reaches_each_of_n_clients_exactly_once() {
  let (broker, _task) = Broker::spawn(BrokerConfig::default());
  let mut clients = connect_many(&broker, 5).await;

  broker
    .inbound(clients[2].0, sos_frame("t9", "Bob", Some("twisted ankle")))
    .await
    .unwrap();
  settle(&broker).await;
  let id = broker.incidents().await.unwrap()[0].id.clone();
  broker.inbound(clients[4].0, ack_frame(&id, "admin_7")).await.unwrap();
  settle(&broker).await;

  for (_, outbox) in clients.iter_mut() {
    let names: Vec<String> = drain(outbox)
      .into_iter()
      .map(|f| f["event"].as_str().unwrap().to_string())
      .collect();
    assert_eq!(names, vec!["NEW_SOS_INCIDENT", "SOS_ACKNOWLEDGED"]);
  }
}

#[tokio::test]
async fn ack_for_unknown_incident_is_silent() {
  let (broker, _task) = Broker::spawn(BrokerConfig::default());
  let mut clients = connect_many(&broker, 3).await;

  broker.inbound(clients[0].0, sos_frame("t1", "Alice", None)).await.unwrap();
  settle(&broker).await;
  for (_, outbox) in clients.iter_mut() {
    drain(outbox);
  }
  let before = broker.incidents().await.unwrap();

  broker.inbound(clients[1].0, ack_frame("sos_0", "admin_001")).await.unwrap();
  settle(&broker).await;

  assert_eq!(broker.incidents().await.unwrap(), before);
  for (_, outbox) in clients.iter_mut() {
    assert!(drain(outbox).is_empty(), "no broadcast and no reply");
  }
}

#[tokio::test]
async fn second_ack_overwrites_and_rebroadcasts() {
  let (broker, _task) = Broker::spawn(BrokerConfig::default());
  let (client, mut outbox) = broker.connect().await.unwrap();

  broker.inbound(client, sos_frame("t1", "Alice", None)).await.unwrap();
  settle(&broker).await;
  let id = broker.incidents().await.unwrap()[0].id.clone();

  broker.inbound(client, ack_frame(&id, "admin_001")).await.unwrap();
  broker.inbound(client, ack_frame(&id, "admin_002")).await.unwrap();
  settle(&broker).await;

  let acks: Vec<Value> = drain(&mut outbox)
    .into_iter()
    .filter(|f| f["event"] == "SOS_ACKNOWLEDGED")
    .collect();
  assert_eq!(acks.len(), 2);
  assert_eq!(acks[1]["data"]["acknowledgedBy"], "admin_002");

  let incidents = broker.incidents().await.unwrap();
  let stored = &incidents[0];
  assert_eq!(stored.acknowledged_by.as_deref(), Some("admin_002"));
  assert_eq!(stored.status, sos_relay::IncidentStatus::Acknowledged);
}

#[tokio::test]
async fn burst_of_sos_events_gets_unique_ids() {
  let (broker, _task) = Broker::spawn(BrokerConfig::default());
  let (client, _outbox) = broker.connect().await.unwrap();

  for i in 0..50 {
    broker
      .inbound(client, sos_frame(&format!("t{i}"), "Burst", None))
      .await
      .unwrap();
  }

  let incidents = broker.incidents().await.unwrap();
  assert_eq!(incidents.len(), 50);
  let mut ids: Vec<&str> = incidents.iter().map(|i| i.id.as_str()).collect();
  ids.sort_unstable();
  ids.dedup();
  assert_eq!(ids.len(), 50);
}

#[tokio::test]
async fn malformed_sos_is_rejected_to_sender_without_touching_table() {
  let (broker, _task) = Broker::spawn(BrokerConfig::default());
  let (sender, mut sender_box) = broker.connect().await.unwrap();
  let (_, mut other_box) = broker.connect().await.unwrap();

  let bad = json!({"event": "SEND_SOS", "data": {"name": "Alice", "location": {"lat": 1.0, "lng": 2.0}}});
  broker.inbound(sender, bad.to_string()).await.unwrap();
  broker.inbound(sender, "{not json").await.unwrap();
  settle(&broker).await;

  assert!(broker.incidents().await.unwrap().is_empty());
  assert!(drain(&mut other_box).is_empty());

  let replies = drain(&mut sender_box);
  assert_eq!(replies.len(), 2);
  assert_eq!(replies[0]["event"], "SOS_ERROR");
  assert_eq!(replies[0]["data"]["field"], "touristId");
  assert_eq!(replies[1]["data"]["field"], "event");
}

#[tokio::test]
async fn incidents_listing_starts_empty() {
  let (broker, _task) = Broker::spawn(BrokerConfig::default());
  assert!(get_incidents(broker).await.is_empty());
}
