//! HTTP and WebSocket handlers for the relay.

use axum::{
  extract::{
    ws::{Message, WebSocket, WebSocketUpgrade},
    Request, State,
  },
  http::{header, HeaderValue, Method, StatusCode},
  middleware::{self, Next},
  response::{IntoResponse, Response},
  routing::get,
  Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use tower_http::{
  cors::{AllowOrigin, Any, CorsLayer},
  trace::TraceLayer,
};

use crate::broker::BrokerHandle;
use crate::config::{AllowedOrigins, RelayConfig};
use crate::error::RelayError;
use crate::types::Incident;

#[derive(Clone)]
pub struct AppState {
  pub broker: BrokerHandle,
}

/// Assemble the full router: socket path, health probe, incident listing.
pub fn router(config: &RelayConfig, broker: BrokerHandle) -> Result<Router, RelayError> {
  let socket = Router::new()
    .route(&config.ws_path, get(ws_upgrade))
    .route_layer(middleware::from_fn_with_state(
      config.allowed_origins.clone(),
      check_origin,
    ));

  let app = Router::new()
    .route("/health", get(health))
    .route("/incidents", get(list_incidents))
    .merge(socket)
    .with_state(AppState { broker })
    .layer(TraceLayer::new_for_http())
    .layer(cors_layer(&config.allowed_origins)?);

  Ok(app)
}

fn cors_layer(origins: &AllowedOrigins) -> Result<CorsLayer, RelayError> {
  let list = match origins {
    AllowedOrigins::Any => return Ok(CorsLayer::permissive()),
    AllowedOrigins::List(list) => list,
  };

  let parsed = list
    .iter()
    .map(|origin| {
      origin
        .parse::<HeaderValue>()
        .map_err(|_| RelayError::config("SOS_RELAY_ALLOWED_ORIGINS", format!("invalid origin: {origin}")))
    })
    .collect::<Result<Vec<_>, _>>()?;

  Ok(CorsLayer::new()
    .allow_origin(AllowOrigin::list(parsed))
    .allow_methods([Method::GET, Method::OPTIONS])
    .allow_headers(Any))
}

/// Browsers do not apply CORS to WebSocket upgrades, so the socket route
/// checks `Origin` itself. Requests without the header (non-browser clients)
/// pass.
async fn check_origin(State(origins): State<AllowedOrigins>, req: Request, next: Next) -> Response {
  if let Some(origin) = req.headers().get(header::ORIGIN) {
    let origin = origin.to_str().unwrap_or_default();
    if !origins.allows(origin) {
      tracing::warn!(origin = %origin, "websocket upgrade from disallowed origin");
      return StatusCode::FORBIDDEN.into_response();
    }
  }
  next.run(req).await
}

pub async fn health() -> &'static str {
  "ok"
}

pub async fn list_incidents(
  State(state): State<AppState>,
) -> Result<Json<Vec<Incident>>, StatusCode> {
  match state.broker.incidents().await {
    Ok(incidents) => Ok(Json(incidents)),
    Err(e) => {
      tracing::error!(error = %e, "incident listing failed");
      Err(StatusCode::SERVICE_UNAVAILABLE)
    }
  }
}

pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
  ws.on_upgrade(move |socket| handle_socket(socket, state.broker))
}

async fn handle_socket(socket: WebSocket, broker: BrokerHandle) {
  let (id, mut outbox) = match broker.connect().await {
    Ok(joined) => joined,
    Err(e) => {
      tracing::warn!(error = %e, "refusing socket");
      return;
    }
  };

  let (mut sender, mut receiver) = socket.split();

  // Broker -> client.
  let mut send_task = tokio::spawn(async move {
    while let Some(frame) = outbox.recv().await {
      if sender.send(Message::Text(frame)).await.is_err() {
        break;
      }
    }
    let _ = sender.close().await;
  });

  // Client -> broker. Frames are forwarded one at a time, keeping per-socket order.
  let inbound = broker.clone();
  let mut recv_task = tokio::spawn(async move {
    while let Some(result) = receiver.next().await {
      match result {
        Ok(Message::Text(text)) => {
          if inbound.inbound(id, text).await.is_err() {
            break;
          }
        }
        Ok(Message::Binary(data)) => {
          tracing::debug!(connection_id = %id, len = data.len(), "ignoring binary frame");
        }
        Ok(Message::Close(_)) => break,
        // Ping/pong is answered by the transport.
        Ok(_) => {}
        Err(e) => {
          tracing::warn!(connection_id = %id, error = %e, "websocket error");
          break;
        }
      }
    }
  });

  tokio::select! {
    _ = &mut send_task => recv_task.abort(),
    _ = &mut recv_task => send_task.abort(),
  }

  if let Err(e) = broker.disconnect(id).await {
    tracing::debug!(connection_id = %id, error = %e, "broker gone before disconnect");
  }
}
