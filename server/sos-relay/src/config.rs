//! Relay configuration: broker defaults plus env-driven server settings.

use std::env;
use std::net::SocketAddr;

use crate::error::RelayError;

pub const DEFAULT_SOS_MESSAGE: &str = "Emergency SOS triggered";
pub const DEFAULT_ID_PREFIX: &str = "sos_";

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5005";
const DEFAULT_ALLOWED_ORIGINS: &str = "*";
const DEFAULT_WS_PATH: &str = "/ws";
const DEFAULT_MAILBOX_CAPACITY: usize = 1024;

/// HTTP routes the socket path may not shadow.
pub const RESERVED_PATHS: [&str; 2] = ["/health", "/incidents"];

/// Tunables for the broker and its incident engine.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
  /// Message stored when an SOS arrives without one.
  pub default_message: String,
  /// Prefix for minted incident ids (followed by millisecond digits).
  pub id_prefix: String,
  /// Bounded mailbox size for the broker task.
  pub mailbox_capacity: usize,
}

impl Default for BrokerConfig {
  fn default() -> Self {
    Self {
      default_message: DEFAULT_SOS_MESSAGE.to_string(),
      id_prefix: DEFAULT_ID_PREFIX.to_string(),
      mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
    }
  }
}

/// Which origins may talk to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
  Any,
  List(Vec<String>),
}

impl AllowedOrigins {
  /// Parse a comma-separated list. A lone `*` (or an empty list) means any origin.
  pub fn parse(raw: &str) -> Self {
    let origins: Vec<String> = raw
      .split(',')
      .map(str::trim)
      .filter(|origin| !origin.is_empty())
      .map(str::to_string)
      .collect();

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
      Self::Any
    } else {
      Self::List(origins)
    }
  }

  pub fn allows(&self, origin: &str) -> bool {
    match self {
      Self::Any => true,
      Self::List(list) => list.iter().any(|o| o == origin),
    }
  }
}

/// Process-level settings read once at startup.
#[derive(Debug, Clone)]
pub struct RelayConfig {
  pub bind_addr: SocketAddr,
  pub allowed_origins: AllowedOrigins,
  pub ws_path: String,
  pub broker: BrokerConfig,
}

impl Default for RelayConfig {
  fn default() -> Self {
    Self {
      bind_addr: SocketAddr::from(([127, 0, 0, 1], 5005)),
      allowed_origins: AllowedOrigins::Any,
      ws_path: DEFAULT_WS_PATH.to_string(),
      broker: BrokerConfig::default(),
    }
  }
}

impl RelayConfig {
  pub fn from_env() -> Result<Self, RelayError> {
    Self::from_lookup(|key| env::var(key).ok())
  }

  /// Build from an arbitrary key lookup (env in production, a map in tests).
  pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let bind_addr = lookup("SOS_RELAY_BIND_ADDR")
      .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
      .parse::<SocketAddr>()
      .map_err(|e| RelayError::config("SOS_RELAY_BIND_ADDR", e.to_string()))?;

    let allowed_origins = AllowedOrigins::parse(
      &lookup("SOS_RELAY_ALLOWED_ORIGINS").unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
    );

    let ws_path = lookup("SOS_RELAY_WS_PATH").unwrap_or_else(|| DEFAULT_WS_PATH.to_string());
    if !ws_path.starts_with('/') {
      return Err(RelayError::config("SOS_RELAY_WS_PATH", "must start with '/'"));
    }
    if RESERVED_PATHS.contains(&ws_path.as_str()) {
      return Err(RelayError::config(
        "SOS_RELAY_WS_PATH",
        format!("{ws_path} is reserved"),
      ));
    }

    let mailbox_capacity = match lookup("SOS_RELAY_MAILBOX_CAPACITY") {
      Some(raw) => raw
        .parse::<usize>()
        .map_err(|e| RelayError::config("SOS_RELAY_MAILBOX_CAPACITY", e.to_string()))?
        .max(1),
      None => DEFAULT_MAILBOX_CAPACITY,
    };

    Ok(Self {
      bind_addr,
      allowed_origins,
      ws_path,
      broker: BrokerConfig {
        mailbox_capacity,
        ..BrokerConfig::default()
      },
    })
  }
}
