//! Binary entrypoint for the SOS relay.
//!
//! Reads config from the environment, spawns the broker, serves HTTP and
//! WebSocket until Ctrl-C, then stops the broker.

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sos_relay::{router, Broker, RelayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  init_tracing();

  let config = RelayConfig::from_env().context("invalid relay configuration")?;
  let (broker, broker_task) = Broker::spawn(config.broker.clone());
  let app = router(&config, broker.clone())?;

  let listener = TcpListener::bind(config.bind_addr)
    .await
    .with_context(|| format!("failed to bind {}", config.bind_addr))?;

  tracing::info!(
    bind_addr = %config.bind_addr,
    ws_path = %config.ws_path,
    allowed_origins = ?config.allowed_origins,
    "sos-relay listening"
  );

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server exited with error")?;

  broker.shutdown().await;
  broker_task.await.context("broker task panicked")?;

  Ok(())
}

fn init_tracing() {
  tracing_subscriber::registry()
    .with(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sos_relay=info,tower_http=info")),
    )
    .with(tracing_subscriber::fmt::layer().with_target(false))
    .init();
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for shutdown signal");
    // Without a signal handler, never resolve: keep serving.
    std::future::pending::<()>().await;
  }
  tracing::info!("shutdown signal received");
}
