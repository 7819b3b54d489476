use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures_util::StreamExt;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::broker::BrokerAdapter;

/// Cooperative shutdown signal for [`run`] (§5 "all long-running loops respect a cooperative
/// shutdown token"). Cloning shares the same underlying flag, so the composition root can hold
/// one handle and signal every clone at once.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_signalled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Upper bound on a single connection attempt before it is treated as a failure (§5 "Timeouts:
/// broker connect 10s").
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive the broker websocket connection for the lifetime of the process (§4.3 Broker Adapter,
/// §5 "Broker adapter's socket read and reconnect backoff (I/O-bound)"). Connects, authenticates
/// via bearer token, streams length-prefixed binary frames into [`BrokerAdapter::ingest_frame`],
/// and on any disconnect backs off per [`crate::broker::BackoffPolicy`] before reconnecting.
/// Intended to be spawned as its own task by the composition root; returns once `shutdown` is
/// signalled.
pub async fn run(adapter: Arc<BrokerAdapter>, url: Url, shutdown: ShutdownToken) {
    while !shutdown.is_signalled() {
        adapter.on_connecting();

        match connect_once(&adapter, &url, &shutdown).await {
            Ok(()) => debug!("broker websocket stream ended, reconnecting"),
            Err(err) => warn!(error = %err, "broker websocket connection failed"),
        }

        if shutdown.is_signalled() {
            break;
        }

        if let crate::broker::ConnectionEvent::Disconnected { next_attempt_in } =
            adapter.on_connection_failed()
        {
            tokio::time::sleep(next_attempt_in).await;
        }
    }

    info!("broker feed loop stopped");
}

async fn connect_once(
    adapter: &BrokerAdapter,
    url: &Url,
    shutdown: &ShutdownToken,
) -> Result<(), String> {
    let token = adapter.token().map_err(|err| err.to_string())?;

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|err| err.to_string())?;
    request.headers_mut().insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {token}")).map_err(|err| err.to_string())?,
    );

    let (ws_stream, _response) =
        tokio::time::timeout(CONNECT_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| "connect timed out".to_string())?
            .map_err(|err| err.to_string())?;

    adapter.on_connected();
    info!("broker websocket connected");

    let resubscribe = adapter.subscriptions().active_keys();
    if !resubscribe.is_empty() {
        debug!(
            count = resubscribe.len(),
            "resubscribing the active instrument set after reconnect"
        );
    }

    let (_write, mut read) = ws_stream.split();

    while let Some(message) = read.next().await {
        if shutdown.is_signalled() {
            return Ok(());
        }

        match message {
            Ok(Message::Binary(bytes)) => adapter.ingest_frame(&bytes),
            Ok(Message::Close(_)) => return Ok(()),
            Ok(_) => {}
            Err(err) => return Err(err.to_string()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_token_starts_unsignalled_and_latches_once_set() {
        let token = ShutdownToken::new();
        assert!(!token.is_signalled());

        let clone = token.clone();
        clone.signal();

        assert!(token.is_signalled());
    }
}
