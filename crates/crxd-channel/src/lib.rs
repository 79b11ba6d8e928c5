//! Single-client WebSocket update channel for crxd.
//!
//! The channel accepts one extension client at a time on
//! `/<url-encoded extension name>/crx` and exposes one operation,
//! [`Notifier::notify_update`], which pushes the `UPDATE_CONTENT` signal to
//! that client if one is connected and silently does nothing otherwise.
//!
//! # Quick Start
//!
//! ```ignore
//! use crxd_channel::{ChannelConfig, start_channel};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ChannelConfig {
//!         host: "127.0.0.1".to_owned(),
//!         port: 8787,
//!         extension_name: "web-update-alerts".to_owned(),
//!     };
//!
//!     let channel = start_channel(&config).await.unwrap();
//!     println!("listening on {}", channel.port());
//!     channel.notifier().notify_update();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Extension ──WS /<name>/crx──► axum server (crxd-channel)
//!                                    │
//!                                    ├─► socket task (one per accepted client)
//!                                    │       │
//!                                    │       └─► HubEvent::Connected / Disconnected
//!                                    │
//!                                    └─► hub task (owns the Session)
//!                                            ▲
//! Change watcher ── Notifier ── HubEvent::Notify
//! ```

mod bind;
mod session;
mod websocket;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

pub use session::SessionStatus;
use session::{ConnectionId, HubEvent};

/// Channel configuration.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Host address to bind to.
    pub host: String,
    /// Preferred port. Occupied ports are skipped upward.
    pub port: u16,
    /// Extension identifier encoded into the upgrade path.
    pub extension_name: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8787,
            extension_name: crxd_protocol::DEFAULT_EXTENSION_NAME.to_owned(),
        }
    }
}

/// Channel error.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Binding failed for a reason other than the port being taken.
    #[error("Failed to bind {host}:{port}: {source}")]
    Bind {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
    /// Every port from the preferred one up to 65535 was taken.
    #[error("No free port at or above {preferred}")]
    PortExhausted { preferred: u16 },
    /// The server loop failed.
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
    /// The server task panicked or was cancelled.
    #[error("Server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// State shared by the socket tasks.
pub(crate) struct ChannelState {
    /// Exact path upgrades are accepted on.
    pub(crate) upgrade_path: String,
    /// Sender into the hub task.
    pub(crate) hub: mpsc::UnboundedSender<HubEvent>,
    /// Flips to `true` when the channel shuts down.
    pub(crate) closing: watch::Receiver<bool>,
    next_id: AtomicU64,
}

impl ChannelState {
    fn next_connection_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Handle for pushing update signals to the connected client.
#[derive(Clone, Debug)]
pub struct Notifier {
    hub: mpsc::UnboundedSender<HubEvent>,
}

impl Notifier {
    /// Send `UPDATE_CONTENT` to the connected client.
    ///
    /// Without a client this is a no-op: nothing is queued for later clients
    /// and no error is reported.
    pub fn notify_update(&self) {
        let _ = self.hub.send(HubEvent::Notify);
    }

    /// Current session status. Reports disconnected once the hub has stopped.
    pub async fn status(&self) -> SessionStatus {
        let (reply, rx) = oneshot::channel();
        if self.hub.send(HubEvent::Status(reply)).is_err() {
            return SessionStatus::default();
        }
        rx.await.unwrap_or_default()
    }
}

/// A running channel.
pub struct Channel {
    port: u16,
    notifier: Notifier,
    shutdown: watch::Sender<bool>,
    server: JoinHandle<std::io::Result<()>>,
}

impl Channel {
    /// Port the channel actually bound.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Handle for sending update signals.
    #[must_use]
    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    /// Stop accepting connections, close the connected client and wait for
    /// the server loop to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the server loop failed.
    pub async fn shutdown(self) -> Result<(), ChannelError> {
        let _ = self.shutdown.send(true);
        self.server.await??;
        Ok(())
    }
}

/// Bind the channel and start serving in the background.
///
/// # Errors
///
/// Returns an error if no port at or above `config.port` can be bound.
pub async fn start_channel(config: &ChannelConfig) -> Result<Channel, ChannelError> {
    let (listener, port) = bind::bind_with_fallback(&config.host, config.port).await?;
    let upgrade_path = crxd_protocol::upgrade_path(&config.extension_name);
    tracing::info!(host = %config.host, port, path = %upgrade_path, "Update channel listening");

    let (hub, events) = mpsc::unbounded_channel();
    tokio::spawn(session::run_hub(events));

    let (shutdown, closing) = watch::channel(false);
    let state = Arc::new(ChannelState {
        upgrade_path,
        hub: hub.clone(),
        closing: closing.clone(),
        next_id: AtomicU64::new(0),
    });
    let app = Router::new()
        .fallback(websocket::upgrade_handler)
        .with_state(state);

    let mut closing = closing;
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = closing.changed().await;
            })
            .await
    });

    Ok(Channel {
        port,
        notifier: Notifier { hub },
        shutdown,
        server,
    })
}
