//! Extension-side listener for the crxd update channel.
//!
//! A [`Listener`] connects once, pings on a fixed cadence, and reacts to
//! `UPDATE_CONTENT` by asking its [`Host`] to restart the extension and then
//! reload the page. There is no reconnection: a closed channel ends
//! [`Listener::run`].

mod listener;

pub use listener::{Listener, ListenerState, Reaction};

use async_trait::async_trait;

/// A reload request the host declined.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HostError(pub String);

/// Runtime the listener acts on.
///
/// Reloads are awaited on the listener's task, so implementations must not
/// block the thread while they wait on external work.
#[async_trait]
pub trait Host: Send {
    /// Whether the extension context is still alive.
    fn is_context_valid(&self) -> bool;

    /// Ask the background side to restart the extension.
    ///
    /// `Ok` is the acknowledgement; the view is reloaded only after it.
    async fn reload_background(&mut self) -> Result<(), HostError>;

    /// Reload the current view.
    async fn reload_view(&mut self);
}

/// Listener error.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connecting or talking to the channel failed.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}
