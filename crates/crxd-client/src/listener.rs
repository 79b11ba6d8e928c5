//! Listener state machine and connection loop.

use std::time::Duration;

use crxd_protocol::{ClientMessage, UPDATE_CONTENT};
use futures::{SinkExt, StreamExt};
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::{ClientError, Host};

/// Connection state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListenerState {
    #[default]
    Disconnected,
    Connected,
}

/// Outcome of one inbound frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reaction {
    /// Not an update, or not connected.
    Ignored,
    /// Update received but the extension context is gone.
    StaleContext,
    /// The background restart was not acknowledged.
    NotAcknowledged,
    /// Background restarted and view reloaded.
    Reloaded,
}

/// Single-connection update listener.
pub struct Listener<H> {
    url: String,
    ping_interval: Duration,
    host: H,
    state: ListenerState,
}

impl<H: Host> Listener<H> {
    #[must_use]
    pub fn new(url: impl Into<String>, ping_interval: Duration, host: H) -> Self {
        Self {
            url: url.into(),
            ping_interval,
            host,
            state: ListenerState::Disconnected,
        }
    }

    #[must_use]
    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// React to one text frame.
    pub async fn handle_message(&mut self, text: &str) -> Reaction {
        if self.state != ListenerState::Connected || text != UPDATE_CONTENT {
            tracing::debug!(message = %text, "Ignoring message");
            return Reaction::Ignored;
        }

        if !self.host.is_context_valid() {
            tracing::debug!("Extension context invalidated, skipping reload");
            return Reaction::StaleContext;
        }

        if let Err(e) = self.host.reload_background().await {
            tracing::warn!(error = %e, "Background reload not acknowledged");
            return Reaction::NotAcknowledged;
        }
        self.host.reload_view().await;
        tracing::info!("Extension reloaded");
        Reaction::Reloaded
    }

    /// Connect and listen until the channel closes.
    ///
    /// The first ping goes out one interval after the connection opens.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened or fails mid-stream.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        let (ws, _) = connect_async(self.url.as_str()).await?;
        self.state = ListenerState::Connected;
        tracing::info!(url = %self.url, "Connected to update channel");

        let (mut sink, mut stream) = ws.split();
        let mut ping = interval_at(Instant::now() + self.ping_interval, self.ping_interval);

        let result = loop {
            tokio::select! {
                _ = ping.tick() => {
                    let msg = Message::text(ClientMessage::Ping.to_json());
                    if let Err(e) = sink.send(msg).await {
                        break Err(e.into());
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.handle_message(text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(e.into()),
                },
            }
        };

        self.state = ListenerState::Disconnected;
        tracing::info!("Disconnected from update channel");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostError;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct MockHost {
        invalid: bool,
        reject: bool,
        background_reloads: usize,
        view_reloads: usize,
    }

    #[async_trait::async_trait]
    impl Host for MockHost {
        fn is_context_valid(&self) -> bool {
            !self.invalid
        }

        async fn reload_background(&mut self) -> Result<(), HostError> {
            self.background_reloads += 1;
            if self.reject {
                return Err(HostError("no receiver".to_owned()));
            }
            Ok(())
        }

        async fn reload_view(&mut self) {
            self.view_reloads += 1;
        }
    }

    fn connected(host: MockHost) -> Listener<MockHost> {
        let mut listener =
            Listener::new("ws://localhost:8787/x/crx", Duration::from_secs(5), host);
        listener.state = ListenerState::Connected;
        listener
    }

    #[tokio::test]
    async fn test_update_reloads_background_then_view() {
        let mut listener = connected(MockHost::default());

        assert_eq!(
            listener.handle_message(UPDATE_CONTENT).await,
            Reaction::Reloaded
        );

        let host = listener.into_host();
        assert_eq!((host.background_reloads, host.view_reloads), (1, 1));
    }

    #[tokio::test]
    async fn test_invalid_context_does_nothing() {
        let mut listener = connected(MockHost {
            invalid: true,
            ..MockHost::default()
        });

        assert_eq!(
            listener.handle_message(UPDATE_CONTENT).await,
            Reaction::StaleContext
        );

        let host = listener.into_host();
        assert_eq!((host.background_reloads, host.view_reloads), (0, 0));
    }

    #[tokio::test]
    async fn test_view_waits_for_acknowledgement() {
        let mut listener = connected(MockHost {
            reject: true,
            ..MockHost::default()
        });

        assert_eq!(
            listener.handle_message(UPDATE_CONTENT).await,
            Reaction::NotAcknowledged
        );
        assert_eq!(listener.host().view_reloads, 0);
    }

    #[tokio::test]
    async fn test_other_frames_ignored() {
        let mut listener = connected(MockHost::default());

        assert_eq!(
            listener.handle_message("update_content").await,
            Reaction::Ignored
        );
        assert_eq!(
            listener.handle_message(r#"{"type":"ping"}"#).await,
            Reaction::Ignored
        );
        assert_eq!(listener.host().background_reloads, 0);
    }

    #[tokio::test]
    async fn test_disconnected_listener_ignores_updates() {
        let mut listener = Listener::new("ws://x", Duration::from_secs(5), MockHost::default());

        assert_eq!(listener.state(), ListenerState::Disconnected);
        assert_eq!(
            listener.handle_message(UPDATE_CONTENT).await,
            Reaction::Ignored
        );
    }

    #[tokio::test]
    async fn test_run_fails_without_server() {
        let mut listener = Listener::new(
            "ws://127.0.0.1:1/x/crx",
            Duration::from_secs(5),
            MockHost::default(),
        );

        assert!(listener.run().await.is_err());
        assert_eq!(listener.state(), ListenerState::Disconnected);
    }
}
