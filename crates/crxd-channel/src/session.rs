//! Connection session and its dispatcher.
//!
//! The [`Session`] owns the one connection reference the channel keeps. It
//! moves through `none → connected → none` and is only ever touched by the
//! hub task, which applies [`HubEvent`]s in the order they were sent.

use tokio::sync::{mpsc, oneshot};

/// Identifies one accepted WebSocket connection.
pub(crate) type ConnectionId = u64;

/// Outbound signal queued for a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Signal {
    Update,
}

/// Snapshot of the session, for callers that need to observe registration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStatus {
    /// Whether a client is currently held.
    pub connected: bool,
    /// Total connections accepted since startup.
    pub accepted: u64,
}

/// Event applied to the session by the hub task.
pub(crate) enum HubEvent {
    Connected {
        id: ConnectionId,
        outbox: mpsc::UnboundedSender<Signal>,
    },
    Disconnected(ConnectionId),
    Notify,
    Status(oneshot::Sender<SessionStatus>),
}

/// The held connection.
struct Connection {
    id: ConnectionId,
    outbox: mpsc::UnboundedSender<Signal>,
}

/// Owner of the single connection reference.
#[derive(Default)]
pub(crate) struct Session {
    current: Option<Connection>,
    accepted: u64,
}

impl Session {
    /// Hold a new connection, abandoning any previous one.
    ///
    /// Returns the id of the replaced connection. Dropping its outbox is what
    /// tells the old socket task it will never be notified again.
    fn attach(
        &mut self,
        id: ConnectionId,
        outbox: mpsc::UnboundedSender<Signal>,
    ) -> Option<ConnectionId> {
        self.accepted += 1;
        self.current
            .replace(Connection { id, outbox })
            .map(|previous| previous.id)
    }

    /// Clear the held connection if it is `id`.
    ///
    /// Disconnects of already-replaced connections are ignored.
    fn detach(&mut self, id: ConnectionId) -> bool {
        if self.current.as_ref().is_some_and(|c| c.id == id) {
            self.current = None;
            true
        } else {
            false
        }
    }

    /// Queue one update signal for the held connection, if any.
    fn notify(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|c| c.outbox.send(Signal::Update).is_ok())
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            connected: self.current.is_some(),
            accepted: self.accepted,
        }
    }
}

/// Run the hub until every event sender is dropped.
pub(crate) async fn run_hub(mut events: mpsc::UnboundedReceiver<HubEvent>) {
    let mut session = Session::default();

    while let Some(event) = events.recv().await {
        match event {
            HubEvent::Connected { id, outbox } => {
                if let Some(previous) = session.attach(id, outbox) {
                    tracing::info!(connection = id, previous, "Client replaced previous connection");
                } else {
                    tracing::info!(connection = id, "Client connected");
                }
            }
            HubEvent::Disconnected(id) => {
                if session.detach(id) {
                    tracing::info!(connection = id, "Client disconnected");
                } else {
                    tracing::debug!(connection = id, "Abandoned connection closed");
                }
            }
            HubEvent::Notify => {
                if session.notify() {
                    tracing::info!("Update signal sent");
                } else {
                    tracing::debug!("No client connected, update signal dropped");
                }
            }
            HubEvent::Status(reply) => {
                let _ = reply.send(session.status());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_notify_without_connection_is_noop() {
        let session = Session::default();
        let before = session.status();

        assert!(!session.notify());
        assert_eq!(session.status(), before);
    }

    #[test]
    fn test_notify_reaches_held_connection_once() {
        let mut session = Session::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        session.attach(1, tx);

        assert!(session.notify());
        assert_eq!(rx.try_recv(), Ok(Signal::Update));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_last_connection_wins() {
        let mut session = Session::default();
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();

        assert_eq!(session.attach(1, first_tx), None);
        assert_eq!(session.attach(2, second_tx), Some(1));
        session.notify();

        assert_eq!(second_rx.try_recv(), Ok(Signal::Update));
        // Outbox dropped on replacement: the old task sees a closed channel.
        assert_eq!(
            first_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        );
        assert_eq!(
            session.status(),
            SessionStatus {
                connected: true,
                accepted: 2
            }
        );
    }

    #[test]
    fn test_abandoned_disconnect_keeps_current() {
        let mut session = Session::default();
        let (first_tx, _first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();
        session.attach(1, first_tx);
        session.attach(2, second_tx);

        assert!(!session.detach(1));
        assert!(session.notify());
        assert_eq!(second_rx.try_recv(), Ok(Signal::Update));
    }

    #[test]
    fn test_detach_clears_connection() {
        let mut session = Session::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        session.attach(7, tx);

        assert!(session.detach(7));
        assert!(!session.status().connected);
        assert!(!session.notify());
    }

    #[tokio::test]
    async fn test_hub_applies_events_in_order() {
        let (events, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_hub(rx));

        let (outbox, mut inbox) = mpsc::unbounded_channel();
        events.send(HubEvent::Connected { id: 1, outbox }).unwrap();
        events.send(HubEvent::Notify).unwrap();
        events.send(HubEvent::Disconnected(1)).unwrap();
        events.send(HubEvent::Notify).unwrap();

        let (reply, status) = oneshot::channel();
        events.send(HubEvent::Status(reply)).unwrap();
        let status = status.await.unwrap();

        assert!(!status.connected);
        assert_eq!(status.accepted, 1);
        assert_eq!(inbox.recv().await, Some(Signal::Update));
        assert_eq!(inbox.recv().await, None);
    }
}
