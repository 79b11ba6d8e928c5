//! Channel, debounce loop and listener wired together over a real socket.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crxd_channel::{ChannelConfig, Notifier, start_channel};
use crxd_client::{Host, HostError, Listener, ListenerState};
use crxd_protocol::ws_url;
use crxd_watch::run_debounced;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::time::timeout;

const NAME: &str = "web-update-alerts";
const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Default)]
struct CountingHost {
    background: Arc<AtomicUsize>,
    views: Arc<AtomicUsize>,
    valid: Arc<Mutex<bool>>,
}

impl CountingHost {
    fn new() -> Self {
        let host = Self::default();
        *host.valid.lock().unwrap() = true;
        host
    }

    fn views(&self) -> usize {
        self.views.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Host for CountingHost {
    fn is_context_valid(&self) -> bool {
        *self.valid.lock().unwrap()
    }

    async fn reload_background(&mut self) -> Result<(), HostError> {
        self.background.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reload_view(&mut self) {
        self.views.fetch_add(1, Ordering::SeqCst);
    }
}

async fn wait_connected(notifier: &Notifier) {
    timeout(TIMEOUT, async {
        while !notifier.status().await.connected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("listener never connected");
}

#[tokio::test]
async fn test_burst_of_changes_reloads_once() {
    // Hold the preferred port so the channel has to move off it.
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let preferred = occupied.local_addr().unwrap().port();

    let channel = start_channel(&ChannelConfig {
        host: "127.0.0.1".to_owned(),
        port: preferred,
        extension_name: NAME.to_owned(),
    })
    .await
    .unwrap();
    assert!(channel.port() > preferred);
    let notifier = channel.notifier();

    let host = CountingHost::new();
    let mut listener = Listener::new(
        ws_url("127.0.0.1", channel.port(), NAME),
        Duration::from_secs(5),
        host.clone(),
    );
    let listening = tokio::spawn(async move {
        let result = listener.run().await;
        (result, listener.state())
    });
    wait_connected(&notifier).await;

    let (events_tx, events_rx) = mpsc::channel::<PathBuf>(16);
    let fire_notifier = notifier.clone();
    let debounce = tokio::spawn(run_debounced(events_rx, Duration::from_millis(1000), move || {
        fire_notifier.notify_update();
        std::future::ready(())
    }));

    for name in ["a.ts", "b.ts", "c.ts"] {
        events_tx.send(PathBuf::from(name)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    timeout(TIMEOUT, async {
        while host.views() == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("no reload after quiet window");
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(host.views(), 1);
    assert_eq!(host.background.load(Ordering::SeqCst), 1);

    drop(events_tx);
    debounce.await.unwrap();
    channel.shutdown().await.unwrap();

    let (result, state) = timeout(TIMEOUT, listening).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert_eq!(state, ListenerState::Disconnected);
}

#[tokio::test]
async fn test_invalid_context_skips_reload() {
    let channel = start_channel(&ChannelConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        extension_name: NAME.to_owned(),
    })
    .await
    .unwrap();
    let notifier = channel.notifier();

    let host = CountingHost::new();
    *host.valid.lock().unwrap() = false;
    let mut listener = Listener::new(
        ws_url("127.0.0.1", channel.port(), NAME),
        Duration::from_secs(5),
        host.clone(),
    );
    let listening = tokio::spawn(async move { listener.run().await });
    wait_connected(&notifier).await;

    notifier.notify_update();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(host.views(), 0);
    assert_eq!(host.background.load(Ordering::SeqCst), 0);

    channel.shutdown().await.unwrap();
    timeout(TIMEOUT, listening).await.unwrap().unwrap().unwrap();
}
