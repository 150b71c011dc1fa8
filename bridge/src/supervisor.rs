//! Connection supervision: periodic reconnects and at-most-once
//! state-transition notifications.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use rcon::{RconSession, SessionError};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::events::{BridgeEvent, EventBus};
use crate::tasks::spawn_supervised;

/// Keeps one session connected without flooding retries or duplicate
/// alerts. Attempts triggered by the boot path, the periodic loop and
/// manual commands all share the same interval guard.
pub struct ConnectionSupervisor {
    session: Arc<RconSession>,
    bus: Arc<EventBus>,
    min_retry_interval: Duration,
    reconnect_interval: Duration,
    last_attempt_at: Mutex<Option<Instant>>,
    disconnect_notified: Mutex<bool>,
}

impl ConnectionSupervisor {
    pub fn new(
        session: Arc<RconSession>,
        bus: Arc<EventBus>,
        min_retry_interval: Duration,
        reconnect_interval: Duration,
    ) -> Self {
        ConnectionSupervisor {
            session,
            bus,
            min_retry_interval,
            reconnect_interval,
            last_attempt_at: Mutex::new(None),
            disconnect_notified: Mutex::new(false),
        }
    }

    /// Connects unless already connected or attempted too recently. The
    /// check-and-update of the attempt timestamp is atomic under its lock,
    /// so near-simultaneous triggers cannot both pass the interval check.
    pub async fn try_connect(&self) -> Result<(), SessionError> {
        if self.session.connected() {
            return Ok(());
        }

        {
            let mut last_attempt = self.last_attempt_at.lock().await;
            let now = Instant::now();
            if let Some(last) = *last_attempt {
                if now.duration_since(last) < self.min_retry_interval {
                    debug!("connect attempt skipped, tried too recently");
                    return Ok(());
                }
            }
            *last_attempt = Some(now);
        }

        match self.session.connect_to_server().await {
            Ok(()) => {
                self.mark_connected().await;
                Ok(())
            }
            Err(err) => {
                self.notify_disconnected_once().await;
                Err(err)
            }
        }
    }

    /// Manual reconnect: tears the session down first and connects without
    /// the interval guard.
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        self.session.disconnect().await;
        match self.session.connect_to_server().await {
            Ok(()) => {
                self.mark_connected().await;
                Ok(())
            }
            Err(err) => {
                self.notify_disconnected_once().await;
                Err(err)
            }
        }
    }

    async fn mark_connected(&self) {
        {
            let mut notified = self.disconnect_notified.lock().await;
            *notified = false;
        }
        self.bus.notify(BridgeEvent::Connected).await;
    }

    /// Emits the disconnected event unless one is already outstanding for
    /// this disconnected period. Command paths that force a disconnect call
    /// this too, so a flapping server produces a single alert.
    pub async fn notify_disconnected_once(&self) {
        {
            let mut notified = self.disconnect_notified.lock().await;
            if *notified {
                debug!("disconnect already notified, suppressing");
                return;
            }
            *notified = true;
        }
        warn!("game server connection lost");
        self.bus.notify(BridgeEvent::Disconnected).await;
    }

    /// Periodic reconnect loop, running until shutdown.
    pub fn spawn_reconnect_loop(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        spawn_supervised(
            "reconnect",
            self.reconnect_interval,
            shutdown,
            move || {
                let supervisor = Arc::clone(&supervisor);
                async move { supervisor.try_connect().await }
            },
        )
    }
}
