//! Serialized command surface over one RCON transport.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use tokio::sync::Mutex;

use crate::error::SessionError;
use crate::transport::{RconTransport, TransportConfig};

/// Server-side plugin command returning the live status snapshot.
pub const STATUS_COMMAND: &str = "ultrahc_ds_get_info";

/// One logical game-server connection. All operations serialize on an
/// exclusive lock so challenge/response pairs never interleave on the
/// shared socket; the lock is held for the full round trip.
pub struct RconSession {
    config: TransportConfig,
    transport: Mutex<Option<RconTransport>>,
    connected: AtomicBool,
}

impl RconSession {
    pub fn new(config: TransportConfig) -> Self {
        RconSession {
            config,
            transport: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Lock-free view of the connection state. True only while a live
    /// transport is held.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Replaces any stale transport with a freshly validated one.
    pub async fn connect_to_server(&self) -> Result<(), SessionError> {
        let mut slot = self.transport.lock().await;
        *slot = None;
        self.connected.store(false, Ordering::SeqCst);

        match RconTransport::connect(&self.config, true).await {
            Ok(transport) => {
                *slot = Some(transport);
                self.connected.store(true, Ordering::SeqCst);
                info!("connected to game server at {}", self.server_address());
                Ok(())
            }
            Err(err) => Err(SessionError::Connection(err)),
        }
    }

    /// Runs one command on the live transport. Any transport failure tears
    /// the session down; the caller must reconnect.
    pub async fn exec(&self, command: &str) -> Result<String, SessionError> {
        let mut slot = self.transport.lock().await;
        let transport = slot.as_ref().ok_or(SessionError::NotConnected)?;
        match transport.execute(command).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                *slot = None;
                self.connected.store(false, Ordering::SeqCst);
                Err(SessionError::Command {
                    command: command.to_string(),
                    source: err,
                })
            }
        }
    }

    /// Polls the server status plugin command.
    pub async fn fetch_status(&self) -> Result<String, SessionError> {
        self.exec(STATUS_COMMAND).await.map_err(|err| match err {
            SessionError::Command { source, .. } => SessionError::Status(source),
            other => other,
        })
    }

    /// Drops the transport. Safe to call at any time, in any state.
    pub async fn disconnect(&self) {
        let mut slot = self.transport.lock().await;
        if slot.is_some() {
            debug!("rcon session to {} closed", self.server_address());
        }
        *slot = None;
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> RconSession {
        RconSession::new(TransportConfig::new("127.0.0.1", 27015, "secret"))
    }

    #[test]
    fn test_starts_disconnected() {
        assert!(!session().connected());
    }

    #[tokio::test]
    async fn test_exec_without_transport_is_not_connected() {
        let session = session();
        match session.exec("status").await {
            Err(SessionError::NotConnected) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_status_without_transport_is_not_connected() {
        let session = session();
        match session.fetch_status().await {
            Err(SessionError::NotConnected) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let session = session();
        session.disconnect().await;
        session.disconnect().await;
        assert!(!session.connected());
    }
}
