//! UDP transport speaking the challenge-response RCON dialect.

use std::time::Duration;

use log::debug;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::error::RconError;
use crate::packet;

/// Reply the engine sends verbatim when the rcon password is wrong.
const BAD_PASSWORD_REPLY: &str = "Bad rcon_password.";

/// Address, credential and timeout settings for one game server.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Wait for the first reply packet.
    pub timeout: Duration,
    /// Wait for follow-up packets of a multi-datagram reply.
    pub burst_timeout: Duration,
}

impl TransportConfig {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        TransportConfig {
            host: host.into(),
            port,
            password: password.into(),
            timeout: Duration::from_secs(6),
            burst_timeout: Duration::from_millis(80),
        }
    }
}

/// One UDP socket bound to one game server. The socket is disposable:
/// any failure invalidates the transport and the owner must reconnect.
#[derive(Debug)]
pub struct RconTransport {
    socket: UdpSocket,
    password: String,
    timeout: Duration,
    burst_timeout: Duration,
}

impl RconTransport {
    /// Opens a socket to the server. With `validate_password` set, issues a
    /// harmless diagnostic command and rejects the literal bad-password reply.
    pub async fn connect(
        config: &TransportConfig,
        validate_password: bool,
    ) -> Result<Self, RconError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect((config.host.as_str(), config.port)).await?;
        let transport = RconTransport {
            socket,
            password: config.password.clone(),
            timeout: config.timeout,
            burst_timeout: config.burst_timeout,
        };
        if validate_password {
            let reply = transport.execute("stats").await?;
            if reply == BAD_PASSWORD_REPLY {
                return Err(RconError::BadPassword);
            }
        }
        Ok(transport)
    }

    /// Requests a fresh challenge token from the server.
    pub async fn get_challenge(&self) -> Result<String, RconError> {
        self.socket.send(&packet::build_challenge_request()).await?;
        let datagram = self.recv_datagram().await?;
        packet::parse_challenge(&datagram).ok_or_else(|| {
            RconError::ServerOffline("challenge reply carried no token".to_string())
        })
    }

    /// Runs one command: fresh challenge, send, then receive the reply.
    /// Long replies arrive as several datagrams with no length framing, so
    /// after the first packet the socket is drained on a short burst window
    /// and the decoded pieces are joined with newlines.
    pub async fn execute(&self, command: &str) -> Result<String, RconError> {
        let challenge = self.get_challenge().await?;
        let request = packet::build_command(&challenge, &self.password, command);
        self.socket.send(&request).await?;

        let first = self.recv_datagram().await?;
        let mut pieces = vec![Self::decode_reply(&first)?];

        let mut buf = vec![0u8; packet::MAX_PACKET_SIZE];
        loop {
            match timeout(self.burst_timeout, self.socket.recv(&mut buf)).await {
                Ok(Ok(len)) => pieces.push(Self::decode_reply(&buf[..len])?),
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => break,
            }
        }

        let reply = pieces.join("\n");
        debug!("rcon '{}' replied with {} bytes", command, reply.len());
        Ok(reply)
    }

    fn decode_reply(datagram: &[u8]) -> Result<String, RconError> {
        packet::parse_command_reply(datagram)
            .ok_or_else(|| RconError::BadConnection("reply missing packet prefix".to_string()))
    }

    async fn recv_datagram(&self) -> Result<Vec<u8>, RconError> {
        let mut buf = vec![0u8; packet::MAX_PACKET_SIZE];
        match timeout(self.timeout, self.socket.recv(&mut buf)).await {
            Ok(Ok(len)) => {
                buf.truncate(len);
                Ok(buf)
            }
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(RconError::ServerOffline(
                "no reply within timeout".to_string(),
            )),
        }
    }
}
