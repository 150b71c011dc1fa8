use std::error::Error;
use std::fmt;

/// Errors produced by the UDP transport layer.
#[derive(Debug)]
pub enum RconError {
    /// The server answered a command with its literal bad-password reply.
    BadPassword,
    /// The server did not answer within the timeout.
    ServerOffline(String),
    /// The socket failed or the reply could not be understood.
    BadConnection(String),
}

impl fmt::Display for RconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RconError::BadPassword => write!(f, "rcon password rejected by server"),
            RconError::ServerOffline(detail) => write!(f, "server offline: {}", detail),
            RconError::BadConnection(detail) => write!(f, "rcon connection failed: {}", detail),
        }
    }
}

impl Error for RconError {}

impl From<std::io::Error> for RconError {
    fn from(err: std::io::Error) -> Self {
        RconError::BadConnection(err.to_string())
    }
}

/// Errors produced by the session layer wrapping the transport.
#[derive(Debug)]
pub enum SessionError {
    /// Connecting or validating the password failed.
    Connection(RconError),
    /// A command failed on an established session; the session is torn down.
    Command { command: String, source: RconError },
    /// The status poll failed; the session is torn down.
    Status(RconError),
    /// A command was issued without an established session.
    NotConnected,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Connection(source) => write!(f, "connect failed: {}", source),
            SessionError::Command { command, source } => {
                write!(f, "command '{}' failed: {}", command, source)
            }
            SessionError::Status(source) => write!(f, "status poll failed: {}", source),
            SessionError::NotConnected => write!(f, "not connected to server"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::Connection(source) => Some(source),
            SessionError::Command { source, .. } => Some(source),
            SessionError::Status(source) => Some(source),
            SessionError::NotConnected => None,
        }
    }
}
