//! Challenge-response RCON client for GoldSrc/HLDS game servers.

pub mod error;
pub mod packet;
pub mod session;
pub mod transport;

pub use error::{RconError, SessionError};
pub use session::RconSession;
pub use transport::{RconTransport, TransportConfig};
