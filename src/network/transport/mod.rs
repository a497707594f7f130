//! One-request-per-connection TCP transport shared by peers, the discovery node and uploaders.
//!
//! The sender writes a single encoded message and shuts down its write half; the receiver reads
//! to EOF, answers with at most one message and closes.

pub mod client;
pub mod server;
pub mod thread;

use crate::chord::types::RingId;
use crate::chord::{DISCOVERY_PORT, FINGER_TABLE_SIZE, MAX_FORWARD_HOPS, PEER_PORT};
use crate::error::{MessageError, NetworkError};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest message either side will read off a connection.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct PeerConfig {
    pub id: RingId,
    /// Host name other peers use to reach us. The bound port is appended to it.
    pub host: String,
    /// Port to listen on; 0 picks a free one.
    pub port: u16,
    pub discovery_addr: String,
    pub max_hops: usize,
    pub finger_table_size: usize,
}

impl PeerConfig {
    pub fn new(id: RingId, discovery_addr: impl Into<String>) -> Self {
        Self {
            id,
            host: "127.0.0.1".to_string(),
            port: PEER_PORT,
            discovery_addr: discovery_addr.into(),
            max_hops: MAX_FORWARD_HOPS,
            finger_table_size: FINGER_TABLE_SIZE,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    pub host: String,
    pub port: u16,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DISCOVERY_PORT,
        }
    }
}

/// Turns an advertised hostname into something `TcpStream::connect` accepts, appending
/// `default_port` when the name carries none.
pub fn resolve_addr(hostname: &str, default_port: u16) -> String {
    match hostname.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            hostname.to_string()
        }
        _ => format!("{}:{}", hostname, default_port),
    }
}

/// Reads everything the other side sends before closing its write half.
pub(crate) async fn read_message<R>(reader: &mut R) -> Result<Vec<u8>, NetworkError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader
        .take(MAX_MESSAGE_BYTES as u64 + 1)
        .read_to_end(&mut buf)
        .await?;
    if buf.len() > MAX_MESSAGE_BYTES {
        return Err(MessageError::TooLarge(MAX_MESSAGE_BYTES).into());
    }
    Ok(buf)
}
