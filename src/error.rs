use thiserror::Error;

#[derive(Error, Debug)]
pub enum RingletError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Chord protocol error: {0}")]
    Chord(#[from] ChordError),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ChordError {
    #[error("Ring id {0} is already taken by another peer")]
    IdCollision(String),

    #[error("Invalid node ID: {0}")]
    InvalidNodeId(String),

    #[error("Failed to join ring: {0}")]
    JoinFailed(String),

    #[error("Request for {target} exceeded {limit} forwarding hops")]
    HopLimitExceeded { target: String, limit: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Unknown message tag {0}")]
    UnknownTag(u32),

    #[error("Message truncated: needed {needed} more bytes")]
    Truncated { needed: usize },

    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Message exceeds {0} bytes")]
    TooLarge(usize),
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("No peers registered with the discovery node")]
    NoPeers,

    #[error("Unsupported request: {0}")]
    UnsupportedRequest(String),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Message(#[from] MessageError),
}
