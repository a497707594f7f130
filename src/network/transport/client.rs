use crate::chord::peer::RingTransport;
use crate::chord::types::{Identifier, RingId};
use crate::chord::PEER_PORT;
use crate::error::{MessageError, NetworkError};
use crate::network::messages::{Header, Message, MessageBody, Status};
use crate::network::transport::{read_message, resolve_addr};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

/// Sends `message` to `addr` on a fresh connection and waits for the reply, if any.
///
/// `Ok(None)` means the other side closed without answering, which is how notifications end.
pub async fn round_trip(addr: &str, message: &Message) -> Result<Option<Message>, NetworkError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| NetworkError::ConnectionFailed(format!("{}: {}", addr, e)))?;
    debug!(to = addr, kind = %message.kind(), "sending message");

    stream
        .write_all(&message.encode())
        .await
        .map_err(|e| NetworkError::PeerUnreachable(format!("{}: {}", addr, e)))?;
    stream.shutdown().await?;

    let bytes = read_message(&mut stream).await?;
    if bytes.is_empty() {
        return Ok(None);
    }
    let reply = Message::decode(&bytes)?;
    debug!(from = addr, kind = %reply.kind(), "received reply");
    Ok(Some(reply))
}

/// Like [`round_trip`] but a reply is mandatory.
pub async fn request(addr: &str, message: &Message) -> Result<Message, NetworkError> {
    round_trip(addr, message).await?.ok_or_else(|| {
        NetworkError::Server(format!(
            "{} closed the connection without answering {}",
            addr,
            message.kind()
        ))
    })
}

/// Sends a notification. Any reply is read and dropped.
pub async fn notify(addr: &str, message: &Message) -> Result<(), NetworkError> {
    round_trip(addr, message).await.map(|_| ())
}

fn unexpected(expected: &'static str, reply: &Message) -> NetworkError {
    MessageError::UnexpectedResponse {
        expected,
        actual: reply.kind().name(),
    }
    .into()
}

/// Outbound calls a peer makes to other peers. Every call opens its own connection.
#[derive(Clone, Debug)]
pub struct PeerClient {
    header: Header,
}

impl PeerClient {
    pub fn new(header: Header) -> Self {
        Self { header }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    fn message(&self, body: MessageBody) -> Message {
        Message::new(self.header.clone(), body)
    }

    async fn expect_peer(&self, peer: &Identifier, body: MessageBody) -> Result<Identifier, NetworkError> {
        let addr = resolve_addr(&peer.hostname, PEER_PORT);
        let reply = request(&addr, &self.message(body)).await?;
        match reply.body {
            MessageBody::PeerIdentifierResponse { peer } => Ok(peer),
            _ => Err(unexpected("PeerIdentifierResponse", &reply)),
        }
    }

    async fn expect_ok(&self, peer: &Identifier, body: MessageBody) -> Result<(), NetworkError> {
        let addr = resolve_addr(&peer.hostname, PEER_PORT);
        let reply = request(&addr, &self.message(body)).await?;
        match reply.body {
            MessageBody::StatusResponse { status: Status::Ok } => Ok(()),
            MessageBody::StatusResponse { status } => Err(NetworkError::Server(format!(
                "{} answered with status {:?}",
                addr, status
            ))),
            _ => Err(unexpected("StatusResponse", &reply)),
        }
    }

    pub async fn get_successor(&self, peer: &Identifier) -> Result<Identifier, NetworkError> {
        self.expect_peer(peer, MessageBody::GetSuccessorRequest).await
    }

    /// Asks `via` which peer holds `file_key`.
    pub async fn lookup(&self, via: &Identifier, file_key: RingId) -> Result<Identifier, NetworkError> {
        let addr = resolve_addr(&via.hostname, PEER_PORT);
        let reply = request(
            &addr,
            &self.message(MessageBody::LookupRequest { file_key, hops: 0 }),
        )
        .await?;
        match reply.body {
            MessageBody::LookupResponse { peer } => Ok(peer),
            _ => Err(unexpected("LookupResponse", &reply)),
        }
    }

    pub async fn store_file(
        &self,
        owner: &Identifier,
        key: RingId,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), NetworkError> {
        let addr = resolve_addr(&owner.hostname, PEER_PORT);
        let reply = request(
            &addr,
            &self.message(MessageBody::StoreFileRequest {
                key,
                name: name.to_string(),
                bytes,
            }),
        )
        .await?;
        match reply.body {
            MessageBody::StoreFileResponse { key: stored, .. } if stored == key => Ok(()),
            _ => Err(unexpected("StoreFileResponse", &reply)),
        }
    }
}

#[async_trait]
impl RingTransport for PeerClient {
    async fn find_successor(
        &self,
        via: &Identifier,
        target: RingId,
        requester: &Identifier,
    ) -> Result<Identifier, NetworkError> {
        self.expect_peer(
            via,
            MessageBody::FindSuccessorRequest {
                target,
                requester: requester.clone(),
                hops: 0,
            },
        )
        .await
    }

    async fn get_predecessor(&self, peer: &Identifier) -> Result<Identifier, NetworkError> {
        self.expect_peer(peer, MessageBody::GetPredecessorRequest).await
    }

    async fn notify_predecessor(
        &self,
        peer: &Identifier,
        new_predecessor: &Identifier,
    ) -> Result<(), NetworkError> {
        self.expect_ok(
            peer,
            MessageBody::PredecessorNotification {
                peer: new_predecessor.clone(),
            },
        )
        .await
    }

    async fn notify_successor(
        &self,
        peer: &Identifier,
        new_successor: &Identifier,
    ) -> Result<(), NetworkError> {
        self.expect_ok(
            peer,
            MessageBody::SuccessorNotification {
                peer: new_successor.clone(),
            },
        )
        .await
    }

    async fn announce_join(&self, peer: &Identifier, joined: &Identifier) -> Result<(), NetworkError> {
        let addr = resolve_addr(&peer.hostname, PEER_PORT);
        notify(
            &addr,
            &self.message(MessageBody::NetworkJoinNotification {
                peer: joined.clone(),
            }),
        )
        .await
    }
}
