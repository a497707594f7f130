use crate::chord::peer::{Registration, Rendezvous};
use crate::chord::types::Identifier;
use crate::chord::DISCOVERY_PORT;
use crate::error::{DiscoveryError, MessageError};
use crate::network::messages::{Header, Message, MessageBody, Status};
use crate::network::transport::client;
use crate::network::transport::resolve_addr;
use async_trait::async_trait;

/// Talks to a remote discovery node on behalf of a peer or an uploader.
#[derive(Clone, Debug)]
pub struct DiscoveryClient {
    addr: String,
    header: Header,
}

impl DiscoveryClient {
    pub fn new(addr: &str, header: Header) -> Self {
        Self {
            addr: resolve_addr(addr, DISCOVERY_PORT),
            header,
        }
    }

    fn message(&self, body: MessageBody) -> Message {
        Message::new(self.header.clone(), body)
    }
}

#[async_trait]
impl Rendezvous for DiscoveryClient {
    async fn register(&self, candidate: &Identifier) -> Result<Registration, DiscoveryError> {
        let request = self.message(MessageBody::RegisterPeerRequest {
            peer: candidate.clone(),
        });
        let reply = client::request(&self.addr, &request).await?;
        match reply.body {
            MessageBody::RegisterPeerResponse { accepted, contact } => {
                Ok(Registration { accepted, contact })
            }
            _ => Err(MessageError::UnexpectedResponse {
                expected: "RegisterPeerResponse",
                actual: reply.kind().name(),
            }
            .into()),
        }
    }

    async fn random_peer(&self) -> Result<Identifier, DiscoveryError> {
        let reply = client::request(&self.addr, &self.message(MessageBody::GetRandomPeerRequest))
            .await?;
        match reply.body {
            MessageBody::GetRandomPeerResponse { peer } => Ok(peer),
            MessageBody::StatusResponse {
                status: Status::Error,
            } => Err(DiscoveryError::NoPeers),
            _ => Err(MessageError::UnexpectedResponse {
                expected: "GetRandomPeerResponse",
                actual: reply.kind().name(),
            }
            .into()),
        }
    }

    async fn announce_join(&self, peer: &Identifier) -> Result<(), DiscoveryError> {
        let notification = self.message(MessageBody::NetworkJoinNotification { peer: peer.clone() });
        client::notify(&self.addr, &notification).await?;
        Ok(())
    }

    async fn announce_exit(&self, peer: &Identifier) -> Result<(), DiscoveryError> {
        let notification = self.message(MessageBody::NetworkExitNotification { peer: peer.clone() });
        client::notify(&self.addr, &notification).await?;
        Ok(())
    }
}
