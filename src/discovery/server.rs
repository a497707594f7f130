use crate::discovery::registry::Registry;
use crate::error::{DiscoveryError, RingletError};
use crate::network::messages::{Header, Message, MessageBody, Status};
use crate::network::transport::thread::ConnectionHandler;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Handles registration, membership notifications and random-peer requests.
pub struct DiscoveryProcessor {
    header: Header,
    registry: Mutex<Registry>,
}

impl DiscoveryProcessor {
    pub fn new(header: Header) -> Self {
        Self {
            header,
            registry: Mutex::new(Registry::new()),
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub async fn registry(&self) -> tokio::sync::MutexGuard<'_, Registry> {
        self.registry.lock().await
    }

    fn reply(&self, body: MessageBody) -> Option<Message> {
        Some(Message::new(self.header.clone(), body))
    }

    pub async fn process(&self, message: Message) -> Result<Option<Message>, DiscoveryError> {
        let sender = message.header.hostname;
        match message.body {
            MessageBody::RegisterPeerRequest { peer } => {
                info!(candidate = ?peer, "registration requested");
                let registry = self.registry.lock().await;
                let (accepted, contact) = if registry.is_empty() {
                    info!(candidate = ?peer, "first peer to join the ring");
                    (true, peer)
                } else if registry.contains_id(peer.id) {
                    warn!(id = %peer.id, "id collision");
                    (false, peer)
                } else {
                    let contact = registry.random(&mut rand::rng()).unwrap_or(peer);
                    (true, contact)
                };
                Ok(self.reply(MessageBody::RegisterPeerResponse { accepted, contact }))
            }
            MessageBody::NetworkJoinNotification { peer } => {
                if self.registry.lock().await.insert(peer.clone()) {
                    info!(peer = ?peer, "now tracking peer");
                } else {
                    error!(peer = ?peer, "unable to track peer, id already taken");
                }
                Ok(None)
            }
            MessageBody::NetworkExitNotification { peer } => {
                if self.registry.lock().await.remove(&peer) {
                    info!(peer = ?peer, "peer left the ring");
                } else {
                    error!(peer = ?peer, "unknown peer cannot be removed");
                }
                Ok(None)
            }
            MessageBody::GetRandomPeerRequest => {
                info!(%sender, "random peer requested");
                let picked = self.registry.lock().await.random(&mut rand::rng());
                Ok(match picked {
                    Some(peer) => self.reply(MessageBody::GetRandomPeerResponse { peer }),
                    None => self.reply(MessageBody::StatusResponse {
                        status: Status::Error,
                    }),
                })
            }
            other => Err(DiscoveryError::UnsupportedRequest(other.kind().to_string())),
        }
    }
}

#[async_trait]
impl ConnectionHandler for DiscoveryProcessor {
    async fn handle(&self, message: Message) -> Result<Option<Message>, RingletError> {
        Ok(self.process(message).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::types::{Identifier, RingId};

    fn processor() -> DiscoveryProcessor {
        DiscoveryProcessor::new(Header::new("discovery:9000", "127.0.0.1"))
    }

    fn from_peer(body: MessageBody) -> Message {
        Message::new(Header::new("peer", "127.0.0.1"), body)
    }

    fn peer(host: &str, id: u16) -> Identifier {
        Identifier::new(host, RingId::new(id))
    }

    async fn register(processor: &DiscoveryProcessor, candidate: Identifier) -> (bool, Identifier) {
        let reply = processor
            .process(from_peer(MessageBody::RegisterPeerRequest { peer: candidate }))
            .await
            .unwrap()
            .unwrap();
        match reply.body {
            MessageBody::RegisterPeerResponse { accepted, contact } => (accepted, contact),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_registration_gets_itself_back() {
        let processor = processor();
        assert_eq!(
            register(&processor, peer("a", 1)).await,
            (true, peer("a", 1))
        );
        // registering does not track the peer until it announces its join
        assert!(processor.registry().await.is_empty());
    }

    #[tokio::test]
    async fn test_later_registration_gets_a_member() {
        let processor = processor();
        processor
            .process(from_peer(MessageBody::NetworkJoinNotification { peer: peer("a", 1) }))
            .await
            .unwrap();
        assert_eq!(
            register(&processor, peer("b", 2)).await,
            (true, peer("a", 1))
        );
    }

    #[tokio::test]
    async fn test_collision_is_refused() {
        let processor = processor();
        processor
            .process(from_peer(MessageBody::NetworkJoinNotification { peer: peer("a", 1) }))
            .await
            .unwrap();
        assert_eq!(
            register(&processor, peer("b", 1)).await,
            (false, peer("b", 1))
        );
    }

    #[tokio::test]
    async fn test_exit_removes_member() {
        let processor = processor();
        for body in [
            MessageBody::NetworkJoinNotification { peer: peer("a", 1) },
            MessageBody::NetworkJoinNotification { peer: peer("b", 2) },
            MessageBody::NetworkExitNotification { peer: peer("a", 1) },
        ] {
            assert!(processor.process(from_peer(body)).await.unwrap().is_none());
        }
        assert_eq!(processor.registry().await.peers(), vec![peer("b", 2)]);
    }

    #[tokio::test]
    async fn test_random_peer_on_empty_registry_is_an_error_status() {
        let processor = processor();
        let reply = processor
            .process(from_peer(MessageBody::GetRandomPeerRequest))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            reply.body,
            MessageBody::StatusResponse {
                status: Status::Error
            }
        );

        processor
            .process(from_peer(MessageBody::NetworkJoinNotification { peer: peer("a", 1) }))
            .await
            .unwrap();
        let reply = processor
            .process(from_peer(MessageBody::GetRandomPeerRequest))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            reply.body,
            MessageBody::GetRandomPeerResponse { peer: peer("a", 1) }
        );
    }

    #[tokio::test]
    async fn test_peer_messages_are_unsupported() {
        let err = processor()
            .process(from_peer(MessageBody::GetSuccessorRequest))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::UnsupportedRequest(_)));
    }
}
