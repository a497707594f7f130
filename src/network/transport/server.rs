use crate::chord::peer::Peer;
use crate::chord::routing::{self, Route};
use crate::chord::types::{Identifier, RingId, StoredItem};
use crate::chord::PEER_PORT;
use crate::error::{ChordError, RingletError};
use crate::network::messages::{Message, MessageBody, Status};
use crate::network::transport::client::{self, PeerClient};
use crate::network::transport::resolve_addr;
use crate::network::transport::thread::ConnectionHandler;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Handles every request a peer receives.
///
/// The peer's state lock is only held while reading or updating state, never while a request is
/// forwarded, since a forwarded request may come back to this same peer.
pub struct PeerProcessor {
    peer: Arc<Peer>,
    client: PeerClient,
}

impl PeerProcessor {
    pub fn new(peer: Arc<Peer>, client: PeerClient) -> Self {
        Self { peer, client }
    }

    fn reply(&self, body: MessageBody) -> Option<Message> {
        Some(Message::new(self.client.header().clone(), body))
    }

    fn status_ok(&self) -> Option<Message> {
        self.reply(MessageBody::StatusResponse { status: Status::Ok })
    }

    pub async fn process(&self, message: Message) -> Result<Option<Message>, ChordError> {
        match message.body {
            MessageBody::GetPredecessorRequest => {
                let peer = self.peer.predecessor().await;
                Ok(self.reply(MessageBody::PeerIdentifierResponse { peer }))
            }
            MessageBody::GetSuccessorRequest => {
                let peer = self.peer.successor().await;
                Ok(self.reply(MessageBody::PeerIdentifierResponse { peer }))
            }
            MessageBody::FindSuccessorRequest {
                target,
                requester,
                hops,
            } => self.process_find_successor(target, requester, hops).await,
            MessageBody::PredecessorNotification { peer } => {
                {
                    let mut state = self.peer.state().await;
                    state.finger_table.update_with_successor(&peer);
                    state.set_predecessor(peer.clone());
                }
                info!(predecessor = ?peer, "updated predecessor");
                Ok(self.status_ok())
            }
            MessageBody::SuccessorNotification { peer } => {
                self.peer.state().await.set_successor(peer.clone());
                info!(successor = ?peer, "updated successor");
                Ok(self.status_ok())
            }
            MessageBody::NetworkJoinNotification { ref peer } => {
                self.process_join_notification(peer, &message).await?;
                Ok(None)
            }
            MessageBody::LookupRequest { file_key, hops } => {
                self.process_lookup(file_key, hops).await
            }
            MessageBody::StoreFileRequest { key, name, bytes } => {
                self.peer
                    .store_item(StoredItem {
                        key,
                        name: name.clone(),
                        bytes,
                    })
                    .await;
                Ok(self.reply(MessageBody::StoreFileResponse { key, name }))
            }
            MessageBody::MoveFileRequest { key, name, bytes } => {
                self.peer
                    .store_item(StoredItem {
                        key,
                        name: name.clone(),
                        bytes,
                    })
                    .await;
                Ok(self.reply(MessageBody::MoveFileResponse { key, name }))
            }
            other => Err(ChordError::InvalidRequest(format!(
                "peers do not handle {}",
                other.kind()
            ))),
        }
    }

    async fn process_find_successor(
        &self,
        target: RingId,
        requester: Identifier,
        hops: u32,
    ) -> Result<Option<Message>, ChordError> {
        let route = {
            let state = self.peer.state().await;
            routing::find_successor(&state.finger_table, target)
        };
        match route {
            Route::Answer(peer) => {
                info!(%target, successor = ?peer, "answering successor search");
                Ok(self.reply(MessageBody::PeerIdentifierResponse { peer }))
            }
            Route::Forward(next) => {
                self.check_hops(target, hops)?;
                info!(%target, next = ?next, hops, "forwarding successor search");
                let forwarded = MessageBody::FindSuccessorRequest {
                    target,
                    requester,
                    hops: hops + 1,
                };
                self.forward(&next, forwarded).await
            }
        }
    }

    async fn process_lookup(
        &self,
        file_key: RingId,
        hops: u32,
    ) -> Result<Option<Message>, ChordError> {
        let route = {
            let state = self.peer.state().await;
            routing::lookup(&state.finger_table, &state.predecessor, file_key)
        };
        match route {
            Route::Answer(peer) => {
                info!(key = %file_key, owner = ?peer, "answering lookup");
                Ok(self.reply(MessageBody::LookupResponse { peer }))
            }
            Route::Forward(next) => {
                self.check_hops(file_key, hops)?;
                info!(key = %file_key, next = ?next, hops, "forwarding lookup");
                let forwarded = MessageBody::LookupRequest {
                    file_key,
                    hops: hops + 1,
                };
                self.forward(&next, forwarded).await
            }
        }
    }

    // Tightens our table with the newcomer and passes the notification on to our successor. The
    // flood stops once it would reach the newcomer or come back to us. No set of already-seen
    // ids is kept, so two floods for the same newcomer both run their full lap.
    async fn process_join_notification(
        &self,
        joined: &Identifier,
        message: &Message,
    ) -> Result<(), ChordError> {
        if joined == self.peer.identifier() {
            return Ok(());
        }
        let successor = {
            let mut state = self.peer.state().await;
            state.finger_table.update_with_successor(joined);
            state.successor.clone()
        };
        if successor == *joined || successor == *self.peer.identifier() {
            return Ok(());
        }
        info!(joined = ?joined, next = ?successor, "passing join notification on");
        let addr = resolve_addr(&successor.hostname, PEER_PORT);
        client::notify(&addr, &message.resent_by(self.client.header())).await?;
        Ok(())
    }

    fn check_hops(&self, target: RingId, hops: u32) -> Result<(), ChordError> {
        let limit = self.peer.max_hops();
        if hops as usize >= limit {
            warn!(%target, hops, limit, "request exceeded the hop ceiling");
            return Err(ChordError::HopLimitExceeded {
                target: target.to_hex(),
                limit,
            });
        }
        Ok(())
    }

    /// Sends the request on under our own header and relays whatever comes back unchanged.
    async fn forward(
        &self,
        next: &Identifier,
        body: MessageBody,
    ) -> Result<Option<Message>, ChordError> {
        let addr = resolve_addr(&next.hostname, PEER_PORT);
        let request = Message::new(self.client.header().clone(), body);
        let reply = client::request(&addr, &request).await?;
        Ok(Some(reply))
    }
}

#[async_trait]
impl ConnectionHandler for PeerProcessor {
    async fn handle(&self, message: Message) -> Result<Option<Message>, RingletError> {
        Ok(self.process(message).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::FINGER_TABLE_SIZE;
    use crate::network::messages::Header;
    use tracing::Span;

    fn id(hostname: &str, value: u16) -> Identifier {
        Identifier::new(hostname, RingId::new(value))
    }

    fn processor(identifier: Identifier, max_hops: usize) -> PeerProcessor {
        let header = Header::new(identifier.hostname.clone(), "127.0.0.1");
        let peer = Arc::new(Peer::new(identifier, FINGER_TABLE_SIZE, max_hops, Span::none()));
        PeerProcessor::new(peer, PeerClient::new(header))
    }

    fn request(body: MessageBody) -> Message {
        Message::new(Header::new("tester", "127.0.0.1"), body)
    }

    #[tokio::test]
    async fn test_lone_peer_answers_everything_itself() {
        let me = id("127.0.0.1:1", 0x4000);
        let processor = processor(me.clone(), 16);

        let reply = processor
            .process(request(MessageBody::FindSuccessorRequest {
                target: RingId::new(0x9999),
                requester: id("other", 1),
                hops: 0,
            }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.body, MessageBody::PeerIdentifierResponse { peer: me.clone() });
        assert_eq!(reply.header.hostname, "127.0.0.1:1");

        let reply = processor
            .process(request(MessageBody::LookupRequest {
                file_key: RingId::new(0x0001),
                hops: 0,
            }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.body, MessageBody::LookupResponse { peer: me });
    }

    #[tokio::test]
    async fn test_notifications_update_neighbours() {
        let me = id("127.0.0.1:1", 0x4000);
        let processor = processor(me, 16);

        let reply = processor
            .process(request(MessageBody::PredecessorNotification {
                peer: id("p", 0x1000),
            }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.body, MessageBody::StatusResponse { status: Status::Ok });

        processor
            .process(request(MessageBody::SuccessorNotification {
                peer: id("s", 0x8000),
            }))
            .await
            .unwrap();

        let predecessor = processor
            .process(request(MessageBody::GetPredecessorRequest))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            predecessor.body,
            MessageBody::PeerIdentifierResponse { peer: id("p", 0x1000) }
        );
        let successor = processor
            .process(request(MessageBody::GetSuccessorRequest))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            successor.body,
            MessageBody::PeerIdentifierResponse { peer: id("s", 0x8000) }
        );
        assert_eq!(processor.peer.finger_table().await.entries()[0], id("s", 0x8000));
    }

    #[tokio::test]
    async fn test_hop_ceiling_fails_request() {
        let me = id("127.0.0.1:1", 0x0000);
        let processor = processor(me, 4);
        // a far finger that is not our first one forces a forward
        processor.peer.update_finger_table(&id("127.0.0.1:2", 0x0100)).await;
        processor.peer.update_finger_table(&id("127.0.0.1:3", 0x8000)).await;

        let err = processor
            .process(request(MessageBody::FindSuccessorRequest {
                target: RingId::new(0x9000),
                requester: id("origin", 0x7777),
                hops: 4,
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ChordError::HopLimitExceeded { limit: 4, .. }));
    }

    #[tokio::test]
    async fn test_own_join_notification_is_ignored() {
        let me = id("127.0.0.1:1", 0x0000);
        let processor = processor(me.clone(), 16);
        let reply = processor
            .process(request(MessageBody::NetworkJoinNotification { peer: me }))
            .await
            .unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_join_notification_stops_at_newcomer() {
        let me = id("127.0.0.1:1", 0x0000);
        let processor = processor(me, 16);
        let newcomer = id("127.0.0.1:2", 0x2000);
        processor
            .peer
            .state()
            .await
            .set_successor(newcomer.clone());

        let reply = processor
            .process(request(MessageBody::NetworkJoinNotification {
                peer: newcomer.clone(),
            }))
            .await
            .unwrap();
        assert!(reply.is_none());
        assert_eq!(processor.peer.finger_table().await.entries()[0], newcomer);
    }

    #[tokio::test]
    async fn test_join_notification_stops_when_lap_returns() {
        // alone, our successor is ourselves, so the flood ends here without a send
        let me = id("127.0.0.1:1", 0x0000);
        let processor = processor(me, 16);
        let newcomer = id("127.0.0.1:2", 0x4000);

        let reply = processor
            .process(request(MessageBody::NetworkJoinNotification {
                peer: newcomer.clone(),
            }))
            .await
            .unwrap();
        assert!(reply.is_none());
        assert_eq!(processor.peer.finger_table().await.entries()[0], newcomer);
    }

    #[tokio::test]
    async fn test_store_and_move_keep_items() {
        let processor = processor(id("127.0.0.1:1", 0x0000), 16);
        let reply = processor
            .process(request(MessageBody::StoreFileRequest {
                key: RingId::new(0xfff0),
                name: "a.txt".into(),
                bytes: b"abc".to_vec(),
            }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            reply.body,
            MessageBody::StoreFileResponse {
                key: RingId::new(0xfff0),
                name: "a.txt".into()
            }
        );

        let reply = processor
            .process(request(MessageBody::MoveFileRequest {
                key: RingId::new(0x0010),
                name: "b.txt".into(),
                bytes: Vec::new(),
            }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.kind(), crate::network::messages::MessageKind::MoveFileResponse);
        assert_eq!(processor.peer.snapshot().await.stored_items.len(), 2);
    }

    #[tokio::test]
    async fn test_bootstrap_messages_are_rejected() {
        let processor = processor(id("127.0.0.1:1", 0x0000), 16);
        let err = processor
            .process(request(MessageBody::GetRandomPeerRequest))
            .await
            .unwrap_err();
        assert!(matches!(err, ChordError::InvalidRequest(_)));
    }
}
