use ringlet::chord::peer::RingTransport;
use ringlet::chord::types::{Identifier, RingId};
use ringlet::discovery::DiscoveryNode;
use ringlet::error::ChordError;
use ringlet::network::messages::Header;
use ringlet::network::node::ChordPeer;
use ringlet::network::transport::client::PeerClient;
use ringlet::network::transport::{DiscoveryConfig, PeerConfig};
use ringlet::upload::{file_key, Uploader};

async fn start_discovery() -> DiscoveryNode {
    let mut node = DiscoveryNode::new(DiscoveryConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
    })
    .await
    .unwrap();
    node.start_server().await.unwrap();
    node
}

fn peer_config(discovery: &DiscoveryNode, id: u16) -> PeerConfig {
    let mut config = PeerConfig::new(RingId::new(id), discovery.hostname());
    config.port = 0;
    config
}

async fn join_peer(discovery: &DiscoveryNode, id: u16) -> ChordPeer {
    let mut peer = ChordPeer::new(peer_config(discovery, id)).await.unwrap();
    peer.join().await.unwrap();
    peer
}

/// Joins the peers one after another, in the given order.
async fn ring(discovery: &DiscoveryNode, ids: &[u16]) -> Vec<ChordPeer> {
    let mut peers = Vec::new();
    for id in ids {
        peers.push(join_peer(discovery, *id).await);
    }
    peers
}

fn by_id(peers: &[ChordPeer], id: u16) -> &ChordPeer {
    peers.iter().find(|p| p.identifier().value() == id).unwrap()
}

fn tester() -> (PeerClient, Identifier) {
    (
        PeerClient::new(Header::new("tester", "127.0.0.1")),
        Identifier::new("127.0.0.1:1", RingId::new(0x0001)),
    )
}

#[tokio::test]
async fn three_peers_form_one_cycle() {
    let discovery = start_discovery().await;
    let peers = ring(&discovery, &[0x8000, 0x1000, 0xc000]).await;

    let expected = [(0x1000, 0x8000), (0x8000, 0xc000), (0xc000, 0x1000)];
    for (id, successor) in expected {
        let snapshot = by_id(&peers, id).snapshot().await;
        assert_eq!(snapshot.successor.value(), successor, "successor of {:#x}", id);
        assert_eq!(
            by_id(&peers, successor).snapshot().await.predecessor.value(),
            id,
            "predecessor of {:#x}",
            successor
        );
    }

    // walking GetSuccessorRequest from any peer visits every member once
    let (client, _) = tester();
    let start = by_id(&peers, 0x1000).identifier().clone();
    let mut visited = vec![start.value()];
    let mut current = client.get_successor(&start).await.unwrap();
    while current != start {
        visited.push(current.value());
        assert!(visited.len() <= peers.len(), "successor walk never closed");
        current = client.get_successor(&current).await.unwrap();
    }
    assert_eq!(visited, vec![0x1000, 0x8000, 0xc000]);

    let mut registered: Vec<u16> = discovery.peers().await.iter().map(Identifier::value).collect();
    registered.sort_unstable();
    assert_eq!(registered, vec![0x1000, 0x8000, 0xc000]);
}

#[tokio::test]
async fn find_successor_resolves_from_every_peer() {
    let discovery = start_discovery().await;
    let ids = [0x8000, 0x1000, 0xc000, 0x0100, 0x0101];
    let peers = ring(&discovery, &ids).await;
    let (client, outsider) = tester();
    let requesters: Vec<Identifier> = peers
        .iter()
        .map(|p| p.identifier().clone())
        .chain(std::iter::once(outsider))
        .collect();

    for via in &peers {
        for requester in &requesters {
            for id in ids {
                let found = client
                    .find_successor(via.identifier(), RingId::new(id), requester)
                    .await
                    .unwrap();
                assert_eq!(
                    found,
                    *by_id(&peers, id).identifier(),
                    "searching {:#x} from {:?} for {:?}",
                    id,
                    via.identifier(),
                    requester
                );
            }
        }
    }
}

#[tokio::test]
async fn member_requester_gets_true_owner() {
    let discovery = start_discovery().await;
    let peers = ring(&discovery, &[0x8000, 0x1000, 0xc000]).await;
    let (client, _) = tester();

    // 0x1000 routes a search for 0xc000 through 0x8000, which is also the requester
    let found = client
        .find_successor(
            by_id(&peers, 0x1000).identifier(),
            RingId::new(0xc000),
            by_id(&peers, 0x8000).identifier(),
        )
        .await
        .unwrap();
    assert_eq!(found.value(), 0xc000);
}

#[tokio::test]
async fn lookup_places_keys_on_their_successor() {
    let discovery = start_discovery().await;
    let peers = ring(&discovery, &[0x8000, 0x1000, 0xc000]).await;
    let (client, _) = tester();

    let cases = [
        (0x0500, 0x1000),
        (0x1000, 0x1000),
        (0x1001, 0x8000),
        (0x9000, 0xc000),
        (0xc001, 0x1000),
        (0xffff, 0x1000),
    ];
    for via in &peers {
        for (key, owner) in cases {
            let found = client
                .lookup(via.identifier(), RingId::new(key))
                .await
                .unwrap();
            assert_eq!(found.value(), owner, "key {:#x} via {:?}", key, via.identifier());
        }
    }
}

#[tokio::test]
async fn upload_stores_file_on_owner() {
    let discovery = start_discovery().await;
    let peers = ring(&discovery, &[0x8000, 0x1000, 0xc000]).await;

    let content = b"the quick brown fox".to_vec();
    let key = file_key(&content);
    let uploader = Uploader::new(discovery.hostname(), Header::new("uploader", "127.0.0.1"));
    let receipt = uploader.upload("fox.txt", content.clone()).await.unwrap();
    assert_eq!(receipt.key, key);

    let expected_owner = [0x1000u16, 0x8000, 0xc000]
        .into_iter()
        .min_by_key(|id| RingId::distance_clockwise(key, RingId::new(*id)))
        .unwrap();
    assert_eq!(receipt.owner.value(), expected_owner);

    let stored = by_id(&peers, expected_owner)
        .peer()
        .stored_item(key)
        .await
        .unwrap();
    assert_eq!(stored.name, "fox.txt");
    assert_eq!(stored.bytes, content);
}

#[tokio::test]
async fn colliding_id_is_refused() {
    let discovery = start_discovery().await;
    let _peers = ring(&discovery, &[0x8000, 0x1000]).await;

    let mut clash = ChordPeer::new(peer_config(&discovery, 0x8000)).await.unwrap();
    let err = clash.join().await.unwrap_err();
    assert!(matches!(err, ChordError::IdCollision(ref id) if id == "8000"));
    assert_eq!(discovery.peers().await.len(), 2);
    clash.shutdown().await.unwrap();
}

#[tokio::test]
async fn leaving_deregisters_from_discovery() {
    let discovery = start_discovery().await;
    let peers = ring(&discovery, &[0x8000, 0x1000]).await;

    by_id(&peers, 0x1000).leave().await.unwrap();

    let remaining: Vec<u16> = discovery.peers().await.iter().map(Identifier::value).collect();
    assert_eq!(remaining, vec![0x8000]);
}
