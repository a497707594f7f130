use clap::{Parser, Subcommand};
use ringlet::{
    chord::{types::RingId, DISCOVERY_PORT, FINGER_TABLE_SIZE, MAX_FORWARD_HOPS, PEER_PORT},
    discovery::DiscoveryNode,
    error::ChordError,
    network::{
        messages::Header,
        node::ChordPeer,
        transport::{DiscoveryConfig, PeerConfig},
    },
    upload::Uploader,
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "ringlet")]
#[command(about = "A Chord-style distributed hash table on a 16-bit ring")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the discovery node that joining peers and uploaders contact first
    #[command(name = "discovery")]
    Discovery {
        /// Port to listen on
        #[arg(short = 'p', long = "port", default_value_t = DISCOVERY_PORT)]
        port: u16,
        /// Host name peers use to reach this node
        #[arg(short = 'n', long = "host", default_value = "127.0.0.1")]
        host: String,
    },
    /// Start a peer and join the ring
    #[command(name = "peer")]
    Peer {
        /// Discovery node address, host or host:port
        #[arg(short = 'd', long = "discovery")]
        discovery: String,
        /// Ring id of this peer, 1 to 4 hex digits
        #[arg(short = 'i', long = "id")]
        id: RingId,
        /// Host name other peers use to reach this peer
        #[arg(short = 'n', long = "host", default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on (0 picks a free port)
        #[arg(short = 'p', long = "port", default_value_t = PEER_PORT)]
        port: u16,
        /// Forwarding hops after which a lookup is abandoned
        #[arg(long = "max-hops", default_value_t = MAX_FORWARD_HOPS)]
        max_hops: usize,
    },
    /// Store a file on the peer responsible for its key
    #[command(name = "upload")]
    Upload {
        /// Discovery node address, host or host:port
        #[arg(short = 'd', long = "discovery")]
        discovery: String,
        /// File to upload
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Discovery { port, host } => {
            let mut node = DiscoveryNode::new(DiscoveryConfig { host, port })
                .await
                .map_err(|e| format!("Failed to create discovery node: {}", e))?;
            info!("Discovery node listening on {}", node.hostname());

            node.run()
                .await
                .map_err(|e| format!("Discovery node error: {}", e))?;
            info!("Discovery node shut down gracefully");
            Ok(())
        }
        Commands::Peer {
            discovery,
            id,
            host,
            port,
            max_hops,
        } => {
            let config = PeerConfig {
                id,
                host,
                port,
                discovery_addr: discovery,
                max_hops,
                finger_table_size: FINGER_TABLE_SIZE,
            };
            let mut peer = ChordPeer::new(config)
                .await
                .map_err(|e| format!("Failed to create peer: {}", e))?;
            info!(
                "Starting peer {} on port {}",
                peer.identifier().id,
                peer.get_port()
            );

            if let Err(e) = peer.join().await {
                error!("Failed to join the ring: {}", e);
                let _ = peer.shutdown().await;
                return Err(match e {
                    ChordError::IdCollision(id) => format!(
                        "Ring id {} is already taken; restart with a different --id",
                        id
                    ),
                    other => format!("Failed to join the ring: {}", other),
                });
            }

            peer.run().await.map_err(|e| format!("Peer error: {}", e))?;
            info!("Peer shut down gracefully");
            Ok(())
        }
        Commands::Upload { discovery, file } => {
            let uploader = Uploader::new(&discovery, Header::new("ringlet-upload", "127.0.0.1"));
            let receipt = uploader
                .upload_file(&file)
                .await
                .map_err(|e| format!("Upload failed: {}", e))?;
            let rendered = serde_json::to_string_pretty(&receipt)
                .map_err(|e| format!("Failed to render receipt: {}", e))?;
            println!("{}", rendered);
            Ok(())
        }
    }
}
