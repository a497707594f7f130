use crate::chord::peer::{Peer, PeerSnapshot};
use crate::chord::types::Identifier;
use crate::console::{self, ConsoleExit};
use crate::discovery::client::DiscoveryClient;
use crate::error::{ChordError, DiscoveryError, NetworkError};
use crate::network::messages::Header;
use crate::network::transport::client::PeerClient;
use crate::network::transport::server::PeerProcessor;
use crate::network::transport::thread::{RunningServer, ServerThread};
use crate::network::transport::PeerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::{error, info, info_span};

/// A running ring member: the [`Peer`] state, the server answering other peers and the
/// clients it uses to reach peers and the discovery node.
pub struct ChordPeer {
    peer: Arc<Peer>,
    client: PeerClient,
    discovery: DiscoveryClient,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    server: Option<RunningServer>,
}

impl ChordPeer {
    /// Binds the listening socket and sets up an unjoined peer. The advertised hostname is
    /// `config.host` plus the port actually bound.
    pub async fn new(config: PeerConfig) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|e| {
                NetworkError::Server(format!(
                    "unable to listen on {}:{}: {}",
                    config.host, config.port, e
                ))
            })?;
        let local_addr = listener.local_addr()?;

        let identifier = Identifier::new(format!("{}:{}", config.host, local_addr.port()), config.id);
        let span = info_span!("peer", id = %config.id);
        let header = Header::new(identifier.hostname.clone(), local_addr.ip().to_string());

        let peer = Arc::new(Peer::new(
            identifier,
            config.finger_table_size,
            config.max_hops,
            span,
        ));
        let discovery = DiscoveryClient::new(&config.discovery_addr, header.clone());

        Ok(Self {
            peer,
            client: PeerClient::new(header),
            discovery,
            listener: Some(listener),
            local_addr,
            server: None,
        })
    }

    async fn start_server(&mut self) -> Result<(), NetworkError> {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => return Ok(()),
        };
        let processor = Arc::new(PeerProcessor::new(self.peer.clone(), self.client.clone()));
        let server = ServerThread::spawn(listener, processor, self.peer.span().clone()).await?;
        self.peer
            .span()
            .in_scope(|| info!(addr = %server.local_addr(), "peer server is ready"));
        self.server = Some(server);
        Ok(())
    }

    /// Starts answering requests, then joins the ring through the discovery node.
    pub async fn join(&mut self) -> Result<(), ChordError> {
        self.start_server().await?;
        self.peer.join(&self.discovery, &self.client).await
    }

    pub async fn leave(&self) -> Result<(), DiscoveryError> {
        self.peer.leave(&self.discovery).await
    }

    /// Serves the console until `exit` or Ctrl-C, then leaves the ring and stops the server.
    pub async fn run(&mut self) -> Result<(), NetworkError> {
        let peer = self.peer.clone();
        let console = async move {
            let mut stdout = tokio::io::stdout();
            let exit = console::run_peer_console(&peer, BufReader::new(tokio::io::stdin()), &mut stdout).await?;
            if exit == ConsoleExit::InputClosed {
                // no operator attached, keep serving until interrupted
                std::future::pending::<()>().await;
            }
            Ok::<_, std::io::Error>(())
        };

        tokio::select! {
            result = console => {
                if let Err(e) = result {
                    error!(error = %e, "console failed");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "unable to listen for shutdown signal");
                }
                info!("received shutdown signal");
            }
        }

        if let Err(e) = self.leave().await {
            error!(error = %e, "leaving the ring failed");
        }
        self.shutdown().await
    }

    pub async fn shutdown(&mut self) -> Result<(), NetworkError> {
        match self.server.take() {
            Some(server) => server.shutdown().await,
            None => Ok(()),
        }
    }

    pub fn peer(&self) -> &Arc<Peer> {
        &self.peer
    }

    pub fn identifier(&self) -> &Identifier {
        self.peer.identifier()
    }

    pub async fn snapshot(&self) -> PeerSnapshot {
        self.peer.snapshot().await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn get_port(&self) -> u16 {
        self.local_addr.port()
    }
}
