//! The discovery node: the rendezvous point that hands joining peers a contact in the ring and
//! hands uploaders a random peer.

pub mod client;
pub mod registry;
pub mod server;

use crate::chord::types::Identifier;
use crate::console::{self, ConsoleExit};
use crate::error::NetworkError;
use crate::network::messages::Header;
use crate::network::transport::thread::{RunningServer, ServerThread};
use crate::network::transport::DiscoveryConfig;
use server::DiscoveryProcessor;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::{error, info, info_span, Span};

pub struct DiscoveryNode {
    processor: Arc<DiscoveryProcessor>,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    span: Span,
    server: Option<RunningServer>,
}

impl DiscoveryNode {
    pub async fn new(config: DiscoveryConfig) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|e| {
                NetworkError::Server(format!(
                    "unable to listen on {}:{}: {}",
                    config.host, config.port, e
                ))
            })?;
        let local_addr = listener.local_addr()?;
        let header = Header::new(
            format!("{}:{}", config.host, local_addr.port()),
            local_addr.ip().to_string(),
        );
        Ok(Self {
            processor: Arc::new(DiscoveryProcessor::new(header)),
            listener: Some(listener),
            local_addr,
            span: info_span!("discovery"),
            server: None,
        })
    }

    pub async fn start_server(&mut self) -> Result<(), NetworkError> {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => return Ok(()),
        };
        let server = ServerThread::spawn(listener, self.processor.clone(), self.span.clone()).await?;
        self.span
            .in_scope(|| info!(addr = %server.local_addr(), "discovery node is ready"));
        self.server = Some(server);
        Ok(())
    }

    /// Serves until Ctrl-C. The console stays available the whole time.
    pub async fn run(&mut self) -> Result<(), NetworkError> {
        self.start_server().await?;
        let processor = self.processor.clone();
        let console = async move {
            let mut stdout = tokio::io::stdout();
            let exit = console::run_discovery_console(
                &processor,
                BufReader::new(tokio::io::stdin()),
                &mut stdout,
            )
            .await?;
            if exit == ConsoleExit::InputClosed {
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
        self.shutdown().await
    }

    pub async fn shutdown(&mut self) -> Result<(), NetworkError> {
        match self.server.take() {
            Some(server) => server.shutdown().await,
            None => Ok(()),
        }
    }

    /// Address peers should pass as their discovery address.
    pub fn hostname(&self) -> &str {
        &self.processor.header().hostname
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn peers(&self) -> Vec<Identifier> {
        self.processor.registry().await.peers()
    }
}
