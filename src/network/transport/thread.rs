use crate::error::{NetworkError, RingletError};
use crate::network::messages::Message;
use crate::network::transport::read_message;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument, Span};

/// Answers one decoded request. `Ok(None)` closes the connection without a reply.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    async fn handle(&self, message: Message) -> Result<Option<Message>, RingletError>;
}

/// Accept loop for a peer or discovery node. Each connection gets its own task, so a handler
/// blocked on a forwarded request never stalls other connections.
pub struct ServerThread<H: ConnectionHandler> {
    listener: TcpListener,
    handler: Arc<H>,
    span: Span,
    shutdown_rx: Option<oneshot::Receiver<()>>,
    ready_tx: Option<oneshot::Sender<SocketAddr>>,
}

impl<H: ConnectionHandler> ServerThread<H> {
    /// Spawns the accept loop and waits until it is listening.
    pub async fn spawn(
        listener: TcpListener,
        handler: Arc<H>,
        span: Span,
    ) -> Result<RunningServer, NetworkError> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let thread = Self::new(listener, handler, span, shutdown_rx, ready_tx);
        let handle = tokio::spawn(thread.run());

        match ready_rx.await {
            Ok(local_addr) => Ok(RunningServer {
                local_addr,
                shutdown_tx,
                handle,
            }),
            Err(_) => {
                error!("server failed to initialize");
                match handle.await {
                    Ok(Err(e)) => Err(e),
                    _ => Err(NetworkError::Server("server failed to initialize".into())),
                }
            }
        }
    }

    pub fn new(
        listener: TcpListener,
        handler: Arc<H>,
        span: Span,
        shutdown_rx: oneshot::Receiver<()>,
        ready_tx: oneshot::Sender<SocketAddr>,
    ) -> Self {
        Self {
            listener,
            handler,
            span,
            shutdown_rx: Some(shutdown_rx),
            ready_tx: Some(ready_tx),
        }
    }

    pub async fn run(mut self) -> Result<(), NetworkError> {
        let span = self.span.clone();
        self.accept_loop().instrument(span).await
    }

    async fn accept_loop(&mut self) -> Result<(), NetworkError> {
        let local_addr = self.listener.local_addr()?;
        let mut shutdown_rx = self
            .shutdown_rx
            .take()
            .ok_or_else(|| NetworkError::Server("server already started".into()))?;

        info!(%local_addr, "listening for connections");
        if let Some(ready_tx) = self.ready_tx.take() {
            let _ = ready_tx.send(local_addr);
        }

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!(%local_addr, "server shut down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let handler = self.handler.clone();
                        tokio::spawn(
                            serve_connection(stream, remote, handler).instrument(self.span.clone()),
                        );
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                },
            }
        }
    }
}

/// Handle to an accept loop started with [`ServerThread::spawn`].
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), NetworkError>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections. Connections already being served run to completion.
    pub async fn shutdown(self) -> Result<(), NetworkError> {
        let _ = self.shutdown_tx.send(());
        self.handle
            .await
            .map_err(|e| NetworkError::Server(format!("server task failed: {}", e)))?
    }
}

async fn serve_connection<H: ConnectionHandler>(
    mut stream: TcpStream,
    remote: SocketAddr,
    handler: Arc<H>,
) {
    let bytes = match read_message(&mut stream).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(%remote, error = %e, "failed to read request");
            return;
        }
    };
    let message = match Message::decode(&bytes) {
        Ok(message) => message,
        Err(e) => {
            warn!(%remote, error = %e, "dropping malformed request");
            return;
        }
    };

    let kind = message.kind();
    info!(%remote, from = %message.header.hostname, %kind, "processing message");
    match handler.handle(message).await {
        Ok(Some(reply)) => {
            debug!(%remote, kind = %reply.kind(), "sending reply");
            if let Err(e) = stream.write_all(&reply.encode()).await {
                warn!(%remote, error = %e, "failed to send reply");
            }
        }
        Ok(None) => {}
        Err(e) => error!(%remote, %kind, error = %e, "failed to process message"),
    }
    let _ = stream.shutdown().await;
}
