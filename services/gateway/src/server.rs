use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::GatewayConfig;
use crate::gate::AccessGate;
use crate::proxy::{GatewayHandler, GatewayState};

pub struct GatewayServer {
    config: Arc<GatewayConfig>,
    handler: Arc<GatewayHandler>,
}

impl GatewayServer {
    /// Create a gateway server backed by the configured HTTP collaborators
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let state = GatewayState::new(config).context("Failed to build gateway state")?;
        Ok(Self::from_state(state))
    }

    /// Create a gateway server around an existing access gate
    pub fn with_gate(config: GatewayConfig, gate: AccessGate) -> Result<Self> {
        let state = GatewayState::with_gate(config, gate)?;
        Ok(Self::from_state(state))
    }

    fn from_state(state: GatewayState) -> Self {
        Self {
            config: Arc::clone(&state.config),
            handler: Arc::new(GatewayHandler::new(state)),
        }
    }

    pub fn handler(&self) -> Arc<GatewayHandler> {
        Arc::clone(&self.handler)
    }

    /// Run the gateway until the returned future is dropped
    pub async fn run(self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .listen_addr()
            .parse()
            .context("Invalid listen address")?;

        let listener = TcpListener::bind(&addr)
            .await
            .context(format!("Failed to bind to {}", addr))?;

        let _sweeper = SweeperGuard(
            self.handler
                .state()
                .gate
                .resolver()
                .cache()
                .start_sweeper(self.config.cache_sweep_interval()),
        );

        info!(
            "School gate listening on {} (upstream: {})",
            addr, self.config.upstream_url
        );

        let server = Arc::new(self);

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let server = Arc::clone(&server);

            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                    error!("Connection error from {}: {}", peer_addr, e);
                }
            });
        }
    }

    async fn handle_connection(&self, stream: tokio::net::TcpStream, peer_addr: SocketAddr) -> Result<()> {
        let io = TokioIo::new(stream);
        let handler = Arc::clone(&self.handler);
        let peer_info = Arc::new(PeerInfo { addr: peer_addr });

        let service = service_fn(move |req| {
            let handler = Arc::clone(&handler);
            let peer_info = Arc::clone(&peer_info);
            async move { Ok::<_, Infallible>(handler.handle_request(req, Some(peer_info)).await) }
        });

        http1::Builder::new()
            .serve_connection(io, service)
            .await
            .context("Failed to serve connection")?;

        Ok(())
    }
}

/// Stops the cache sweeper when the server future ends or is dropped.
struct SweeperGuard(JoinHandle<()>);

impl Drop for SweeperGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Peer connection information
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub addr: SocketAddr,
}

impl PeerInfo {
    /// Get client IP address
    pub fn client_ip(&self) -> std::net::IpAddr {
        self.addr.ip()
    }
}
