use crate::config::Config;
use crate::server::pool::{PoolConfig, PoolRegistry};
use crate::server::session::RelaySession;
use crate::utils::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// How long to back off after a failed accept before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct ProxyServer {
    config: Arc<Config>,
    registry: PoolRegistry,
}

impl ProxyServer {
    pub fn new(config: Config) -> Self {
        let pool_config = PoolConfig {
            reserved: config.pool.reserved,
            idle_ttl_ms: config.pool.idle_ttl_ms,
            evict_interval_ms: config.pool.evict_interval_ms,
        };

        Self {
            config: Arc::new(config),
            registry: PoolRegistry::new(pool_config),
        }
    }

    /// Registry handle, shared with every session this server spawns.
    pub fn registry(&self) -> PoolRegistry {
        self.registry.clone()
    }

    pub async fn run(&self) -> Result<()> {
        let bind_addr = format!(
            "{}:{}",
            self.config.server.bind_address, self.config.server.bind_port
        );

        let listener = TcpListener::bind(&bind_addr).await?;

        info!("warmsocks listening on {}", bind_addr);

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let _ = stream.set_nodelay(true);

                    let session = RelaySession::new(stream, peer, &bind_addr, self.registry());
                    tokio::spawn(session.run());
                }
                Err(e) => {
                    warn!(
                        "Failed to accept connection: {}, retrying in {:?}",
                        e, ACCEPT_RETRY_DELAY
                    );
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }
}
