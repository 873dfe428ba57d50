use crate::protocol::*;
use crate::server::pool::{ConnectionPool, PooledConnection, PoolRegistry};
use crate::server::relay::relay;
use crate::utils::error::{Result, WarmsocksError};
use tokio::net::TcpStream;
use tracing::{debug, error, info};

/// One client connection: negotiation, relay, teardown.
///
/// The session owns the client transport for its whole lifetime and the
/// acquired upstream connection from successful negotiation until the end,
/// when the upstream goes back to its pool's `release` (which closes it).
/// Errors never leave the session; they are logged with its label.
pub struct RelaySession {
    label: String,
    client: TcpStream,
    registry: PoolRegistry,
}

struct Negotiated {
    target: String,
    pool: ConnectionPool,
    upstream: PooledConnection,
}

impl RelaySession {
    pub fn new(
        client: TcpStream,
        peer: std::net::SocketAddr,
        bind_addr: &str,
        registry: PoolRegistry,
    ) -> Self {
        Self {
            label: format!("server [{}] conn [{}]", bind_addr, peer),
            client,
            registry,
        }
    }

    pub async fn run(mut self) {
        debug!("{} opened", self.label);

        match self.negotiate().await {
            Ok(negotiated) => {
                let Negotiated {
                    target,
                    pool,
                    upstream,
                } = negotiated;
                debug!("{} relaying to [{}]", self.label, target);

                let mut upstream = upstream;
                relay(&mut self.client, &mut upstream.stream, &self.label).await;

                pool.release(upstream).await;
            }
            Err(e) => {
                error!("{} negotiation error: {}", self.label, e);
            }
        }

        // client transport closes on drop
        debug!("{} closed", self.label);
    }

    /// Drive the handshake to a resolved destination and an acquired
    /// upstream connection. Which branch runs is decided by the first two
    /// client bytes; in both branches the success reply is only written
    /// after the upstream has been acquired.
    async fn negotiate(&mut self) -> Result<Negotiated> {
        match detect_dialect(&mut self.client).await? {
            Dialect::HttpConnect => {
                let target = read_http_connect_target(&mut self.client).await?;
                let (pool, upstream) = self.acquire_upstream(&target).await?;

                drain_request_remainder(&mut self.client).await?;
                send_http_established(&mut self.client).await?;

                Ok(Negotiated {
                    target,
                    pool,
                    upstream,
                })
            }
            Dialect::Socks { version, nmethods } => {
                finish_socks5_greeting(&mut self.client, version, nmethods).await?;

                let request = parse_connect_request(&mut self.client).await?;
                let target = request.target();
                let (pool, upstream) = self.acquire_upstream(&target).await?;

                send_connect_success(&mut self.client).await?;

                Ok(Negotiated {
                    target,
                    pool,
                    upstream,
                })
            }
        }
    }

    async fn acquire_upstream(&self, target: &str) -> Result<(ConnectionPool, PooledConnection)> {
        info!("{} dial target [{}]", self.label, target);

        let pool = self.registry.get(target).await;
        let upstream =
            pool.acquire()
                .await
                .map_err(|source| WarmsocksError::UpstreamUnavailable {
                    address: target.to_string(),
                    source: Box::new(source),
                })?;

        Ok((pool, upstream))
    }
}
