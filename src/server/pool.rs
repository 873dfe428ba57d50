use crate::utils::error::{Result, WarmsocksError};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Configuration for the per-destination connection pools
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Idle connections kept warm per destination
    pub reserved: usize,
    /// Evict a pool after this long without acquire/release activity (milliseconds)
    pub idle_ttl_ms: u64,
    /// How often each pool checks itself for eviction (milliseconds)
    pub evict_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            reserved: 5,
            idle_ttl_ms: 60_000,
            evict_interval_ms: 60_000,
        }
    }
}

/// A pre-dialed upstream connection with its last-use timestamp.
///
/// Owned by exactly one place at a time: a pool's idle list, or the
/// session that acquired it. Once a session is done with it the
/// connection is closed, never re-admitted.
#[derive(Debug)]
pub struct PooledConnection {
    pub stream: TcpStream,
    last_used: Instant,
}

impl PooledConnection {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            last_used: Instant::now(),
        }
    }

    async fn close(self) {
        let mut stream = self.stream;
        let _ = stream.shutdown().await;
    }
}

struct PoolState {
    idle: VecDeque<PooledConnection>,
    checked_out: usize,
    last_activity: Instant,
    disabled: bool,
}

/// Pre-warmed connection pool for a single destination address.
///
/// Used connections are not returned to the idle list: `release` closes
/// them, and a background top-up pass re-dials replacements toward the
/// reserved target. The idle length may transiently overshoot the target
/// when top-up passes overlap; that is accepted, not prevented.
///
/// Cloning is cheap and yields a handle to the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    address: String,
    config: PoolConfig,
    state: Arc<Mutex<PoolState>>,
}

impl ConnectionPool {
    fn new(address: String, config: PoolConfig) -> Self {
        Self {
            address,
            config,
            state: Arc::new(Mutex::new(PoolState {
                idle: VecDeque::new(),
                checked_out: 0,
                last_activity: Instant::now(),
                disabled: false,
            })),
        }
    }

    /// Destination address this pool dials.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether two handles refer to the same pool instance.
    pub fn same_pool(&self, other: &ConnectionPool) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Take a connection: the idle head if one is warm, otherwise a fresh
    /// dial. Blocks on dial latency when the idle list is empty. Fails with
    /// `PoolDisabled` once the pool has been evicted, or `DialFailed` when
    /// the destination cannot be reached.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let mut state = self.state.lock().await;

        if state.disabled {
            return Err(WarmsocksError::PoolDisabled(self.address.clone()));
        }

        let mut conn = match state.idle.pop_front() {
            Some(conn) => {
                trace!(
                    "Handing out warm connection to {} (idle {:?})",
                    self.address,
                    conn.last_used.elapsed()
                );
                conn
            }
            None => {
                debug!("Idle list for {} empty, dialing inline", self.address);
                self.dial().await?
            }
        };

        conn.last_used = Instant::now();
        state.checked_out += 1;
        state.last_activity = conn.last_used;
        drop(state);

        self.spawn_top_up();

        Ok(conn)
    }

    /// Give a connection back. It is always closed, regardless of pool
    /// state; release only does bookkeeping and triggers replenishment of
    /// idle capacity for future acquirers.
    pub async fn release(&self, conn: PooledConnection) {
        conn.close().await;

        let mut state = self.state.lock().await;
        state.checked_out = state.checked_out.saturating_sub(1);
        state.last_activity = Instant::now();
        drop(state);

        self.spawn_top_up();
    }

    /// Admit a freshly dialed connection into the idle list. A disabled
    /// pool closes it instead; this check is what keeps racing top-up
    /// passes harmless after eviction.
    async fn admit(&self, conn: PooledConnection) {
        let mut state = self.state.lock().await;
        if state.disabled {
            drop(state);
            conn.close().await;
            return;
        }
        state.idle.push_back(conn);
    }

    async fn dial(&self) -> Result<PooledConnection> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|source| WarmsocksError::DialFailed {
                address: self.address.clone(),
                source,
            })?;
        Ok(PooledConnection::new(stream))
    }

    /// Restock the idle list toward the reserved target. Passes may run
    /// concurrently with themselves; each dial failure is skipped.
    async fn top_up(&self) {
        let deficit = {
            let state = self.state.lock().await;
            self.config.reserved.saturating_sub(state.idle.len())
        };
        if deficit < 1 {
            return;
        }

        for _ in 0..deficit {
            if self.state.lock().await.disabled {
                break;
            }
            match self.dial().await {
                Ok(conn) => self.admit(conn).await,
                Err(e) => {
                    trace!("Top-up dial to {} failed: {}", self.address, e);
                }
            }
        }
    }

    fn spawn_top_up(&self) {
        let pool = self.clone();
        tokio::spawn(async move {
            pool.top_up().await;
        });
    }

    /// Periodic self-eviction: once the pool has seen no acquire/release
    /// activity for longer than the TTL, it removes itself from the
    /// registry, disables itself and stops ticking. Checked-out
    /// connections are left to their sessions; `release` closes them.
    fn spawn_evictor(&self, registry: PoolRegistry) {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(pool.config.evict_interval_ms));
            // the first tick completes immediately
            ticker.tick().await;

            let ttl = Duration::from_millis(pool.config.idle_ttl_ms);
            loop {
                ticker.tick().await;
                let idle_for = pool.state.lock().await.last_activity.elapsed();
                if idle_for > ttl {
                    debug!(
                        "Evicting pool for {} after {:?} of inactivity",
                        pool.address, idle_for
                    );
                    registry.remove(&pool.address).await;
                    pool.disable().await;
                    return;
                }
            }
        });
    }

    async fn disable(&self) {
        let drained = {
            let mut state = self.state.lock().await;
            state.disabled = true;
            std::mem::take(&mut state.idle)
        };
        for conn in drained {
            conn.close().await;
        }
    }

    /// Snapshot of the pool's bookkeeping.
    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        PoolStats {
            idle: state.idle.len(),
            checked_out: state.checked_out,
            disabled: state.disabled,
        }
    }

    async fn touch(&self) {
        self.state.lock().await.last_activity = Instant::now();
    }
}

/// Statistics about one destination pool
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub idle: usize,
    pub checked_out: usize,
    pub disabled: bool,
}

/// Process-wide map from destination address to its connection pool.
///
/// Pools are created lazily on first reference and remove themselves via
/// their own eviction timers. A lookup racing an eviction may create a
/// fresh pool for the same address right after the old one is deleted;
/// nothing is lost, the old idle connections were closed on disable.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone)]
pub struct PoolRegistry {
    config: PoolConfig,
    pools: Arc<Mutex<HashMap<String, ConnectionPool>>>,
}

impl PoolRegistry {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            pools: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Return the pool for `address`, creating and registering one if
    /// absent. Creation starts the pool's eviction timer and an initial
    /// top-up as fire-and-forget tasks. Every call stamps the pool's
    /// last-activity time.
    pub async fn get(&self, address: &str) -> ConnectionPool {
        let pool = {
            let mut pools = self.pools.lock().await;
            match pools.get(address) {
                Some(pool) => pool.clone(),
                None => {
                    debug!("Creating connection pool for {}", address);
                    let pool = ConnectionPool::new(address.to_string(), self.config.clone());
                    pools.insert(address.to_string(), pool.clone());
                    pool.spawn_evictor(self.clone());
                    pool.spawn_top_up();
                    pool
                }
            }
        };

        pool.touch().await;
        pool
    }

    async fn remove(&self, address: &str) {
        self.pools.lock().await.remove(address);
    }

    /// Number of live pools, mostly useful for diagnostics and tests.
    pub async fn pool_count(&self) -> usize {
        self.pools.lock().await.len()
    }
}
