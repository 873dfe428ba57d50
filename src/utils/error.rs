use thiserror::Error;

#[derive(Debug, Error)]
pub enum WarmsocksError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("connection pool for [{0}] is disabled")]
    PoolDisabled(String),

    #[error("dial target [{address}] failed: {source}")]
    DialFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Unsupported SOCKS version: 0x{0:02x}")]
    UnsupportedVersion(u8),

    #[error("Unsupported command: 0x{0:02x}")]
    UnsupportedCommand(u8),

    #[error("Unsupported address type: 0x{0:02x}")]
    UnsupportedAddressType(u8),

    #[error("upstream [{address}] unavailable: {source}")]
    UpstreamUnavailable {
        address: String,
        #[source]
        source: Box<WarmsocksError>,
    },
}

pub type Result<T> = std::result::Result<T, WarmsocksError>;
