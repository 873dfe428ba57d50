use std::fmt;
use std::net::Ipv4Addr;

/// SOCKS5 Version
pub const SOCKS_VERSION: u8 = 0x05;

/// Opening literal of an HTTP CONNECT request line
pub const HTTP_CONNECT_LITERAL: &[u8; 8] = b"CONNECT ";

/// Fixed reply sent once an HTTP CONNECT tunnel is established
pub const HTTP_ESTABLISHED_REPLY: &[u8] = b"HTTP/1.1 200 Connection\r\nContent-Length: 0\r\n\r\n";

/// Fixed SOCKS5 success reply: bound address is always reported as 0.0.0.0:0.
/// CONNECT clients ignore BND.ADDR/BND.PORT in practice.
pub const SOCKS5_SUCCESS_REPLY: &[u8; 10] = &[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0];

/// Reply selecting the "no authentication" method, sent unconditionally.
pub const SOCKS5_NO_AUTH_REPLY: &[u8; 2] = &[0x05, 0x00];

/// Wire dialect spoken by a client, decided from its first two bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// First two bytes matched the start of "CONNECT ".
    HttpConnect,
    /// Anything else: byte 0 is the SOCKS version, byte 1 the method count.
    Socks { version: u8, nmethods: u8 },
}

/// SOCKS5 commands. Only CONNECT is served; BIND and UDP ASSOCIATE
/// are rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Connect = 0x01,
}

impl TryFrom<u8> for Command {
    type Error = crate::utils::error::WarmsocksError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Command::Connect),
            _ => Err(crate::utils::error::WarmsocksError::UnsupportedCommand(
                value,
            )),
        }
    }
}

/// Destination address of a CONNECT request. IPv6 targets are not
/// supported and fail during parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    IPv4([u8; 4]),
    Domain(String),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::IPv4(octets) => write!(f, "{}", Ipv4Addr::from(*octets)),
            Address::Domain(domain) => write!(f, "{}", domain),
        }
    }
}

/// Parsed SOCKS5 CONNECT request
#[derive(Debug)]
pub struct ConnectRequest {
    pub command: Command,
    pub address: Address,
    pub port: u16,
}

impl ConnectRequest {
    /// Destination in `host:port` form, the key used by the pool registry.
    pub fn target(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
