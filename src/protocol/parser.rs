use super::types::*;
use crate::utils::error::{Result, WarmsocksError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Longest `host:port` accepted in an HTTP CONNECT request line. Targets
/// beyond this fail with MalformedRequest instead of growing unchecked.
pub const MAX_CONNECT_TARGET_LEN: usize = 255;

/// One best-effort read's worth of trailing request bytes.
const DRAIN_BUFFER_SIZE: usize = 8 * 1024;

/// Decide the wire dialect from the first two client bytes.
///
/// An HTTP CONNECT request line starts with "CONNECT "; matching its first
/// two bytes is enough to commit to that branch, the rest of the literal is
/// verified by `read_http_connect_target`. Anything else is treated as a
/// SOCKS greeting: version byte followed by the method count.
pub async fn detect_dialect<S>(stream: &mut S) -> Result<Dialect>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    if buf == HTTP_CONNECT_LITERAL[..2] {
        trace!("Detected HTTP CONNECT dialect");
        return Ok(Dialect::HttpConnect);
    }

    trace!("Detected SOCKS dialect, version 0x{:02x}", buf[0]);
    Ok(Dialect::Socks {
        version: buf[0],
        nmethods: buf[1],
    })
}

/// Finish reading an HTTP CONNECT request line and return its target.
///
/// The caller has already consumed the first two bytes of the "CONNECT "
/// literal; this reads the remaining six, verifies the full literal, then
/// scans single bytes up to the space terminating the `host:port` field.
pub async fn read_http_connect_target<S>(stream: &mut S) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut rest = [0u8; 6];
    stream.read_exact(&mut rest).await?;

    if rest != HTTP_CONNECT_LITERAL[2..] {
        return Err(WarmsocksError::MalformedRequest(
            "request line does not start with CONNECT".to_string(),
        ));
    }

    let mut target = Vec::new();
    loop {
        let byte = stream.read_u8().await?;
        if byte == b' ' {
            break;
        }
        if target.len() >= MAX_CONNECT_TARGET_LEN {
            return Err(WarmsocksError::MalformedRequest(
                "CONNECT target exceeds maximum length".to_string(),
            ));
        }
        target.push(byte);
    }

    let target = String::from_utf8(target)
        .map_err(|_| WarmsocksError::MalformedRequest("invalid target encoding".to_string()))?;

    trace!("Parsed HTTP CONNECT target: {}", target);

    Ok(target)
}

/// Drain one read's worth of the remaining request bytes (the rest of the
/// request line and whatever headers arrived with it). Header blocks split
/// across several network reads are not fully consumed.
pub async fn drain_request_remainder<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut buf = vec![0u8; DRAIN_BUFFER_SIZE];
    let n = stream.read(&mut buf).await?;
    trace!("Drained {} trailing request bytes", n);
    Ok(())
}

/// Reply that the HTTP CONNECT tunnel is established.
pub async fn send_http_established<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    stream.write_all(HTTP_ESTABLISHED_REPLY).await?;
    stream.flush().await?;
    Ok(())
}

/// Finish the SOCKS5 greeting whose first two bytes were already read.
///
/// The offered methods are consumed but not inspected: the server always
/// selects "no authentication", whether or not the client offered it.
pub async fn finish_socks5_greeting<S>(stream: &mut S, version: u8, nmethods: u8) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    if version != SOCKS_VERSION {
        return Err(WarmsocksError::UnsupportedVersion(version));
    }

    let mut methods = vec![0u8; nmethods as usize];
    stream.read_exact(&mut methods).await?;

    stream.write_all(SOCKS5_NO_AUTH_REPLY).await?;
    stream.flush().await?;

    trace!("Completed SOCKS5 greeting, {} methods offered", nmethods);

    Ok(())
}

/// Parse the SOCKS5 connect sub-phase request.
pub async fn parse_connect_request<S>(stream: &mut S) -> Result<ConnectRequest>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    // Fixed part: version, command, reserved, address type
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await?;

    let version = buf[0];
    let command = buf[1];
    let _reserved = buf[2];
    let address_type = buf[3];

    if version != SOCKS_VERSION {
        return Err(WarmsocksError::UnsupportedVersion(version));
    }

    let command = Command::try_from(command)?;

    let address = match address_type {
        0x01 => {
            // IPv4
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            Address::IPv4(addr)
        }
        0x03 => {
            // Domain name
            let domain_len = stream.read_u8().await? as usize;
            let mut domain_buf = vec![0u8; domain_len];
            stream.read_exact(&mut domain_buf).await?;
            let domain = String::from_utf8(domain_buf).map_err(|_| {
                WarmsocksError::MalformedRequest("invalid domain encoding".to_string())
            })?;
            Address::Domain(domain)
        }
        // IPv6 (0x04) and anything else
        _ => {
            return Err(WarmsocksError::UnsupportedAddressType(address_type));
        }
    };

    // Port (big-endian)
    let port = stream.read_u16().await?;

    trace!(
        "Parsed SOCKS5 request: command={:?}, address={}, port={}",
        command,
        address,
        port
    );

    Ok(ConnectRequest {
        command,
        address,
        port,
    })
}

/// Send the fixed SOCKS5 success reply.
pub async fn send_connect_success<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    stream.write_all(SOCKS5_SUCCESS_REPLY).await?;
    stream.flush().await?;
    Ok(())
}
