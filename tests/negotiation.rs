//! Wire-level negotiation tests: the exact SOCKS5 and HTTP CONNECT byte
//! exchanges, and the failure modes that close the session without a reply.

use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use warmsocks::server::{PoolConfig, PoolRegistry, RelaySession};

/// Accept loop that feeds every connection into a RelaySession, the way
/// ProxyServer::run does.
async fn spawn_proxy(registry: PoolRegistry) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let bind_addr = addr.to_string();

    tokio::spawn(async move {
        loop {
            if let Ok((stream, peer)) = listener.accept().await {
                let session =
                    RelaySession::new(stream, peer, &bind_addr, registry.clone());
                tokio::spawn(session.run());
            }
        }
    });

    addr
}

/// Echo server standing in for the upstream destination. Pre-warmed pool
/// connections idle here until a session uses them.
async fn spawn_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            if let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if stream.write_all(&buf[..n]).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        }
    });

    addr
}

fn test_registry() -> PoolRegistry {
    PoolRegistry::new(PoolConfig {
        reserved: 2,
        ..PoolConfig::default()
    })
}

#[tokio::test]
async fn socks5_connect_and_relay() {
    let upstream = spawn_echo_upstream().await;
    let proxy = spawn_proxy(test_registry()).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();

    // greeting: version 5, one method, no-auth
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();

    let mut choice = [0u8; 2];
    client.read_exact(&mut choice).await.unwrap();
    assert_eq!(choice, [0x05, 0x00]);

    // CONNECT 127.0.0.1:<upstream port>
    let mut request = vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1];
    request.extend_from_slice(&upstream.port().to_be_bytes());
    client.write_all(&request).await.unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);

    // tunnel is up: bytes echo back through the proxy
    client.write_all(b"ping through socks").await.unwrap();
    let mut echoed = [0u8; 18];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ping through socks");
}

#[tokio::test]
async fn socks5_domain_address_connects() {
    let upstream = spawn_echo_upstream().await;
    let proxy = spawn_proxy(test_registry()).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut choice = [0u8; 2];
    client.read_exact(&mut choice).await.unwrap();

    let host = b"localhost";
    let mut request = vec![0x05, 0x01, 0x00, 0x03, host.len() as u8];
    request.extend_from_slice(host);
    request.extend_from_slice(&upstream.port().to_be_bytes());
    client.write_all(&request).await.unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0..2], [0x05, 0x00]);

    client.write_all(b"hello").await.unwrap();
    let mut echoed = [0u8; 5];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"hello");
}

#[tokio::test]
async fn http_connect_and_relay() {
    let upstream = spawn_echo_upstream().await;
    let proxy = spawn_proxy(test_registry()).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();

    let request = format!(
        "CONNECT 127.0.0.1:{} HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n",
        upstream.port()
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let expected = b"HTTP/1.1 200 Connection\r\nContent-Length: 0\r\n\r\n";
    let mut reply = vec![0u8; expected.len()];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, expected);

    client.write_all(b"tunnel payload").await.unwrap();
    let mut echoed = [0u8; 14];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"tunnel payload");
}

#[tokio::test]
async fn ipv6_address_type_closes_without_reply() {
    let proxy = spawn_proxy(test_registry()).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();

    let mut choice = [0u8; 2];
    client.read_exact(&mut choice).await.unwrap();
    assert_eq!(choice, [0x05, 0x00]);

    // ATYP 0x04 (IPv6) is not supported
    let mut request = vec![0x05, 0x01, 0x00, 0x04];
    request.extend_from_slice(&[0u8; 16]);
    request.extend_from_slice(&443u16.to_be_bytes());
    client.write_all(&request).await.unwrap();

    // no success reply, just end-of-stream
    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn socks4_version_closes_without_reply() {
    let proxy = spawn_proxy(test_registry()).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client
        .write_all(&[0x04, 0x01, 0x00, 0x50, 127, 0, 0, 1, 0x00])
        .await
        .unwrap();

    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn malformed_connect_literal_closes_without_reply() {
    let proxy = spawn_proxy(test_registry()).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(b"COMPUTE nothing HTTP/1.1\r\n\r\n").await.unwrap();

    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn unreachable_upstream_closes_without_success_reply() {
    let proxy = spawn_proxy(test_registry()).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut choice = [0u8; 2];
    client.read_exact(&mut choice).await.unwrap();

    // port 1 should refuse the dial
    let request = [0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x01];
    client.write_all(&request).await.unwrap();

    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}
