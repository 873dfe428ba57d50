use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error};

// 32KB keeps syscall counts low on large transfers
const BUFFER_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, Copy)]
enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::ClientToUpstream => write!(f, "client->upstream"),
            Direction::UpstreamToClient => write!(f, "upstream->client"),
        }
    }
}

/// Relay bytes between client and upstream until both directions are done.
///
/// The two directions run concurrently and independently: one side
/// reaching end-of-stream does not interrupt or half-close the other, and
/// neither transport is shut down here. Errors end only their own
/// direction and are logged with the session label; the caller closes
/// both transports afterwards.
pub async fn relay(client: &mut TcpStream, upstream: &mut TcpStream, label: &str) {
    let (mut client_read, mut client_write) = client.split();
    let (mut upstream_read, mut upstream_write) = upstream.split();

    let upload = copy_direction(
        &mut client_read,
        &mut upstream_write,
        Direction::ClientToUpstream,
        label,
    );
    let download = copy_direction(
        &mut upstream_read,
        &mut client_write,
        Direction::UpstreamToClient,
        label,
    );

    let (up, down) = tokio::join!(upload, download);

    debug!("{} relay finished: {} bytes up, {} bytes down", label, up, down);
}

/// Copy one direction until its source reaches end-of-stream or either
/// side errors. Returns the bytes written.
async fn copy_direction<R, W>(reader: &mut R, writer: &mut W, direction: Direction, label: &str) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; BUFFER_SIZE];
    let mut written: u64 = 0;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                error!("{} read error ({}): {}", label, direction, e);
                break;
            }
        };

        // write_all surfaces short writes as WriteZero
        if let Err(e) = writer.write_all(&buf[..n]).await {
            error!("{} write error ({}): {}", label, direction, e);
            break;
        }

        written += n as u64;
    }

    written
}
