//! TCP connect probe implementation.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::{lookup_host, TcpStream};

use super::ProbeError;

/// Connect to `host:port` and return the time until the handshake completed.
///
/// The connection is closed right away; nothing is sent or read. Every resolved
/// address is tried in order until one accepts.
pub async fn run_tcp_probe(host: &str, port: u16) -> Result<Duration, ProbeError> {
    let start = Instant::now();

    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|e| ProbeError::Dns(format!("{}: {}", host, e)))?
        .collect();

    if addrs.is_empty() {
        return Err(ProbeError::Dns(format!("no addresses found for {}", host)));
    }

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                let elapsed = start.elapsed();
                drop(stream);
                return Ok(elapsed);
            }
            Err(e) => {
                tracing::trace!("TCP connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }

    Err(match last_err {
        Some(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => ProbeError::ConnectionRefused,
        Some(e) => ProbeError::Network(e.to_string()),
        None => ProbeError::Network(format!("no connection attempt made to {}", host)),
    })
}
