use crate::error::PortError;
use std::future::Future;
use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::TcpSocket;

pub const DEFAULT_SCAN_ATTEMPTS: u16 = 10;

/// Answers whether a host port can be taken right now.
pub trait PortProbe: Send + Sync {
    fn is_available(&self, port: u16) -> impl Future<Output = bool> + Send;
}

/// Probes by binding a listener on every local interface and dropping it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

impl PortProbe for TcpProbe {
    async fn is_available(&self, port: u16) -> bool {
        is_available(port).await
    }
}

/// True iff bind+listen succeeds on both `0.0.0.0:port` and `[::]:port`.
/// Each listener is closed before returning. Every error counts as "in use",
/// except a host without IPv6, where the IPv4 answer stands.
pub async fn is_available(port: u16) -> bool {
    let v4 = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let socket = match TcpSocket::new_v4() {
        Ok(s) => s,
        Err(e) => {
            tracing::debug!(port, error = %e, "socket creation failed");
            return false;
        }
    };
    if let Err(e) = bind_and_listen(socket, v4) {
        tracing::debug!(port, error = %e, "IPv4 bind/listen failed");
        return false;
    }

    let v6 = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));
    let socket = match TcpSocket::new_v6() {
        Ok(s) => s,
        Err(e) => {
            tracing::debug!(port, error = %e, "no IPv6 stack, IPv4 probe only");
            return true;
        }
    };
    match bind_and_listen(socket, v6) {
        Ok(()) => true,
        // IPv6 disabled on the host: no wildcard address to conflict with
        Err(e) if e.kind() == ErrorKind::AddrNotAvailable => {
            tracing::debug!(port, error = %e, "IPv6 unavailable, IPv4 probe only");
            true
        }
        Err(e) => {
            tracing::debug!(port, error = %e, "IPv6 bind/listen failed");
            false
        }
    }
}

fn bind_and_listen(socket: TcpSocket, addr: SocketAddr) -> io::Result<()> {
    socket.bind(addr)?;
    let listener = socket.listen(1)?;
    drop(listener);
    Ok(())
}

/// Sequential scan of `start..start + max_attempts`, lowest free port wins.
pub async fn find_available<P: PortProbe>(
    probe: &P,
    start: u16,
    max_attempts: u16,
) -> Result<u16, PortError> {
    for offset in 0..max_attempts {
        // past 65535 there is nothing left to try
        let Some(port) = start.checked_add(offset) else {
            break;
        };
        if probe.is_available(port).await {
            if offset > 0 {
                tracing::debug!(start, port, "found free port after {offset} busy");
            }
            return Ok(port);
        }
    }

    Err(PortError::Exhausted {
        start,
        attempts: max_attempts,
    })
}
