//! TCP socket tuning for browser impersonation.
//!
//! Only the options a userspace socket can set are covered: buffer sizes
//! (which drive the advertised window), IPv4 TTL and Nagle. MSS, window
//! scaling, SACK and timestamps are negotiated by the OS.

use std::io;
use std::net::SocketAddr;

use socket2::SockRef;
use tokio::net::{TcpSocket, TcpStream};

/// TCP/IP fingerprint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpFingerprint {
    /// Socket buffer size in bytes; influences the initial receive window.
    pub window_size: u32,
    /// IPv4 TTL. macOS and Linux: 64, Windows: 128.
    pub ttl: u8,
    pub nodelay: bool,
}

impl Default for TcpFingerprint {
    fn default() -> Self {
        Self {
            window_size: 65535,
            ttl: 64,
            nodelay: true,
        }
    }
}

impl TcpFingerprint {
    /// Chrome on macOS.
    pub fn chrome() -> Self {
        Self::default()
    }

    /// Apply this fingerprint to an unconnected socket.
    fn configure(&self, socket: &TcpSocket, addr: &SocketAddr) -> io::Result<()> {
        socket.set_recv_buffer_size(self.window_size)?;
        socket.set_send_buffer_size(self.window_size)?;
        if addr.is_ipv4() {
            SockRef::from(socket).set_ttl_v4(self.ttl as u32)?;
        }
        Ok(())
    }

    /// Open a TCP connection with this fingerprint applied.
    ///
    /// The connect runs on the reactor, so dropping the future abandons the
    /// handshake and closes the socket.
    pub async fn connect(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        self.configure(&socket, &addr)?;
        let stream = socket.connect(addr).await?;
        stream.set_nodelay(self.nodelay)?;
        Ok(stream)
    }
}
