//! Unreliable datagram channel abstraction.
//!
//! The protocol needs only three capabilities from the surrounding I/O code:
//! send a datagram to the fixed peer, block until a datagram arrives, and
//! close.  [`Channel`] captures exactly that, so the sender and receiver run
//! unchanged over real UDP ([`UdpChannel`]) or the in-memory fault simulator
//! ([`crate::simulator`]).
//!
//! Delivery may lose, duplicate, reorder or corrupt datagrams; the protocol
//! above copes with all of it.

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;

/// A bidirectional, unreliable, datagram-oriented link to one peer.
///
/// All methods are `&self` so one channel can be shared by the transmit and
/// acknowledge loops.
pub trait Channel: Send + Sync + 'static {
    /// Send `datagram` to the peer as a single unit.
    fn send(&self, datagram: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Wait for the next datagram, copy it into `buf` and return its length
    /// and source.  Datagrams longer than `buf` are truncated.
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;

    /// Release the channel.  Later sends and receives fail.
    fn close(&self);
}

/// Lets a caller keep a handle on a channel it hands to a sender or receiver.
impl<C: Channel> Channel for Arc<C> {
    fn send(&self, datagram: &[u8]) -> impl Future<Output = io::Result<()>> + Send {
        (**self).send(datagram)
    }

    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send {
        (**self).recv(buf)
    }

    fn close(&self) {
        (**self).close()
    }
}

pub(crate) fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel closed")
}

/// UDP link built from two unidirectional flows: an inbound socket bound to
/// a known port and an outbound socket on an ephemeral port.
#[derive(Debug)]
pub struct UdpChannel {
    inbound: UdpSocket,
    outbound: UdpSocket,
    peer: SocketAddr,
    closed: AtomicBool,
}

impl UdpChannel {
    /// Bind the inbound socket to `local` and an ephemeral outbound socket,
    /// sending everything to `peer`.
    pub async fn bind(local: SocketAddr, peer: SocketAddr) -> io::Result<Self> {
        let inbound = UdpSocket::bind(local).await?;
        let unspecified = match peer.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let outbound = UdpSocket::bind(SocketAddr::new(unspecified, 0)).await?;
        Ok(Self::from_sockets(inbound, outbound, peer))
    }

    /// Wrap already-bound sockets.
    pub fn from_sockets(inbound: UdpSocket, outbound: UdpSocket, peer: SocketAddr) -> Self {
        Self {
            inbound,
            outbound,
            peer,
            closed: AtomicBool::new(false),
        }
    }

    /// Address the inbound socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inbound.local_addr()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error());
        }
        Ok(())
    }
}

impl Channel for UdpChannel {
    async fn send(&self, datagram: &[u8]) -> io::Result<()> {
        self.ensure_open()?;
        self.outbound.send_to(datagram, self.peer).await?;
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.ensure_open()?;
        self.inbound.recv_from(buf).await
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            log::debug!("[udp] channel to {} closed", self.peer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback_pair() -> (UdpChannel, UdpChannel) {
        let a_in = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_in = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let a_peer = b_in.local_addr().unwrap();
        let b_peer = a_in.local_addr().unwrap();
        let a_out = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_out = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        (
            UdpChannel::from_sockets(a_in, a_out, a_peer),
            UdpChannel::from_sockets(b_in, b_out, b_peer),
        )
    }

    #[tokio::test]
    async fn datagram_crosses_loopback() {
        let (a, b) = loopback_pair().await;
        a.send(b"ping").await.unwrap();
        let mut buf = [0u8; 16];
        let (n, _) = b.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");

        b.send(b"pong").await.unwrap();
        let (n, _) = a.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[tokio::test]
    async fn closed_channel_refuses_io() {
        let (a, _b) = loopback_pair().await;
        a.close();
        let err = a.send(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        let mut buf = [0u8; 4];
        assert!(a.recv(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn bind_reports_local_address() {
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let ch = UdpChannel::bind("127.0.0.1:0".parse().unwrap(), peer).await.unwrap();
        assert_ne!(ch.local_addr().unwrap().port(), 0);
        assert_eq!(ch.peer(), peer);
    }
}
