//! Datagram transport to the command station.
//!
//! The protocol has no request ids, so a [`Transport`] is used strictly one request,
//! one reply at a time. Serializing callers is the job of [`crate::Z21`].

use bytes::Bytes;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, trace};

use crate::config::Config;
use crate::error::{Error, Result};

/// One socket, one destination. No retries and no correlation of replies.
pub trait Transport: Send {
    /// Send one datagram. Fire-and-forget: UDP gives no delivery guarantee.
    fn send(&mut self, datagram: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next datagram, at most `max_bytes` long.
    ///
    /// Fails with [`Error::Timeout`] when nothing arrives within the receive window.
    fn receive(&mut self, max_bytes: usize) -> impl Future<Output = Result<Bytes>> + Send;

    /// Release the socket. Later calls fail with [`Error::Closed`].
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn is_connected(&self) -> bool;
}

/// UDP socket connected to the command station.
#[derive(Debug)]
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    peer: SocketAddr,
    timeout: Duration,
    verbose: bool,
}

impl UdpTransport {
    /// Bind an ephemeral local port and connect it to `config.host:config.port`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let addr = config.address();
        debug!(addr = %addr, "Binding UDP socket");

        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(|e| {
            error!(error = %e, "Failed to bind UDP socket");
            Error::connect(&addr, e)
        })?;
        socket.connect(&addr).await.map_err(|e| {
            error!(addr = %addr, error = %e, "Failed to connect UDP socket");
            Error::connect(&addr, e)
        })?;
        let peer = socket.peer_addr().map_err(|e| Error::connect(&addr, e))?;

        info!(peer = %peer, timeout_ms = config.timeout.as_millis() as u64, "Connected to command station");
        Ok(Self {
            socket: Some(socket),
            peer,
            timeout: config.timeout,
            verbose: config.verbose,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket.as_ref().ok_or(Error::Closed)
    }
}

impl Transport for UdpTransport {
    async fn send(&mut self, datagram: &[u8]) -> Result<()> {
        let socket = self.socket()?;
        if self.verbose {
            debug!(peer = %self.peer, tx = %hex::encode(datagram), "Sending datagram");
        }
        socket.send(datagram).await.map_err(|e| {
            error!(peer = %self.peer, error = %e, "Failed to send datagram");
            Error::Io(e)
        })?;
        Ok(())
    }

    async fn receive(&mut self, max_bytes: usize) -> Result<Bytes> {
        let socket = self.socket()?;
        let mut buf = vec![0u8; max_bytes];
        let n = match tokio::time::timeout(self.timeout, socket.recv(&mut buf)).await {
            Ok(result) => result?,
            Err(_) => {
                trace!(peer = %self.peer, "Receive timed out");
                return Err(Error::Timeout(self.timeout));
            }
        };
        buf.truncate(n);
        if self.verbose {
            debug!(peer = %self.peer, rx = %hex::encode(&buf), "Received datagram");
        }
        Ok(Bytes::from(buf))
    }

    async fn close(&mut self) -> Result<()> {
        if self.socket.take().is_some() {
            info!(peer = %self.peer, "Closed connection to command station");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn station() -> (UdpSocket, Config) {
        let station = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = station.local_addr().unwrap().port();
        let config = Config::new("127.0.0.1")
            .with_port(port)
            .with_timeout(Duration::from_millis(200));
        (station, config)
    }

    #[tokio::test]
    async fn datagrams_reach_the_station_and_back() {
        let (station, config) = station().await;
        let mut transport = UdpTransport::connect(&config).await.unwrap();

        transport.send(&[0x04, 0x00, 0x10, 0x00]).await.unwrap();
        let mut buf = [0u8; 64];
        let (n, from) = station.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x04, 0x00, 0x10, 0x00]);

        station.send_to(&[0x08, 0x00, 0x10, 0x00, 0xD2, 0x04, 0x00, 0x00], from).await.unwrap();
        let reply = transport.receive(1024).await.unwrap();
        assert_eq!(reply.as_ref(), &[0x08, 0x00, 0x10, 0x00, 0xD2, 0x04, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn silence_is_a_timeout_not_a_connectivity_error() {
        let (_station, config) = station().await;
        let mut transport = UdpTransport::connect(&config).await.unwrap();
        let err = transport.receive(1024).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(200)));
        assert!(!err.is_connectivity());
    }

    #[tokio::test]
    async fn closed_transport_refuses_io() {
        let (_station, config) = station().await;
        let mut transport = UdpTransport::connect(&config).await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        assert!(matches!(transport.send(&[0x00]).await, Err(Error::Closed)));
        assert!(matches!(transport.receive(8).await, Err(Error::Closed)));
    }
}
