//! The three bound UDP sockets the dispatcher polls (spec.md §4.1):
//! authentication, accounting, and proxy. Grounded in the teacher's
//! `UdpInput::start`/`UdpOutput::start` bind idiom, collapsed into one
//! struct since the dispatcher's main loop needs all three sockets
//! live at once rather than swapped behind a generic `Input`/`Output`
//! trait object.

use std::io;
use std::net::SocketAddrV4;

use tokio::net::UdpSocket;

use crate::core::packet::SocketLabel;

/// Datagrams larger than this are never legitimate DHCP or RADIUS
/// traffic; used to size the receive buffer.
const MAX_DATAGRAM_LEN: usize = 1500;

pub struct BoundSockets {
    pub auth: UdpSocket,
    pub acct: UdpSocket,
    pub proxy: UdpSocket,
    pub dhcp: UdpSocket,
}

impl BoundSockets {
    pub async fn bind(
        auth_addr: &str,
        acct_addr: &str,
        proxy_addr: &str,
        dhcp_addr: &str,
    ) -> io::Result<Self> {
        Ok(Self {
            auth: UdpSocket::bind(auth_addr).await?,
            acct: UdpSocket::bind(acct_addr).await?,
            proxy: UdpSocket::bind(proxy_addr).await?,
            dhcp: UdpSocket::bind(dhcp_addr).await?,
        })
    }

    fn socket(&self, label: SocketLabel) -> &UdpSocket {
        match label {
            SocketLabel::Auth => &self.auth,
            SocketLabel::Acct => &self.acct,
            SocketLabel::Proxy => &self.proxy,
            SocketLabel::Dhcp => &self.dhcp,
        }
    }

    /// Receives exactly one datagram from the socket named by `label`.
    pub async fn recv_from(&self, label: SocketLabel) -> io::Result<(Vec<u8>, SocketAddrV4)> {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        let (len, addr) = self.socket(label).recv_from(&mut buf).await?;
        let addr = match addr {
            std::net::SocketAddr::V4(v4) => v4,
            std::net::SocketAddr::V6(_) => {
                return Err(io::Error::new(io::ErrorKind::InvalidInput, "IPv6 sender on a v4 socket"))
            }
        };
        Ok((buf[..len].to_vec(), addr))
    }

    pub async fn send_to(&self, label: SocketLabel, dst: SocketAddrV4, bytes: &[u8]) -> io::Result<usize> {
        self.socket(label).send_to(bytes, dst).await
    }
}
