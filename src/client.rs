use std::fmt::Display;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::{Mutex, PoisonError};

use crate::common::{BuildError, ClientError};
use crate::formatting::{write_metric_line, MetricType};

/// The operations shared by every DogStatsD client of this crate.
///
/// Implemented by [`UdpClient`], the bare transport client, and by
/// [`RenewingClient`][crate::RenewingClient], which renews its transport client periodically,
/// so that calling code can depend on either interchangeably.
pub trait DogstatsdClient: Send + Sync {
    /// Tracks how many times something happened per second.
    fn count(&self, name: &str, value: i64, tags: &[&str], rate: f64) -> Result<(), ClientError>;

    /// Measures the value of a metric at a particular time.
    fn gauge(&self, name: &str, value: f64, tags: &[&str], rate: f64) -> Result<(), ClientError>;

    /// Sends timing information in milliseconds.
    fn time_in_milliseconds(
        &self,
        name: &str,
        value: f64,
        tags: &[&str],
        rate: f64,
    ) -> Result<(), ClientError>;

    /// Releases the client's network resources.
    fn close(&self) -> Result<(), ClientError>;
}

/// A DogStatsD client sending one datagram per sample over UDP.
///
/// The agent address is resolved once, when the client is created, and the socket stays
/// connected to that address for the lifetime of the client.
#[derive(Debug)]
pub struct UdpClient {
    socket: Mutex<Option<UdpSocket>>,
    peer: SocketAddr,
    namespace: String,
    tags: Vec<String>,
}

impl UdpClient {
    /// Creates a client sending to `address` with the given namespace and client tags.
    ///
    /// ## Errors
    ///
    /// Returns [`BuildError::TransportCreation`] if `address` cannot be resolved or a local
    /// socket cannot be bound and connected to it.
    pub fn connect(address: &str, namespace: &str, tags: Vec<String>) -> Result<Self, BuildError> {
        let resolved: Vec<SocketAddr> = address
            .to_socket_addrs()
            .map_err(|e| BuildError::transport(address, e))?
            .collect();
        let addrs = preferred_addrs(address.starts_with('['), resolved);
        let first = addrs.first().ok_or_else(|| {
            BuildError::transport(
                address,
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    "to_socket_addrs returned an empty iterator",
                ),
            )
        })?;

        let socket = if first.is_ipv4() {
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0))
        }
        .and_then(|socket| {
            socket.connect(&addrs[..])?;
            Ok(socket)
        })
        .map_err(|e| BuildError::transport(address, e))?;
        let peer = socket
            .peer_addr()
            .map_err(|e| BuildError::transport(address, e))?;

        Ok(UdpClient {
            socket: Mutex::new(Some(socket)),
            peer,
            namespace: namespace.to_string(),
            tags,
        })
    }

    /// The address this client is bound to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// The client tags sent with every sample.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    fn send<T: Display>(
        &self,
        mtype: MetricType,
        name: &str,
        value: T,
        tags: &[&str],
        rate: f64,
    ) -> Result<(), ClientError> {
        let socket = self.socket.lock().unwrap_or_else(PoisonError::into_inner);
        let socket = socket.as_ref().ok_or(ClientError::Closed)?;

        if rate < 1.0 && rand::random::<f64>() > rate {
            return Ok(());
        }

        let mut buffer = String::new();
        write_metric_line(
            &mut buffer,
            Some(self.namespace.as_str()),
            name,
            mtype,
            value,
            rate,
            &self.tags,
            tags,
        );

        let sent = socket.send(buffer.as_bytes())?;
        if sent != buffer.len() {
            tracing::error!(
                "Somehow this UDP socket sent less bytes ({}) than it was asked ({})",
                sent,
                buffer.len()
            );
        }
        Ok(())
    }
}

/// Picks the addresses to connect to among those a host resolved to.
///
/// Unless the host was written as a bracketed IPv6 literal, IPv4 addresses win whenever there
/// is one: agents usually listen on IPv4 only, and `localhost` often resolves to `::1` first.
fn preferred_addrs(bracketed: bool, addrs: Vec<SocketAddr>) -> Vec<SocketAddr> {
    if bracketed || !addrs.iter().any(SocketAddr::is_ipv4) {
        return addrs;
    }
    addrs.into_iter().filter(SocketAddr::is_ipv4).collect()
}

impl DogstatsdClient for UdpClient {
    fn count(&self, name: &str, value: i64, tags: &[&str], rate: f64) -> Result<(), ClientError> {
        self.send(MetricType::Count, name, value, tags, rate)
    }

    fn gauge(&self, name: &str, value: f64, tags: &[&str], rate: f64) -> Result<(), ClientError> {
        self.send(MetricType::Gauge, name, value, tags, rate)
    }

    fn time_in_milliseconds(
        &self,
        name: &str,
        value: f64,
        tags: &[&str],
        rate: f64,
    ) -> Result<(), ClientError> {
        self.send(MetricType::Timing, name, value, tags, rate)
    }

    fn close(&self) -> Result<(), ClientError> {
        // Dropping the socket closes it.
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}
