//! Transport establishment and connect-time failure classification

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;

use tracing::debug;

use tcpcheck_core::{ConnectOutcome, ProbeConfig, TransportKind};

use crate::deadline::Deadline;
use crate::error::ProbeError;
use crate::transport::{PlainTransport, Transport};

/// Live connection handed from the connector to the exchanger
pub type Connection = Box<dyn Transport>;

/// Open the configured transport to `config.host:config.port`
///
/// Every resolved address of the preferred family is tried in order within
/// the one probe budget. The outcome of the last attempt is reported if none
/// succeeds.
pub fn connect(config: &ProbeConfig, deadline: &Deadline) -> ConnectOutcome<Connection> {
    let addrs = match resolve(config, deadline) {
        Ok(addrs) => addrs,
        Err(ProbeError::DeadlineExceeded) => {
            debug!(host = %config.host, "resolution timed out");
            return ConnectOutcome::TimedOut;
        }
        Err(e) => {
            debug!(host = %config.host, error = %e, "resolution failed");
            return ConnectOutcome::Error(e.to_string());
        }
    };

    match config.transport {
        TransportKind::Udp => connect_datagram(&addrs),
        TransportKind::Tcp => match connect_stream(&addrs, deadline) {
            ConnectOutcome::Connected(stream) => {
                ConnectOutcome::Connected(Box::new(PlainTransport::Stream(stream)))
            }
            ConnectOutcome::Refused => ConnectOutcome::Refused,
            ConnectOutcome::TimedOut => ConnectOutcome::TimedOut,
            ConnectOutcome::Error(detail) => ConnectOutcome::Error(detail),
        },
        TransportKind::Tls => match connect_stream(&addrs, deadline) {
            ConnectOutcome::Connected(stream) => secure(stream, config, deadline),
            ConnectOutcome::Refused => ConnectOutcome::Refused,
            ConnectOutcome::TimedOut => ConnectOutcome::TimedOut,
            ConnectOutcome::Error(detail) => ConnectOutcome::Error(detail),
        },
    }
}

/// Resolve the target, keeping only addresses of the preferred family
fn resolve(config: &ProbeConfig, deadline: &Deadline) -> Result<Vec<SocketAddr>, ProbeError> {
    resolve_with(config, deadline, system_lookup)
}

fn system_lookup(host: String, port: u16) -> io::Result<Vec<SocketAddr>> {
    Ok((host.as_str(), port).to_socket_addrs()?.collect())
}

/// Run `lookup` on a helper thread and wait for it no longer than the budget
///
/// The system resolver cannot be interrupted. A lookup that outlives the
/// budget is abandoned and its thread exits once the resolver returns.
fn resolve_with<F>(
    config: &ProbeConfig,
    deadline: &Deadline,
    lookup: F,
) -> Result<Vec<SocketAddr>, ProbeError>
where
    F: FnOnce(String, u16) -> io::Result<Vec<SocketAddr>> + Send + 'static,
{
    let limit = deadline.budget_left()?;
    let (tx, rx) = mpsc::channel();
    let (host, port) = (config.host.clone(), config.port);
    thread::Builder::new()
        .name("resolver".to_string())
        .spawn(move || {
            let _ = tx.send(lookup(host, port));
        })
        .map_err(|e| ProbeError::Resolve(config.host.clone(), e.to_string()))?;

    let found = match rx.recv_timeout(limit) {
        Ok(found) => found.map_err(|e| ProbeError::Resolve(config.host.clone(), e.to_string()))?,
        Err(RecvTimeoutError::Timeout) => return Err(ProbeError::DeadlineExceeded),
        Err(RecvTimeoutError::Disconnected) => {
            return Err(ProbeError::Resolve(
                config.host.clone(),
                "resolver exited without an answer".to_string(),
            ));
        }
    };

    let addrs: Vec<SocketAddr> = found
        .into_iter()
        .filter(|addr| config.address_family.accepts(&addr.ip()))
        .collect();

    if addrs.is_empty() {
        return Err(ProbeError::NoAddress(config.host.clone()));
    }
    Ok(addrs)
}

fn connect_stream(addrs: &[SocketAddr], deadline: &Deadline) -> ConnectOutcome<TcpStream> {
    let mut last = ConnectOutcome::Error("no address attempted".to_string());

    for addr in addrs {
        let Ok(limit) = deadline.budget_left() else {
            return ConnectOutcome::TimedOut;
        };
        debug!(%addr, limit_ms = limit.as_millis() as u64, "connecting");

        match TcpStream::connect_timeout(addr, limit) {
            Ok(stream) => {
                debug!(%addr, "connected");
                return ConnectOutcome::Connected(stream);
            }
            Err(e) => match attempt_failure(&e, deadline) {
                ConnectOutcome::TimedOut => {
                    debug!(%addr, "connect timed out");
                    return ConnectOutcome::TimedOut;
                }
                failure => {
                    debug!(%addr, error = %e, "connect failed");
                    last = failure;
                }
            },
        }
    }

    last
}

/// Classify one failed connect attempt
///
/// A timeout only ends the probe once the budget is spent. A kernel timeout
/// that fires earlier is an ordinary error and the next address is tried.
fn attempt_failure<C>(err: &io::Error, deadline: &Deadline) -> ConnectOutcome<C> {
    if err.kind() == io::ErrorKind::ConnectionRefused {
        return ConnectOutcome::Refused;
    }
    match ProbeError::from_io(err) {
        ProbeError::DeadlineExceeded if deadline.is_expired() => ConnectOutcome::TimedOut,
        ProbeError::DeadlineExceeded => ConnectOutcome::Error(err.to_string()),
        other => ConnectOutcome::Error(other.to_string()),
    }
}

/// Bind a local datagram socket and associate it with the first usable peer
///
/// Nothing is exchanged yet, so an unreachable UDP service cannot be detected
/// at this stage.
fn connect_datagram(addrs: &[SocketAddr]) -> ConnectOutcome<Connection> {
    let mut last = ConnectOutcome::Error("no address attempted".to_string());

    for addr in addrs {
        let local = if addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        match UdpSocket::bind(local).and_then(|socket| socket.connect(addr).map(|()| socket)) {
            Ok(socket) => {
                debug!(%addr, "datagram socket associated");
                return ConnectOutcome::Connected(Box::new(PlainTransport::Datagram(socket)));
            }
            Err(e) => {
                debug!(%addr, error = %e, "datagram association failed");
                last = ConnectOutcome::Error(e.to_string());
            }
        }
    }

    last
}

#[cfg(feature = "tls")]
fn secure(stream: TcpStream, config: &ProbeConfig, deadline: &Deadline) -> ConnectOutcome<Connection> {
    use crate::transport::SecureTransport;

    match SecureTransport::handshake(stream, &config.host, config.verify_certificates, deadline) {
        Ok(transport) => ConnectOutcome::Connected(Box::new(transport)),
        Err(ProbeError::DeadlineExceeded) => ConnectOutcome::TimedOut,
        Err(e) => {
            debug!(error = %e, "tls handshake failed");
            ConnectOutcome::Error(e.to_string())
        }
    }
}

#[cfg(not(feature = "tls"))]
fn secure(_stream: TcpStream, _config: &ProbeConfig, _deadline: &Deadline) -> ConnectOutcome<Connection> {
    ConnectOutcome::Error(ProbeError::TlsUnavailable.to_string())
}
