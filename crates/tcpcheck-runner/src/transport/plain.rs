//! Unencrypted TCP and UDP transports

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, UdpSocket};
use std::time::Duration;

use super::Transport;

/// TCP stream or connected UDP socket
#[derive(Debug)]
pub enum PlainTransport {
    Stream(TcpStream),
    /// Each write is one datagram; each read receives one datagram
    Datagram(UdpSocket),
}

impl Read for PlainTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Stream(stream) => stream.read(buf),
            Self::Datagram(socket) => socket.recv(buf),
        }
    }
}

impl Write for PlainTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stream(stream) => stream.write(buf),
            Self::Datagram(socket) => socket.send(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stream(stream) => stream.flush(),
            Self::Datagram(_) => Ok(()),
        }
    }
}

impl Transport for PlainTransport {
    fn set_io_timeout(&mut self, limit: Duration) -> io::Result<()> {
        match self {
            Self::Stream(stream) => {
                stream.set_read_timeout(Some(limit))?;
                stream.set_write_timeout(Some(limit))
            }
            Self::Datagram(socket) => {
                socket.set_read_timeout(Some(limit))?;
                socket.set_write_timeout(Some(limit))
            }
        }
    }

    fn close(&mut self) {
        if let Self::Stream(stream) = self {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Stream(_) => "tcp",
            Self::Datagram(_) => "udp",
        }
    }
}
