//! Transport capability
//!
//! The connector and exchanger are written once against [`Transport`].
//! [`PlainTransport`] covers TCP streams and connected UDP sockets;
//! [`SecureTransport`] (feature `tls`) wraps a TCP stream in TLS.

mod plain;
#[cfg(feature = "tls")]
mod secure;

use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;

pub use plain::PlainTransport;
#[cfg(feature = "tls")]
pub use secure::SecureTransport;

/// A connected byte channel to the target
pub trait Transport: Read + Write + fmt::Debug {
    /// Bound the next blocking read or write by `limit`
    ///
    /// # Errors
    ///
    /// Returns the socket error if the timeout cannot be applied.
    fn set_io_timeout(&mut self, limit: Duration) -> io::Result<()>;

    /// Orderly, best-effort close; errors are ignored
    fn close(&mut self);

    /// Short name for logs
    fn kind(&self) -> &'static str;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn set_io_timeout(&mut self, limit: Duration) -> io::Result<()> {
        (**self).set_io_timeout(limit)
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn kind(&self) -> &'static str {
        (**self).kind()
    }
}
