//! TLS over TCP

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, ring};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme, StreamOwned};
use rustls_platform_verifier::BuilderVerifierExt;
use tracing::debug;

use super::Transport;
use crate::deadline::Deadline;
use crate::error::ProbeError;

/// TLS session on top of a connected TCP stream
pub struct SecureTransport {
    stream: StreamOwned<ClientConnection, TcpStream>,
}

impl SecureTransport {
    /// Run the client handshake on `sock` within the probe budget
    ///
    /// # Errors
    ///
    /// [`ProbeError::DeadlineExceeded`] if the budget runs out mid-handshake,
    /// [`ProbeError::Tls`] for any protocol, certificate or peer-close failure.
    pub fn handshake(
        mut sock: TcpStream,
        host: &str,
        verify: bool,
        deadline: &Deadline,
    ) -> Result<Self, ProbeError> {
        let config = client_config(verify)?;
        let server_name =
            ServerName::try_from(host.to_string()).map_err(|e| ProbeError::Tls(e.to_string()))?;
        let mut conn = ClientConnection::new(Arc::new(config), server_name)
            .map_err(|e| ProbeError::Tls(e.to_string()))?;

        while conn.is_handshaking() {
            let limit = deadline.budget_left()?;
            sock.set_read_timeout(Some(limit))?;
            sock.set_write_timeout(Some(limit))?;
            conn.complete_io(&mut sock).map_err(|e| match ProbeError::from_io(&e) {
                ProbeError::DeadlineExceeded => ProbeError::DeadlineExceeded,
                _ => ProbeError::Tls(e.to_string()),
            })?;
        }

        debug!(
            version = ?conn.protocol_version(),
            suite = ?conn.negotiated_cipher_suite().map(|s| s.suite()),
            "tls handshake complete"
        );

        Ok(Self {
            stream: StreamOwned::new(conn, sock),
        })
    }
}

impl fmt::Debug for SecureTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureTransport")
            .field("peer", &self.stream.sock.peer_addr().ok())
            .field("version", &self.stream.conn.protocol_version())
            .finish()
    }
}

impl Read for SecureTransport {
    /// A TCP close without `close_notify` reads as end of stream
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!(error = %e, "peer closed without close_notify");
                Ok(0)
            }
            other => other,
        }
    }
}

impl Write for SecureTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Transport for SecureTransport {
    fn set_io_timeout(&mut self, limit: Duration) -> io::Result<()> {
        self.stream.sock.set_read_timeout(Some(limit))?;
        self.stream.sock.set_write_timeout(Some(limit))
    }

    fn close(&mut self) {
        self.stream.conn.send_close_notify();
        let _ = self.stream.conn.complete_io(&mut self.stream.sock);
        let _ = self.stream.sock.shutdown(Shutdown::Both);
    }

    fn kind(&self) -> &'static str {
        "tls"
    }
}

fn client_config(verify: bool) -> Result<ClientConfig, ProbeError> {
    let provider = Arc::new(ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Tls(e.to_string()))?;

    let config = if verify {
        builder.with_platform_verifier().with_no_client_auth()
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AnyServerCert { provider }))
            .with_no_client_auth()
    };
    Ok(config)
}

/// Accepts any certificate chain but still checks handshake signatures
///
/// A health probe only cares that the service speaks TLS and answers.
#[derive(Debug)]
struct AnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
