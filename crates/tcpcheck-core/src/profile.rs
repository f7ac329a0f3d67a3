//! Service profiles selected by invocation name
//!
//! The same binary answers to several names (`check_tcp`, `check_ftp`, ...).
//! Each name carries protocol defaults which are applied before any
//! user-supplied option.

use crate::config::{ConfigError, TransportKind};

/// Protocol defaults for one invocation name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceProfile {
    /// Lookup key, e.g. "ftp"
    pub name: &'static str,
    /// Label printed in the summary line
    pub label: &'static str,
    pub port: Option<u16>,
    pub transport: TransportKind,
    pub send: Option<&'static str>,
    pub expect: &'static [&'static str],
    pub quit: Option<&'static str>,
}

const fn profile(
    name: &'static str,
    label: &'static str,
    port: Option<u16>,
    transport: TransportKind,
    expect: &'static [&'static str],
    quit: Option<&'static str>,
) -> ServiceProfile {
    ServiceProfile {
        name,
        label,
        port,
        transport,
        send: None,
        expect,
        quit,
    }
}

/// All known profiles; the first entry is the generic fallback
pub const PROFILES: &[ServiceProfile] = &[
    profile("tcp", "TCP", None, TransportKind::Tcp, &[], None),
    profile("udp", "UDP", None, TransportKind::Udp, &[], None),
    profile("ftp", "FTP", Some(21), TransportKind::Tcp, &["220"], Some("QUIT\r\n")),
    profile("smtp", "SMTP", Some(25), TransportKind::Tcp, &["220"], Some("QUIT\r\n")),
    profile("pop", "POP", Some(110), TransportKind::Tcp, &["+OK"], Some("QUIT\r\n")),
    profile("imap", "IMAP", Some(143), TransportKind::Tcp, &["* OK"], Some("a1 LOGOUT\r\n")),
    profile("simap", "SIMAP", Some(993), TransportKind::Tls, &["* OK"], Some("a1 LOGOUT\r\n")),
    profile("spop", "SPOP", Some(995), TransportKind::Tls, &["+OK"], Some("QUIT\r\n")),
    profile("nntp", "NNTP", Some(119), TransportKind::Tcp, &["200", "201"], Some("QUIT\r\n")),
];

impl ServiceProfile {
    /// Find the profile for an invocation name
    ///
    /// Accepts bare names (`ftp`), plugin names (`check_ftp`) and full paths
    /// (`/usr/lib/nagios/plugins/check_ftp`, `check_ftp.exe`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownService`] if no profile matches.
    pub fn lookup(invocation: &str) -> Result<&'static Self, ConfigError> {
        let key = service_key(invocation);
        PROFILES
            .iter()
            .find(|p| p.name == key)
            .ok_or_else(|| ConfigError::UnknownService(invocation.to_string()))
    }

    /// The generic TCP profile
    #[must_use]
    pub fn generic() -> &'static Self {
        &PROFILES[0]
    }
}

/// `"/opt/plugins/check_FTP.exe"` → `"ftp"`
fn service_key(invocation: &str) -> String {
    let file = invocation
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(invocation);
    let stem = file.strip_suffix(".exe").unwrap_or(file);
    let name = stem.strip_prefix("check_").unwrap_or(stem);
    name.to_ascii_lowercase()
}
