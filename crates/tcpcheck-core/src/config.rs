//! Probe configuration
//!
//! A [`ProbeConfig`] is built once (from a service profile, an optional config
//! file and command-line overrides), validated, and then passed by reference to
//! every stage of the probe. Nothing downstream mutates it.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::profile::ServiceProfile;
use crate::verdict::State;

/// Host probed when none is given
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Overall probe budget when none is given
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport used to reach the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    Udp,
    /// TLS over a TCP stream
    Tls,
}

impl TransportKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Tls => "tls",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State reported when the target actively refuses the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefusalPolicy {
    #[serde(alias = "ok")]
    Healthy,
    #[serde(alias = "warn")]
    Degraded,
    #[default]
    #[serde(alias = "crit")]
    Failed,
}

impl RefusalPolicy {
    #[must_use]
    pub const fn state(self) -> State {
        match self {
            Self::Healthy => State::Healthy,
            Self::Degraded => State::Degraded,
            Self::Failed => State::Failed,
        }
    }
}

/// Which resolved addresses the connector may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    Any,
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    #[must_use]
    pub const fn accepts(self, ip: &IpAddr) -> bool {
        match self {
            Self::Any => true,
            Self::Ipv4 => ip.is_ipv4(),
            Self::Ipv6 => ip.is_ipv6(),
        }
    }
}

/// Everything one probe needs to know
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Service label shown in the summary line, e.g. "TCP" or "FTP"
    pub service: String,

    /// Host name or literal address of the target
    pub host: String,

    /// Target port (must be set before validation)
    pub port: u16,

    pub transport: TransportKind,

    /// Payload sent after connecting; a CRLF is appended on the wire
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send: Option<String>,

    /// Payload written before closing, sent verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quit: Option<String>,

    /// Substrings of which at least one must appear in the response
    pub expect: Vec<String>,

    /// Stop reading once this many bytes have been received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<usize>,

    /// Pause between sending and reading, in seconds
    #[serde(with = "opt_secs", skip_serializing_if = "Option::is_none")]
    pub delay: Option<Duration>,

    /// Response time above which the probe is degraded, in seconds
    #[serde(with = "opt_secs", skip_serializing_if = "Option::is_none")]
    pub warning_time: Option<Duration>,

    /// Response time above which the probe fails, in seconds
    #[serde(with = "opt_secs", skip_serializing_if = "Option::is_none")]
    pub critical_time: Option<Duration>,

    /// Budget for the whole probe (connect, send, receive, quit), in seconds
    #[serde(with = "secs")]
    pub timeout: Duration,

    pub refusal: RefusalPolicy,

    pub address_family: AddressFamily,

    /// Status codes whose presence degrades the result
    pub warning_codes: Vec<String>,

    /// Status codes whose presence fails the result
    pub critical_codes: Vec<String>,

    /// Verify the peer certificate chain on TLS connections
    pub verify_certificates: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            service: "TCP".to_string(),
            host: DEFAULT_HOST.to_string(),
            port: 0,
            transport: TransportKind::Tcp,
            send: None,
            quit: None,
            expect: Vec::new(),
            max_bytes: None,
            delay: None,
            warning_time: None,
            critical_time: None,
            timeout: DEFAULT_TIMEOUT,
            refusal: RefusalPolicy::Failed,
            address_family: AddressFamily::Any,
            warning_codes: Vec::new(),
            critical_codes: Vec::new(),
            verify_certificates: false,
        }
    }
}

impl ProbeConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Start from a service profile's defaults
    #[must_use]
    pub fn from_profile(profile: &ServiceProfile) -> Self {
        Self {
            service: profile.label.to_string(),
            port: profile.port.unwrap_or(0),
            transport: profile.transport,
            send: profile.send.map(str::to_string),
            quit: profile.quit.map(str::to_string),
            expect: profile.expect.iter().map(|s| (*s).to_string()).collect(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn with_send(mut self, send: impl Into<String>) -> Self {
        self.send = Some(send.into());
        self
    }

    #[must_use]
    pub fn with_quit(mut self, quit: impl Into<String>) -> Self {
        self.quit = Some(quit.into());
        self
    }

    /// Append one expected substring
    #[must_use]
    pub fn with_expect(mut self, pattern: impl Into<String>) -> Self {
        self.expect.push(pattern.into());
        self
    }

    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_warning_time(mut self, threshold: Duration) -> Self {
        self.warning_time = Some(threshold);
        self
    }

    #[must_use]
    pub fn with_critical_time(mut self, threshold: Duration) -> Self {
        self.critical_time = Some(threshold);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_refusal(mut self, refusal: RefusalPolicy) -> Self {
        self.refusal = refusal;
        self
    }

    #[must_use]
    pub fn with_address_family(mut self, family: AddressFamily) -> Self {
        self.address_family = family;
        self
    }

    #[must_use]
    pub fn with_warning_code(mut self, code: impl Into<String>) -> Self {
        self.warning_codes.push(code.into());
        self
    }

    #[must_use]
    pub fn with_critical_code(mut self, code: impl Into<String>) -> Self {
        self.critical_codes.push(code.into());
        self
    }

    #[must_use]
    pub fn with_verify_certificates(mut self, verify: bool) -> Self {
        self.verify_certificates = verify;
        self
    }

    /// Whether the probe reads a response at all
    ///
    /// Without a payload to send and nothing to expect the probe is connect-only.
    #[must_use]
    pub fn wants_response(&self) -> bool {
        self.send.is_some() || !self.expect.is_empty()
    }

    /// Check the invariants the probe engine relies on
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_host(&self.host) {
            return Err(ConfigError::InvalidHost(self.host.clone()));
        }
        if self.port == 0 {
            return Err(ConfigError::MissingPort);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.max_bytes == Some(0) {
            return Err(ConfigError::InvalidMaxBytes);
        }
        Ok(())
    }

    /// Load config from file
    ///
    /// Files ending in `.json` are parsed as JSON, anything else as TOML.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Create example config file
    pub fn example() -> &'static str {
        r#"# tcpcheck probe configuration
#
# Flags given on the command line override every value here.

service = "SMTP"
host = "mail.example.com"
port = 25

# tcp, udp or tls
transport = "tcp"

# Sent after connecting (CRLF is appended)
# send = "EHLO monitor.example.com"

# Sent verbatim before closing
quit = "QUIT\r\n"

# At least one must appear in the response
expect = ["220"]

# Status codes that override the match result
# warning_codes = ["421"]
# critical_codes = ["554"]

# Stop reading after this many bytes
# max_bytes = 4096

# Seconds to wait between sending and reading
# delay = 1.0

# Response time thresholds in seconds
warning_time = 2.0
critical_time = 5.0

# Budget for the whole probe in seconds
timeout = 10.0

# healthy, degraded or failed when the connection is refused
refusal = "failed"

# any, ipv4 or ipv6
address_family = "any"

# Verify peer certificates on tls probes
verify_certificates = false
"#
    }
}

/// Host name or literal address, as accepted on the command line
fn is_host(host: &str) -> bool {
    if host.is_empty() {
        return false;
    }
    if host.parse::<IpAddr>().is_ok() {
        return true;
    }
    host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid host name or address: {0:?}")]
    InvalidHost(String),
    #[error("Server port must be set (1-65535)")]
    MissingPort,
    #[error("Timeout interval must be positive")]
    InvalidTimeout,
    #[error("Maxbytes must be a positive integer")]
    InvalidMaxBytes,
    #[error("Unknown service: {0}")]
    UnknownService(String),
}

/// `Duration` as fractional seconds
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// `Option<Duration>` as fractional seconds
mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
