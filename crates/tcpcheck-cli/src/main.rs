//! check_tcp - single-probe TCP/UDP/TLS service check
//!
//! Installed under several names (`check_ftp`, `check_imap`, ...); the name
//! it is invoked as selects the protocol defaults.

mod report;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tcpcheck_core::{AddressFamily, ProbeConfig, RefusalPolicy, ServiceProfile, TransportKind};
use tcpcheck_runner::Prober;

/// Written by `--init`
const CONFIG_FILE: &str = ".tcpcheck.toml";

#[derive(Debug, Parser)]
#[command(name = "check_tcp")]
#[command(about = "Probe a TCP, UDP or TLS service with a single connection")]
#[command(version)]
struct Cli {
    /// Host name or address (same as -H)
    #[arg(value_name = "HOST")]
    target: Option<String>,

    /// Host name or address
    #[arg(short = 'H', long = "hostname")]
    hostname: Option<String>,

    /// Port number
    #[arg(short, long)]
    port: Option<u16>,

    /// Response time in seconds above which the result is WARNING
    #[arg(short, long = "warning-time", value_parser = parse_secs)]
    warning: Option<Duration>,

    /// Response time in seconds above which the result is CRITICAL
    #[arg(short, long = "critical-time", value_parser = parse_secs)]
    critical: Option<Duration>,

    /// String to send to the server (CRLF is appended)
    #[arg(short, long)]
    send: Option<String>,

    /// String to expect in the server response (repeatable, any may match)
    #[arg(short, long)]
    expect: Vec<String>,

    /// String to send to the server before closing
    #[arg(short, long)]
    quit: Option<String>,

    /// Close the connection once this many bytes have been received
    #[arg(short = 'm', long = "maxbytes")]
    max_bytes: Option<usize>,

    /// Seconds to wait between sending and reading
    #[arg(short, long, value_parser = parse_secs)]
    delay: Option<Duration>,

    /// Seconds before the probe is abandoned as UNKNOWN
    #[arg(short, long, value_parser = parse_secs)]
    timeout: Option<Duration>,

    /// State to report when the connection is refused
    #[arg(short, long = "refuse")]
    refuse: Option<RefuseArg>,

    /// Status code that makes the result WARNING (repeatable)
    #[arg(short = 'W', long = "warning-codes")]
    warning_codes: Vec<String>,

    /// Status code that makes the result CRITICAL (repeatable)
    #[arg(short = 'C', long = "critical-codes")]
    critical_codes: Vec<String>,

    /// Use TLS for the connection
    #[arg(short = 'S', long = "ssl", conflicts_with = "udp")]
    ssl: bool,

    /// Use UDP instead of TCP
    #[arg(long)]
    udp: bool,

    /// Verify the server certificate on TLS connections
    #[arg(long = "verify-cert")]
    verify_cert: bool,

    /// Only connect over IPv4
    #[arg(short = '4', long = "use-ipv4", conflicts_with = "ipv6")]
    ipv4: bool,

    /// Only connect over IPv6
    #[arg(short = '6', long = "use-ipv6")]
    ipv6: bool,

    /// Log to stderr (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Service profile to use (default: taken from the program name)
    #[arg(long)]
    service: Option<String>,

    /// Probe configuration file (TOML, or JSON by extension)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "terminal")]
    output: OutputFormat,

    /// Write an example config to .tcpcheck.toml and exit
    #[arg(long)]
    init: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RefuseArg {
    Ok,
    Warn,
    Crit,
}

impl From<RefuseArg> for RefusalPolicy {
    fn from(arg: RefuseArg) -> Self {
        match arg {
            RefuseArg::Ok => RefusalPolicy::Healthy,
            RefuseArg::Warn => RefusalPolicy::Degraded,
            RefuseArg::Crit => RefusalPolicy::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
    Silent,
}

impl Cli {
    /// Apply command-line overrides on top of `config`
    fn apply(&self, mut config: ProbeConfig) -> ProbeConfig {
        if let Some(host) = self.hostname.as_ref().or(self.target.as_ref()) {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.udp {
            config.transport = TransportKind::Udp;
        }
        if self.ssl {
            config.transport = TransportKind::Tls;
        }
        if let Some(send) = &self.send {
            config.send = Some(send.clone());
        }
        if let Some(quit) = &self.quit {
            config.quit = Some(quit.clone());
        }
        if !self.expect.is_empty() {
            config.expect.clone_from(&self.expect);
        }
        if let Some(max_bytes) = self.max_bytes {
            config.max_bytes = Some(max_bytes);
        }
        if let Some(delay) = self.delay {
            config.delay = Some(delay);
        }
        if let Some(warning) = self.warning {
            config.warning_time = Some(warning);
        }
        if let Some(critical) = self.critical {
            config.critical_time = Some(critical);
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(refuse) = self.refuse {
            config.refusal = refuse.into();
        }
        if !self.warning_codes.is_empty() {
            config.warning_codes.clone_from(&self.warning_codes);
        }
        if !self.critical_codes.is_empty() {
            config.critical_codes.clone_from(&self.critical_codes);
        }
        if self.verify_cert {
            config.verify_certificates = true;
        }
        if self.ipv4 {
            config.address_family = AddressFamily::Ipv4;
        }
        if self.ipv6 {
            config.address_family = AddressFamily::Ipv6;
        }
        config
    }
}

/// Non-negative, finite number of seconds
fn parse_secs(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw
        .parse()
        .map_err(|_| format!("{raw:?} is not a number of seconds"))?;
    if secs.is_sign_negative() {
        return Err(format!("{raw:?} must not be negative"));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{raw:?}: {e}"))
}

/// Rewrite the old two-letter spellings `-to`, `-wt` and `-ct`
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some("-to") => OsString::from("-t"),
            Some("-wt") => OsString::from("-w"),
            Some("-ct") => OsString::from("-c"),
            _ => arg,
        })
        .collect()
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Stdout carries the summary line only
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let args = normalize_args(std::env::args_os());
    let invocation = args
        .first()
        .map(|arg| arg.to_string_lossy().into_owned())
        .unwrap_or_default();

    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(3)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing(cli.verbose);

    match run(&cli, &invocation) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(3)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(3)
        }
    }
}

fn run(cli: &Cli, invocation: &str) -> Result<i32> {
    if cli.init {
        return init(Path::new(CONFIG_FILE));
    }

    let config = cli.apply(base_config(cli, invocation)?);
    debug!(?config, "effective configuration");

    let prober = Prober::new(config)?;
    let verdict = prober.run();
    let config = prober.config();

    match cli.output {
        OutputFormat::Terminal => {
            println!(
                "{}",
                report::summary_line(&config.service, config.port, &verdict)
            );
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&report::to_json(config, &verdict))?
            );
        }
        OutputFormat::Silent => {}
    }

    Ok(verdict.exit_code())
}

/// Config file if given, otherwise the defaults of the selected profile
fn base_config(cli: &Cli, invocation: &str) -> Result<ProbeConfig> {
    if let Some(path) = &cli.config {
        return ProbeConfig::load(path).with_context(|| format!("loading {}", path.display()));
    }

    let profile = match &cli.service {
        Some(name) => ServiceProfile::lookup(name)?,
        None => ServiceProfile::lookup(invocation).unwrap_or_else(|_| ServiceProfile::generic()),
    };
    debug!(profile = profile.name, "service profile selected");
    Ok(ProbeConfig::from_profile(profile))
}

fn init(path: &Path) -> Result<i32> {
    if path.exists() {
        eprintln!("{} already exists", path.display());
        return Ok(1);
    }

    std::fs::write(path, ProbeConfig::example())
        .with_context(|| format!("writing {}", path.display()))?;
    println!("Created {}", path.display());
    println!("\nEdit the file to configure:");
    println!("  - host, port: target to probe");
    println!("  - send, expect, quit: the conversation");
    println!("  - warning_time, critical_time, timeout: thresholds in seconds");
    println!("\nThen run: check_tcp --config {}", path.display());
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let args = normalize_args(args.iter().map(OsString::from));
        Cli::try_parse_from(args).unwrap()
    }

    fn effective(args: &[&str]) -> ProbeConfig {
        let cli = parse(args);
        cli.apply(base_config(&cli, args[0]).unwrap())
    }

    #[test]
    fn invocation_name_selects_profile() {
        let config = effective(&["/usr/lib/nagios/plugins/check_ftp", "-H", "ftp.example.com"]);
        assert_eq!(config.service, "FTP");
        assert_eq!(config.port, 21);
        assert_eq!(config.expect, vec!["220"]);
        assert_eq!(config.quit.as_deref(), Some("QUIT\r\n"));
        assert_eq!(config.host, "ftp.example.com");
    }

    #[test]
    fn unknown_invocation_falls_back_to_tcp() {
        let config = effective(&["tcpcheck", "-p", "80"]);
        assert_eq!(config.service, "TCP");
        assert_eq!(config.port, 80);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn service_flag_beats_invocation_name() {
        let config = effective(&["check_tcp", "--service", "simap", "mail.example.com"]);
        assert_eq!(config.service, "SIMAP");
        assert_eq!(config.transport, TransportKind::Tls);
        assert_eq!(config.port, 993);
        assert_eq!(config.host, "mail.example.com");
    }

    #[test]
    fn unknown_service_flag_is_an_error() {
        let cli = parse(&["check_tcp", "--service", "gopher"]);
        let err = base_config(&cli, "check_tcp").unwrap_err();
        assert_eq!(err.to_string(), "Unknown service: gopher");
    }

    #[test]
    fn flags_override_profile() {
        let config = effective(&[
            "check_smtp", "-H", "mx", "-p", "2525", "-e", "250", "-e", "220", "-q", "BYE", "-r",
            "warn", "-w", "0.5", "-c", "2", "-m", "64", "-d", "1.5",
        ]);
        assert_eq!(config.port, 2525);
        assert_eq!(config.expect, vec!["250", "220"]);
        assert_eq!(config.quit.as_deref(), Some("BYE"));
        assert_eq!(config.refusal, RefusalPolicy::Degraded);
        assert_eq!(config.warning_time, Some(Duration::from_millis(500)));
        assert_eq!(config.critical_time, Some(Duration::from_secs(2)));
        assert_eq!(config.max_bytes, Some(64));
        assert_eq!(config.delay, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn hostname_flag_beats_positional() {
        let config = effective(&["check_tcp", "positional", "-H", "flag", "-p", "1"]);
        assert_eq!(config.host, "flag");
    }

    #[test]
    fn legacy_spellings_are_rewritten() {
        let config = effective(&["check_tcp", "-p", "22", "-to", "3", "-wt", "1", "-ct", "2"]);
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.warning_time, Some(Duration::from_secs(1)));
        assert_eq!(config.critical_time, Some(Duration::from_secs(2)));
    }

    #[test]
    fn transport_and_family_flags() {
        let config = effective(&["check_tcp", "-p", "53", "--udp", "-6"]);
        assert_eq!(config.transport, TransportKind::Udp);
        assert_eq!(config.address_family, AddressFamily::Ipv6);

        let config = effective(&["check_tcp", "-p", "443", "-S", "--verify-cert", "-4"]);
        assert_eq!(config.transport, TransportKind::Tls);
        assert!(config.verify_certificates);
        assert_eq!(config.address_family, AddressFamily::Ipv4);
    }

    #[test]
    fn status_codes_accumulate() {
        let config = effective(&["check_tcp", "-p", "21", "-W", "421", "-C", "530", "-C", "554"]);
        assert_eq!(config.warning_codes, vec!["421"]);
        assert_eq!(config.critical_codes, vec!["530", "554"]);
    }

    #[test]
    fn bad_arguments_are_rejected() {
        let args = |list: &[&str]| Cli::try_parse_from(normalize_args(list.iter().map(OsString::from)));
        assert!(args(&["check_tcp", "-r", "maybe"]).is_err());
        assert!(args(&["check_tcp", "-t", "-1"]).is_err());
        assert!(args(&["check_tcp", "-w", "soon"]).is_err());
        assert!(args(&["check_tcp", "-p", "70000"]).is_err());
        assert!(args(&["check_tcp", "-4", "-6"]).is_err());
        assert!(args(&["check_tcp", "-S", "--udp"]).is_err());
    }

    #[test]
    fn parse_secs_accepts_fractions() {
        assert_eq!(parse_secs("0.25"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_secs("0"), Ok(Duration::ZERO));
        assert!(parse_secs("inf").is_err());
        assert!(parse_secs("-0.5").is_err());
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        assert_eq!(init(&path).unwrap(), 0);
        assert!(ProbeConfig::load(&path).is_ok());
        assert_eq!(init(&path).unwrap(), 1);
    }
}
