//! Verdict rendering for stdout

use serde_json::{Value, json};

use tcpcheck_core::{ProbeConfig, Verdict};

/// One-line plugin summary with perfdata
///
/// `SMTP OK - 0.012 second response time on port 25 [220 ready]|time=0.012`
pub fn summary_line(label: &str, port: u16, verdict: &Verdict) -> String {
    let secs = verdict.elapsed_secs();
    let refused = if verdict.refused() { " (refused)" } else { "" };
    let mut line = format!(
        "{label} {}{refused} - {secs:.3} second response time on port {port}",
        verdict.state()
    );

    let response = single_line(verdict.response());
    if !response.is_empty() {
        line.push_str(&format!(" [{response}]"));
    }
    line.push_str(&format!("|time={secs:.3}"));
    line
}

/// Machine-readable verdict for `--output json`
pub fn to_json(config: &ProbeConfig, verdict: &Verdict) -> Value {
    json!({
        "service": config.service,
        "host": config.host,
        "port": config.port,
        "state": verdict.state(),
        "status": verdict.state().as_str(),
        "exit_code": verdict.exit_code(),
        "elapsed_secs": verdict.elapsed_secs(),
        "response": verdict.response(),
        "detail": verdict.detail(),
        "refused": verdict.refused(),
    })
}

/// Multi-line banners are joined so the summary stays on one line
fn single_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tcpcheck_core::{ConnectOutcome, MatchOutcome, RefusalPolicy, SessionOutcome, compose};

    fn verdict(
        connect: ConnectOutcome,
        session: SessionOutcome,
        matched: MatchOutcome,
        response: &str,
        millis: u64,
        config: &ProbeConfig,
    ) -> Verdict {
        compose(
            &connect,
            &session,
            &matched,
            response,
            Duration::from_millis(millis),
            config,
        )
    }

    #[test]
    fn connect_only_has_no_brackets() {
        let config = ProbeConfig::new("127.0.0.1", 80);
        let v = verdict(
            ConnectOutcome::Connected(()),
            SessionOutcome::Completed,
            MatchOutcome::Matched { pattern: None },
            "",
            52,
            &config,
        );
        insta::assert_snapshot!(
            summary_line("TCP", 80, &v),
            @"TCP OK - 0.052 second response time on port 80|time=0.052"
        );
    }

    #[test]
    fn response_is_bracketed() {
        let config = ProbeConfig::new("mail.example.com", 25).with_expect("220");
        let v = verdict(
            ConnectOutcome::Connected(()),
            SessionOutcome::Completed,
            MatchOutcome::Matched {
                pattern: Some("220".to_string()),
            },
            "220 mail.example.com ESMTP\r\n",
            7,
            &config,
        );
        insta::assert_snapshot!(
            summary_line("SMTP", 25, &v),
            @"SMTP OK - 0.007 second response time on port 25 [220 mail.example.com ESMTP]|time=0.007"
        );
    }

    #[test]
    fn mismatch_is_warning() {
        let config = ProbeConfig::new("ftp.example.com", 21).with_expect("220");
        let v = verdict(
            ConnectOutcome::Connected(()),
            SessionOutcome::Completed,
            MatchOutcome::Mismatch,
            "421 service not available\r\n",
            1234,
            &config,
        );
        insta::assert_snapshot!(
            summary_line("FTP", 21, &v),
            @"FTP WARNING - 1.234 second response time on port 21 [421 service not available]|time=1.234"
        );
    }

    #[test]
    fn refusal_is_annotated() {
        let config = ProbeConfig::new("127.0.0.1", 5666).with_refusal(RefusalPolicy::Healthy);
        let v = verdict(
            ConnectOutcome::Refused,
            SessionOutcome::NotStarted,
            MatchOutcome::NotEvaluated,
            "",
            1,
            &config,
        );
        insta::assert_snapshot!(
            summary_line("TCP", 5666, &v),
            @"TCP OK (refused) - 0.001 second response time on port 5666|time=0.001"
        );
    }

    #[test]
    fn timeout_is_unknown() {
        let v = Verdict::indeterminate(Duration::from_secs(10));
        insta::assert_snapshot!(
            summary_line("IMAP", 143, &v),
            @"IMAP UNKNOWN - 10.000 second response time on port 143|time=10.000"
        );
    }

    #[test]
    fn multi_line_banner_is_joined() {
        assert_eq!(
            single_line("220-first\r\n220-second\r\n\r\n220 last"),
            "220-first 220-second 220 last"
        );
    }

    #[test]
    fn json_carries_target_and_verdict() {
        let config = ProbeConfig::new("127.0.0.1", 110).with_service("POP");
        let v = verdict(
            ConnectOutcome::Connected(()),
            SessionOutcome::NoData,
            MatchOutcome::NotEvaluated,
            "",
            20,
            &config,
        );
        let value = to_json(&config, &v);

        assert_eq!(value["service"], "POP");
        assert_eq!(value["port"], 110);
        assert_eq!(value["state"], "failed");
        assert_eq!(value["status"], "CRITICAL");
        assert_eq!(value["exit_code"], 2);
        assert_eq!(value["elapsed_secs"], 0.02);
        assert_eq!(value["detail"], "no data received from host");
        assert_eq!(value["refused"], false);
    }
}
