//! Scripted send / receive session over an established transport

use std::io::ErrorKind;

use tracing::{debug, trace};

use tcpcheck_core::response::TERMINATOR;
use tcpcheck_core::{ProbeConfig, ResponseBuffer, SessionOutcome};

use crate::deadline::Deadline;
use crate::error::{DeadlineExceeded, ProbeError};
use crate::transport::Transport;

/// Size of each read from the transport
const SCRATCH_SIZE: usize = 1024;

/// What the exchanger hands back once the connection is closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub buffer: ResponseBuffer,
    pub outcome: SessionOutcome,
}

/// Run the scripted exchange and close the connection
///
/// The connection is consumed: it is closed on every return path, including
/// budget expiry. Read/write failures end the session immediately and skip the
/// quit payload.
///
/// # Errors
///
/// Returns [`DeadlineExceeded`] if the budget ran out during the exchange;
/// every other failure is reported through [`SessionOutcome`].
pub fn exchange<T: Transport>(
    mut conn: T,
    config: &ProbeConfig,
    deadline: &Deadline,
) -> Result<Exchange, DeadlineExceeded> {
    let mut buffer = ResponseBuffer::new(config.max_bytes);

    let outcome = match converse(&mut conn, config, deadline, &mut buffer) {
        Ok(()) if config.wants_response() && buffer.is_empty() => {
            send_quit(&mut conn, config, deadline);
            SessionOutcome::NoData
        }
        Ok(()) => {
            send_quit(&mut conn, config, deadline);
            SessionOutcome::Completed
        }
        Err(ProbeError::DeadlineExceeded) => {
            debug!(received = buffer.len(), "budget exhausted mid-session");
            conn.close();
            return Err(DeadlineExceeded);
        }
        Err(e) => {
            debug!(error = %e, "session aborted");
            SessionOutcome::Error(e.to_string())
        }
    };

    conn.close();
    Ok(Exchange { buffer, outcome })
}

fn converse<T: Transport>(
    conn: &mut T,
    config: &ProbeConfig,
    deadline: &Deadline,
    buffer: &mut ResponseBuffer,
) -> Result<(), ProbeError> {
    if let Some(send) = &config.send {
        let mut payload = Vec::with_capacity(send.len() + TERMINATOR.len());
        payload.extend_from_slice(send.as_bytes());
        payload.extend_from_slice(TERMINATOR);
        write_fully(conn, &payload, deadline)?;
        debug!(bytes = payload.len(), "payload sent");
    }

    if let Some(delay) = config.delay {
        trace!(delay_ms = delay.as_millis() as u64, "waiting before read");
        deadline.sleep(delay)?;
    }

    if !config.wants_response() {
        debug!("connect-only probe, nothing to read");
        return Ok(());
    }

    let mut scratch = [0u8; SCRATCH_SIZE];
    loop {
        conn.set_io_timeout(deadline.budget_left()?)?;
        let n = match conn.read(&mut scratch) {
            Ok(0) => {
                trace!("peer closed the connection");
                break;
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProbeError::from_io(&e)),
        };
        buffer.extend(&scratch[..n]);
        trace!(chunk = n, total = buffer.len(), "received");

        if buffer.is_complete() {
            break;
        }
    }

    Ok(())
}

/// Write all of `payload`; a write that makes no progress is an error
fn write_fully<T: Transport>(
    conn: &mut T,
    payload: &[u8],
    deadline: &Deadline,
) -> Result<(), ProbeError> {
    let mut written = 0;
    while written < payload.len() {
        conn.set_io_timeout(deadline.budget_left()?)?;
        match conn.write(&payload[written..]) {
            Ok(0) => {
                return Err(ProbeError::PartialWrite {
                    written,
                    expected: payload.len(),
                });
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(ProbeError::from_io(&e)),
        }
    }
    conn.flush().map_err(|e| ProbeError::from_io(&e))
}

/// Courtesy close; failures here never change the result
fn send_quit<T: Transport>(conn: &mut T, config: &ProbeConfig, deadline: &Deadline) {
    let Some(quit) = &config.quit else {
        return;
    };
    match write_fully(conn, quit.as_bytes(), deadline) {
        Ok(()) => debug!("quit sent"),
        Err(e) => debug!(error = %e, "quit not sent"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::time::Duration;

    /// Scripted transport: replays reads, records writes
    #[derive(Debug, Default)]
    struct Scripted {
        reads: VecDeque<io::Result<Vec<u8>>>,
        written: Vec<u8>,
        reads_taken: usize,
        fail_writes: bool,
        write_limit: Option<usize>,
        closed: usize,
    }

    impl Scripted {
        fn replying(chunks: &[&[u8]]) -> Self {
            Self {
                reads: chunks.iter().map(|c| Ok(c.to_vec())).collect(),
                ..Default::default()
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads_taken += 1;
            match self.reads.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes {
                return Err(io::Error::new(ErrorKind::BrokenPipe, "broken pipe"));
            }
            let room = match self.write_limit {
                Some(limit) => limit.saturating_sub(self.written.len()),
                None => buf.len(),
            };
            let n = room.min(buf.len());
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Transport for &mut Scripted {
        fn set_io_timeout(&mut self, _limit: Duration) -> io::Result<()> {
            Ok(())
        }

        fn close(&mut self) {
            self.closed += 1;
        }

        fn kind(&self) -> &'static str {
            "scripted"
        }
    }

    fn budget() -> Deadline {
        Deadline::start(Duration::from_secs(5))
    }

    #[test]
    fn send_appends_terminator_and_stops_at_crlf() {
        let mut conn = Scripted::replying(&[b"220 mail", b".example.com ready\r\n", b"unread"]);
        let config = ProbeConfig::new("localhost", 25).with_send("HELO probe");

        let ex = exchange(&mut conn, &config, &budget()).unwrap();

        assert_eq!(ex.outcome, SessionOutcome::Completed);
        assert_eq!(ex.buffer.text(), "220 mail.example.com ready\r\n");
        assert_eq!(conn.written, b"HELO probe\r\n");
        assert_eq!(conn.reads.len(), 1);
        assert_eq!(conn.closed, 1);
    }

    #[test]
    fn empty_send_still_sends_terminator() {
        let mut conn = Scripted::replying(&[b"421 service not available\r\n"]);
        let config = ProbeConfig::new("localhost", 21)
            .with_send("")
            .with_expect("220");

        let ex = exchange(&mut conn, &config, &budget()).unwrap();
        assert_eq!(conn.written, b"\r\n");
        assert_eq!(ex.buffer.text(), "421 service not available\r\n");
    }

    #[test]
    fn connect_only_never_reads() {
        let mut conn = Scripted::replying(&[b"banner\r\n"]);
        let config = ProbeConfig::new("localhost", 80);

        let ex = exchange(&mut conn, &config, &budget()).unwrap();

        assert_eq!(ex.outcome, SessionOutcome::Completed);
        assert!(ex.buffer.is_empty());
        assert_eq!(conn.reads_taken, 0);
        assert_eq!(conn.closed, 1);
    }

    #[test]
    fn orderly_close_ends_read_loop() {
        let mut conn = Scripted::replying(&[b"partial ", b"banner"]);
        let config = ProbeConfig::new("localhost", 80).with_expect("banner");

        let ex = exchange(&mut conn, &config, &budget()).unwrap();
        assert_eq!(ex.outcome, SessionOutcome::Completed);
        assert_eq!(ex.buffer.text(), "partial banner");
    }

    #[test]
    fn silent_peer_is_no_data() {
        let mut conn = Scripted::default();
        let config = ProbeConfig::new("localhost", 21)
            .with_expect("220")
            .with_quit("QUIT\r\n");

        let ex = exchange(&mut conn, &config, &budget()).unwrap();
        assert_eq!(ex.outcome, SessionOutcome::NoData);
        assert_eq!(conn.written, b"QUIT\r\n");
        assert_eq!(conn.closed, 1);
    }

    #[test]
    fn max_bytes_stops_reading() {
        let mut conn = Scripted::replying(&[b"0123456789", b"abcdef", b"never read"]);
        let config = ProbeConfig::new("localhost", 80)
            .with_expect("0123")
            .with_max_bytes(12);

        let ex = exchange(&mut conn, &config, &budget()).unwrap();
        assert_eq!(ex.buffer.text(), "0123456789ab");
        assert_eq!(conn.reads.len(), 1);
    }

    #[test]
    fn max_bytes_and_quit_are_independent() {
        let mut conn = Scripted::replying(&[b"+OK ready\r\n"]);
        let config = ProbeConfig::new("localhost", 110)
            .with_expect("+OK")
            .with_max_bytes(4);

        exchange(&mut conn, &config, &budget()).unwrap();
        assert!(conn.written.is_empty());
    }

    #[test]
    fn quit_written_after_response() {
        let mut conn = Scripted::replying(&[b"+OK ready\r\n"]);
        let config = ProbeConfig::new("localhost", 110)
            .with_expect("+OK")
            .with_quit("QUIT\r\n");

        let ex = exchange(&mut conn, &config, &budget()).unwrap();
        assert_eq!(ex.outcome, SessionOutcome::Completed);
        assert_eq!(conn.written, b"QUIT\r\n");
    }

    #[test]
    fn read_error_aborts_and_skips_quit() {
        let mut conn = Scripted {
            reads: VecDeque::from([
                Ok(b"220-".to_vec()),
                Err(io::Error::new(ErrorKind::ConnectionReset, "connection reset")),
            ]),
            ..Default::default()
        };
        let config = ProbeConfig::new("localhost", 21)
            .with_expect("220")
            .with_quit("QUIT\r\n");

        let ex = exchange(&mut conn, &config, &budget()).unwrap();
        assert_eq!(
            ex.outcome,
            SessionOutcome::Error("connection reset".to_string())
        );
        assert!(conn.written.is_empty());
        assert_eq!(conn.closed, 1);
    }

    #[test]
    fn write_error_aborts_before_reading() {
        let mut conn = Scripted {
            fail_writes: true,
            ..Scripted::replying(&[b"hello\r\n"])
        };
        let config = ProbeConfig::new("localhost", 7).with_send("ping");

        let ex = exchange(&mut conn, &config, &budget()).unwrap();
        assert_eq!(ex.outcome, SessionOutcome::Error("broken pipe".to_string()));
        assert_eq!(conn.reads_taken, 0);
    }

    #[test]
    fn stalled_write_is_short_write() {
        let mut conn = Scripted {
            write_limit: Some(2),
            ..Scripted::replying(&[b"pong\r\n"])
        };
        let config = ProbeConfig::new("localhost", 7)
            .with_send("ping")
            .with_expect("pong");

        let ex = exchange(&mut conn, &config, &budget()).unwrap();
        assert_eq!(
            ex.outcome,
            SessionOutcome::Error("Short write: 2 of 6 bytes sent".to_string())
        );
        assert_eq!(conn.written, b"pi");
        assert_eq!(conn.reads_taken, 0);
        assert_eq!(conn.closed, 1);
    }

    #[test]
    fn quit_failure_does_not_change_outcome() {
        let mut conn = Scripted {
            fail_writes: true,
            ..Scripted::replying(&[b"220 ok\r\n"])
        };
        let config = ProbeConfig::new("localhost", 21)
            .with_expect("220")
            .with_quit("QUIT\r\n");

        let ex = exchange(&mut conn, &config, &budget()).unwrap();
        assert_eq!(ex.outcome, SessionOutcome::Completed);
    }

    #[test]
    fn read_timeout_is_deadline_exceeded() {
        let mut conn = Scripted {
            reads: VecDeque::from([Err(io::Error::from(ErrorKind::WouldBlock))]),
            ..Default::default()
        };
        let config = ProbeConfig::new("localhost", 21).with_expect("220");

        assert_eq!(
            exchange(&mut conn, &config, &budget()),
            Err(DeadlineExceeded)
        );
        assert_eq!(conn.closed, 1);
    }

    #[test]
    fn delay_past_budget_is_deadline_exceeded() {
        let mut conn = Scripted::replying(&[b"late\r\n"]);
        let config = ProbeConfig::new("localhost", 21)
            .with_send("x")
            .with_delay(Duration::from_secs(10));

        let deadline = Deadline::start(Duration::from_millis(20));
        assert_eq!(exchange(&mut conn, &config, &deadline), Err(DeadlineExceeded));
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_response(
            body in "[a-z0-9 ]{0,200}",
            cuts in prop::collection::vec(1usize..64, 0..8),
        ) {
            let reply = format!("{body}\r\n").into_bytes();
            let mut chunks = Vec::new();
            let mut rest = reply.as_slice();
            for cut in cuts {
                if rest.is_empty() {
                    break;
                }
                let (head, tail) = rest.split_at(cut.min(rest.len()));
                chunks.push(head);
                rest = tail;
            }
            if !rest.is_empty() {
                chunks.push(rest);
            }

            let mut conn = Scripted::replying(&chunks);
            let config = ProbeConfig::new("localhost", 80).with_expect("x");
            let ex = exchange(&mut conn, &config, &budget()).unwrap();
            prop_assert_eq!(ex.buffer.as_bytes(), reply.as_slice());
        }
    }
}
