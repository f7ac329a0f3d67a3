//! Accumulated response bytes

/// Line terminator that ends a line-oriented response
pub const TERMINATOR: &[u8] = b"\r\n";

/// Append-only buffer of bytes received during one probe
///
/// When a cap is set, bytes beyond it are discarded so the buffer never
/// exceeds `max_bytes`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseBuffer {
    bytes: Vec<u8>,
    max_bytes: Option<usize>,
}

impl ResponseBuffer {
    #[must_use]
    pub fn new(max_bytes: Option<usize>) -> Self {
        Self {
            bytes: Vec::new(),
            max_bytes,
        }
    }

    /// Append a received chunk, honouring the cap
    pub fn extend(&mut self, chunk: &[u8]) {
        let take = match self.max_bytes {
            Some(cap) => chunk.len().min(cap.saturating_sub(self.bytes.len())),
            None => chunk.len(),
        };
        self.bytes.extend_from_slice(&chunk[..take]);
    }

    /// Whether the reader should stop: terminator seen or cap reached
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.ends_with_terminator() || self.is_full()
    }

    #[must_use]
    pub fn ends_with_terminator(&self) -> bool {
        self.bytes.ends_with(TERMINATOR)
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.max_bytes.is_some_and(|cap| self.bytes.len() >= cap)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Response as text, invalid UTF-8 replaced
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_detected_across_chunks() {
        let mut buf = ResponseBuffer::new(None);
        buf.extend(b"220 ready\r");
        assert!(!buf.is_complete());
        buf.extend(b"\n");
        assert!(buf.ends_with_terminator());
        assert!(buf.is_complete());
    }

    #[test]
    fn embedded_terminator_does_not_complete() {
        let mut buf = ResponseBuffer::new(None);
        buf.extend(b"220-first\r\n220 second");
        assert!(!buf.is_complete());
    }

    #[test]
    fn cap_truncates_and_completes() {
        let mut buf = ResponseBuffer::new(Some(5));
        buf.extend(b"abc");
        assert!(!buf.is_full());
        buf.extend(b"defgh");
        assert!(buf.is_full());
        assert_eq!(buf.as_bytes(), b"abcde");

        buf.extend(b"ignored");
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn lossy_text() {
        let mut buf = ResponseBuffer::new(None);
        buf.extend(b"ok \xff");
        assert_eq!(buf.text(), "ok \u{fffd}");
        assert!(!buf.is_empty());
    }
}
