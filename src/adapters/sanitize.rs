//! Log sanitization: every formatted line passes through
//! [`crate::domain::redaction`] before it reaches the sink.
//!
//! Input is capped at `MEDLEDGER_SANITIZE_MAX_BYTES` (default 16 KiB).

use std::io::Write;

use tracing_subscriber::fmt::MakeWriter;

use crate::domain::redaction::{redact_with_limit, DEFAULT_MAX_BYTES};

fn max_sanitize_bytes() -> usize {
    std::env::var("MEDLEDGER_SANITIZE_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_MAX_BYTES)
}

/// Redact with the configured cap.
#[must_use]
pub fn sanitize(input: &str) -> String {
    redact_with_limit(input, max_sanitize_bytes())
}

/// Wraps a `MakeWriter` so each log event is redacted before output.
#[derive(Debug, Clone)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

/// Buffers one event and writes it redacted on flush or drop.
pub struct SanitizingWriter<W: Write> {
    inner: W,
    buffer: Vec<u8>,
}

impl<W: Write> SanitizingWriter<W> {
    fn emit(&mut self) -> std::io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&self.buffer);
        let redacted: String = text.split_inclusive('\n').map(sanitize).collect();
        self.buffer.clear();
        self.inner.write_all(redacted.as_bytes())
    }
}

impl<W: Write> Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        if self.buffer.ends_with(b"\n") || self.buffer.len() > max_sanitize_bytes() {
            self.emit()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.emit()?;
        self.inner.flush()
    }
}

impl<W: Write> Drop for SanitizingWriter<W> {
    fn drop(&mut self) {
        let _ = self.emit();
    }
}

impl<'a, M> MakeWriter<'a> for SanitizingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter {
            inner: self.inner.make_writer(),
            buffer: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_redacts_each_line() {
        let mut sink = Vec::new();
        {
            let mut writer = SanitizingWriter {
                inner: &mut sink,
                buffer: Vec::new(),
            };
            writer
                .write_all(b"granted to 0x90f79bf6eb2c4f870365e785982e1f101e93b906\nemail a@b.org\n")
                .expect("Should write");
            writer.flush().expect("Should flush");
        }
        let out = String::from_utf8(sink).expect("utf8");
        assert_eq!(out, "granted to [REDACTED-ADDRESS]\nemail [REDACTED-EMAIL]\n");
    }

    #[test]
    fn test_partial_event_written_on_drop() {
        let mut sink = Vec::new();
        {
            let mut writer = SanitizingWriter {
                inner: &mut sink,
                buffer: Vec::new(),
            };
            writer.write_all(b"ssn 123-45-6789").expect("Should write");
        }
        assert_eq!(String::from_utf8(sink).expect("utf8"), "ssn [REDACTED-SSN]");
    }
}
