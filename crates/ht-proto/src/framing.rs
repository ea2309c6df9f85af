//! Bounded newline framing over an async byte stream.
//!
//! [`LineReader`] never buffers more than `max + 1` bytes of a single line.
//! Longer lines are skipped up to their terminator and reported as
//! [`Frame::TooLong`], so one bad peer cannot make the reader grow without
//! bound.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    /// One line without its `\n` or `\r\n` terminator.
    Line(Vec<u8>),
    /// A line longer than the limit was discarded. Carries its length up to
    /// the `\n`.
    TooLong(usize),
    Eof,
}

pub struct LineReader<R> {
    reader: R,
    max: usize,
    buf: Vec<u8>,
    /// Bytes of an oversize line seen so far, while skipping it.
    skipped: Option<usize>,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(reader: R, max: usize) -> Self {
        Self {
            reader,
            max,
            buf: Vec::new(),
            skipped: None,
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Read the next frame.
    ///
    /// Cancel safe: partial input is kept in `self` between calls, and no
    /// bytes are consumed across an await point.
    pub async fn next_frame(&mut self) -> io::Result<Frame> {
        loop {
            let chunk = self.reader.fill_buf().await?;

            if chunk.is_empty() {
                if let Some(len) = self.skipped.take() {
                    return Ok(Frame::TooLong(len));
                }
                if self.buf.is_empty() {
                    return Ok(Frame::Eof);
                }
                // Final line without a terminator.
                return Ok(self.finish());
            }

            let (taken, complete) = match chunk.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos, true),
                None => (chunk.len(), false),
            };

            match self.skipped.as_mut() {
                Some(len) => *len += taken,
                None => {
                    self.buf.extend_from_slice(&chunk[..taken]);
                    // One extra byte of slack for a `\r` before the terminator.
                    if self.buf.len() > self.max + 1 {
                        self.skipped = Some(self.buf.len());
                        self.buf.clear();
                    }
                }
            }

            let consumed = if complete { taken + 1 } else { taken };
            self.reader.consume(consumed);

            if complete {
                if let Some(len) = self.skipped.take() {
                    return Ok(Frame::TooLong(len));
                }
                return Ok(self.finish());
            }
        }
    }

    fn finish(&mut self) -> Frame {
        let mut line = std::mem::take(&mut self.buf);
        let raw_len = line.len();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.len() > self.max {
            Frame::TooLong(raw_len)
        } else {
            Frame::Line(line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn frames(input: &[u8], max: usize) -> Vec<Frame> {
        let mut reader = LineReader::new(input, max);
        let mut out = Vec::new();
        loop {
            match reader.next_frame().await.unwrap() {
                Frame::Eof => return out,
                frame => out.push(frame),
            }
        }
    }

    fn line(s: &str) -> Frame {
        Frame::Line(s.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_splits_lines() {
        let got = frames(b"one\r\ntwo\nthree", 16).await;
        assert_eq!(got, vec![line("one"), line("two"), line("three")]);
    }

    #[tokio::test]
    async fn test_skips_oversize_line() {
        let input = format!("{}\nok\n", "x".repeat(50));
        let got = frames(input.as_bytes(), 8).await;
        assert_eq!(got, vec![Frame::TooLong(50), line("ok")]);
    }

    #[tokio::test]
    async fn test_exact_limit_with_crlf() {
        let got = frames(b"12345678\r\n123456789\r\n", 8).await;
        assert_eq!(got, vec![line("12345678"), Frame::TooLong(10)]);
    }

    #[tokio::test]
    async fn test_oversize_unterminated_tail() {
        let got = frames(b"ok\nxxxxxxxxxxxx", 4).await;
        assert_eq!(got, vec![line("ok"), Frame::TooLong(12)]);
    }

    #[tokio::test]
    async fn test_buffer_stays_bounded_across_small_reads() {
        // A one-byte BufReader delivers the line in pieces.
        let input = format!("{}\nafter\n", "y".repeat(1000));
        let reader = tokio::io::BufReader::with_capacity(1, input.as_bytes());
        let mut lines = LineReader::new(reader, 16);

        assert_eq!(lines.next_frame().await.unwrap(), Frame::TooLong(1000));
        assert!(lines.buf.capacity() <= 64, "line buffer grew to {}", lines.buf.capacity());
        assert_eq!(lines.next_frame().await.unwrap(), line("after"));
    }
}
