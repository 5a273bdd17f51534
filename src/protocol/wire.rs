//! Line framing over a stream socket.
//!
//! Requests are newline-terminated text. Reads are expected to carry a
//! timeout so that the session loop wakes up regularly even when the client
//! sends nothing.

use std::io::{self, Read, Write};

use crate::error::{DaemonError, ProtocolErrorKind};

use super::reply::Reply;

/// What a single bounded read produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Line(String),
    /// The read timed out before a full line arrived.
    Idle,
    /// The peer closed the connection.
    Closed,
}

/// Buffered line reader that surfaces read timeouts instead of hiding them.
pub struct LineReader<R> {
    inner: R,
    pending: Vec<u8>,
    max_line: usize,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R, max_line: usize) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            max_line,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Return the next complete line, or report that the read went idle.
    ///
    /// Trailing `\r\n` or `\n` is stripped. A partial line left at EOF is
    /// discarded.
    pub fn next_event(&mut self) -> Result<LineEvent, DaemonError> {
        loop {
            if let Some(line) = self.take_line() {
                if line.len() > self.max_line {
                    return Err(self.too_long());
                }
                return Ok(LineEvent::Line(String::from_utf8_lossy(&line).into_owned()));
            }
            if self.pending.len() > self.max_line {
                return Err(self.too_long());
            }

            let mut chunk = [0u8; 4096];
            match self.inner.read(&mut chunk) {
                Ok(0) => return Ok(LineEvent::Closed),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    return Ok(LineEvent::Idle)
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DaemonError::Io(e)),
            }
        }
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }

    fn too_long(&self) -> DaemonError {
        DaemonError::Protocol {
            kind: ProtocolErrorKind::LineTooLong { max: self.max_line },
        }
    }
}

/// Write one status line.
pub fn write_reply<W: Write>(writer: &mut W, reply: &Reply) -> io::Result<()> {
    writeln!(writer, "{}", reply)?;
    writer.flush()
}

/// Write an object payload: `+OK <len>` followed by the raw bytes.
pub fn write_object<W: Write>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    writeln!(writer, "+OK {}", data.len())?;
    writer.write_all(data)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use std::io::Cursor;

    /// Yields its chunks one read at a time, then times out once, then EOF.
    struct Scripted {
        chunks: Vec<Vec<u8>>,
        timed_out: bool,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.chunks.is_empty() {
                let chunk = self.chunks.remove(0);
                buf[..chunk.len()].copy_from_slice(&chunk);
                return Ok(chunk.len());
            }
            if !self.timed_out {
                self.timed_out = true;
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "timeout"));
            }
            Ok(0)
        }
    }

    #[test]
    fn test_lines_split_and_trimmed() {
        let mut reader = LineReader::new(Cursor::new(b"hello app\r\nquit\n".to_vec()), 1024);
        assert_eq!(reader.next_event().unwrap(), LineEvent::Line("hello app".to_string()));
        assert_eq!(reader.next_event().unwrap(), LineEvent::Line("quit".to_string()));
        assert_eq!(reader.next_event().unwrap(), LineEvent::Closed);
    }

    #[test]
    fn test_line_across_reads_and_idle() {
        let mut reader = LineReader::new(
            Scripted {
                chunks: vec![b"hel".to_vec(), b"lo app\npartial".to_vec()],
                timed_out: false,
            },
            1024,
        );
        assert_eq!(reader.next_event().unwrap(), LineEvent::Line("hello app".to_string()));
        assert_eq!(reader.next_event().unwrap(), LineEvent::Idle);
        assert_eq!(reader.next_event().unwrap(), LineEvent::Closed);
    }

    #[test]
    fn test_line_too_long() {
        let mut reader = LineReader::new(Cursor::new(vec![b'x'; 100]), 16);
        assert!(matches!(
            reader.next_event(),
            Err(DaemonError::Protocol {
                kind: ProtocolErrorKind::LineTooLong { max: 16 }
            })
        ));
    }

    #[test]
    fn test_write_reply_and_object() {
        let mut out = Vec::new();
        write_reply(&mut out, &Reply::Ok).unwrap();
        write_reply(&mut out, &Reply::Err(Failure::syntax())).unwrap();
        write_object(&mut out, b"abc\n").unwrap();
        assert_eq!(out, b"+OK\n-ERR:1:Unknown command\n+OK 4\nabc\n".to_vec());
    }
}
