//! Bounded line source for the read loop.

use std::io::{self, Read};

use bytes::{Buf, BytesMut};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),
    #[error("input line exceeds {limit} bytes")]
    TooLong { limit: usize },
}

/// Splits a byte stream into lines of at most `max_line` bytes.
///
/// An oversized line is rejected whole: its bytes are discarded up to the
/// next newline and [`InputError::TooLong`] is returned once for it.
pub struct LineReader<R> {
    inner: R,
    buf: BytesMut,
    max_line: usize,
    chunk: usize,
    discarding: bool,
}

const MAX_CHUNK: usize = 1024;

impl<R: Read> LineReader<R> {
    /// `chunk` caps how many bytes a single read may take. A chunk of 1
    /// leaves everything after the current line unread, for the next program
    /// that reads the same input.
    pub fn new(inner: R, max_line: usize, chunk: usize) -> Self {
        LineReader {
            inner,
            buf: BytesMut::with_capacity(max_line.min(MAX_CHUNK)),
            max_line,
            chunk: chunk.clamp(1, MAX_CHUNK),
            discarding: false,
        }
    }

    /// Returns the next line without its newline, or `None` at end of input.
    pub fn read_line(&mut self) -> Result<Option<String>, InputError> {
        let mut scratch = [0u8; MAX_CHUNK];
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line = self.buf.split_to(pos + 1);
                if std::mem::take(&mut self.discarding) || pos > self.max_line {
                    return Err(InputError::TooLong {
                        limit: self.max_line,
                    });
                }
                return Ok(Some(String::from_utf8_lossy(&line[..pos]).into_owned()));
            }

            if self.buf.len() > self.max_line {
                self.buf.clear();
                self.discarding = true;
            }

            let n = match self.inner.read(&mut scratch[..self.chunk]) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                return self.finish();
            }
            self.buf.extend_from_slice(&scratch[..n]);
        }
    }

    fn finish(&mut self) -> Result<Option<String>, InputError> {
        if std::mem::take(&mut self.discarding) || self.buf.len() > self.max_line {
            self.buf.clear();
            return Err(InputError::TooLong {
                limit: self.max_line,
            });
        }
        if self.buf.is_empty() {
            return Ok(None);
        }
        let rest = String::from_utf8_lossy(self.buf.chunk()).into_owned();
        self.buf.clear();
        Ok(Some(rest))
    }
}
