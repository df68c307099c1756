//! IO helpers.

use std::io::{BufRead, Error, ErrorKind, Read, Result};

/// Read data without consuming it.
pub trait PeekRead {
    /// Returns data from the stream without advancing the stream position.
    ///
    /// At most one read call is made to fill the buffer. The length of the
    /// returned slice may be smaller than requested.
    fn peek(&mut self, amount: usize) -> Result<&[u8]>;
}

/// Count number of bytes marked as consumed.
pub trait CountRead {
    /// Returns the number of bytes read from this stream.
    ///
    /// Bytes held in internal buffers are not included.
    fn read_count(&self) -> u64;
}

/// Count number of bytes pulled from a wrapped source stream.
///
/// Implemented by readers that wrap another stream, such as decoders.
pub trait SourceCountRead {
    /// Returns the number of bytes read by this object from the source stream.
    fn source_read_count(&self) -> u64;
}

/// Extension trait for [std::io::BufRead].
pub trait BufReadMoreExt {
    /// Reads bytes into `buf` until the delimiter `byte` or EOF is reached.
    ///
    /// Like [std::io::BufRead::read_until] but returns an error when `limit`
    /// bytes have been read without reaching the delimiter.
    fn read_limit_until(&mut self, byte: u8, buf: &mut Vec<u8>, limit: u64) -> Result<usize>;
}

impl<R: BufRead> BufReadMoreExt for R {
    fn read_limit_until(&mut self, byte: u8, buf: &mut Vec<u8>, limit: u64) -> Result<usize> {
        read_limit_until(self, byte, buf, limit)
    }
}

fn read_limit_until<R: BufRead>(
    stream: R,
    byte: u8,
    buf: &mut Vec<u8>,
    limit: u64,
) -> Result<usize> {
    let mut stream = stream.take(limit);
    let amount = stream.read_until(byte, buf)?;

    if amount as u64 == limit && !buf.ends_with(&[byte]) {
        return Err(Error::new(ErrorKind::InvalidData, "line too long"));
    }

    Ok(amount)
}

const BUFFER_CHUNK: usize = 4096;

/// Buffered reader with peeking and byte counters.
///
/// The counters distinguish bytes consumed by the caller ([CountRead]) from
/// bytes pulled out of the wrapped stream ([SourceCountRead]); peeked but
/// unconsumed data only shows up in the latter.
pub struct PeekBufReader<R: Read> {
    stream: R,
    buf: Vec<u8>,
    read_count: u64,
    source_read_count: u64,
}

impl<R: Read> PeekBufReader<R> {
    /// Creates a reader with the given stream.
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            read_count: 0,
            source_read_count: 0,
        }
    }

    /// Returns a reference to the wrapped stream.
    pub fn get_ref(&self) -> &R {
        &self.stream
    }

    /// Returns a mutable reference to the wrapped stream.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.stream
    }

    /// Returns the wrapped stream, discarding any buffered data.
    pub fn into_inner(self) -> R {
        self.stream
    }

    /// Returns a view of the internal buffer.
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    fn fill_buf_to(&mut self, amount: usize) -> Result<()> {
        while self.buf.len() < amount {
            let offset = self.buf.len();
            self.buf.resize(offset + BUFFER_CHUNK, 0);
            let filled = self.stream.read(&mut self.buf[offset..])?;
            self.buf.truncate(offset + filled);
            self.source_read_count += filled as u64;

            if filled == 0 {
                break;
            }
        }

        Ok(())
    }

    fn discard_front(&mut self, amount: usize) {
        self.buf.copy_within(amount.., 0);
        self.buf.truncate(self.buf.len() - amount);
    }
}

impl<R: Read> Read for PeekBufReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.buf.is_empty() && buf.len() >= BUFFER_CHUNK {
            let amount = self.stream.read(buf)?;
            self.source_read_count += amount as u64;
            self.read_count += amount as u64;
            return Ok(amount);
        }

        if self.buf.is_empty() {
            self.fill_buf_to(1)?;
        }

        let amount = self.buf.len().min(buf.len());
        buf[0..amount].copy_from_slice(&self.buf[0..amount]);
        self.discard_front(amount);
        self.read_count += amount as u64;

        Ok(amount)
    }
}

impl<R: Read> BufRead for PeekBufReader<R> {
    fn fill_buf(&mut self) -> Result<&[u8]> {
        if self.buf.is_empty() {
            self.fill_buf_to(1)?;
        }

        Ok(&self.buf)
    }

    fn consume(&mut self, amount: usize) {
        let amount = self.buf.len().min(amount);
        self.discard_front(amount);
        self.read_count += amount as u64;
    }
}

impl<R: Read> PeekRead for PeekBufReader<R> {
    fn peek(&mut self, amount: usize) -> Result<&[u8]> {
        self.fill_buf_to(amount)?;

        let amount = amount.min(self.buf.len());

        Ok(&self.buf[0..amount])
    }
}

impl<R: Read> CountRead for PeekBufReader<R> {
    fn read_count(&self) -> u64 {
        self.read_count
    }
}

impl<R: Read> SourceCountRead for PeekBufReader<R> {
    fn source_read_count(&self) -> u64 {
        self.source_read_count
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_read_limit_until() {
        let mut input = Cursor::new(b"a\r\nb\r\n\r\nc");
        let mut output = Vec::new();
        let count = input.read_limit_until(b'\n', &mut output, 9999).unwrap();

        assert_eq!(count, 3);
        assert_eq!(&output, b"a\r\n");
    }

    #[test]
    fn test_read_limit_until_limit() {
        let mut input = Cursor::new(b"aaaaabbbbbccccc");
        let mut output = Vec::new();
        let result = input.read_limit_until(b'\n', &mut output, 7);

        assert!(result.is_err());
    }

    #[test]
    fn test_peek_then_read() {
        let input = Cursor::new(b"0123456789".to_vec());
        let mut reader = PeekBufReader::new(input);

        assert_eq!(reader.peek(4).unwrap(), b"0123");
        assert_eq!(reader.read_count(), 0);

        let mut output = vec![0u8; 6];
        reader.read_exact(&mut output).unwrap();
        assert_eq!(&output, b"012345");
        assert_eq!(reader.read_count(), 6);

        assert_eq!(reader.peek(100).unwrap(), b"6789");

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(&rest, b"6789");
        assert_eq!(reader.read_count(), 10);
        assert_eq!(reader.source_read_count(), 10);
    }

    #[test]
    fn test_peek_short_input() {
        let input = Cursor::new(b"ab".to_vec());
        let mut reader = PeekBufReader::new(input);

        assert_eq!(reader.peek(4).unwrap(), b"ab");
    }

    #[test]
    fn test_bufread_lines() {
        let input = Cursor::new(b"k1: v1\r\nk2: v2\r\n".to_vec());
        let mut reader = PeekBufReader::new(input);
        let mut line = Vec::new();

        reader.read_until(b'\n', &mut line).unwrap();
        assert_eq!(&line, b"k1: v1\r\n");
        assert_eq!(reader.read_count(), 8);
    }
}
