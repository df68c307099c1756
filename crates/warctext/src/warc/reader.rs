use std::io::{BufReader, Read, Take};

use crate::{
    compress::{CompressionFormat, Decompressor},
    header::{HeaderMap, HeaderParser},
    io::BufReadMoreExt,
};

use super::header::HeaderMapExt;
use super::{WARCError, WARCRecord};

/// Header and version lines longer than this indicate garbage input.
const MAX_LINE_LENGTH: u64 = 32768;

/// Reads a WARC file.
///
/// The stream compression format is guessed from magic bytes by default;
/// [WARCReader::with_format] forces a specific format. Reading is a strict
/// sequence of [Self::begin_record], [Self::read_block], [Self::end_record]
/// per record; [Self::read_record] bundles the sequence for callers that
/// want the record fully in memory.
pub struct WARCReader<'a, S: Read> {
    stream: Option<BufReader<Decompressor<'a, S>>>,

    state: ReaderState,

    file_offset: u64,

    version_buffer: Vec<u8>,
    line_buffer: Vec<u8>,
    header_buffer: Vec<u8>,

    record_id: String,
    block_file_offset: u64,
    block_length: u64,
}

impl<'a, S: Read> WARCReader<'a, S> {
    /// Creates a `WARCReader`, guessing the stream's compression format.
    pub fn new(stream: S) -> Result<Self, WARCError> {
        Self::from_decompressor(Decompressor::new_allow_unknown(stream)?)
    }

    /// Creates a `WARCReader` with a known compression format.
    pub fn with_format(stream: S, format: CompressionFormat) -> Result<Self, WARCError> {
        Self::from_decompressor(Decompressor::with_format(stream, format)?)
    }

    fn from_decompressor(decompressor: Decompressor<'a, S>) -> Result<Self, WARCError> {
        Ok(Self {
            stream: Some(BufReader::new(decompressor)),
            state: ReaderState::StartOfHeader,
            file_offset: 0,
            version_buffer: Vec::new(),
            line_buffer: Vec::new(),
            header_buffer: Vec::new(),
            record_id: String::new(),
            block_file_offset: 0,
            block_length: 0,
        })
    }

    /// Starts reading a record and returns its header.
    ///
    /// The caller must call [Self::read_block] next to advance the stream.
    ///
    /// Panics when called out of sequence.
    ///
    /// Returns `None` when there are no more records in the stream.
    pub fn begin_record(&mut self) -> Result<Option<RecordHeader>, WARCError> {
        assert!(matches!(&self.state, ReaderState::StartOfHeader));

        let start_file_offset = self.file_offset;
        let raw_file_offset = self.raw_file_offset();

        tracing::debug!(
            file_offset = self.file_offset,
            raw_file_offset,
            "begin_record"
        );

        if !self.read_version_line()? {
            return Ok(None);
        }
        self.read_header_lines()?;
        let fields = self.parse_header_lines()?;
        self.prepare_for_block_read(&fields)?;

        self.state = ReaderState::EndOfHeader;

        Ok(Some(RecordHeader {
            version: String::from_utf8_lossy(&self.version_buffer)
                .trim()
                .to_string(),
            fields,
            block_length: self.block_length,
            file_offset: start_file_offset,
            raw_file_offset,
        }))
    }

    fn raw_file_offset(&self) -> u64 {
        self.stream
            .as_ref()
            .map(|stream| stream.get_ref().raw_input_read_count())
            .unwrap_or_default()
    }

    fn read_line(&mut self, into: Line) -> Result<usize, WARCError> {
        let offset = self.file_offset;
        let raw_offset = self.raw_file_offset();

        let buffer = match into {
            Line::Version => &mut self.version_buffer,
            Line::Other => &mut self.line_buffer,
        };
        buffer.clear();

        let amount = self
            .stream
            .as_mut()
            .unwrap()
            .read_limit_until(b'\n', buffer, MAX_LINE_LENGTH)
            .map_err(|source| WARCError::CorruptStream {
                offset,
                raw_offset,
                source,
            })?;

        self.file_offset += amount as u64;

        Ok(amount)
    }

    fn read_version_line(&mut self) -> Result<bool, WARCError> {
        tracing::debug!("read_version_line");

        self.read_line(Line::Version)?;

        tracing::trace!(version_buffer = ?self.version_buffer, "read_version_line");

        if self.version_buffer.is_empty() {
            return Ok(false);
        }

        if !(self.version_buffer.starts_with(b"WARC/0.")
            || self.version_buffer.starts_with(b"WARC/1."))
        {
            return Err(WARCError::UnknownFormat);
        }

        Ok(true)
    }

    fn read_header_lines(&mut self) -> Result<(), WARCError> {
        tracing::debug!("read_header_lines");

        self.header_buffer.clear();

        loop {
            self.read_line(Line::Other)?;

            if self.line_buffer.is_empty() || b"\r\n".contains(&self.line_buffer[0]) {
                break;
            }

            self.header_buffer.extend_from_slice(&self.line_buffer);
        }

        Ok(())
    }

    fn parse_header_lines(&mut self) -> Result<HeaderMap, WARCError> {
        tracing::debug!("parse_header_lines");

        match HeaderParser::new().parse_header(&self.header_buffer) {
            Ok(fields) => Ok(fields),
            Err(error) => Err(WARCError::MalformedHeader {
                offset: self.file_offset,
                source: Some(Box::new(error)),
            }),
        }
    }

    fn prepare_for_block_read(&mut self, fields: &HeaderMap) -> Result<(), WARCError> {
        self.record_id = fields
            .get_str("WARC-Record-ID")
            .unwrap_or_default()
            .to_string();
        self.block_file_offset = self.file_offset;
        self.block_length = fields.get_parsed_required("Content-Length")?;

        tracing::debug!(
            block_file_offset = self.block_file_offset,
            block_length = self.block_length,
            "prepare_for_block_read"
        );

        Ok(())
    }

    /// Starts reading a record body.
    ///
    /// The caller must read until the block stream is empty and then call
    /// [Self::end_record].
    ///
    /// Panics when called out of sequence.
    pub fn read_block(&mut self) -> BlockReader<'a, S> {
        assert!(matches!(&self.state, ReaderState::EndOfHeader));
        tracing::debug!("read_block");

        let stream = self.stream.take().unwrap().take(self.block_length);
        self.state = ReaderState::InBlock;

        BlockReader {
            stream,
            num_bytes_read: 0,
        }
    }

    /// Finishes reading a record.
    ///
    /// Panics when called out of sequence.
    pub fn end_record(&mut self, block_reader: BlockReader<'a, S>) -> Result<(), WARCError> {
        assert!(matches!(&self.state, ReaderState::InBlock));
        tracing::debug!("end_record");
        assert!(self.stream.is_none());

        self.stream = Some(block_reader.stream.into_inner());
        self.file_offset += block_reader.num_bytes_read;

        self.check_block_length()?;
        self.read_end_of_record_lines()?;

        self.state = ReaderState::StartOfHeader;

        Ok(())
    }

    fn check_block_length(&self) -> Result<(), WARCError> {
        let current_offset = self.file_offset;
        let expected_offset = self.block_file_offset + self.block_length;

        tracing::debug!(current_offset, expected_offset, "check_block_length");

        if current_offset != expected_offset {
            return Err(WARCError::WrongBlockLength {
                record_id: self.record_id.clone(),
            });
        }

        Ok(())
    }

    fn read_end_of_record_lines(&mut self) -> Result<(), WARCError> {
        tracing::debug!("read_end_of_record_lines");

        for _ in 0..2 {
            self.read_line(Line::Other)?;

            if self.line_buffer.is_empty() || !b"\r\n".contains(&self.line_buffer[0]) {
                return Err(WARCError::MalformedFooter {
                    offset: self.file_offset,
                });
            }
        }

        Ok(())
    }

    /// Reads an entire record into memory.
    ///
    /// Returns `None` when there are no more records in the stream.
    pub fn read_record(&mut self) -> Result<Option<WARCRecord>, WARCError> {
        let header = match self.begin_record()? {
            Some(header) => header,
            None => return Ok(None),
        };

        let version = header.version.clone();
        let fields = header.fields;

        let mut body = Vec::new();
        let mut block = self.read_block();
        block.read_to_end(&mut body)?;
        self.end_record(block)?;

        Ok(Some(WARCRecord {
            version,
            headers: fields,
            body,
        }))
    }
}

enum Line {
    Version,
    Other,
}

enum ReaderState {
    StartOfHeader,
    EndOfHeader,
    InBlock,
}

/// Reader stream for a record body.
pub struct BlockReader<'a, S: Read> {
    stream: Take<BufReader<Decompressor<'a, S>>>,
    num_bytes_read: u64,
}

impl<'a, S: Read> BlockReader<'a, S> {
    /// Number of bytes read in total from the (compressed) file.
    pub fn raw_file_offset(&self) -> u64 {
        self.stream.get_ref().get_ref().raw_input_read_count()
    }
}

impl<'a, S: Read> Read for BlockReader<'a, S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let size = self.stream.read(buf)?;
        self.num_bytes_read += size as u64;
        Ok(size)
    }
}

/// A record's parsed header and associated file positions.
pub struct RecordHeader {
    /// The WARC version line without line endings.
    pub version: String,
    /// The parsed name-value fields.
    pub fields: HeaderMap,
    /// The length of the body of the record.
    pub block_length: u64,
    /// Number of bytes read in total from the (uncompressed) stream when
    /// this record started.
    pub file_offset: u64,
    /// Number of bytes read in total from the (compressed) stream when this
    /// record started.
    pub raw_file_offset: u64,
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const SINGLE_RECORD: &[u8] = b"WARC/1.0\r\n\
        WARC-Type: resource\r\n\
        WARC-Record-ID: <urn:uuid:00000000-0000-0000-0000-000000000001>\r\n\
        WARC-Date: 2014-02-10T11:00:00Z\r\n\
        Content-Type: text/plain\r\n\
        Content-Length: 5\r\n\
        \r\n\
        hello\r\n\
        \r\n";

    #[test]
    fn test_read_single_record() {
        let mut reader = WARCReader::new(Cursor::new(SINGLE_RECORD.to_vec())).unwrap();

        let record = reader.read_record().unwrap().unwrap();

        assert_eq!(record.version, "WARC/1.0");
        assert_eq!(record.headers.get_str("WARC-Type"), Some("resource"));
        assert_eq!(record.body, b"hello");

        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_read_streaming() {
        let mut reader = WARCReader::new(Cursor::new(SINGLE_RECORD.to_vec())).unwrap();

        let header = reader.begin_record().unwrap().unwrap();
        assert_eq!(header.block_length, 5);
        assert_eq!(header.file_offset, 0);

        let mut block = reader.read_block();
        let mut body = Vec::new();
        block.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"hello");

        reader.end_record(block).unwrap();
        assert!(reader.begin_record().unwrap().is_none());
    }

    #[test]
    fn test_reject_unknown_magic() {
        let mut reader = WARCReader::new(Cursor::new(b"HTTP/1.1 200 OK\r\n".to_vec())).unwrap();
        let result = reader.begin_record();

        assert!(matches!(result, Err(WARCError::UnknownFormat)));
    }

    #[test]
    fn test_wrong_content_length() {
        let data = b"WARC/1.0\r\n\
            WARC-Record-ID: <urn:uuid:1>\r\n\
            Content-Length: 100\r\n\
            \r\n\
            hello\r\n\
            \r\n";
        let mut reader = WARCReader::new(Cursor::new(data.to_vec())).unwrap();

        reader.begin_record().unwrap().unwrap();
        let mut block = reader.read_block();
        let mut body = Vec::new();
        block.read_to_end(&mut body).unwrap();
        let result = reader.end_record(block);

        assert!(matches!(result, Err(WARCError::WrongBlockLength { .. })));
    }

    #[test]
    fn test_corrupt_gzip_member() {
        let mut data = Vec::new();
        data.extend_from_slice(&[0x1f, 0x8b]);
        data.extend_from_slice(b"garbage garbage garbage");

        let mut reader = WARCReader::new(Cursor::new(data)).unwrap();
        let result = reader.begin_record();

        assert!(matches!(result, Err(WARCError::CorruptStream { .. })));
    }

    #[test]
    fn test_missing_footer() {
        let data = b"WARC/1.0\r\n\
            WARC-Record-ID: <urn:uuid:1>\r\n\
            Content-Length: 5\r\n\
            \r\n\
            hello";
        let mut reader = WARCReader::new(Cursor::new(data.to_vec())).unwrap();

        reader.begin_record().unwrap().unwrap();
        let mut block = reader.read_block();
        let mut body = Vec::new();
        block.read_to_end(&mut body).unwrap();
        let result = reader.end_record(block);

        assert!(matches!(result, Err(WARCError::MalformedFooter { .. })));
    }
}
