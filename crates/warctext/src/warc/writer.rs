use std::io::Write;

use crate::{
    compress::{CompressionFormat, CompressionLevel, Compressor},
    header::{HeaderFormatter, HeaderMap},
};

use super::{WARCError, WARCRecord};

/// Writes a WARC file.
///
/// When compression is requested, every record becomes exactly one
/// compressed member so the output stays concatenation-safe and seekable by
/// record. `Content-Length` is regenerated from the actual block length on
/// every record; any value carried in the given header is discarded.
pub struct WARCWriter<'a, S: Write> {
    stream: Option<S>,

    state: WriterState,

    compressed_stream: Option<Compressor<'a, S>>,
    compression_format: CompressionFormat,
    compression_level: CompressionLevel,

    header_formatter: HeaderFormatter,

    record_id: String,
    block_length: u64,
    block_amount_written: u64,
}

impl<'a, S: Write> WARCWriter<'a, S> {
    /// Creates a writer with the given stream without compression.
    pub fn new(stream: S) -> Self {
        Self::new_compressed(stream, CompressionFormat::Raw, Default::default())
    }

    /// Creates a writer with the given stream and compression configuration.
    pub fn new_compressed(
        stream: S,
        compression_format: CompressionFormat,
        compression_level: CompressionLevel,
    ) -> Self {
        Self {
            stream: Some(stream),
            state: WriterState::StartOfHeader,
            compressed_stream: None,
            compression_format,
            compression_level,
            header_formatter: HeaderFormatter::new(),
            record_id: String::new(),
            block_length: 0,
            block_amount_written: 0,
        }
    }

    /// Returns the wrapped stream.
    ///
    /// Panics if the writer is in the middle of writing a record.
    pub fn into_inner(self) -> S {
        self.stream.unwrap()
    }

    /// Begins a record by writing the version line and header.
    ///
    /// `block_length` becomes the record's `Content-Length`, replacing
    /// whatever the header carries. The caller must call [Self::write_block]
    /// next and write exactly `block_length` bytes.
    ///
    /// Panics when called out of sequence.
    pub fn begin_record(
        &mut self,
        version: &str,
        header: &HeaderMap,
        block_length: u64,
    ) -> Result<(), WARCError> {
        assert!(self.state == WriterState::StartOfHeader);
        assert!(self.stream.is_some());
        assert!(self.compressed_stream.is_none());

        tracing::debug!(version, block_length, "begin_record");

        let mut header = header.clone();
        header.insert("Content-Length", block_length.to_string());

        self.create_compressor()?;
        self.write_header(version, &header)?;
        self.prepare_for_block_write(&header, block_length);

        self.state = WriterState::EndOfHeader;

        Ok(())
    }

    fn create_compressor(&mut self) -> Result<(), WARCError> {
        tracing::debug!("create_compressor");

        let stream = self.stream.take().unwrap();
        let stream = Compressor::new(stream, self.compression_format, self.compression_level)?;
        self.compressed_stream = Some(stream);

        Ok(())
    }

    fn write_header(&mut self, version: &str, header: &HeaderMap) -> Result<(), WARCError> {
        tracing::debug!("write_header");

        let mut stream = self.compressed_stream.as_mut().unwrap();

        stream.write_all(version.as_bytes())?;
        stream.write_all(b"\r\n")?;
        if let Err(error) = self.header_formatter.format_header(header, &mut stream) {
            return Err(WARCError::MalformedHeader {
                offset: 0,
                source: Some(Box::new(error)),
            });
        }
        stream.write_all(b"\r\n")?;

        Ok(())
    }

    fn prepare_for_block_write(&mut self, header: &HeaderMap, block_length: u64) {
        self.record_id = header
            .get_str("WARC-Record-ID")
            .unwrap_or_default()
            .to_string();
        self.block_length = block_length;
        self.block_amount_written = 0;

        tracing::debug!(block_length = self.block_length, "prepare_for_block_write");
    }

    /// Starts writing a record body.
    ///
    /// The caller must write the full block contents and then call
    /// [Self::end_record].
    ///
    /// Panics when called out of sequence.
    pub fn write_block(&mut self) -> BlockWriter<'a, '_, S> {
        assert!(self.state == WriterState::EndOfHeader);
        tracing::debug!("write_block");

        self.state = WriterState::InBlock;

        BlockWriter {
            stream: self.compressed_stream.as_mut().unwrap(),
            num_bytes_written: &mut self.block_amount_written,
        }
    }

    /// Finishes writing a record.
    ///
    /// Panics when called out of sequence.
    pub fn end_record(&mut self) -> Result<(), WARCError> {
        assert!(self.state == WriterState::InBlock);
        tracing::debug!("end_record");
        assert!(self.stream.is_none());
        assert!(self.compressed_stream.is_some());

        self.check_block_length()?;

        let mut stream = self.compressed_stream.take().unwrap();
        stream.write_all(b"\r\n\r\n")?;
        let mut stream = stream.finish()?;
        stream.flush()?;
        self.stream = Some(stream);
        self.state = WriterState::StartOfHeader;

        Ok(())
    }

    fn check_block_length(&self) -> Result<(), WARCError> {
        tracing::debug!(
            bytes_written = self.block_amount_written,
            block_length = self.block_length,
            "check_block_length"
        );

        if self.block_amount_written != self.block_length {
            return Err(WARCError::WrongBlockLength {
                record_id: self.record_id.clone(),
            });
        }

        Ok(())
    }

    /// Writes a fully materialized record.
    pub fn write_record(&mut self, record: &WARCRecord) -> Result<(), WARCError> {
        self.begin_record(&record.version, &record.headers, record.body.len() as u64)?;
        let mut block = self.write_block();
        block.write_all(&record.body)?;
        self.end_record()?;

        Ok(())
    }
}

/// Writer stream for a record body.
pub struct BlockWriter<'a, 'b, S: Write> {
    stream: &'b mut Compressor<'a, S>,
    num_bytes_written: &'b mut u64,
}

impl<'a, 'b, S: Write> Write for BlockWriter<'a, 'b, S> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let amount = self.stream.write(buf)?;
        *self.num_bytes_written += amount as u64;
        Ok(amount)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    StartOfHeader,
    EndOfHeader,
    InBlock,
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::warc::WARCReader;

    use super::*;

    fn sample_record(body: &[u8]) -> WARCRecord {
        let mut headers = HeaderMap::new();
        headers.append("WARC-Type", "resource");
        headers.append("WARC-Record-ID", "<urn:uuid:1>");
        headers.append("WARC-Date", "2014-02-10T11:00:00Z");
        headers.append("Content-Type", "text/plain");

        WARCRecord::new(headers, body.to_vec())
    }

    #[test]
    fn test_write_read_round_trip() {
        let mut writer = WARCWriter::new(Vec::new());
        writer.write_record(&sample_record(b"hello")).unwrap();
        let data = writer.into_inner();

        let mut reader = WARCReader::new(Cursor::new(data)).unwrap();
        let record = reader.read_record().unwrap().unwrap();

        assert_eq!(record.headers.get_str("Content-Length"), Some("5"));
        assert_eq!(record.body, b"hello");
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_content_length_regenerated() {
        let mut record = sample_record(b"hello");
        record.headers.insert("Content-Length", "9999");

        let mut writer = WARCWriter::new(Vec::new());
        writer.write_record(&record).unwrap();
        let data = writer.into_inner();

        let mut reader = WARCReader::new(Cursor::new(data)).unwrap();
        let read_back = reader.read_record().unwrap().unwrap();

        assert_eq!(read_back.headers.get_str("Content-Length"), Some("5"));
    }

    #[test]
    fn test_gzip_one_member_per_record() {
        let mut writer = WARCWriter::new_compressed(
            Vec::new(),
            CompressionFormat::Gzip,
            CompressionLevel::default(),
        );
        writer.write_record(&sample_record(b"first")).unwrap();
        writer.write_record(&sample_record(b"second")).unwrap();
        let data = writer.into_inner();

        let members = data
            .windows(2)
            .filter(|pair| pair == &[0x1f, 0x8b])
            .count();
        assert_eq!(members, 2);

        let mut reader = WARCReader::new(Cursor::new(data)).unwrap();
        assert_eq!(reader.read_record().unwrap().unwrap().body, b"first");
        assert_eq!(reader.read_record().unwrap().unwrap().body, b"second");
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_short_block_rejected() {
        let mut writer = WARCWriter::new(Vec::new());
        writer
            .begin_record("WARC/1.0", &sample_record(b"").headers, 10)
            .unwrap();
        let mut block = writer.write_block();
        block.write_all(b"short").unwrap();
        let result = writer.end_record();

        assert!(matches!(result, Err(WARCError::WrongBlockLength { .. })));
    }
}
