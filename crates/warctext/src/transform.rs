//! Per-record transformation of WARC files.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use lazy_static::lazy_static;
use thiserror::Error;

use crate::{
    compress::CompressionFormat,
    http::{parse_response_payload, HTTPError},
    mime::MimeClassifier,
    tika::{Extracted, TextExtractor},
    warc::{RecordKind, WARCError, WARCReader, WARCRecord, WARCWriter},
};

/// Errors that abort processing of a whole file.
///
/// Failures scoped to a single record are handled inside the transformer by
/// keeping the original record; they never surface here.
#[derive(Error, Debug)]
pub enum TransformError {
    /// The input archive violates WARC parse rules.
    #[error(transparent)]
    Warc(#[from] WARCError),

    /// IO error on the input or output file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Per-file outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    /// Records read from the input.
    pub records_read: u64,
    /// Records written to the output.
    pub records_written: u64,
    /// Records replaced by a conversion record.
    pub converted: u64,
    /// Records passed through unchanged.
    pub kept: u64,
    /// Records kept because processing them failed unexpectedly.
    pub failed: u64,
}

/// Rewrites WARC files, replacing extractable binary documents with
/// plain-text `conversion` records.
///
/// `warcinfo` records get the mangling notice appended to their description;
/// `response` (http and https schemes) and `resource` records are candidates
/// for conversion; segmented records and every other type pass through
/// verbatim. No single bad record aborts a file.
pub struct RecordTransformer<E> {
    extractor: E,
    classifier: MimeClassifier,
}

impl<E: TextExtractor> RecordTransformer<E> {
    /// Creates a transformer that submits documents to the given extractor.
    pub fn new(extractor: E) -> Self {
        Self {
            extractor,
            classifier: MimeClassifier::new(),
        }
    }

    /// Processes the archive at `input`, writing the rewritten archive to
    /// `output` with the given compression.
    ///
    /// The output file must not already exist.
    pub fn transform_file(
        &mut self,
        input: &Path,
        output: &Path,
        compression: CompressionFormat,
    ) -> Result<FileStats, TransformError> {
        tracing::info!(?input, ?output, "transforming file");

        let input_file = BufReader::new(File::open(input)?);
        let mut reader = WARCReader::new(input_file)?;

        let output_file = BufWriter::new(
            OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(output)?,
        );
        let mut writer = WARCWriter::new_compressed(output_file, compression, Default::default());

        let mut stats = FileStats::default();

        loop {
            let header = match reader.begin_record()? {
                Some(header) => header,
                None => break,
            };

            stats.records_read += 1;

            let kind = header
                .fields
                .get_str("WARC-Type")
                .map(RecordKind::from_type)
                .unwrap_or(RecordKind::Other);
            let segmented = header.fields.contains_key("WARC-Segment-Number");

            let inspect = !segmented
                && matches!(
                    kind,
                    RecordKind::Warcinfo | RecordKind::Response | RecordKind::Resource
                );

            if inspect {
                let mut body = Vec::new();
                let mut block = reader.read_block();
                block.read_to_end(&mut body)?;
                reader.end_record(block)?;

                let record = WARCRecord {
                    version: header.version,
                    headers: header.fields,
                    body,
                };

                self.process_record(&mut writer, record, kind, &mut stats)?;
            } else {
                // Segmented records and types with nothing to inspect are
                // copied through without materializing the body.
                writer.begin_record(&header.version, &header.fields, header.block_length)?;
                let mut block = reader.read_block();
                {
                    let mut block_writer = writer.write_block();
                    std::io::copy(&mut block, &mut block_writer)?;
                }
                writer.end_record()?;
                reader.end_record(block)?;

                stats.records_written += 1;
                stats.kept += 1;
            }
        }

        let mut sink = writer.into_inner();
        sink.flush()?;

        self.extractor.end_of_file();
        tracing::info!(?stats, "finished file");

        Ok(stats)
    }

    fn process_record<W: Write>(
        &mut self,
        writer: &mut WARCWriter<'_, W>,
        record: WARCRecord,
        kind: RecordKind,
        stats: &mut FileStats,
    ) -> Result<(), TransformError> {
        match kind {
            RecordKind::Warcinfo => {
                let mut record = record;
                annotate_warcinfo(&mut record, &self.classifier.description());
                writer.write_record(&record)?;
                stats.records_written += 1;
                stats.kept += 1;
            }
            RecordKind::Response | RecordKind::Resource => {
                match self.convert_record(&record) {
                    Ok(Some(conversion)) => {
                        writer.write_record(&conversion)?;
                        stats.records_written += 1;
                        stats.converted += 1;
                    }
                    Ok(None) => {
                        writer.write_record(&record)?;
                        stats.records_written += 1;
                        stats.kept += 1;
                    }
                    Err(error) => {
                        // One bad record never aborts the file; the
                        // original is written in place of the conversion.
                        tracing::warn!(
                            %error,
                            target = record.target_uri().unwrap_or_default(),
                            "failed to process record, writing original"
                        );
                        writer.write_record(&record)?;
                        stats.records_written += 1;
                        stats.failed += 1;
                    }
                }
            }
            _ => unreachable!("only inspected kinds reach process_record"),
        }

        Ok(())
    }

    fn convert_record(&mut self, record: &WARCRecord) -> Result<Option<WARCRecord>, HTTPError> {
        let (media_type, body) = match record.kind() {
            RecordKind::Resource => (
                record.content_type().map(|value| value.to_string()),
                record.body.clone(),
            ),
            RecordKind::Response => {
                let target = record.target_uri().unwrap_or_default().to_string();

                if !has_http_scheme(&target) {
                    tracing::debug!(%target, "response is not an http capture");
                    return Ok(None);
                }

                let payload = parse_response_payload(&record.body, &target)?;
                (payload.media_type, payload.body)
            }
            _ => return Ok(None),
        };

        let canonical = match self.classifier.canonical_type(media_type.as_deref()) {
            Some(canonical) => canonical,
            None => return Ok(None),
        };

        let extracted = match self.extractor.extract(&canonical, &body) {
            Ok(extracted) => extracted,
            Err(error) => {
                // Very common for image-based PDFs; keep the original.
                tracing::debug!(
                    %error,
                    target = record.target_uri().unwrap_or_default(),
                    "keeping original record"
                );
                return Ok(None);
            }
        };

        Ok(Some(build_conversion_record(record, extracted)))
    }
}

fn has_http_scheme(uri: &str) -> bool {
    url::Url::parse(uri)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Builds a `conversion` record derived from `original`.
///
/// `WARC-Concurrent-To` is not valid in conversion records and the digests
/// and lengths no longer describe the block; they are dropped. The record
/// gets a fresh ID and refers back to the original.
pub fn build_conversion_record(original: &WARCRecord, extracted: Extracted) -> WARCRecord {
    let mut headers = original.headers.clone();
    let refers_to = original.id().unwrap_or_default().to_string();

    for name in [
        "WARC-Concurrent-To",
        "WARC-Block-Digest",
        "WARC-Payload-Digest",
        "Content-Length",
        "Content-Type",
    ] {
        headers.remove(name);
    }

    headers.insert("WARC-Refers-To", refers_to);
    headers.insert("WARC-Type", "conversion");
    headers.insert("WARC-Record-ID", crate::uuid::new_record_id());
    headers.insert("Content-Type", extracted.content_type);

    WARCRecord {
        version: original.version.clone(),
        headers,
        body: extracted.body,
    }
}

lazy_static! {
    static ref DESCRIPTION_LINE: regex::bytes::Regex =
        regex::bytes::Regex::new(r"(?mi-u)^description: [^\r\n]*").unwrap();
}

/// Appends the mangling notice to a `warcinfo` record's description line,
/// creating the line when absent.
pub fn annotate_warcinfo(record: &mut WARCRecord, notice: &str) {
    match DESCRIPTION_LINE.find(&record.body) {
        Some(found) => {
            let mut body = Vec::with_capacity(record.body.len() + notice.len() + 2);
            body.extend_from_slice(&record.body[..found.end()]);
            body.extend_from_slice(b". ");
            body.extend_from_slice(notice.as_bytes());
            body.extend_from_slice(&record.body[found.end()..]);
            record.body = body;
        }
        None => {
            let mut body = format!("description: {}\r\n", notice).into_bytes();
            body.extend_from_slice(&record.body);
            record.body = body;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::header::HeaderMap;
    use crate::tika::ExtractError;

    use super::*;

    struct ScriptedExtractor {
        result: Option<Result<Extracted, ExtractError>>,
        calls: u64,
    }

    impl ScriptedExtractor {
        fn returning(result: Result<Extracted, ExtractError>) -> Self {
            Self {
                result: Some(result),
                calls: 0,
            }
        }

        fn never_called() -> Self {
            Self {
                result: None,
                calls: 0,
            }
        }
    }

    impl TextExtractor for ScriptedExtractor {
        fn extract(&mut self, _content_type: &str, _body: &[u8]) -> Result<Extracted, ExtractError> {
            self.calls += 1;
            self.result.take().expect("extractor was not scripted")
        }
    }

    fn text_result(len: usize) -> Result<Extracted, ExtractError> {
        Ok(Extracted {
            content_type: "text/plain".to_string(),
            body: vec![b't'; len],
        })
    }

    fn response_record(content_type: &str, body: &[u8]) -> WARCRecord {
        let mut http = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
            content_type,
            body.len()
        )
        .into_bytes();
        http.extend_from_slice(body);

        let mut headers = HeaderMap::new();
        headers.append("WARC-Type", "response");
        headers.append("WARC-Record-ID", "<urn:uuid:00000000-0000-0000-0000-000000000001>");
        headers.append("WARC-Date", "2014-02-10T11:00:00Z");
        headers.append("WARC-Target-URI", "http://x/doc.pdf");
        headers.append("WARC-Concurrent-To", "<urn:uuid:00000000-0000-0000-0000-000000000009>");
        headers.append("WARC-Block-Digest", "sha1:AAAA");
        headers.append("Content-Type", "application/http; msgtype=response");

        WARCRecord::new(headers, http)
    }

    #[test_log::test]
    fn test_convert_pdf_response() {
        let mut transformer =
            RecordTransformer::new(ScriptedExtractor::returning(text_result(2048)));
        let record = response_record("application/pdf", b"%PDF-1.4");

        let conversion = transformer.convert_record(&record).unwrap().unwrap();

        assert_eq!(conversion.headers.get_str("WARC-Type"), Some("conversion"));
        assert_eq!(
            conversion.headers.get_str("WARC-Refers-To"),
            Some("<urn:uuid:00000000-0000-0000-0000-000000000001>")
        );
        assert_ne!(conversion.id(), record.id());
        assert!(conversion.id().unwrap().starts_with("<urn:uuid:"));
        assert_eq!(conversion.headers.get_str("Content-Type"), Some("text/plain"));
        assert!(!conversion.headers.contains_key("WARC-Concurrent-To"));
        assert!(!conversion.headers.contains_key("WARC-Block-Digest"));
        assert!(!conversion.headers.contains_key("WARC-Payload-Digest"));
        assert!(!conversion.headers.contains_key("Content-Length"));
        assert_eq!(conversion.body, vec![b't'; 2048]);
    }

    #[test]
    fn test_keep_on_no_result() {
        let mut transformer = RecordTransformer::new(ScriptedExtractor::returning(Err(
            ExtractError::NoResult {
                reason: "output only 10 bytes".to_string(),
            },
        )));
        let record = response_record("application/pdf", b"%PDF-1.4");

        assert!(transformer.convert_record(&record).unwrap().is_none());
    }

    #[test]
    fn test_html_not_submitted() {
        let mut transformer = RecordTransformer::new(ScriptedExtractor::never_called());
        let record = response_record("text/html", b"<html></html>");

        assert!(transformer.convert_record(&record).unwrap().is_none());
        assert_eq!(transformer.extractor.calls, 0);
    }

    #[test]
    fn test_non_http_scheme_not_submitted() {
        let mut transformer = RecordTransformer::new(ScriptedExtractor::never_called());
        let mut record = response_record("application/pdf", b"%PDF-1.4");
        record
            .headers
            .insert("WARC-Target-URI", "ftp://x/doc.pdf");

        assert!(transformer.convert_record(&record).unwrap().is_none());
        assert_eq!(transformer.extractor.calls, 0);
    }

    #[test]
    fn test_resource_record_uses_record_content_type() {
        let mut transformer =
            RecordTransformer::new(ScriptedExtractor::returning(text_result(2048)));

        let mut headers = HeaderMap::new();
        headers.append("WARC-Type", "resource");
        headers.append("WARC-Record-ID", "<urn:uuid:2>");
        headers.append("Content-Type", "application/pdf");
        let record = WARCRecord::new(headers, b"%PDF-1.4".to_vec());

        let conversion = transformer.convert_record(&record).unwrap().unwrap();

        assert_eq!(conversion.headers.get_str("WARC-Type"), Some("conversion"));
        assert_eq!(transformer.extractor.calls, 1);
    }

    #[test_log::test]
    fn test_annotate_existing_description() {
        let mut headers = HeaderMap::new();
        headers.append("WARC-Type", "warcinfo");
        let body = b"software: crawler/1.0\r\ndescription: my crawl\r\nformat: WARC\r\n";
        let mut record = WARCRecord::new(headers, body.to_vec());

        annotate_warcinfo(&mut record, "NOTICE");

        let text = String::from_utf8(record.body.clone()).unwrap();
        assert!(text.contains("description: my crawl. NOTICE\r\nformat: WARC"));
        assert_eq!(text.matches("description:").count(), 1);
    }

    #[test]
    fn test_annotate_missing_description() {
        let mut headers = HeaderMap::new();
        headers.append("WARC-Type", "warcinfo");
        let mut record = WARCRecord::new(headers, b"format: WARC\r\n".to_vec());

        annotate_warcinfo(&mut record, "NOTICE");

        let text = String::from_utf8(record.body.clone()).unwrap();
        assert!(text.starts_with("description: NOTICE\r\n"));
        assert!(text.ends_with("format: WARC\r\n"));
    }
}
