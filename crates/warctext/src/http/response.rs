use std::fmt::Display;

use crate::{
    header::{HeaderMap, HeaderParser},
    nomutil::NomParseError,
};

use super::{HTTPError, decode_chunked};

/// An HTTP status line.
#[derive(Debug, Clone, Default)]
pub struct StatusLine {
    /// Protocol version pair, such as `(1, 1)`.
    pub version: (u16, u16),
    /// Three digit status code.
    pub status_code: u16,
    /// Reason phrase, possibly empty.
    pub reason_phrase: String,
}

impl StatusLine {
    /// Parses a status line from the given bytes.
    pub fn parse_from(input: &[u8]) -> Result<Self, HTTPError> {
        match super::pc::parse_status_line(input) {
            Ok(line) => Ok(Self {
                version: line.http_version,
                status_code: line.status_code,
                reason_phrase: String::from_utf8_lossy(line.reason_phrase).to_string(),
            }),
            Err(error) => Err(HTTPError::InvalidStartLine {
                source: Some(Box::new(NomParseError::from_nom(input, &error))),
            }),
        }
    }
}

impl Display for StatusLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "HTTP/{}.{} {:03} {}",
            self.version.0,
            self.version.1,
            self.status_code,
            self.reason_phrase
                .replace(|c: char| c.is_ascii_control(), "\u{FFFD}")
        ))
    }
}

/// The header portion of an HTTP response message.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeader {
    /// The status line.
    pub status_line: StatusLine,
    /// The name-value fields.
    pub fields: HeaderMap,
}

impl ResponseHeader {
    /// Parses a response header (status line and fields) from the given
    /// bytes. The bytes must not include the message body.
    pub fn parse_from(buf: &[u8]) -> Result<Self, HTTPError> {
        let (line, remain) = super::util::cut_start_line(buf);
        let status_line = StatusLine::parse_from(line)?;
        let field_buf = super::util::trim_trailing_newline(remain);

        match HeaderParser::new().parse_header(field_buf) {
            Ok(fields) => Ok(Self {
                status_line,
                fields,
            }),
            Err(error) => Err(HTTPError::MalformedHeader {
                source: Some(Box::new(error)),
            }),
        }
    }
}

/// The interesting parts of a captured HTTP response payload.
#[derive(Debug, Clone)]
pub struct ResponsePayload {
    /// Status code of the response.
    pub status_code: u16,
    /// Media type from `Content-Type`, without parameters, lower-cased.
    pub media_type: Option<String>,
    /// Value of the `charset` parameter of `Content-Type`, lower-cased.
    pub charset: Option<String>,
    /// Decoded message body.
    pub body: Vec<u8>,
}

/// Re-parses the content block of a WARC `response` record.
///
/// `target` is used only for diagnostics. Truncated messages and trailing
/// bytes after the declared body produce warnings, not errors; the bytes
/// that are available are returned. Chunked transfer coding is decoded
/// transparently.
pub fn parse_response_payload(block: &[u8], target: &str) -> Result<ResponsePayload, HTTPError> {
    let (head, body) = split_message(block);
    let header = ResponseHeader::parse_from(head)?;

    let (media_type, charset) = content_type_parts(&header.fields);

    let transfer_encoding = header
        .fields
        .get_str("Transfer-Encoding")
        .unwrap_or_default()
        .to_ascii_lowercase();

    let body = if transfer_encoding.contains("chunked") {
        match decode_chunked(body) {
            Ok(decoded) => decoded,
            Err(HTTPError::UnexpectedEnd) => {
                tracing::warn!(%target, "truncated chunked http response");
                body.to_vec()
            }
            Err(error) => return Err(error),
        }
    } else {
        check_body_length(&header.fields, body, target);
        body.to_vec()
    };

    Ok(ResponsePayload {
        status_code: header.status_line.status_code,
        media_type,
        charset,
        body,
    })
}

fn split_message(block: &[u8]) -> (&[u8], &[u8]) {
    // The head keeps the blank line so the last field line stays terminated
    // for the header parser.
    if let Some(index) = find_subsequence(block, b"\r\n\r\n") {
        (&block[..index + 4], &block[index + 4..])
    } else if let Some(index) = find_subsequence(block, b"\n\n") {
        (&block[..index + 2], &block[index + 2..])
    } else {
        (block, b"".as_slice())
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn content_type_parts(fields: &HeaderMap) -> (Option<String>, Option<String>) {
    let value = match fields.get_str("Content-Type") {
        Some(value) => value,
        None => return (None, None),
    };

    let mut parts = value.split(';');
    let media_type = parts
        .next()
        .map(|part| part.trim().to_ascii_lowercase())
        .filter(|part| !part.is_empty());

    let charset = parts
        .map(|part| part.trim())
        .find_map(|part| {
            let (name, value) = part.split_once('=')?;
            if name.trim().eq_ignore_ascii_case("charset") {
                Some(value.trim().trim_matches('"').to_ascii_lowercase())
            } else {
                None
            }
        })
        .filter(|charset| !charset.is_empty());

    (media_type, charset)
}

fn check_body_length(fields: &HeaderMap, body: &[u8], target: &str) {
    let declared = fields
        .get_str("Content-Length")
        .and_then(|value| value.trim().parse::<u64>().ok());

    if let Some(declared) = declared {
        let actual = body.len() as u64;

        if actual < declared {
            tracing::warn!(%target, declared, actual, "truncated http response");
        } else if actual > declared {
            tracing::warn!(%target, declared, actual, "trailing data in http response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_block(head: &str, body: &[u8]) -> Vec<u8> {
        let mut block = head.as_bytes().to_vec();
        block.extend_from_slice(body);
        block
    }

    #[test]
    fn test_parse_payload() {
        let block = response_block(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: Application/PDF\r\n\
             Content-Length: 4\r\n\
             \r\n",
            b"%PDF",
        );
        let payload = parse_response_payload(&block, "http://example.com/a.pdf").unwrap();

        assert_eq!(payload.status_code, 200);
        assert_eq!(payload.media_type.as_deref(), Some("application/pdf"));
        assert_eq!(payload.charset, None);
        assert_eq!(payload.body, b"%PDF");
    }

    #[test]
    fn test_parse_payload_charset() {
        let block = response_block(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/html; charset=UTF-8\r\n\
             \r\n",
            b"<html></html>",
        );
        let payload = parse_response_payload(&block, "http://example.com/").unwrap();

        assert_eq!(payload.media_type.as_deref(), Some("text/html"));
        assert_eq!(payload.charset.as_deref(), Some("utf-8"));
    }

    #[test]
    fn test_parse_payload_chunked() {
        let block = response_block(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/plain\r\n\
             Transfer-Encoding: chunked\r\n\
             \r\n",
            b"5\r\nhello\r\n0\r\n\r\n",
        );
        let payload = parse_response_payload(&block, "http://example.com/").unwrap();

        assert_eq!(payload.body, b"hello");
    }

    #[test]
    fn test_parse_payload_no_content_type() {
        let block = response_block("HTTP/1.1 204 No Content\r\n\r\n", b"");
        let payload = parse_response_payload(&block, "http://example.com/").unwrap();

        assert_eq!(payload.status_code, 204);
        assert_eq!(payload.media_type, None);
        assert!(payload.body.is_empty());
    }

    #[test]
    fn test_parse_payload_truncated_keeps_bytes() {
        let block = response_block(
            "HTTP/1.1 200 OK\r\n\
             Content-Length: 100\r\n\
             \r\n",
            b"only this",
        );
        let payload = parse_response_payload(&block, "http://example.com/").unwrap();

        assert_eq!(payload.body, b"only this");
    }

    #[test]
    fn test_parse_payload_bad_status_line() {
        let block = response_block("NOT-HTTP nonsense\r\n\r\n", b"");
        let result = parse_response_payload(&block, "http://example.com/");

        assert!(matches!(result, Err(HTTPError::InvalidStartLine { .. })));
    }
}
