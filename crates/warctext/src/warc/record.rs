use crate::header::HeaderMap;

/// Default WARC version string emitted for new records.
pub const DEFAULT_VERSION: &str = "WARC/1.0";

/// The value of a `WARC-Type` field, with unknown types preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Archive-level metadata record.
    Warcinfo,
    /// Captured request message.
    Request,
    /// Captured response message.
    Response,
    /// Directly stored resource.
    Resource,
    /// Metadata about another record.
    Metadata,
    /// Revisit of previously archived content.
    Revisit,
    /// Continuation of a segmented record.
    Continuation,
    /// Content derived from another record.
    Conversion,
    /// Any type this crate does not handle explicitly.
    Other,
}

impl RecordKind {
    /// Parses a `WARC-Type` value. Matching is case-insensitive.
    pub fn from_type(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "warcinfo" => Self::Warcinfo,
            "request" => Self::Request,
            "response" => Self::Response,
            "resource" => Self::Resource,
            "metadata" => Self::Metadata,
            "revisit" => Self::Revisit,
            "continuation" => Self::Continuation,
            "conversion" => Self::Conversion,
            _ => Self::Other,
        }
    }
}

/// A fully materialized WARC record.
///
/// The reader and writer also offer streaming access to record bodies; this
/// owned form is for records whose content must be inspected or replaced.
#[derive(Debug, Clone)]
pub struct WARCRecord {
    /// WARC version line, such as `WARC/1.0`.
    pub version: String,
    /// Named fields of the record.
    pub headers: HeaderMap,
    /// Content block.
    pub body: Vec<u8>,
}

impl WARCRecord {
    /// Creates a record with the default version.
    pub fn new(headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            headers,
            body,
        }
    }

    /// Returns the classified `WARC-Type`.
    pub fn kind(&self) -> RecordKind {
        self.headers
            .get_str("WARC-Type")
            .map(RecordKind::from_type)
            .unwrap_or(RecordKind::Other)
    }

    /// Returns the `WARC-Record-ID` value.
    pub fn id(&self) -> Option<&str> {
        self.headers.get_str("WARC-Record-ID")
    }

    /// Returns the `WARC-Target-URI` value.
    pub fn target_uri(&self) -> Option<&str> {
        self.headers.get_str("WARC-Target-URI")
    }

    /// Returns the record's declared `Content-Type`.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get_str("Content-Type")
    }

    /// Returns whether the record is one segment of a larger logical record.
    pub fn is_segmented(&self) -> bool {
        self.headers.contains_key("WARC-Segment-Number")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kind() {
        assert_eq!(RecordKind::from_type("response"), RecordKind::Response);
        assert_eq!(RecordKind::from_type("WARCINFO"), RecordKind::Warcinfo);
        assert_eq!(RecordKind::from_type("exotic"), RecordKind::Other);
    }

    #[test]
    fn test_record_accessors() {
        let mut headers = HeaderMap::new();
        headers.append("WARC-Type", "response");
        headers.append("WARC-Record-ID", "<urn:uuid:1>");
        headers.append("WARC-Segment-Number", "1");

        let record = WARCRecord::new(headers, Vec::new());

        assert_eq!(record.kind(), RecordKind::Response);
        assert_eq!(record.id(), Some("<urn:uuid:1>"));
        assert!(record.is_segmented());
        assert_eq!(record.version, DEFAULT_VERSION);
    }
}
