//! Canonicalisation of observed Content-Types to types the extraction
//! service is known to accept.

use lazy_static::lazy_static;
use regex::RegexBuilder;

/// The canonicalisation table.
///
/// Entries are tried in order; the first pattern found anywhere in the input
/// type wins. A `None` canonical type means the input type is forwarded
/// verbatim, which is used for the long variable Open XML and OpenDocument
/// families. The patterns were collected from a crawl of .gov.uk; it is
/// astonishing what junk some web servers will supply for a Content-Type.
const MAPPINGS: [(&str, Option<&str>); 8] = [
    (r"^application/pdf$", Some("application/pdf")),
    (
        r"^application/(x-)?(vnd\.?)?(ms-?)?(excel)|(xls)",
        Some("application/vnd.ms-excel"),
    ),
    (
        r"^application/(x-)?(vnd\.?)?(ms-?)?(powerpoint)|(pps)|(ppt)",
        Some("application/vnd.ms-powerpoint"),
    ),
    (
        r"^application/(x-)?(vnd\.?)?(ms-?)?(word$)|(doc$)",
        Some("application/msword"),
    ),
    (r"^application/vnd\.openxmlformats-officedocument", None),
    (r"^((text)|(application))/((rtf)|(richtext))$", Some("text/rtf")),
    (r"^application/vnd\.oasis\.opendocument", None),
    (r"^acrobat$", Some("application/pdf")),
];

lazy_static! {
    static ref COMPILED: Vec<(regex::Regex, Option<&'static str>)> = MAPPINGS
        .iter()
        .map(|(pattern, canonical)| {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .unwrap();
            (regex, *canonical)
        })
        .collect();
}

/// Decides whether a Content-Type should be sent for text extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct MimeClassifier {}

impl MimeClassifier {
    /// Creates a classifier over the fixed canonicalisation table.
    pub fn new() -> Self {
        Self {}
    }

    /// Returns the canonical type to submit for extraction, or `None` when
    /// the record should be kept as is.
    ///
    /// An absent input type always returns `None`.
    pub fn canonical_type(&self, mime_type: Option<&str>) -> Option<String> {
        let mime_type = mime_type?;

        for (regex, canonical) in COMPILED.iter() {
            if regex.is_match(mime_type) {
                return match canonical {
                    Some(canonical) => Some(canonical.to_string()),
                    None => Some(mime_type.to_string()),
                };
            }
        }

        None
    }

    /// Returns the sentence documenting the rewrite for `warcinfo` records.
    ///
    /// Enumerates every pattern of the table joined by `"; "` and terminated
    /// by `"."`.
    pub fn description(&self) -> String {
        let mut text = String::from(
            "Items collected with content types matching the following \
             regular expressions have been processed by Apache Tika to \
             attempt to produce plain text formats for storage. These \
             processed items have been stored as WARC conversion records: ",
        );

        text.push_str(
            &MAPPINGS
                .iter()
                .map(|(pattern, _)| *pattern)
                .collect::<Vec<&str>>()
                .join("; "),
        );
        text.push('.');

        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_types() {
        let classifier = MimeClassifier::new();

        assert_eq!(
            classifier.canonical_type(Some("application/pdf")).as_deref(),
            Some("application/pdf")
        );
        assert_eq!(
            classifier.canonical_type(Some("acrobat")).as_deref(),
            Some("application/pdf")
        );
        assert_eq!(
            classifier.canonical_type(Some("text/rtf")).as_deref(),
            Some("text/rtf")
        );
        assert_eq!(
            classifier.canonical_type(Some("application/richtext")).as_deref(),
            Some("text/rtf")
        );
    }

    #[test]
    fn test_legacy_office_families() {
        let classifier = MimeClassifier::new();

        assert_eq!(
            classifier
                .canonical_type(Some("application/vnd.ms-excel"))
                .as_deref(),
            Some("application/vnd.ms-excel")
        );
        assert_eq!(
            classifier.canonical_type(Some("application/x-excel")).as_deref(),
            Some("application/vnd.ms-excel")
        );
        assert_eq!(
            classifier
                .canonical_type(Some("application/mspowerpoint"))
                .as_deref(),
            Some("application/vnd.ms-powerpoint")
        );
        assert_eq!(
            classifier.canonical_type(Some("application/msword")).as_deref(),
            Some("application/msword")
        );
    }

    #[test]
    fn test_passthrough_families() {
        let classifier = MimeClassifier::new();
        let openxml =
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
        let odf = "application/vnd.oasis.opendocument.text";

        assert_eq!(classifier.canonical_type(Some(openxml)).as_deref(), Some(openxml));
        assert_eq!(classifier.canonical_type(Some(odf)).as_deref(), Some(odf));
    }

    #[test]
    fn test_case_insensitive() {
        let classifier = MimeClassifier::new();

        assert_eq!(
            classifier.canonical_type(Some("Application/PDF")).as_deref(),
            Some("application/pdf")
        );
    }

    #[test]
    fn test_do_not_convert() {
        let classifier = MimeClassifier::new();

        assert_eq!(classifier.canonical_type(Some("text/html")), None);
        assert_eq!(classifier.canonical_type(Some("image/png")), None);
        assert_eq!(classifier.canonical_type(None), None);
    }

    #[test]
    fn test_description_lists_all_patterns() {
        let classifier = MimeClassifier::new();
        let description = classifier.description();

        assert!(description.ends_with('.'));
        assert_eq!(description.matches("; ").count(), MAPPINGS.len() - 1);
        for (pattern, _) in MAPPINGS.iter() {
            assert!(description.contains(pattern));
        }
    }
}
