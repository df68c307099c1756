//! Predicate-driven removal of records from WARC files.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;

use crate::{
    http::parse_response_payload,
    warc::{RecordKind, WARCError, WARCReader, WARCRecord, WARCWriter},
};

/// Prefix of the synthetic fields computed from an HTTP response payload.
const HTTP_FIELD_PREFIX: &str = "XHTTP-";

/// Field name that includes further predicates from a file.
const FILE_FIELD: &str = "XFile";

/// How many levels of pattern files may include each other.
const MAX_PATTERN_FILE_DEPTH: usize = 16;

/// Errors from the exclusion filter.
#[derive(Error, Debug)]
pub enum ExcludeError {
    /// A pattern argument is not of the `field/regexp` form or its regex is
    /// invalid.
    #[error("invalid exclusion pattern `{pattern}`")]
    InvalidPattern {
        /// The offending pattern text.
        pattern: String,
        /// Source of the error.
        #[source]
        source: Option<regex::Error>,
    },

    /// A pattern file could not be read or includes itself.
    #[error("unusable pattern file `{path}`: {reason}")]
    PatternFile {
        /// Path of the pattern file.
        path: String,
        /// Why the file was rejected.
        reason: String,
    },

    /// No predicates were given.
    #[error("no exclusion predicates")]
    NoPredicates,

    /// The archive could not be read or written.
    #[error(transparent)]
    Warc(#[from] WARCError),

    /// IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A single `field/regexp` exclusion predicate.
#[derive(Debug, Clone)]
pub struct Predicate {
    /// Header (or synthetic) field the regex is matched against.
    pub field: String,
    /// Compiled pattern.
    pub pattern: Regex,
}

impl Predicate {
    /// Parses a `field/regexp` pattern. The first `/` separates the parts.
    pub fn parse(text: &str) -> Result<Self, ExcludeError> {
        let (field, pattern) = text.split_once('/').ok_or_else(|| {
            ExcludeError::InvalidPattern {
                pattern: text.to_string(),
                source: None,
            }
        })?;

        let pattern = Regex::new(pattern).map_err(|error| ExcludeError::InvalidPattern {
            pattern: text.to_string(),
            source: Some(error),
        })?;

        Ok(Self {
            field: field.to_string(),
            pattern,
        })
    }

    fn is_http_field(&self) -> bool {
        self.field
            .to_ascii_lowercase()
            .starts_with(&HTTP_FIELD_PREFIX.to_ascii_lowercase())
    }
}

/// Expands pattern arguments into predicates.
///
/// An argument `XFile/path` loads further patterns from `path`, one per
/// non-empty line, recursively. Inclusion cycles and over-deep nesting are
/// rejected.
pub fn load_patterns(args: &[String]) -> Result<Vec<Predicate>, ExcludeError> {
    let mut predicates = Vec::new();
    let mut visited = HashSet::new();

    for arg in args {
        load_one_pattern(arg, &mut predicates, &mut visited, 0)?;
    }

    Ok(predicates)
}

fn load_one_pattern(
    text: &str,
    predicates: &mut Vec<Predicate>,
    visited: &mut HashSet<PathBuf>,
    depth: usize,
) -> Result<(), ExcludeError> {
    let text = text.trim();

    if let Some(path) = text.strip_prefix(&format!("{}/", FILE_FIELD)) {
        return load_pattern_file(Path::new(path), predicates, visited, depth);
    }

    predicates.push(Predicate::parse(text)?);

    Ok(())
}

fn load_pattern_file(
    path: &Path,
    predicates: &mut Vec<Predicate>,
    visited: &mut HashSet<PathBuf>,
    depth: usize,
) -> Result<(), ExcludeError> {
    if depth >= MAX_PATTERN_FILE_DEPTH {
        return Err(ExcludeError::PatternFile {
            path: path.display().to_string(),
            reason: "pattern files nested too deeply".to_string(),
        });
    }

    let canonical = path
        .canonicalize()
        .map_err(|error| ExcludeError::PatternFile {
            path: path.display().to_string(),
            reason: error.to_string(),
        })?;

    if !visited.insert(canonical) {
        return Err(ExcludeError::PatternFile {
            path: path.display().to_string(),
            reason: "pattern file includes itself".to_string(),
        });
    }

    let contents = std::fs::read_to_string(path).map_err(|error| ExcludeError::PatternFile {
        path: path.display().to_string(),
        reason: error.to_string(),
    })?;

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }

        load_one_pattern(line, predicates, visited, depth + 1)?;
    }

    Ok(())
}

/// Whether every predicate or any predicate must fire to exclude a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Every predicate must fire.
    All,
    /// One firing predicate suffices.
    Any,
}

/// Per-run counts for the exclusion filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExcludeStats {
    /// Records read from the input.
    pub records_read: u64,
    /// Records written to the output.
    pub records_written: u64,
    /// Records excluded, whether by predicate or by cascade.
    pub records_excluded: u64,
}

/// Removes records matched by predicates, cascading to derivative records.
///
/// When a record is excluded its ID joins a growing set; later records
/// whose `WARC-Concurrent-To` names an excluded ID are excluded without
/// evaluating any predicate, so requests and metadata disappear together
/// with their response.
pub struct ExclusionFilter {
    predicates: Vec<Predicate>,
    mode: MatchMode,
    http_fields: bool,
}

impl ExclusionFilter {
    /// Creates a filter over the given predicates.
    ///
    /// `http_fields` enables the synthetic `XHTTP-` fields; when disabled,
    /// predicates naming them never fire.
    pub fn new(
        predicates: Vec<Predicate>,
        mode: MatchMode,
        http_fields: bool,
    ) -> Result<Self, ExcludeError> {
        if predicates.is_empty() {
            return Err(ExcludeError::NoPredicates);
        }

        Ok(Self {
            predicates,
            mode,
            http_fields,
        })
    }

    /// Copies `reader` to `writer`, dropping matched records.
    pub fn run<R: Read, W: Write>(
        &self,
        reader: &mut WARCReader<'_, R>,
        writer: &mut WARCWriter<'_, W>,
    ) -> Result<ExcludeStats, ExcludeError> {
        let mut stats = ExcludeStats::default();
        let mut excluded_ids: HashSet<String> = HashSet::new();

        let wants_http = self.http_fields
            && self
                .predicates
                .iter()
                .any(|predicate| predicate.is_http_field());

        loop {
            let record = match reader.read_record()? {
                Some(record) => record,
                None => break,
            };

            stats.records_read += 1;

            if self.is_excluded(&record, &excluded_ids, wants_http) {
                tracing::debug!(
                    record_id = record.id().unwrap_or_default(),
                    "excluding record"
                );
                stats.records_excluded += 1;

                if let Some(id) = record.id() {
                    excluded_ids.insert(id.to_string());
                }

                continue;
            }

            writer.write_record(&record)?;
            stats.records_written += 1;
        }

        Ok(stats)
    }

    fn is_excluded(
        &self,
        record: &WARCRecord,
        excluded_ids: &HashSet<String>,
        wants_http: bool,
    ) -> bool {
        // Derivatives of an excluded record go first, without touching the
        // predicates at all.
        if record
            .headers
            .get_all("WARC-Concurrent-To")
            .any(|value| excluded_ids.contains(&value.text))
        {
            return true;
        }

        let payload = if wants_http && record.kind() == RecordKind::Response {
            let target = record.target_uri().unwrap_or_default();
            parse_response_payload(&record.body, target).ok()
        } else {
            None
        };

        let mut fired = 0;

        for predicate in &self.predicates {
            let hit = if predicate.is_http_field() {
                match &payload {
                    Some(payload) => {
                        let field = predicate.field.to_ascii_lowercase();
                        match field.as_str() {
                            "xhttp-response-code" => {
                                predicate.pattern.is_match(&payload.status_code.to_string())
                            }
                            "xhttp-content-type" => payload
                                .media_type
                                .as_deref()
                                .map(|value| predicate.pattern.is_match(value))
                                .unwrap_or(false),
                            "xhttp-body" => predicate
                                .pattern
                                .is_match(&String::from_utf8_lossy(&payload.body)),
                            _ => false,
                        }
                    }
                    None => false,
                }
            } else {
                record
                    .headers
                    .get_all(&predicate.field)
                    .any(|value| predicate.pattern.is_match(&value.text))
            };

            if hit {
                fired += 1;
            } else if self.mode == MatchMode::All {
                return false;
            }
        }

        match self.mode {
            MatchMode::All => fired == self.predicates.len(),
            MatchMode::Any => fired > 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::header::HeaderMap;

    use super::*;

    fn record(warc_type: &str, id: &str, extra: &[(&str, &str)]) -> WARCRecord {
        let mut headers = HeaderMap::new();
        headers.append("WARC-Type", warc_type);
        headers.append("WARC-Record-ID", id);
        headers.append("WARC-Date", "2014-02-10T11:00:00Z");

        for (name, value) in extra {
            headers.append(*name, *value);
        }

        WARCRecord::new(headers, b"body bytes".to_vec())
    }

    fn archive(records: &[WARCRecord]) -> Vec<u8> {
        let mut writer = WARCWriter::new(Vec::new());

        for record in records {
            writer.write_record(record).unwrap();
        }

        writer.into_inner()
    }

    fn run_filter(filter: &ExclusionFilter, data: Vec<u8>) -> (ExcludeStats, Vec<WARCRecord>) {
        let mut reader = WARCReader::new(Cursor::new(data)).unwrap();
        let mut writer = WARCWriter::new(Vec::new());
        let stats = filter.run(&mut reader, &mut writer).unwrap();
        let output = writer.into_inner();

        let mut reader = WARCReader::new(Cursor::new(output)).unwrap();
        let mut records = Vec::new();
        while let Some(record) = reader.read_record().unwrap() {
            records.push(record);
        }

        (stats, records)
    }

    #[test]
    fn test_exclude_by_uri() {
        let data = archive(&[
            record("warcinfo", "<urn:uuid:0>", &[]),
            record(
                "response",
                "<urn:uuid:1>",
                &[("WARC-Target-URI", "http://x/doc.pdf")],
            ),
        ]);

        let filter = ExclusionFilter::new(
            vec![Predicate::parse("WARC-Target-URI/^http://x/").unwrap()],
            MatchMode::All,
            true,
        )
        .unwrap();

        let (stats, records) = run_filter(&filter, data);

        assert_eq!(stats.records_read, 2);
        assert_eq!(stats.records_excluded, 1);
        assert_eq!(stats.records_written, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].headers.get_str("WARC-Type"), Some("warcinfo"));
    }

    #[test]
    fn test_cascade_through_concurrent_to() {
        let data = archive(&[
            record("warcinfo", "<urn:uuid:0>", &[]),
            record(
                "response",
                "<urn:uuid:1>",
                &[("WARC-Target-URI", "http://x/doc.pdf")],
            ),
            record(
                "metadata",
                "<urn:uuid:2>",
                &[("WARC-Concurrent-To", "<urn:uuid:1>")],
            ),
        ]);

        let filter = ExclusionFilter::new(
            vec![Predicate::parse("WARC-Target-URI/^http://x/").unwrap()],
            MatchMode::All,
            true,
        )
        .unwrap();

        let (stats, records) = run_filter(&filter, data);

        assert_eq!(stats.records_excluded, 2);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].headers.get_str("WARC-Type"), Some("warcinfo"));
    }

    #[test]
    fn test_cascade_is_transitive() {
        let data = archive(&[
            record(
                "response",
                "<urn:uuid:1>",
                &[("WARC-Target-URI", "http://x/doc.pdf")],
            ),
            record(
                "metadata",
                "<urn:uuid:2>",
                &[("WARC-Concurrent-To", "<urn:uuid:1>")],
            ),
            record(
                "metadata",
                "<urn:uuid:3>",
                &[("WARC-Concurrent-To", "<urn:uuid:2>")],
            ),
        ]);

        let filter = ExclusionFilter::new(
            vec![Predicate::parse("WARC-Target-URI/^http://x/").unwrap()],
            MatchMode::All,
            true,
        )
        .unwrap();

        let (stats, records) = run_filter(&filter, data);

        assert_eq!(stats.records_excluded, 3);
        assert!(records.is_empty());
    }

    #[test]
    fn test_match_modes() {
        let data = archive(&[record(
            "response",
            "<urn:uuid:1>",
            &[("WARC-Target-URI", "http://x/doc.pdf")],
        )]);

        let both = vec![
            Predicate::parse("WARC-Target-URI/^http://x/").unwrap(),
            Predicate::parse("WARC-Type/^request$").unwrap(),
        ];

        let all = ExclusionFilter::new(both.clone(), MatchMode::All, true).unwrap();
        let (stats, _) = run_filter(&all, data.clone());
        assert_eq!(stats.records_excluded, 0);

        let any = ExclusionFilter::new(both, MatchMode::Any, true).unwrap();
        let (stats, _) = run_filter(&any, data);
        assert_eq!(stats.records_excluded, 1);
    }

    #[test]
    fn test_http_response_code_field() {
        let body = b"HTTP/1.1 404 Not Found\r\nContent-Type: text/html\r\n\r\ngone";
        let mut response = record(
            "response",
            "<urn:uuid:1>",
            &[("WARC-Target-URI", "http://x/missing")],
        );
        response.body = body.to_vec();

        let data = archive(&[response]);

        let filter = ExclusionFilter::new(
            vec![Predicate::parse("XHTTP-Response-Code/^404$").unwrap()],
            MatchMode::All,
            true,
        )
        .unwrap();
        let (stats, _) = run_filter(&filter, data.clone());
        assert_eq!(stats.records_excluded, 1);

        // With synthetic fields disabled the predicate cannot fire.
        let filter = ExclusionFilter::new(
            vec![Predicate::parse("XHTTP-Response-Code/^404$").unwrap()],
            MatchMode::All,
            false,
        )
        .unwrap();
        let (stats, _) = run_filter(&filter, data);
        assert_eq!(stats.records_excluded, 0);
    }

    #[test]
    fn test_pattern_parse_errors() {
        assert!(matches!(
            Predicate::parse("no-slash-here"),
            Err(ExcludeError::InvalidPattern { .. })
        ));
        assert!(matches!(
            Predicate::parse("field/([unclosed"),
            Err(ExcludeError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_pattern_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.txt");
        std::fs::write(&path, "WARC-Type/^request$\n\nWARC-Type/^metadata$\n").unwrap();

        let args = vec![format!("XFile/{}", path.display())];
        let predicates = load_patterns(&args).unwrap();

        assert_eq!(predicates.len(), 2);
        assert_eq!(predicates[0].field, "WARC-Type");
    }

    #[test]
    fn test_pattern_file_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cycle.txt");
        std::fs::write(&path, format!("XFile/{}\n", path.display())).unwrap();

        let args = vec![format!("XFile/{}", path.display())];
        let result = load_patterns(&args);

        assert!(matches!(result, Err(ExcludeError::PatternFile { .. })));
    }

    #[test]
    fn test_no_predicates_rejected() {
        assert!(matches!(
            ExclusionFilter::new(Vec::new(), MatchMode::All, true),
            Err(ExcludeError::NoPredicates)
        ));
    }
}
