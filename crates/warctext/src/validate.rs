//! In-process validation of produced archives.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use thiserror::Error;

use crate::warc::{WARCError, WARCReader};

/// Fields every record must carry to be considered usable downstream.
const REQUIRED_FIELDS: [&str; 3] = ["WARC-Type", "WARC-Record-ID", "WARC-Date"];

/// Errors from archive validation.
#[derive(Error, Debug)]
pub enum ValidateError {
    /// A record is missing a required field.
    #[error("record {record_number} is missing field {name}")]
    MissingField {
        /// Position of the record in the file, starting at 1.
        record_number: u64,
        /// Name of the missing field.
        name: String,
    },

    /// A record's `WARC-Date` is not a valid timestamp.
    #[error("record {record_number} has unparseable date `{value}`")]
    BadDate {
        /// Position of the record in the file, starting at 1.
        record_number: u64,
        /// The offending value.
        value: String,
    },

    /// The archive framing is broken.
    #[error(transparent)]
    Warc(#[from] WARCError),

    /// IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Re-reads the archive at `path` and checks every record.
///
/// Framing (block lengths, record footers) is enforced by the reader; on
/// top of that each record must carry `WARC-Type`, `WARC-Record-ID`, and a
/// `WARC-Date` that parses as an RFC 3339 timestamp. Returns the number of
/// records in the archive.
pub fn validate_file(path: &Path) -> Result<u64, ValidateError> {
    let file = BufReader::new(File::open(path)?);
    let mut reader = WARCReader::new(file)?;
    let mut record_number = 0;

    loop {
        let header = match reader.begin_record()? {
            Some(header) => header,
            None => break,
        };

        record_number += 1;

        for name in REQUIRED_FIELDS {
            if !header.fields.contains_key(name) {
                return Err(ValidateError::MissingField {
                    record_number,
                    name: name.to_string(),
                });
            }
        }

        let date = header.fields.get_str("WARC-Date").unwrap_or_default();
        if chrono::DateTime::parse_from_rfc3339(date).is_err() {
            return Err(ValidateError::BadDate {
                record_number,
                value: date.to_string(),
            });
        }

        let mut block = reader.read_block();
        std::io::copy(&mut block, &mut std::io::sink())?;
        reader.end_record(block)?;
    }

    tracing::debug!(?path, record_number, "validated file");

    Ok(record_number)
}
