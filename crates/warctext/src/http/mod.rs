//! Parsing of HTTP messages captured inside WARC records.
mod chunked;
mod pc;
mod response;
mod util;

pub use chunked::*;
pub use response::*;

use thiserror::Error;

/// Errors during HTTP parsing.
#[derive(Error, Debug)]
pub enum HTTPError {
    /// Unexpected end of data.
    #[error("unexpected end of data")]
    UnexpectedEnd,

    /// Invalid or malformed status line.
    #[error("invalid start line")]
    InvalidStartLine {
        /// Source of the error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Header couldn't be parsed or formatted.
    #[error("malformed header")]
    MalformedHeader {
        /// Source of the error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Chunked transfer coding couldn't be decoded.
    #[error("malformed chunked coding")]
    MalformedChunkedCoding,

    /// IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
