use crate::nomutil::NomParseError;

use super::HeaderMap;

/// Error occurred parsing a header.
pub type ParseError = crate::error::ParseError;

/// Decode header data into structures.
#[derive(Default)]
pub struct HeaderParser {}

impl HeaderParser {
    /// Creates a `HeaderParser` with the default configuration.
    pub fn new() -> Self {
        Self {}
    }

    /// Decode the given header data.
    ///
    /// Special decoding steps are performed:
    ///
    /// - Whitespace surrounding names and values are removed.
    /// - Folded lines are automatically unfolded.
    ///
    /// The original bytes of each name and value are retained on the parsed
    /// fields.
    pub fn parse_header(&self, input: &[u8]) -> Result<HeaderMap, ParseError> {
        super::pc::parse_fields(input)
            .map_err(|error| crate::error::ParseError(NomParseError::from_nom(input, &error)))
    }
}
