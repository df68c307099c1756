//! Client for the text extraction service.

use std::collections::BTreeMap;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use thiserror::Error;

/// Default URL of the extraction service endpoint.
pub const DEFAULT_TIKA_URL: &str = "http://localhost:9998/tika";

/// Default minimum length of usable extractor output.
///
/// Image-only PDFs and scan artefacts produce near-empty text; below this
/// threshold the binary original is kept instead.
pub const DEFAULT_MIN_OUTPUT_BYTES: usize = 256;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const TRANSIENT_PAUSE_INITIAL: Duration = Duration::from_secs(2);
const TRANSIENT_PAUSE_MAX: Duration = Duration::from_secs(120);

/// Errors from a single extraction attempt.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The service answered but produced nothing worth keeping.
    #[error("no usable extractor result: {reason}")]
    NoResult {
        /// Why the result was discarded.
        reason: String,
    },

    /// The service could not be reached.
    #[error("extraction service unreachable")]
    Transient {
        /// Source of the error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Output of a successful extraction.
#[derive(Debug, Clone)]
pub struct Extracted {
    /// Content type of the extracted text, normally `text/plain`.
    pub content_type: String,
    /// The extracted text as bytes.
    pub body: Vec<u8>,
}

/// Submits document bodies for plain-text extraction.
///
/// Implemented by [TikaClient] for production and by scripted fakes in
/// tests; the record transformer is generic over this trait.
pub trait TextExtractor {
    /// Submits `body` with the given canonical content type and returns the
    /// extracted text.
    fn extract(&mut self, content_type: &str, body: &[u8]) -> Result<Extracted, ExtractError>;

    /// Called when the current input file is complete so the extractor may
    /// report per-file tallies.
    fn end_of_file(&mut self) {}
}

/// HTTP client for an Apache Tika compatible extraction endpoint.
///
/// The document bytes are `PUT` with a `Content-Type` header naming the
/// canonical type; a 200 response body is the extracted plain text. The
/// client counts response status codes per input file and pauses with
/// exponential backoff when connection failures cluster, so a transient
/// outage slows the pipeline down instead of corrupting its output.
#[derive(Debug, Clone)]
pub struct TikaClient {
    url: String,
    min_output_bytes: usize,
    client: reqwest::blocking::Client,
    status_counts: BTreeMap<u16, u64>,
    pause: ExponentialBackoff,
}

impl TikaClient {
    /// Creates a client for the given endpoint URL.
    pub fn new(url: &str, min_output_bytes: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::ClientBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            url: url.to_string(),
            min_output_bytes,
            client,
            status_counts: BTreeMap::new(),
            pause: ExponentialBackoff {
                initial_interval: TRANSIENT_PAUSE_INITIAL,
                max_interval: TRANSIENT_PAUSE_MAX,
                max_elapsed_time: None,
                ..Default::default()
            },
        })
    }

    /// Returns the endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Checks that the extraction service answers at all.
    pub fn health_check(&self) -> Result<(), ExtractError> {
        match self.client.get(&self.url).send() {
            Ok(_) => Ok(()),
            Err(error) => Err(ExtractError::Transient {
                source: Box::new(error),
            }),
        }
    }

    /// Returns and resets the per-file tally of response status codes.
    pub fn take_status_counts(&mut self) -> BTreeMap<u16, u64> {
        std::mem::take(&mut self.status_counts)
    }

    fn pause_after_transient(&mut self) {
        if let Some(duration) = self.pause.next_backoff() {
            tracing::warn!(?duration, "pausing after transient extractor failure");
            std::thread::sleep(duration);
        }
    }
}

impl TextExtractor for TikaClient {
    fn extract(&mut self, content_type: &str, body: &[u8]) -> Result<Extracted, ExtractError> {
        let response = self
            .client
            .put(&self.url)
            .header("Content-Type", content_type)
            .body(body.to_vec())
            .send();

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                self.pause_after_transient();
                return Err(ExtractError::Transient {
                    source: Box::new(error),
                });
            }
        };

        let status = response.status().as_u16();
        *self.status_counts.entry(status).or_insert(0) += 1;

        let bytes = match response.bytes() {
            Ok(bytes) => bytes,
            Err(error) => {
                self.pause_after_transient();
                return Err(ExtractError::Transient {
                    source: Box::new(error),
                });
            }
        };

        self.pause.reset();

        evaluate_response(content_type, status, bytes.to_vec(), self.min_output_bytes)
    }

    fn end_of_file(&mut self) {
        let counts = self.take_status_counts();

        if !counts.is_empty() {
            tracing::info!(status_counts = ?counts, "extractor response codes for file");
        }
    }
}

/// Applies the status-code and minimum-length policies to a response.
fn evaluate_response(
    content_type: &str,
    status: u16,
    body: Vec<u8>,
    min_output_bytes: usize,
) -> Result<Extracted, ExtractError> {
    if status != 200 {
        return Err(ExtractError::NoResult {
            reason: format!(
                "response code {} submitting content type {}",
                status, content_type
            ),
        });
    }

    if body.len() < min_output_bytes {
        return Err(ExtractError::NoResult {
            reason: format!(
                "output only {} bytes, probably an image-based document",
                body.len()
            ),
        });
    }

    Ok(Extracted {
        content_type: "text/plain".to_string(),
        body,
    })
}
