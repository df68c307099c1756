//! Warctext rewrites WARC web archives so that binary document payloads
//! (PDF, Office formats, RTF, OpenDocument) are replaced by plain text
//! `conversion` records produced by an external extraction service.

#![warn(missing_docs)]
pub mod compress;
pub mod error;
pub mod exclude;
pub mod header;
pub mod http;
pub mod io;
pub mod mime;
mod nomutil;
pub mod stringutil;
pub mod tika;
pub mod transform;
pub mod uuid;
pub mod validate;
pub mod warc;
pub mod watch;
