use lazy_static::lazy_static;
use regex::bytes::Regex;

pub(crate) const DEFAULT_WHOLE_STREAM_SIZE_LIMIT: u64 = std::u64::MAX;
pub(crate) const DEFAULT_PER_FIELD_SIZE_LIMIT: u64 = std::u64::MAX;
pub(crate) const DEFAULT_HEADERS_SIZE_LIMIT: usize = 8 * 1024;

pub(crate) const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Extra room the lookahead window keeps beyond the longest delimiter.
pub(crate) const BUFFER_PADDING: usize = 4;

/// Scratch size used when a body or epilogue is discarded.
pub(crate) const DISCARD_CHUNK_SIZE: usize = 4 * 1024;

pub(crate) const MAX_HEADERS: usize = 32;
pub(crate) const BOUNDARY_EXT: &[u8] = b"--";
pub(crate) const CRLF: &[u8] = b"\r\n";
pub(crate) const CRLF_CRLF: &[u8] = b"\r\n\r\n";

/// Linear whitespace allowed between a boundary and its CRLF.
pub(crate) const LWSP: &[u8] = b" \t";

lazy_static! {
    /// One `; key=value` parameter: group 1 is the key, group 2 a quoted
    /// value without its quotes, group 3 a token value.
    pub(crate) static ref CONTENT_DISPOSITION_PARAM_RE: Regex =
        Regex::new(r#"(?-u);\s*([^\s;=]+)\s*=\s*(?:"((?:[^"\\]|\\.)*)"?|([^;\s]*))"#).unwrap();
    pub(crate) static ref QUOTED_PAIR_RE: Regex = Regex::new(r"(?-u)\\(.)").unwrap();
}
