use std::fmt::{self, Debug, Display, Formatter};
use std::io;

use derive_more::Display;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A set of errors that can occur while parsing a multipart stream and in
/// other operations.
#[derive(Display)]
#[non_exhaustive]
pub enum Error {
    /// The multipart body is malformed. The message is the scanner's error
    /// message.
    #[display(fmt = "malformed multipart body: {}", _0)]
    Malformed(ScanError),

    /// A buffer size, offset, length or boundary was not acceptable.
    #[display(fmt = "invalid argument: {}", _0)]
    InvalidArgument(String),

    /// Reading from the underlying stream failed.
    #[display(fmt = "stream read failed: {}", _0)]
    StreamReadFailed(io::Error),

    /// Couldn't read the part headers completely.
    #[display(fmt = "failed to read part complete headers")]
    IncompleteHeaders,

    /// Failed to read headers.
    #[display(fmt = "failed to read headers: {}", _0)]
    ReadHeaderFailed(httparse::Error),

    /// Failed to decode the part's raw header name to
    /// [`HeaderName`](http::header::HeaderName) type.
    #[display(fmt = "failed to decode part's raw header name: {:?} {}", name, cause)]
    DecodeHeaderName { name: String, cause: BoxError },

    /// Failed to decode the part's raw header value to
    /// [`HeaderValue`](http::header::HeaderValue) type.
    #[display(fmt = "failed to decode part's raw header value: {}", cause)]
    DecodeHeaderValue { value: Vec<u8>, cause: BoxError },

    /// The raw header block of a part exceeded the maximum limit.
    #[display(fmt = "part headers exceeded the maximum size limit: {} bytes", limit)]
    HeadersSizeExceeded { limit: usize },

    /// An unknown field is detected when multipart
    /// [`constraints`](crate::Constraints::allowed_fields) are added.
    #[display(fmt = "unknown field received: {}", "field_name.as_deref().unwrap_or(\"<unknown>\")")]
    UnknownField { field_name: Option<String> },

    /// The incoming field size exceeded the maximum limit.
    #[display(
        fmt = "field '{}' exceeded the maximum size limit: {} bytes",
        "field_name.as_deref().unwrap_or(\"<unknown>\")",
        limit
    )]
    FieldSizeExceeded { limit: u64, field_name: Option<String> },

    /// The incoming stream size exceeded the maximum limit.
    #[display(fmt = "stream size exceeded the maximum limit: {} bytes", limit)]
    StreamSizeExceeded { limit: u64 },

    /// The `Content-Type` header is not a `multipart` type.
    #[display(fmt = "Content-Type is not multipart")]
    NoMultipart,

    /// Failed to convert the `Content-Type` to [`mime::Mime`] type.
    #[display(fmt = "Failed to convert Content-Type to `mime::Mime` type: {}", _0)]
    DecodeContentType(mime::FromStrError),

    /// No boundary found in `Content-Type` header.
    #[display(fmt = "multipart boundary not found in Content-Type")]
    NoBoundary,

    /// Failed to decode the field data as `JSON` in
    /// [`field.json()`](crate::Field::json) method.
    #[cfg(feature = "json")]
    #[display(fmt = "failed to decode field data as JSON: {}", _0)]
    DecodeJson(serde_json::Error),
}

impl Error {
    pub(crate) fn invalid_argument<T: Into<String>>(msg: T) -> Error {
        Error::InvalidArgument(msg.into())
    }

    /// Returns the scan error if this error reports a malformed body.
    pub fn scan_error(&self) -> Option<ScanError> {
        match self {
            Error::Malformed(err) => Some(*err),
            _ => None,
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::StreamReadFailed(err) => Some(err),
            Error::Malformed(err) => Some(err),
            _ => None,
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string().eq(&other.to_string())
    }
}

impl Eq for Error {}

impl From<ScanError> for Error {
    fn from(err: ScanError) -> Self {
        Error::Malformed(err)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::StreamReadFailed(err) => err,
            Error::InvalidArgument(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
            err => io::Error::new(io::ErrorKind::InvalidData, err),
        }
    }
}

/// The ways a multipart body can be malformed.
///
/// These are reported by [`MultipartReader`](crate::MultipartReader) as part
/// of a [`ReadResult`](crate::ReadResult) and are terminal for the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanError {
    /// A boundary appears mid-stream without the preceding CRLF.
    BoundaryNotPrecededByCrlf,
    /// Non-whitespace bytes follow a boundary before its terminating CRLF.
    InvalidCharactersFollowingBoundary,
    /// A header block runs into a boundary before its empty line.
    HeadersNotFollowedByEmptyLine,
    /// A boundary line recurs inside the epilogue.
    BoundaryFoundAfterClosingBoundary,
    /// The stream ended while more structure was expected.
    UnexpectedEndOfStream,
}

impl ScanError {
    pub fn message(&self) -> &'static str {
        match self {
            ScanError::BoundaryNotPrecededByCrlf => "boundary not preceded by CRLF",
            ScanError::InvalidCharactersFollowingBoundary => "invalid characters following boundary",
            ScanError::HeadersNotFollowedByEmptyLine => "headers not followed by empty line",
            ScanError::BoundaryFoundAfterClosingBoundary => "boundary found after closing boundary",
            ScanError::UnexpectedEndOfStream => "unexpected end of stream",
        }
    }
}

impl Display for ScanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for ScanError {}
