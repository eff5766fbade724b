use std::io::{self, Read};

use crate::buffer::{Completion, ReadOutcome, StreamBuffer};
use crate::constants;
use crate::error::ScanError;
use crate::state::Section;

/// The result of one [`MultipartReader::read`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadResult {
    /// The section the returned bytes belong to.
    pub section: Section,
    /// Bytes written to the destination.
    pub read: usize,
    /// The section finished with this call: the preamble, a header block or
    /// a part body is complete, or the epilogue reached end of stream.
    pub end_of_part: bool,
    pub end_of_stream: bool,
    pub error: Option<ScanError>,
}

impl ReadResult {
    fn data(section: Section, read: usize) -> Self {
        ReadResult {
            section,
            read,
            end_of_part: false,
            end_of_stream: false,
            error: None,
        }
    }

    fn end_of_part(section: Section, read: usize) -> Self {
        ReadResult {
            end_of_part: true,
            ..ReadResult::data(section, read)
        }
    }

    fn end_of_stream(section: Section, read: usize) -> Self {
        ReadResult {
            end_of_part: true,
            end_of_stream: true,
            ..ReadResult::data(section, read)
        }
    }

    fn failed(section: Section, read: usize, error: ScanError) -> Self {
        ReadResult {
            error: Some(error),
            ..ReadResult::data(section, read)
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_message(&self) -> Option<&'static str> {
        self.error.as_ref().map(ScanError::message)
    }
}

/// A pull-based state machine over a multipart byte stream.
///
/// Each [`read`](MultipartReader::read) call hands out bytes of the current
/// [`Section`] and moves to the next section when a boundary or the empty
/// line after a header block is found. Boundary lines themselves are never
/// handed out.
///
/// Memory use is bounded by the buffer size: bodies of any length are passed
/// through in windows.
///
/// # Examples
///
/// ```
/// use multiread::{MultipartReader, Section};
///
/// let data = "--X-BOUNDARY\r\nContent-Type: text/plain\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
/// let mut reader = MultipartReader::new(data.as_bytes(), "X-BOUNDARY").unwrap();
/// let mut buf = [0u8; 64];
///
/// let mut body = Vec::new();
/// loop {
///     let result = reader.read(&mut buf).unwrap();
///     assert!(result.error.is_none());
///     if result.section == Section::Body {
///         body.extend_from_slice(&buf[..result.read]);
///     }
///     if result.end_of_stream {
///         break;
///     }
/// }
/// assert_eq!(body, b"abcd");
/// ```
pub struct MultipartReader<R> {
    buffer: StreamBuffer<R>,
    section: Section,
    /// `CRLF "--" boundary`; the dash-boundary is its tail.
    delimiter: Vec<u8>,
    header_start: bool,
    error: Option<ScanError>,
    /// Set once the underlying stream failed; the scan cannot resume.
    failure: Option<(io::ErrorKind, String)>,
}

impl<R: Read> MultipartReader<R> {
    /// Creates a reader with the default buffer size.
    pub fn new<B: AsRef<[u8]>>(reader: R, boundary: B) -> crate::Result<Self> {
        let boundary = boundary.as_ref();
        let buffer_size = constants::DEFAULT_BUFFER_SIZE.max(Self::min_buffer_size(boundary.len()));
        Self::with_buffer_size(reader, boundary, buffer_size)
    }

    /// Creates a reader whose lookahead window is `buffer_size` bytes.
    ///
    /// Fails if the boundary is empty or the buffer is smaller than
    /// [`min_buffer_size`](MultipartReader::min_buffer_size).
    pub fn with_buffer_size<B: AsRef<[u8]>>(reader: R, boundary: B, buffer_size: usize) -> crate::Result<Self> {
        let boundary = boundary.as_ref();
        if boundary.is_empty() {
            return Err(crate::Error::invalid_argument("boundary must not be empty"));
        }

        let min = Self::min_buffer_size(boundary.len());
        if buffer_size < min {
            return Err(crate::Error::invalid_argument(format!(
                "buffer size {} is below the minimum of {} bytes for a {} byte boundary",
                buffer_size,
                min,
                boundary.len()
            )));
        }

        let mut delimiter = Vec::with_capacity(boundary.len() + 4);
        delimiter.extend_from_slice(constants::CRLF);
        delimiter.extend_from_slice(constants::BOUNDARY_EXT);
        delimiter.extend_from_slice(boundary);

        Ok(MultipartReader {
            buffer: StreamBuffer::new(reader, buffer_size)?,
            section: Section::Preamble,
            delimiter,
            header_start: false,
            error: None,
            failure: None,
        })
    }

    /// The smallest buffer that can hold a delimiter for a boundary of
    /// `boundary_len` bytes plus padding.
    pub fn min_buffer_size(boundary_len: usize) -> usize {
        constants::CRLF.len() + constants::BOUNDARY_EXT.len() + boundary_len + constants::BUFFER_PADDING
    }

    pub fn section(&self) -> Section {
        self.section
    }

    /// The error that stopped the scan, if any.
    pub fn error(&self) -> Option<ScanError> {
        self.error
    }

    /// Total bytes consumed from the underlying stream.
    pub fn position(&self) -> u64 {
        self.buffer.position()
    }

    pub fn into_inner(self) -> R {
        self.buffer.into_inner()
    }

    /// Reads into `dest[offset..offset + max_len]`.
    pub fn read_at(&mut self, dest: &mut [u8], offset: usize, max_len: usize) -> crate::Result<ReadResult> {
        let end = offset
            .checked_add(max_len)
            .filter(|end| *end <= dest.len())
            .ok_or_else(|| {
                crate::Error::invalid_argument(format!(
                    "offset {} and length {} exceed a destination of {} bytes",
                    offset,
                    max_len,
                    dest.len()
                ))
            })?;

        self.read(&mut dest[offset..end])
    }

    /// Reads the next bytes of the current section into `dest`.
    ///
    /// Once a result carries an error, every later call returns the same
    /// error without touching the stream. Only I/O failures of the
    /// underlying stream are returned as `Err`; they are terminal as well,
    /// since the failed call may already have consumed part of a boundary
    /// line.
    pub fn read(&mut self, dest: &mut [u8]) -> crate::Result<ReadResult> {
        if let Some(err) = self.error {
            return Ok(ReadResult::failed(self.section, 0, err));
        }

        if let Some((kind, ref msg)) = self.failure {
            return Err(crate::Error::StreamReadFailed(io::Error::new(kind, msg.clone())));
        }

        let result = match self.section {
            Section::Preamble => self.read_preamble(dest),
            Section::Headers => self.read_headers(dest),
            Section::Body => self.read_body(dest),
            Section::Epilogue => self.read_epilogue(dest),
        };

        let result = match result {
            Ok(result) => result,
            Err(crate::Error::StreamReadFailed(err)) => {
                debug!("multipart stream failed in {} at byte {}: {}", self.section, self.position(), err);
                self.failure = Some((err.kind(), err.to_string()));
                return Err(crate::Error::StreamReadFailed(err));
            }
            Err(err) => return Err(err),
        };

        if let Some(err) = result.error {
            debug!("multipart scan failed in {} at byte {}: {}", result.section, self.position(), err);
            self.error = Some(err);
        }

        Ok(result)
    }

    fn read_preamble(&mut self, dest: &mut [u8]) -> crate::Result<ReadResult> {
        let section = Section::Preamble;
        let dash_boundary = &self.delimiter[constants::CRLF.len()..];

        if self.buffer.is_beginning_of_stream() && self.buffer.starts_with(dash_boundary)? {
            self.buffer.consume(dash_boundary.len());
            return self.after_boundary(section, 0);
        }

        let outcome = self.buffer.read_to(dest, &self.delimiter, &[dash_boundary])?;
        if outcome.invalid {
            return Ok(ReadResult::failed(section, outcome.read, ScanError::BoundaryNotPrecededByCrlf));
        }

        self.after_delimiter(section, outcome)
    }

    fn read_headers(&mut self, dest: &mut [u8]) -> crate::Result<ReadResult> {
        let section = Section::Headers;

        if self.header_start {
            if self.buffer.starts_with(constants::CRLF)? {
                self.buffer.consume(constants::CRLF.len());
                self.header_start = false;
                self.enter(Section::Body);
                return Ok(ReadResult::end_of_part(section, 0));
            }

            if self.buffer.starts_with(&self.delimiter[constants::CRLF.len()..])? {
                return Ok(ReadResult::failed(section, 0, ScanError::HeadersNotFollowedByEmptyLine));
            }
        }

        let outcome = self
            .buffer
            .read_to(dest, constants::CRLF_CRLF, &[self.delimiter.as_slice()])?;
        if outcome.read > 0 {
            self.header_start = false;
        }

        if outcome.invalid {
            return Ok(ReadResult::failed(section, outcome.read, ScanError::HeadersNotFollowedByEmptyLine));
        }

        Ok(match outcome.completion {
            Completion::EndOfSection => {
                self.header_start = false;
                self.enter(Section::Body);
                ReadResult::end_of_part(section, outcome.read)
            }
            Completion::EndOfStream => ReadResult::failed(section, outcome.read, ScanError::UnexpectedEndOfStream),
            Completion::None => ReadResult::data(section, outcome.read),
        })
    }

    fn read_body(&mut self, dest: &mut [u8]) -> crate::Result<ReadResult> {
        let outcome = self.buffer.read_to(dest, &self.delimiter, &[])?;
        self.after_delimiter(Section::Body, outcome)
    }

    fn read_epilogue(&mut self, dest: &mut [u8]) -> crate::Result<ReadResult> {
        let section = Section::Epilogue;
        let outcome = self.buffer.read(dest, &[self.delimiter.as_slice()])?;

        if outcome.invalid {
            return Ok(ReadResult::failed(
                section,
                outcome.read,
                ScanError::BoundaryFoundAfterClosingBoundary,
            ));
        }

        Ok(match outcome.completion {
            Completion::EndOfStream => ReadResult::end_of_stream(section, outcome.read),
            _ => ReadResult::data(section, outcome.read),
        })
    }

    /// Maps a scan for the next delimiter in the preamble or a body.
    fn after_delimiter(&mut self, section: Section, outcome: ReadOutcome) -> crate::Result<ReadResult> {
        match outcome.completion {
            Completion::EndOfSection => self.after_boundary(section, outcome.read),
            Completion::EndOfStream => Ok(ReadResult::failed(
                section,
                outcome.read,
                ScanError::UnexpectedEndOfStream,
            )),
            Completion::None => Ok(ReadResult::data(section, outcome.read)),
        }
    }

    /// Handles the rest of a boundary line once the boundary was consumed.
    fn after_boundary(&mut self, section: Section, read: usize) -> crate::Result<ReadResult> {
        if self.buffer.starts_with(constants::BOUNDARY_EXT)? {
            self.buffer.consume(constants::BOUNDARY_EXT.len());
            self.enter(Section::Epilogue);
            return Ok(ReadResult::end_of_part(section, read));
        }

        let tail = self.buffer.skip_to(constants::CRLF, constants::LWSP)?;
        if tail.invalid {
            return Ok(ReadResult::failed(section, read, ScanError::InvalidCharactersFollowingBoundary));
        }

        if tail.is_end_of_section() {
            self.header_start = true;
            self.enter(Section::Headers);
            return Ok(ReadResult::end_of_part(section, read));
        }

        Ok(ReadResult::failed(section, read, ScanError::UnexpectedEndOfStream))
    }

    fn enter(&mut self, next: Section) {
        trace!("multipart section {} -> {} at byte {}", self.section, next, self.buffer.position());
        self.section = next;
    }
}
