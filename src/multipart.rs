use std::io::Read;
use std::sync::Arc;

use bytes::BytesMut;
use http::header::HeaderMap;
use spin::mutex::spin::SpinMutex as Mutex;

use crate::constants;
use crate::constraints::Constraints;
use crate::field::{Field, FieldInfo};
use crate::helpers;
use crate::reader::MultipartReader;
use crate::state::{MultipartState, Section, StreamingStage};

/// Represents the implementation of a multipart body.
///
/// This will parse the source reader into [`Field`] instances via its
/// [`Iterator`] implementation or [`next_field`](Multipart::next_field).
///
/// To maintain consistency in the underlying stream, only the most recently
/// returned [`Field`] has a live body. Asking for the next field discards
/// whatever is left of the current body first, so bytes of one part never
/// leak into another.
///
/// # Examples
///
/// ```
/// use multiread::Multipart;
///
/// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
/// let mut multipart = Multipart::new(data.as_bytes(), "X-BOUNDARY").unwrap();
///
/// while let Some(field) = multipart.next_field().unwrap() {
///     println!("Field: {:?}", field.text())
/// }
/// ```
pub struct Multipart<R> {
    state: Arc<Mutex<MultipartState<R>>>,
    constraints: Constraints,
    exhausted: bool,
}

impl<R: Read> Multipart<R> {
    /// Construct a new `Multipart` instance with the given reader and the
    /// boundary.
    pub fn new<B: AsRef<[u8]>>(reader: R, boundary: B) -> crate::Result<Multipart<R>> {
        Multipart::with_constraints(reader, boundary, Constraints::default())
    }

    /// Construct a new `Multipart` instance with the given reader, the
    /// boundary and the constraints.
    ///
    /// Fails if the boundary is empty or the configured buffer size cannot
    /// hold a boundary line.
    pub fn with_constraints<B: AsRef<[u8]>>(
        reader: R,
        boundary: B,
        constraints: Constraints,
    ) -> crate::Result<Multipart<R>> {
        let reader = MultipartReader::with_buffer_size(reader, boundary, constraints.buffer_size)?;

        let state = MultipartState {
            reader,
            stage: StreamingStage::FindingNextField,
            whole_stream_limit: constraints.size_limit.whole_stream,
            peeked: None,
            next_field_idx: 0,
            curr_field_idx: None,
            curr_field_name: None,
            curr_field_size_limit: constraints.size_limit.per_field,
            curr_field_size_counter: 0,
        };

        Ok(Multipart {
            state: Arc::new(Mutex::new(state)),
            constraints,
            exhausted: false,
        })
    }

    /// Parses the headers of the next field without touching its body.
    ///
    /// Repeated calls return the same [`FieldInfo`] until
    /// [`next_field`](Multipart::next_field) takes it. If the current field's
    /// body has not been read completely, the rest of it is discarded.
    pub fn peek_field(&mut self) -> crate::Result<Option<Arc<FieldInfo>>> {
        let mut state = self.state.lock();
        find_next_field(&mut state, &self.constraints)
    }

    /// Yields the next [`Field`] if available.
    ///
    /// The rest of the previous field's body, if any, is discarded first.
    pub fn next_field(&mut self) -> crate::Result<Option<Field<R>>> {
        let mut state = self.state.lock();

        if find_next_field(&mut state, &self.constraints)?.is_none() {
            return Ok(None);
        }

        let info = match state.peeked.take() {
            Some(info) => info,
            None => return Ok(None),
        };

        let field_name = info.name().map(|name| name.to_owned());

        state.stage = StreamingStage::ReadingFieldData;
        state.curr_field_idx = Some(info.index());
        state.curr_field_size_limit = self
            .constraints
            .size_limit
            .extract_size_limit_for(field_name.as_deref());
        state.curr_field_size_counter = 0;
        state.curr_field_name = field_name.clone();

        drop(state);

        if !self.constraints.is_it_allowed(field_name.as_deref()) {
            return Err(crate::Error::UnknownField { field_name });
        }

        Ok(Some(Field::new(Arc::clone(&self.state), info)))
    }

    /// Yields the next [`Field`] with their positioning index as a tuple
    /// `(usize, Field)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use multiread::Multipart;
    ///
    /// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
    /// let mut multipart = Multipart::new(data.as_bytes(), "X-BOUNDARY").unwrap();
    ///
    /// while let Some((idx, field)) = multipart.next_field_with_idx().unwrap() {
    ///     println!("Index: {:?}, Content: {:?}", idx, field.text())
    /// }
    /// ```
    pub fn next_field_with_idx(&mut self) -> crate::Result<Option<(usize, Field<R>)>> {
        self.next_field().map(|f| f.map(|field| (field.index(), field)))
    }
}

impl<R: Read> Iterator for Multipart<R> {
    type Item = crate::Result<Field<R>>;

    /// Same as [`next_field`](Multipart::next_field), but ends after the
    /// first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let next = self.next_field().transpose();
        if !matches!(next, Some(Ok(_))) {
            self.exhausted = true;
        }

        next
    }
}

fn find_next_field<R: Read>(
    state: &mut MultipartState<R>,
    constraints: &Constraints,
) -> crate::Result<Option<Arc<FieldInfo>>> {
    if let Some(ref info) = state.peeked {
        return Ok(Some(Arc::clone(info)));
    }

    loop {
        if state.stage == StreamingStage::Eof {
            return Ok(None);
        }

        if let Some(err) = state.reader.error() {
            return Err(err.into());
        }

        match state.reader.section() {
            Section::Preamble | Section::Body | Section::Epilogue => discard_section(state)?,
            Section::Headers => {
                let idx = state.next_field_idx;
                state.next_field_idx += 1;

                let headers = read_headers(state, constraints.size_limit.headers)?;
                let info = Arc::new(FieldInfo::new(headers, idx));

                debug!("multipart field {} parsed, name: {:?}", idx, info.name());

                state.peeked = Some(Arc::clone(&info));
                return Ok(Some(info));
            }
        }
    }
}

/// Reads and drops the rest of the current section.
fn discard_section<R: Read>(state: &mut MultipartState<R>) -> crate::Result<()> {
    let section = state.reader.section();
    let counted = section == Section::Body && state.curr_field_idx.is_some();

    if counted {
        trace!("discarding the rest of field {:?}", state.curr_field_idx);
    }

    let mut scratch = [0u8; constants::DISCARD_CHUNK_SIZE];
    loop {
        let result = state.reader.read(&mut scratch)?;
        if let Some(err) = result.error {
            return Err(err.into());
        }

        if counted {
            state.curr_field_size_counter += result.read as u64;
            if state.curr_field_size_counter > state.curr_field_size_limit {
                return Err(crate::Error::FieldSizeExceeded {
                    limit: state.curr_field_size_limit,
                    field_name: state.curr_field_name.clone(),
                });
            }
        }

        state.check_stream_size()?;

        if result.end_of_part {
            break;
        }
    }

    match section {
        Section::Body => state.finish_field(),
        Section::Epilogue => state.stage = StreamingStage::Eof,
        _ => {}
    }

    Ok(())
}

/// Collects the raw header block of the next part and parses it.
///
/// A block over `limit` bytes is still read to its end, without being kept,
/// so the part's body can be skipped on the next advance.
fn read_headers<R: Read>(state: &mut MultipartState<R>, limit: usize) -> crate::Result<HeaderMap> {
    let mut raw = BytesMut::new();
    let mut overflow = false;
    let mut scratch = [0u8; 1024];

    loop {
        let result = state.reader.read(&mut scratch)?;
        if let Some(err) = result.error {
            return Err(err.into());
        }

        if !overflow {
            if raw.len() + result.read > limit {
                overflow = true;
                raw.clear();
            } else {
                raw.extend_from_slice(&scratch[..result.read]);
            }
        }

        state.check_stream_size()?;

        if result.end_of_part {
            break;
        }
    }

    if overflow {
        return Err(crate::Error::HeadersSizeExceeded { limit });
    }

    if raw.is_empty() {
        raw.extend_from_slice(constants::CRLF);
    } else {
        raw.extend_from_slice(constants::CRLF_CRLF);
    }

    let mut headers = [httparse::EMPTY_HEADER; constants::MAX_HEADERS];

    match httparse::parse_headers(&raw, &mut headers) {
        Ok(httparse::Status::Complete((_, raw_headers))) => helpers::convert_raw_headers_to_header_map(raw_headers),
        Ok(httparse::Status::Partial) => Err(crate::Error::IncompleteHeaders),
        Err(err) => Err(crate::Error::ReadHeaderFailed(err)),
    }
}
