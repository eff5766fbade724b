use std::borrow::Cow;
use std::io::{self, Read};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use encoding_rs::{Encoding, UTF_8};
use http::header::{self, HeaderMap};
#[cfg(feature = "json")]
use serde::de::DeserializeOwned;
use spin::mutex::spin::SpinMutex as Mutex;

use crate::constants;
use crate::content_disposition::ContentDisposition;
use crate::helpers;
use crate::state::{MultipartState, Section, StreamingStage};

/// The headers of a single part and what can be derived from them.
///
/// Header lookup through [`headers`](FieldInfo::headers) is case-insensitive
/// and keeps every value of repeated headers.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    headers: HeaderMap,
    content_disposition: ContentDisposition,
    content_type: Option<mime::Mime>,
    idx: usize,
}

impl FieldInfo {
    pub(crate) fn new(headers: HeaderMap, idx: usize) -> Self {
        let content_disposition = ContentDisposition::parse(&headers);
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<mime::Mime>().ok());

        FieldInfo {
            headers,
            content_disposition,
            content_type,
            idx,
        }
    }

    /// The field name found in the
    /// [`Content-Disposition`](https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Content-Disposition)
    /// header.
    pub fn name(&self) -> Option<&str> {
        self.content_disposition.field_name.as_deref()
    }

    /// The file name found in the `Content-Disposition` header. An RFC 5987
    /// `filename*` parameter takes precedence over `filename`.
    pub fn file_name(&self) -> Option<&str> {
        self.content_disposition.file_name.as_deref()
    }

    /// Get the content type of the part if present.
    pub fn content_type(&self) -> Option<&mime::Mime> {
        self.content_type.as_ref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(header::CONTENT_LENGTH)
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.trim().parse().ok())
    }

    /// Every coding listed in `Content-Encoding` headers, in order.
    pub fn content_encoding(&self) -> Vec<&str> {
        helpers::header_list(&self.headers, &header::CONTENT_ENCODING)
    }

    /// Every language tag listed in `Content-Language` headers, in order.
    pub fn content_language(&self) -> Vec<&str> {
        helpers::header_list(&self.headers, &header::CONTENT_LANGUAGE)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The position of the part in the stream, starting at zero.
    pub fn index(&self) -> usize {
        self.idx
    }
}

/// A single part in a multipart stream.
///
/// Its body is read through the [`Read`] implementation or the helper
/// methods. Only the part most recently returned by
/// [`next_field`](crate::Multipart::next_field) has a live body: advancing
/// to the next part discards whatever remains of this one, and reading a
/// stale `Field` afterwards yields no bytes.
///
/// # Examples
///
/// ```
/// use multiread::Multipart;
///
/// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
/// let mut multipart = Multipart::new(data.as_bytes(), "X-BOUNDARY").unwrap();
///
/// while let Some(mut field) = multipart.next_field().unwrap() {
///     while let Some(chunk) = field.chunk().unwrap() {
///         println!("Chunk: {:?}", chunk);
///     }
/// }
/// ```
pub struct Field<R> {
    state: Arc<Mutex<MultipartState<R>>>,
    info: Arc<FieldInfo>,
    done: bool,
}

impl<R: Read> Field<R> {
    pub(crate) fn new(state: Arc<Mutex<MultipartState<R>>>, info: Arc<FieldInfo>) -> Self {
        Field {
            state,
            info,
            done: false,
        }
    }

    /// The parsed headers of this part.
    pub fn info(&self) -> &Arc<FieldInfo> {
        &self.info
    }

    pub fn name(&self) -> Option<&str> {
        self.info.name()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.info.file_name()
    }

    pub fn content_type(&self) -> Option<&mime::Mime> {
        self.info.content_type()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.info.headers()
    }

    pub fn index(&self) -> usize {
        self.info.index()
    }

    /// Returns `true` once the whole body has been read, as opposed to a read
    /// that merely returned no bytes.
    pub fn is_read_complete(&self) -> bool {
        self.done
    }

    /// Get the next chunk of the body, or `None` once the body is complete.
    pub fn chunk(&mut self) -> crate::Result<Option<Bytes>> {
        let mut buf = vec![0; constants::DISCARD_CHUNK_SIZE];

        match self.read_chunk(&mut buf)? {
            0 => Ok(None),
            n => {
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
        }
    }

    /// Get the full body as [`Bytes`].
    pub fn bytes(mut self) -> crate::Result<Bytes> {
        let mut buf = BytesMut::new();

        while let Some(bytes) = self.chunk()? {
            buf.extend_from_slice(&bytes);
        }

        Ok(buf.freeze())
    }

    /// Get the full body as text, decoded with the `charset` of the part's
    /// content type, or UTF-8.
    pub fn text(self) -> crate::Result<String> {
        self.text_with_charset("utf-8")
    }

    /// Get the full body as text, decoded with the `charset` of the part's
    /// content type, or `default_encoding` when it has none.
    pub fn text_with_charset(self, default_encoding: &str) -> crate::Result<String> {
        let encoding_name = self
            .content_type()
            .and_then(|mime| mime.get_param(mime::CHARSET))
            .map(|charset| charset.as_str())
            .unwrap_or(default_encoding)
            .to_owned();

        let encoding = Encoding::for_label(encoding_name.as_bytes()).unwrap_or(UTF_8);

        let bytes = self.bytes()?;

        let (text, _, _) = encoding.decode(&bytes);

        match text {
            Cow::Owned(s) => Ok(s),
            Cow::Borrowed(s) => Ok(String::from(s)),
        }
    }

    /// Deserializes the full body as JSON.
    ///
    /// # Optional
    ///
    /// This requires the optional `json` feature to be enabled.
    #[cfg(feature = "json")]
    pub fn json<T: DeserializeOwned>(self) -> crate::Result<T> {
        let bytes = self.bytes()?;
        serde_json::from_slice(&bytes).map_err(crate::Error::DecodeJson)
    }

    /// Reads and drops the rest of the body.
    pub fn skip(&mut self) -> crate::Result<()> {
        let mut scratch = [0u8; constants::DISCARD_CHUNK_SIZE];
        while self.read_chunk(&mut scratch)? > 0 {}
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock();

        if let Some(err) = state.reader.error() {
            return Err(err.into());
        }

        let live = state.stage == StreamingStage::ReadingFieldData
            && state.curr_field_idx == Some(self.info.index())
            && state.reader.section() == Section::Body;
        if !live {
            self.done = true;
            return Ok(0);
        }

        let result = state.reader.read(buf)?;
        if let Some(err) = result.error {
            return Err(err.into());
        }

        state.curr_field_size_counter += result.read as u64;
        if state.curr_field_size_counter > state.curr_field_size_limit {
            return Err(crate::Error::FieldSizeExceeded {
                limit: state.curr_field_size_limit,
                field_name: state.curr_field_name.clone(),
            });
        }

        state.check_stream_size()?;

        if result.end_of_part {
            trace!("field {} body complete", self.info.index());
            state.finish_field();
            self.done = true;
        }

        Ok(result.read)
    }
}

impl<R: Read> Read for Field<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_chunk(buf).map_err(io::Error::from)
    }
}
