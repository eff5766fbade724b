use crate::constants;
use crate::size_limit::SizeLimit;

/// Represents some rules to be applied on the stream and field's content
/// size to prevent DoS attacks, plus the size of the lookahead buffer.
///
/// It's recommended to add some rules on field (specially text field) size
/// to avoid potential DoS attacks from attackers running the server out of
/// memory. This type provides some API to apply constraints on basis of
/// `stream size`, `field size`, `header size` and allowed fields.
///
/// # Examples
///
/// ```
/// use multiread::{Constraints, Multipart, SizeLimit};
///
/// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
///
/// let constraints = Constraints::new()
///     .allowed_fields(vec!["my_text_field", "my_file_field"])
///     .size_limit(
///         SizeLimit::new()
///             .whole_stream(15 * 1024 * 1024)
///             .per_field(10 * 1024 * 1024)
///             .for_field("my_text_field", 30 * 1024),
///     )
///     .buffer_size(4 * 1024);
///
/// let mut multipart = Multipart::with_constraints(data.as_bytes(), "X-BOUNDARY", constraints).unwrap();
///
/// while let Some(field) = multipart.next_field().unwrap() {
///     println!("Content: {:?}", field.text().unwrap())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Constraints {
    pub(crate) size_limit: SizeLimit,
    pub(crate) allowed_fields: Option<Vec<String>>,
    pub(crate) buffer_size: usize,
}

impl Constraints {
    /// Creates a set of rules with default behaviour.
    pub fn new() -> Constraints {
        Constraints::default()
    }

    /// Applies rules on field's content length.
    pub fn size_limit(self, size_limit: SizeLimit) -> Constraints {
        Constraints { size_limit, ..self }
    }

    /// Specify which fields should be allowed, for any unknown field the
    /// [`next_field`](crate::Multipart::next_field) will throw an error.
    pub fn allowed_fields<N: Into<String>>(self, allowed_fields: Vec<N>) -> Constraints {
        let allowed_fields = allowed_fields.into_iter().map(|item| item.into()).collect();

        Constraints {
            allowed_fields: Some(allowed_fields),
            ..self
        }
    }

    /// Sets the size of the lookahead window kept over the stream.
    ///
    /// It must be at least
    /// [`MultipartReader::min_buffer_size`](crate::MultipartReader::min_buffer_size)
    /// for the boundary in use.
    pub fn buffer_size(self, buffer_size: usize) -> Constraints {
        Constraints { buffer_size, ..self }
    }

    pub(crate) fn is_it_allowed(&self, field: Option<&str>) -> bool {
        if let Some(ref allowed_fields) = self.allowed_fields {
            field
                .map(|field| allowed_fields.iter().any(|item| item == field))
                .unwrap_or(false)
        } else {
            true
        }
    }
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints {
            size_limit: SizeLimit::default(),
            allowed_fields: None,
            buffer_size: constants::DEFAULT_BUFFER_SIZE,
        }
    }
}
