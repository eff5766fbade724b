//! A bounded-memory, pull-based streaming parser for `multipart/*` bodies.
//!
//! The body is pulled from any [`std::io::Read`] source through a fixed-size
//! lookahead window, so memory use does not depend on the size of the parts.
//! There are two levels to work at:
//!
//! * [`Multipart`] yields the parts one by one as [`Field`]s, with their
//!   headers parsed into a [`FieldInfo`] and their bodies readable as a
//!   [`Read`](std::io::Read) stream.
//! * [`MultipartReader`] is the scanner underneath. It hands out raw bytes
//!   tagged with the [`Section`] they belong to and reports malformed input
//!   as a [`ScanError`].
//!
//! # Examples
//!
//! ```
//! use multiread::Multipart;
//!
//! # fn run() -> multiread::Result<()> {
//! let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_file_field\"; filename=\"a-text-file.txt\"\r\nContent-Type: text/plain\r\n\r\nHello world\nHello\r\nWorld\rAgain\r\n--X-BOUNDARY--\r\n";
//! let mut multipart = Multipart::new(data.as_bytes(), "X-BOUNDARY")?;
//!
//! while let Some(field) = multipart.next_field()? {
//!     let name = field.name().map(|name| name.to_owned());
//!     let file_name = field.file_name().map(|name| name.to_owned());
//!     let content = field.text()?;
//!
//!     println!("Name: {:?}, File name: {:?}, Content: {:?}", name, file_name, content);
//! }
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
//!
//! ## Optional features
//!
//! * `json`: adds [`Field::json`] to deserialize a part's body.
//! * `log`: emits `trace` and `debug` records through the `log` crate.

#[cfg(feature = "log")]
macro_rules! trace {
    ($($arg:tt)*) => { log::trace!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

pub use bytes;
pub use buffer::{Completion, ReadOutcome, StreamBuffer};
pub use constraints::Constraints;
pub use error::{Error, ScanError};
pub use field::{Field, FieldInfo};
pub use multipart::Multipart;
pub use reader::{MultipartReader, ReadResult};
pub use size_limit::SizeLimit;
pub use state::Section;

mod buffer;
mod constants;
mod constraints;
mod content_disposition;
mod error;
mod field;
mod helpers;
mod multipart;
mod reader;
mod size_limit;
mod state;

/// A Result type often returned from methods that can have `multiread` errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Parses the `Content-Type` header to extract the boundary value.
///
/// Any `multipart/*` subtype is accepted.
///
/// # Examples
///
/// ```
/// let content_type = "multipart/form-data; boundary=ABCDEFG";
///
/// assert_eq!(multiread::parse_boundary(content_type), Ok("ABCDEFG".to_owned()));
/// ```
pub fn parse_boundary<T: AsRef<str>>(content_type: T) -> Result<String> {
    let m = content_type
        .as_ref()
        .parse::<mime::Mime>()
        .map_err(Error::DecodeContentType)?;

    if m.type_() != mime::MULTIPART {
        return Err(Error::NoMultipart);
    }

    m.get_param(mime::BOUNDARY)
        .map(|name| name.as_str().to_owned())
        .ok_or(Error::NoBoundary)
}
