use std::io::{self, Read};
use std::sync::Arc;

use multiread::{Constraints, Error, Multipart, MultipartReader, ScanError, SizeLimit};

const BASIC: &str = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"My Field\"\r\n\r\nabcd\r\n--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"File Field\"; filename=\"a-text-file.txt\"\r\nContent-Type: text/plain\r\n\r\nHello world\nHello\r\nWorld\rAgain\r\n--X-BOUNDARY--\r\n";

/// Hands out one byte per read call.
struct Trickle<'a> {
    data: &'a [u8],
}

impl<'a> Trickle<'a> {
    fn new<T: AsRef<[u8]> + ?Sized>(data: &'a T) -> Self {
        Trickle { data: data.as_ref() }
    }
}

impl Read for Trickle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.data.is_empty() {
            return Ok(0);
        }

        buf[0] = self.data[0];
        self.data = &self.data[1..];
        Ok(1)
    }
}

fn expect_err<T>(result: multiread::Result<T>) -> Error {
    match result {
        Ok(_) => panic!("expected an error"),
        Err(err) => err,
    }
}

#[test]
fn test_multipart_basic() {
    let mut m = Multipart::new(Trickle::new(BASIC), "X-BOUNDARY").unwrap();

    while let Some((idx, field)) = m.next_field_with_idx().unwrap() {
        if idx == 0 {
            assert_eq!(field.name(), Some("My Field"));
            assert_eq!(field.file_name(), None);
            assert_eq!(field.content_type(), None);
            assert_eq!(field.index(), 0);

            assert_eq!(field.text(), Ok("abcd".to_owned()));
        } else if idx == 1 {
            assert_eq!(field.name(), Some("File Field"));
            assert_eq!(field.file_name(), Some("a-text-file.txt"));
            assert_eq!(field.content_type(), Some(&mime::TEXT_PLAIN));
            assert_eq!(field.index(), 1);

            assert_eq!(field.text(), Ok("Hello world\nHello\r\nWorld\rAgain".to_owned()));
        } else {
            panic!("unexpected field {}", idx);
        }
    }
}

#[test]
fn test_multipart_empty() {
    let mut m = Multipart::new(Trickle::new("--X-BOUNDARY--\r\n"), "X-BOUNDARY").unwrap();

    assert!(m.next_field().unwrap().is_none());
    assert!(m.next_field().unwrap().is_none());
    assert!(m.peek_field().unwrap().is_none());
}

#[test]
fn test_multipart_clean_field() {
    let mut m = Multipart::new(Trickle::new(BASIC), "X-BOUNDARY").unwrap();

    assert!(m.next_field().unwrap().is_some());
    assert!(m.next_field().unwrap().is_some());
    assert!(m.next_field().unwrap().is_none());
}

#[test]
fn test_single_part_with_content_type() {
    let mut m = Multipart::new(Trickle::new("--b\r\nContent-Type: text/plain\r\n\r\nhi\r\n--b--"), "b").unwrap();

    let field = m.next_field().unwrap().unwrap();
    assert_eq!(field.content_type(), Some(&mime::TEXT_PLAIN));
    assert_eq!(field.name(), None);
    assert_eq!(field.bytes().unwrap().as_ref(), b"hi");

    assert!(m.next_field().unwrap().is_none());
}

#[test]
fn test_preamble_and_epilogue_are_skipped() {
    let data = "This is the preamble.\r\n--X-BOUNDARY\r\n\r\nbody\r\n--X-BOUNDARY--\r\nThis is the epilogue.\r\n";
    let mut m = Multipart::new(Trickle::new(data), "X-BOUNDARY").unwrap();

    let field = m.next_field().unwrap().unwrap();
    assert!(field.headers().is_empty());
    assert_eq!(field.text(), Ok("body".to_owned()));

    assert!(m.next_field().unwrap().is_none());
}

#[test]
fn test_peek_returns_same_info() {
    let mut m = Multipart::new(Trickle::new(BASIC), "X-BOUNDARY").unwrap();

    let first = m.peek_field().unwrap().unwrap();
    let again = m.peek_field().unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(first.name(), Some("My Field"));

    let field = m.next_field().unwrap().unwrap();
    assert!(Arc::ptr_eq(field.info(), &first));
    assert_eq!(field.text(), Ok("abcd".to_owned()));

    let second = m.peek_field().unwrap().unwrap();
    assert_eq!(second.index(), 1);
    assert_eq!(second.file_name(), Some("a-text-file.txt"));
}

#[test]
fn test_unread_body_is_discarded() {
    let mut m = Multipart::new(Trickle::new(BASIC), "X-BOUNDARY").unwrap();

    let mut first = m.next_field().unwrap().unwrap();
    let second = m.next_field().unwrap().unwrap();

    assert_eq!(second.name(), Some("File Field"));

    let mut stale = Vec::new();
    first.read_to_end(&mut stale).unwrap();
    assert!(stale.is_empty());
    assert!(first.is_read_complete());

    assert_eq!(second.text(), Ok("Hello world\nHello\r\nWorld\rAgain".to_owned()));
    assert!(m.next_field().unwrap().is_none());
}

#[test]
fn test_partially_read_body_is_discarded() {
    let data = "--X-BOUNDARY\r\n\r\n0123456789\r\n--X-BOUNDARY\r\n\r\nabc\r\n--X-BOUNDARY--";
    let mut m = Multipart::new(Trickle::new(data), "X-BOUNDARY").unwrap();

    let mut first = m.next_field().unwrap().unwrap();
    let mut buf = [0u8; 4];
    let n = first.read(&mut buf).unwrap();
    assert!(n > 0);
    assert!(!first.is_read_complete());

    let second = m.next_field().unwrap().unwrap();
    assert_eq!(second.text(), Ok("abc".to_owned()));

    assert_eq!(first.read(&mut buf).unwrap(), 0);
}

#[test]
fn test_field_read_impl() {
    let mut m = Multipart::new(Trickle::new(BASIC), "X-BOUNDARY").unwrap();

    let mut field = m.next_field().unwrap().unwrap();
    let mut body = Vec::new();
    field.read_to_end(&mut body).unwrap();

    assert_eq!(body, b"abcd");
    assert!(field.is_read_complete());
    assert_eq!(field.read(&mut [0u8; 8]).unwrap(), 0);
}

#[test]
fn test_field_chunks_with_small_buffer() {
    let body = "0123456789".repeat(50);
    let data = format!("--X-BOUNDARY\r\n\r\n{}\r\n--X-BOUNDARY--\r\n", body);

    let constraints = Constraints::new().buffer_size(MultipartReader::<&[u8]>::min_buffer_size(10));
    let mut m = Multipart::with_constraints(data.as_bytes(), "X-BOUNDARY", constraints).unwrap();

    let mut field = m.next_field().unwrap().unwrap();
    let mut collected = Vec::new();
    let mut chunks = 0;
    while let Some(chunk) = field.chunk().unwrap() {
        collected.extend_from_slice(&chunk);
        chunks += 1;
    }

    assert_eq!(collected, body.as_bytes());
    assert!(chunks > 1);
    assert!(m.next_field().unwrap().is_none());
}

#[test]
fn test_skip_field() {
    let mut m = Multipart::new(Trickle::new(BASIC), "X-BOUNDARY").unwrap();

    let mut field = m.next_field().unwrap().unwrap();
    field.skip().unwrap();
    assert!(field.is_read_complete());

    let field = m.next_field().unwrap().unwrap();
    assert_eq!(field.index(), 1);
}

#[test]
fn test_iterator() {
    let m = Multipart::new(Trickle::new(BASIC), "X-BOUNDARY").unwrap();

    let names: Vec<_> = m
        .map(|field| field.unwrap().name().map(|name| name.to_owned()))
        .collect();

    assert_eq!(names, vec![Some("My Field".to_owned()), Some("File Field".to_owned())]);
}

#[test]
fn test_repeated_headers() {
    let data = "--X-BOUNDARY\r\nX-Tag: one\r\nx-tag: two\r\nContent-Language: en, fr\r\n\r\n\r\n--X-BOUNDARY--";
    let mut m = Multipart::new(Trickle::new(data), "X-BOUNDARY").unwrap();

    let field = m.next_field().unwrap().unwrap();
    let tags: Vec<_> = field.headers().get_all("x-tag").iter().collect();
    assert_eq!(tags, vec!["one", "two"]);
    assert_eq!(field.info().content_language(), vec!["en", "fr"]);
    assert_eq!(field.text(), Ok(String::new()));
}

#[test]
fn test_text_with_charset() {
    let mut data = b"--X-BOUNDARY\r\nContent-Type: text/plain; charset=iso-8859-1\r\n\r\ncaf".to_vec();
    data.push(0xE9);
    data.extend_from_slice(b"\r\n--X-BOUNDARY\r\n\r\ncaf");
    data.push(0xE9);
    data.extend_from_slice(b"\r\n--X-BOUNDARY--");

    let mut m = Multipart::new(Trickle::new(&data), "X-BOUNDARY").unwrap();

    let field = m.next_field().unwrap().unwrap();
    assert_eq!(field.text(), Ok("café".to_owned()));

    let field = m.next_field().unwrap().unwrap();
    assert_eq!(field.text_with_charset("windows-1252"), Ok("café".to_owned()));
}

#[test]
fn test_malformed_body() {
    let data = "--X-BOUNDARY\r\nA: 1\r\n--X-BOUNDARY\r\n\r\nabcd\r\n--X-BOUNDARY--";
    let mut m = Multipart::new(Trickle::new(data), "X-BOUNDARY").unwrap();

    let err = expect_err(m.next_field());
    assert_eq!(err, Error::Malformed(ScanError::HeadersNotFollowedByEmptyLine));
    assert_eq!(err.scan_error(), Some(ScanError::HeadersNotFollowedByEmptyLine));
    assert_eq!(
        err.to_string(),
        "malformed multipart body: headers not followed by empty line"
    );

    let err = expect_err(m.next_field());
    assert_eq!(err, Error::Malformed(ScanError::HeadersNotFollowedByEmptyLine));
}

#[test]
fn test_malformed_body_inside_field() {
    let data = "--X-BOUNDARY\r\n\r\nabcd\r\n--X-BOUNDARY oops\r\n\r\n";
    let mut m = Multipart::new(Trickle::new(data), "X-BOUNDARY").unwrap();

    let field = m.next_field().unwrap().unwrap();
    let err = expect_err(field.text());
    assert_eq!(err, Error::Malformed(ScanError::InvalidCharactersFollowingBoundary));

    let err = expect_err(m.next_field());
    assert_eq!(err, Error::Malformed(ScanError::InvalidCharactersFollowingBoundary));
}

#[test]
fn test_iterator_stops_after_error() {
    let data = "--X-BOUNDARY\r\n\r\nabcd";
    let mut m = Multipart::new(Trickle::new(data), "X-BOUNDARY").unwrap();

    let field = m.next().unwrap().unwrap();
    assert_eq!(
        expect_err(field.text()),
        Error::Malformed(ScanError::UnexpectedEndOfStream)
    );

    assert!(matches!(
        m.next(),
        Some(Err(Error::Malformed(ScanError::UnexpectedEndOfStream)))
    ));
    assert!(m.next().is_none());
}

#[test]
fn test_boundary_not_preceded_by_crlf() {
    let data = "preamble--X-BOUNDARY\r\n\r\nabcd\r\n--X-BOUNDARY--";
    let mut m = Multipart::new(Trickle::new(data), "X-BOUNDARY").unwrap();

    let err = expect_err(m.peek_field());
    assert_eq!(err, Error::Malformed(ScanError::BoundaryNotPrecededByCrlf));
}

#[test]
fn test_invalid_arguments() {
    let err = expect_err(Multipart::new(BASIC.as_bytes(), ""));
    assert!(matches!(err, Error::InvalidArgument(_)));

    let constraints = Constraints::new().buffer_size(8);
    let err = expect_err(Multipart::with_constraints(BASIC.as_bytes(), "X-BOUNDARY", constraints));
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn test_unknown_field() {
    let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"b\"\r\n\r\nskipped\r\n--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nkept\r\n--X-BOUNDARY--";
    let constraints = Constraints::new().allowed_fields(vec!["a"]);
    let mut m = Multipart::with_constraints(Trickle::new(data), "X-BOUNDARY", constraints).unwrap();

    let err = expect_err(m.next_field());
    assert_eq!(
        err,
        Error::UnknownField {
            field_name: Some("b".to_owned())
        }
    );

    let field = m.next_field().unwrap().unwrap();
    assert_eq!(field.name(), Some("a"));
    assert_eq!(field.text(), Ok("kept".to_owned()));
}

#[test]
fn test_field_size_exceeded() {
    let constraints = Constraints::new().size_limit(SizeLimit::new().per_field(3).for_field("File Field", 100));
    let mut m = Multipart::with_constraints(Trickle::new(BASIC), "X-BOUNDARY", constraints).unwrap();

    let field = m.next_field().unwrap().unwrap();
    let err = expect_err(field.text());
    assert_eq!(
        err,
        Error::FieldSizeExceeded {
            limit: 3,
            field_name: Some("My Field".to_owned())
        }
    );
}

#[test]
fn test_stream_size_exceeded() {
    let constraints = Constraints::new().size_limit(SizeLimit::new().whole_stream(20));
    let mut m = Multipart::with_constraints(Trickle::new(BASIC), "X-BOUNDARY", constraints).unwrap();

    let err = expect_err(m.next_field());
    assert_eq!(err, Error::StreamSizeExceeded { limit: 20 });
}

#[test]
fn test_headers_size_exceeded() {
    let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"long\"\r\n\r\nabcd\r\n--X-BOUNDARY\r\nA: b\r\n\r\nefgh\r\n--X-BOUNDARY--\r\n";
    let constraints = Constraints::new().size_limit(SizeLimit::new().headers(10));
    let mut m = Multipart::with_constraints(Trickle::new(data), "X-BOUNDARY", constraints).unwrap();

    let err = expect_err(m.next_field());
    assert_eq!(err, Error::HeadersSizeExceeded { limit: 10 });

    let field = m.next_field().unwrap().unwrap();
    assert_eq!(field.index(), 1);
    assert_eq!(field.headers().get("a").unwrap(), "b");
    assert_eq!(field.text(), Ok("efgh".to_owned()));
}

#[test]
fn test_io_error_is_propagated() {
    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "connection reset"))
        }
    }

    let mut m = Multipart::new(Broken, "X-BOUNDARY").unwrap();
    let err = expect_err(m.next_field());
    assert!(matches!(err, Error::StreamReadFailed(_)));
}

#[test]
fn test_io_error_mid_boundary_is_not_retried() {
    /// Fails once after the opening dash-boundary, then serves the rest.
    struct FlakyOnce {
        parts: Vec<io::Result<&'static [u8]>>,
    }

    impl Read for FlakyOnce {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.parts.is_empty() {
                return Ok(0);
            }

            let chunk = self.parts.remove(0)?;
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                self.parts.insert(0, Ok(&chunk[n..]));
            }
            Ok(n)
        }
    }

    let source = FlakyOnce {
        parts: vec![
            Ok(&b"--b"[..]),
            Err(io::Error::new(io::ErrorKind::TimedOut, "timed out")),
            Ok(&b"\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\nabcd\r\n--b--"[..]),
        ],
    };
    let mut m = Multipart::new(source, "b").unwrap();

    let err = expect_err(m.next_field());
    assert!(matches!(err, Error::StreamReadFailed(_)));

    let err = expect_err(m.next_field());
    assert!(matches!(err, Error::StreamReadFailed(_)));

    let err = expect_err(m.peek_field());
    assert!(matches!(err, Error::StreamReadFailed(_)));
}

#[test]
fn test_peek_discards_field_being_read() {
    let data = "--X-BOUNDARY\r\n\r\n0123456789\r\n--X-BOUNDARY\r\nA: b\r\n\r\nabc\r\n--X-BOUNDARY--";
    let mut m = Multipart::new(Trickle::new(data), "X-BOUNDARY").unwrap();

    let mut first = m.next_field().unwrap().unwrap();
    let mut buf = [0u8; 4];
    assert!(first.read(&mut buf).unwrap() > 0);
    assert!(!first.is_read_complete());

    let next = m.peek_field().unwrap().unwrap();
    assert_eq!(next.index(), 1);

    assert_eq!(first.read(&mut buf).unwrap(), 0);
    assert!(first.is_read_complete());

    let second = m.next_field().unwrap().unwrap();
    assert!(Arc::ptr_eq(second.info(), &next));
    assert_eq!(second.text(), Ok("abc".to_owned()));
}

#[cfg(feature = "json")]
#[test]
fn test_field_json() {
    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"point\"\r\nContent-Type: application/json\r\n\r\n{\"x\": 1, \"y\": -2}\r\n--X-BOUNDARY--\r\n";
    let mut m = Multipart::new(Trickle::new(data), "X-BOUNDARY").unwrap();

    let field = m.next_field().unwrap().unwrap();
    let point: Point = field.json().unwrap();
    assert_eq!(point, Point { x: 1, y: -2 });
}
