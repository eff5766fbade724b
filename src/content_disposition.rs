use http::header::{self, HeaderMap};
use percent_encoding::percent_decode;

use crate::constants;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ContentDisposition {
    pub(crate) field_name: Option<String>,
    pub(crate) file_name: Option<String>,
}

impl ContentDisposition {
    pub fn parse(headers: &HeaderMap) -> ContentDisposition {
        let content_disposition = match headers.get(header::CONTENT_DISPOSITION) {
            Some(value) => value.as_bytes(),
            None => return ContentDisposition::default(),
        };

        let field_name = find_param(content_disposition, b"name").and_then(|val| String::from_utf8(val).ok());

        let file_name = find_param(content_disposition, b"filename*")
            .and_then(|val| decode_ext_value(&val))
            .or_else(|| find_param(content_disposition, b"filename").and_then(|val| String::from_utf8(val).ok()));

        ContentDisposition { field_name, file_name }
    }
}

/// Finds the value of the parameter `name`, unquoting quoted strings.
///
/// Parameter names compare case-insensitively; the first match wins.
fn find_param(value: &[u8], name: &[u8]) -> Option<Vec<u8>> {
    constants::CONTENT_DISPOSITION_PARAM_RE
        .captures_iter(value)
        .find(|caps| caps[1].eq_ignore_ascii_case(name))
        .map(|caps| match caps.get(2) {
            Some(quoted) => constants::QUOTED_PAIR_RE
                .replace_all(quoted.as_bytes(), &b"$1"[..])
                .into_owned(),
            None => caps.get(3).map_or_else(Vec::new, |token| token.as_bytes().to_vec()),
        })
}

/// Decodes an RFC 5987 `charset'language'percent-encoded` value.
fn decode_ext_value(value: &[u8]) -> Option<String> {
    let mut parts = value.splitn(3, |byte| *byte == b'\'');
    let charset = parts.next()?;
    let _language = parts.next()?;
    let encoded = parts.next()?;

    let decoded: Vec<u8> = percent_decode(encoded).collect();

    let encoding = encoding_rs::Encoding::for_label(charset)?;
    let (text, _, had_errors) = encoding.decode(&decoded);
    if had_errors {
        return None;
    }

    Some(text.into_owned())
}
