//! Decoding of `application/x-www-form-urlencoded` request bodies.
//!
//! A body is a list of `name=value` segments joined by `&`. Every segment
//! must carry exactly one `=`; a body with any other segment is rejected as
//! a whole and nothing from it is relayed.

use thiserror::Error;

use crate::submission::Submission;

#[derive(Error, Debug, PartialEq)]
pub enum FormError {
    #[error("form body is empty")]
    Empty,
    #[error("form segment '{0}' must contain exactly one '='")]
    MalformedSegment(String),
    #[error("invalid percent-encoding in '{0}'")]
    InvalidPercentEncoding(String),
    #[error("form body is not valid UTF-8")]
    InvalidUtf8,
}

/// Decodes a form body into a [`Submission`].
///
/// Segments are split before decoding, so an encoded `%26` or `%3D` inside
/// a value stays part of that value. `+` decodes to a space.
///
/// # Examples
///
/// ```ignore
/// let submission = decode_form(b"name=Alice&msg=Hi+there")?;
/// assert_eq!(submission.get("msg"), Some("Hi there"));
///
/// assert!(decode_form(b"foo=bar&baz").is_err());
/// ```
pub fn decode_form(body: &[u8]) -> Result<Submission, FormError> {
    let body = std::str::from_utf8(body).map_err(|_| FormError::InvalidUtf8)?;

    if body.is_empty() {
        return Err(FormError::Empty);
    }

    let mut submission = Submission::new();

    for segment in body.split('&') {
        let mut parts = segment.split('=');
        let (Some(name), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(FormError::MalformedSegment(segment.to_string()));
        };

        submission.insert(percent_decode(name, true)?, percent_decode(value, true)?);
    }

    Ok(submission)
}

/// Decodes `%XX` escapes, and `+` as a space when `plus_as_space` is set.
pub fn percent_decode(input: &str, plus_as_space: bool) -> Result<String, FormError> {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'%' => {
                let escape = bytes
                    .get(index + 1..index + 3)
                    .and_then(|hex| Some((hex_value(hex[0])? << 4) | hex_value(hex[1])?))
                    .ok_or_else(|| FormError::InvalidPercentEncoding(input.to_string()))?;
                decoded.push(escape);
                index += 3;
            }
            b'+' if plus_as_space => {
                decoded.push(b' ');
                index += 1;
            }
            byte => {
                decoded.push(byte);
                index += 1;
            }
        }
    }

    String::from_utf8(decoded).map_err(|_| FormError::InvalidUtf8)
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
