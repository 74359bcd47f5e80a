//! Byte-level encoding at the document boundary.
//!
//! Input bytes are sniffed for a byte order mark, then for the `encoding`
//! pseudo-attribute of the XML declaration, and decoded to UTF-8 with
//! `encoding_rs`. Output text is encoded back into the document's declared
//! encoding when it is saved.

use encoding_rs::Encoding;

use crate::parser::source;

/// An input or output encoding could not be handled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// The label names no encoding `encoding_rs` knows.
    #[error("unsupported encoding: {0}")]
    Unsupported(String),
    /// The bytes are not valid in the encoding.
    #[error("malformed byte sequence for encoding {0}")]
    Malformed(String),
    /// The text contains characters the target encoding cannot represent.
    #[error("text is not representable in encoding {0}")]
    Unmappable(String),
}

/// Returns the encoding named by a byte order mark and the BOM length.
///
/// Without a BOM the input is taken to be UTF-8.
///
/// ```
/// use oxdom::encoding::detect_encoding;
///
/// assert_eq!(detect_encoding(b"\xFF\xFE<\x00"), ("UTF-16LE", 2));
/// assert_eq!(detect_encoding(b"<r/>"), ("UTF-8", 0));
/// ```
#[must_use]
pub fn detect_encoding(bytes: &[u8]) -> (&'static str, usize) {
    match Encoding::for_bom(bytes) {
        Some((encoding, len)) => (encoding.name(), len),
        None => ("UTF-8", 0),
    }
}

fn lookup(label: &str) -> Result<&'static Encoding, EncodingError> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| EncodingError::Unsupported(label.to_string()))
}

/// Decodes `bytes` from the encoding named `label`.
///
/// # Errors
///
/// Fails if the label is unknown or the input is malformed.
pub fn transcode(bytes: &[u8], label: &str) -> Result<String, EncodingError> {
    let encoding = lookup(label)?;
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(EncodingError::Malformed(encoding.name().to_string()));
    }
    Ok(text.into_owned())
}

/// The declared encoding, read from the ASCII-compatible prefix of the
/// input. Only the first line can hold the declaration.
fn declared_label(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(256)];
    source::xml_declaration(&String::from_utf8_lossy(head)).and_then(|decl| decl.encoding)
}

/// Decodes raw XML bytes to UTF-8.
///
/// A byte order mark wins. Otherwise the declared encoding is used, and
/// without a declaration the input must be UTF-8.
///
/// # Errors
///
/// Fails if the declared encoding is unknown or the input is malformed.
///
/// ```
/// use oxdom::encoding::decode_to_utf8;
///
/// let text = decode_to_utf8(b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><r>\xE9</r>");
/// assert!(text.is_ok_and(|t| t.ends_with("<r>\u{e9}</r>")));
/// ```
pub fn decode_to_utf8(bytes: &[u8]) -> Result<String, EncodingError> {
    if let Some((encoding, len)) = Encoding::for_bom(bytes) {
        return transcode(&bytes[len..], encoding.name());
    }
    match declared_label(bytes) {
        Some(label) if lookup(&label)? != encoding_rs::UTF_8 => transcode(bytes, &label),
        _ => transcode(bytes, "UTF-8"),
    }
}

/// Encodes `text` into the encoding named `label`.
///
/// # Errors
///
/// Fails if the label is unknown, or if the text holds characters the
/// encoding cannot represent. UTF-16 labels are rejected by `encoding_rs`
/// as output encodings and are written as UTF-8 instead.
pub fn encode_from_utf8(text: &str, label: &str) -> Result<Vec<u8>, EncodingError> {
    let encoding = lookup(label)?;
    let (bytes, used, unmappable) = encoding.encode(text);
    if unmappable && used == encoding {
        return Err(EncodingError::Unmappable(encoding.name().to_string()));
    }
    Ok(bytes.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_boms() {
        assert_eq!(detect_encoding(b"\xEF\xBB\xBF<r/>"), ("UTF-8", 3));
        assert_eq!(detect_encoding(b"\xFE\xFF\x00<"), ("UTF-16BE", 2));
        assert_eq!(detect_encoding(b""), ("UTF-8", 0));
    }

    #[test]
    fn test_decode_utf16_with_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "<r/>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_to_utf8(&bytes).ok().as_deref(), Some("<r/>"));
    }

    #[test]
    fn test_decode_declared_latin1() {
        let bytes = b"<?xml version='1.0' encoding='latin1'?><r>caf\xE9</r>";
        let Ok(text) = decode_to_utf8(bytes) else {
            panic!("decode failed");
        };
        assert!(text.ends_with("<r>caf\u{e9}</r>"));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode_to_utf8(&[0x80, 0x81]), Err(EncodingError::Malformed(_))));
        assert!(matches!(
            decode_to_utf8(b"<?xml version='1.0' encoding='no-such'?><r/>"),
            Err(EncodingError::Unsupported(_))
        ));
    }

    #[test]
    fn test_encode_round_trip() {
        let Ok(bytes) = encode_from_utf8("caf\u{e9}", "ISO-8859-1") else {
            panic!("encode failed");
        };
        assert_eq!(bytes, b"caf\xE9");
        assert!(matches!(
            encode_from_utf8("\u{4e2d}", "ISO-8859-1"),
            Err(EncodingError::Unmappable(_))
        ));
    }
}
