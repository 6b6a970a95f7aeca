//! Encoding helpers: base64 in the flavours mail APIs use, RFC 2047
//! header words and hex.

use crate::error::Result;
use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD, URL_SAFE};
use base64::engine::DecodePaddingMode;
use std::fmt::Write as _;

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

/// URL-safe alphabet, padding optional on decode.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Standard alphabet, padding optional on decode.
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

/// Longest payload (in bytes) carried by one RFC 2047 encoded word so the
/// word stays under 75 characters.
const ENCODED_WORD_CHUNK: usize = 45;

/// Encodes data with the URL-safe alphabet, padded.
#[must_use]
pub fn encode_base64_url(data: &[u8]) -> String {
    URL_SAFE.encode(data)
}

/// Decodes base64 body data from a mailbox API.
///
/// Whitespace is ignored, padding is optional and both the URL-safe and
/// the standard alphabet are accepted.
///
/// # Errors
///
/// Returns an error if the input is not valid base64 in either alphabet.
pub fn decode_base64_lenient(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let engine = if cleaned.contains(['+', '/']) {
        &STANDARD_LENIENT
    } else {
        &URL_SAFE_LENIENT
    };
    engine.decode(cleaned).map_err(Into::into)
}

/// Encodes a header value as RFC 2047 `B` encoded words when it is not
/// plain ASCII. ASCII values are returned untouched.
///
/// Long values are split into several words on character boundaries,
/// joined by folding whitespace.
#[must_use]
pub fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for ch in value.chars() {
        if chunk.len() + ch.len_utf8() > ENCODED_WORD_CHUNK {
            words.push(encoded_word(&chunk));
            chunk.clear();
        }
        chunk.push(ch);
    }
    if !chunk.is_empty() {
        words.push(encoded_word(&chunk));
    }
    words.join("\r\n ")
}

fn encoded_word(text: &str) -> String {
    format!("=?utf-8?B?{}?=", STANDARD.encode(text.as_bytes()))
}

/// Lower-case hex rendering of a byte string.
#[must_use]
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decodes_unpadded_url_safe() {
        // "subjects?" encodes to "c3ViamVjdHM_" in the URL-safe alphabet
        assert_eq!(decode_base64_lenient("c3ViamVjdHM_").unwrap(), b"subjects?");
        assert_eq!(decode_base64_lenient("aGk").unwrap(), b"hi");
        assert_eq!(decode_base64_lenient("aGk=").unwrap(), b"hi");
    }

    #[test]
    fn decodes_standard_alphabet_with_line_breaks() {
        assert_eq!(
            decode_base64_lenient("c3ViamVjdHM/\r\naGk=").unwrap(),
            b"subjects?hi"
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_base64_lenient("!!!").is_err());
    }

    #[test]
    fn url_encoding_is_padded() {
        assert_eq!(encode_base64_url(b"hi"), "aGk=");
        assert_eq!(encode_base64_url(&[0xfb, 0xff]), "-_8=");
    }

    #[test]
    fn ascii_header_untouched() {
        assert_eq!(encode_header_value("Spring news"), "Spring news");
    }

    #[test]
    fn non_ascii_header_becomes_encoded_word() {
        assert_eq!(encode_header_value("Grüße"), "=?utf-8?B?R3LDvMOfZQ==?=");
    }

    #[test]
    fn hex_rendering() {
        assert_eq!(hex(&[0x00, 0xab, 0x10]), "00ab10");
    }

    proptest! {
        #[test]
        fn encoded_words_stay_short(value in "\\PC{1,120}") {
            let encoded = encode_header_value(&value);
            for word in encoded.split("\r\n ") {
                prop_assert!(word.len() <= 75);
            }
        }
    }
}
