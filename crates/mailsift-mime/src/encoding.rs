//! MIME decoding utilities.
//!
//! Supports Base64, Quoted-Printable, RFC 2047 encoded words, and charset
//! conversion through `encoding_rs`.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data.
///
/// Whitespace (including the line breaks of a wrapped body) is ignored.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable data (RFC 2045).
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        // Soft line break
        match data.get(i + 1..) {
            Some([b'\r', b'\n', ..]) => {
                i += 3;
                continue;
            }
            Some([b'\n', ..]) => {
                i += 2;
                continue;
            }
            _ => {}
        }

        let hex = data
            .get(i + 1..i + 3)
            .ok_or_else(|| Error::InvalidEncoding("Incomplete escape sequence".to_string()))?;
        let hex = std::str::from_utf8(hex)
            .map_err(|_| Error::InvalidEncoding("Invalid hex escape".to_string()))?;
        let decoded = u8::from_str_radix(hex, 16)
            .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
        result.push(decoded);
        i += 3;
    }

    Ok(result)
}

/// Charset labels naming 7-bit ASCII.
const ASCII_LABELS: [&str; 5] = ["us-ascii", "ascii", "ansi_x3.4-1968", "iso646-us", "us"];

/// Converts bytes in the named charset to a UTF-8 string.
///
/// ASCII labels are decoded as UTF-8, so 8-bit text under a `us-ascii`
/// label is not silently reinterpreted.
///
/// # Errors
///
/// Returns an error if the charset label is unknown or the bytes are
/// malformed for it.
pub fn decode_charset(data: &[u8], charset: &str) -> Result<String> {
    let label = charset.trim();
    // WHATWG maps the ASCII labels to windows-1252; read them as UTF-8.
    let encoding = if ASCII_LABELS
        .iter()
        .any(|ascii| label.eq_ignore_ascii_case(ascii))
    {
        encoding_rs::UTF_8
    } else {
        encoding_rs::Encoding::for_label(label.as_bytes())
            .ok_or_else(|| Error::UnsupportedCharset(charset.to_string()))?
    };

    let (text, had_errors) = encoding.decode_without_bom_handling(data);
    if had_errors {
        return Err(Error::InvalidEncoding(format!(
            "Malformed {} text",
            encoding.name()
        )));
    }
    Ok(text.into_owned())
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Format of a word: `=?charset?encoding?encoded-text?=`. Whitespace between
/// two adjacent encoded words is dropped; all other text is kept as is.
///
/// # Errors
///
/// Returns an error if an encoded word is malformed or names an unknown
/// charset or encoding.
pub fn decode_rfc2047(text: &str) -> Result<String> {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    let mut pending_space = String::new();
    let mut after_word = false;

    while !rest.is_empty() {
        let Some(start) = rest.find("=?") else {
            result.push_str(&pending_space);
            result.push_str(rest);
            return Ok(result);
        };

        let (before, candidate) = rest.split_at(start);
        let Some((word, consumed)) = split_encoded_word(candidate) else {
            // Not an encoded word after all, keep "=?" literally.
            result.push_str(&pending_space);
            pending_space.clear();
            result.push_str(before);
            result.push_str("=?");
            rest = &candidate[2..];
            after_word = false;
            continue;
        };

        if after_word && before.chars().all(char::is_whitespace) {
            // Whitespace between adjacent encoded words is not displayed.
        } else {
            result.push_str(&pending_space);
            result.push_str(before);
        }
        pending_space.clear();

        result.push_str(&decode_encoded_word(word)?);
        rest = &candidate[consumed..];
        after_word = true;

        // Hold trailing whitespace back until we know what follows it.
        let trimmed = rest.trim_start();
        pending_space.push_str(&rest[..rest.len() - trimmed.len()]);
        rest = trimmed;
    }

    result.push_str(&pending_space);
    Ok(result)
}

/// Splits `=?charset?enc?text?=` off the front of `s`.
///
/// Returns the inner `charset?enc?text` and the number of bytes consumed.
fn split_encoded_word(s: &str) -> Option<(&str, usize)> {
    let inner = s.strip_prefix("=?")?;
    let mut question_marks = 0;
    for (idx, ch) in inner.char_indices() {
        if ch.is_whitespace() {
            return None;
        }
        if ch == '?' {
            question_marks += 1;
            if question_marks == 3 {
                return inner[idx + 1..]
                    .starts_with('=')
                    .then(|| (&inner[..idx], idx + 4));
            }
        }
    }
    None
}

fn decode_encoded_word(word: &str) -> Result<String> {
    let mut parts = word.splitn(3, '?');
    let (Some(charset), Some(encoding), Some(encoded)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::InvalidEncoding(
            "Invalid RFC 2047 format".to_string(),
        ));
    };

    // RFC 2231 language suffix: charset*lang
    let charset = charset.split('*').next().unwrap_or(charset);

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => decode_base64(encoded)?,
        "Q" => decode_quoted_printable(encoded.replace('_', " ").as_bytes())?,
        other => {
            return Err(Error::InvalidEncoding(format!("Unknown encoding: {other}")));
        }
    };

    decode_charset(&bytes, charset)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base64_decode_wrapped() {
        let decoded = decode_base64("SGVsbG8s\r\nIFdvcmxkIQ==\r\n").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_decode_invalid() {
        assert!(decode_base64("not base64!").is_err());
    }

    #[test]
    fn test_quoted_printable_decode() {
        let decoded = decode_quoted_printable(b"Hello, World!").unwrap();
        assert_eq!(decoded, b"Hello, World!");

        let decoded = decode_quoted_printable(b"H=C3=A9llo").unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "Héllo");
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        let decoded = decode_quoted_printable(b"Hello=\r\nWorld").unwrap();
        assert_eq!(decoded, b"HelloWorld");

        let decoded = decode_quoted_printable(b"Hello=\nWorld").unwrap();
        assert_eq!(decoded, b"HelloWorld");
    }

    #[test]
    fn test_quoted_printable_incomplete_escape() {
        assert!(decode_quoted_printable(b"abc=4").is_err());
        assert!(decode_quoted_printable(b"abc=ZZ").is_err());
    }

    #[test]
    fn test_decode_charset() {
        assert_eq!(decode_charset(b"plain", "us-ascii").unwrap(), "plain");
        assert_eq!(decode_charset(&[0x63, 0x61, 0x66, 0xE9], "iso-8859-1").unwrap(), "café");
        assert_eq!(
            decode_charset(&[0x82, 0xA0], "Shift_JIS").unwrap(),
            "あ"
        );
    }

    #[test]
    fn test_decode_charset_ascii_label_is_utf8() {
        assert_eq!(decode_charset("Héllo".as_bytes(), "us-ascii").unwrap(), "Héllo");
        assert_eq!(decode_charset("Héllo".as_bytes(), " US-ASCII ").unwrap(), "Héllo");
        assert!(matches!(
            decode_charset(&[0x63, 0x61, 0x66, 0xE9], "us-ascii"),
            Err(Error::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_decode_charset_errors() {
        assert!(matches!(
            decode_charset(b"x", "x-no-such-charset"),
            Err(Error::UnsupportedCharset(_))
        ));
        assert!(matches!(
            decode_charset(&[0xFF, 0xFE, 0xFD], "utf-8"),
            Err(Error::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_rfc2047_plain_passthrough() {
        assert_eq!(decode_rfc2047("Hello").unwrap(), "Hello");
        assert_eq!(decode_rfc2047("a =? b").unwrap(), "a =? b");
    }

    #[test]
    fn test_rfc2047_decode() {
        let decoded = decode_rfc2047("=?utf-8?B?SMOpbGxv?=").unwrap();
        assert_eq!(decoded, "Héllo");
    }

    #[test]
    fn test_rfc2047_quoted_printable() {
        let decoded = decode_rfc2047("=?utf-8?Q?H=C3=A9llo_there?=").unwrap();
        assert_eq!(decoded, "Héllo there");
    }

    #[test]
    fn test_rfc2047_mixed_text() {
        let decoded = decode_rfc2047("Re: =?utf-8?Q?caf=C3=A9?= today").unwrap();
        assert_eq!(decoded, "Re: café today");
    }

    #[test]
    fn test_rfc2047_adjacent_words_join() {
        let decoded = decode_rfc2047("=?utf-8?Q?a?= =?utf-8?Q?b?=").unwrap();
        assert_eq!(decoded, "ab");
    }

    #[test]
    fn test_rfc2047_iso_2022_jp() {
        // "テスト" in ISO-2022-JP, base64 encoded
        let decoded = decode_rfc2047("=?ISO-2022-JP?B?GyRCJUYlOSVIGyhC?=").unwrap();
        assert_eq!(decoded, "テスト");
    }

    #[test]
    fn test_rfc2047_unknown_encoding() {
        assert!(decode_rfc2047("=?utf-8?X?abc?=").is_err());
    }
}
