//! MIME content type and parameter handling.

use crate::encoding::decode_charset;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters (e.g., charset=utf-8, boundary=xxx).
    pub parameters: HashMap<String, String>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: HashMap::new(),
        }
    }

    /// Creates a text/plain content type with no charset.
    ///
    /// Used when a part carries no `Content-Type`; its text is then read
    /// as UTF-8.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameters.get("charset").map(String::as_str)
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters.get("boundary").map(String::as_str)
    }

    /// Returns the `name` parameter if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.parameters.get("name").map(String::as_str)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks if this is a text content type.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("text")
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="value 2"`
    ///
    /// # Errors
    ///
    /// Returns an error if the format is invalid.
    pub fn parse(s: &str) -> Result<Self> {
        let (type_str, params) = s.split_once(';').unwrap_or((s, ""));

        let Some((main_type, sub_type)) = type_str.trim().split_once('/') else {
            return Err(Error::InvalidContentType(format!("Missing subtype: {s}")));
        };
        let main_type = main_type.trim().to_lowercase();
        let sub_type = sub_type.trim().to_lowercase();
        if main_type.is_empty() || sub_type.is_empty() {
            return Err(Error::InvalidContentType(format!("Empty type: {s}")));
        }

        let mut content_type = Self::new(main_type, sub_type);
        content_type.parameters = parse_parameters(params)?;
        Ok(content_type)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = &self.main_type;
        let sub = &self.sub_type;
        write!(f, "{main}/{sub}")
    }
}

/// Parses `; key=value; key2="quoted; value"` parameter lists.
///
/// Keys are lowercased. RFC 2231 extended values (`key*=charset''%xx`)
/// and continuations (`key*0*=...; key*1=...`) are decoded and stored under
/// the plain key, taking precedence over a plain `key=` of the same name.
pub(crate) fn parse_parameters(s: &str) -> Result<HashMap<String, String>> {
    let mut parameters = HashMap::new();
    let mut continued: HashMap<String, Vec<Segment>> = HashMap::new();

    for param in split_unquoted(s, ';') {
        let param = param.trim();
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = unquote(value.trim());

        let (name, extended) = key
            .strip_suffix('*')
            .map_or((key.as_str(), false), |name| (name, true));

        if let Some((base, index)) = name
            .rsplit_once('*')
            .and_then(|(base, n)| n.parse::<u32>().ok().map(|n| (base, n)))
        {
            continued.entry(base.to_string()).or_default().push(Segment {
                index,
                extended,
                value,
            });
        } else if extended {
            parameters.insert(name.to_string(), decode_extended_value(&value)?);
        } else {
            parameters.entry(key).or_insert(value);
        }
    }

    for (name, segments) in continued {
        parameters.insert(name, join_segments(segments)?);
    }

    Ok(parameters)
}

/// One `key*N` or `key*N*` piece of a continued parameter.
#[derive(Debug)]
struct Segment {
    index: u32,
    extended: bool,
    value: String,
}

/// Joins continuation segments in index order.
///
/// Only `*`-marked segments are percent-decoded; the charset comes from the
/// first segment and applies to the joined bytes.
fn join_segments(mut segments: Vec<Segment>) -> Result<String> {
    segments.sort_by_key(|segment| segment.index);

    let mut charset = None;
    let mut bytes = Vec::new();
    for (position, segment) in segments.iter().enumerate() {
        if !segment.extended {
            bytes.extend_from_slice(segment.value.as_bytes());
            continue;
        }
        let mut encoded = segment.value.as_str();
        if position == 0
            && let Some((declared, rest)) = split_charset(encoded)
        {
            charset = Some(declared);
            encoded = rest;
        }
        bytes.extend(percent_decode(encoded)?);
    }

    decode_charset(&bytes, charset.filter(|c| !c.is_empty()).unwrap_or("utf-8"))
}

/// Splits on `sep`, ignoring separators inside double quotes.
fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (idx, ch) in s.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                pieces.push(&s[start..idx]);
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(&s[start..]);
    pieces
}

fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Decodes an RFC 2231 value: `charset'language'percent-encoded`.
fn decode_extended_value(value: &str) -> Result<String> {
    let Some((charset, encoded)) = split_charset(value) else {
        return Ok(value.to_string());
    };
    let charset = if charset.is_empty() { "utf-8" } else { charset };
    decode_charset(&percent_decode(encoded)?, charset)
}

/// Splits `charset'language'rest` into the charset and the rest.
fn split_charset(value: &str) -> Option<(&str, &str)> {
    let mut pieces = value.splitn(3, '\'');
    let (Some(charset), Some(_language), Some(rest)) =
        (pieces.next(), pieces.next(), pieces.next())
    else {
        return None;
    };
    Some((charset, rest))
}

fn percent_decode(encoded: &str) -> Result<Vec<u8>> {
    let raw = encoded.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let hex = raw
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| Error::InvalidEncoding(format!("Bad percent escape: {encoded}")))?;
            bytes.push(hex);
            i += 3;
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }
    Ok(bytes)
}
