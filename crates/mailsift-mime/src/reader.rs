//! Structured reader over a raw RFC 5322 message.
//!
//! [`MessageReader::open`] parses the top-level header block and exposes it
//! as a [`MessageHeader`]. Body parts are produced lazily by
//! [`MessageReader::next_part`], walking nested multiparts depth-first so
//! callers only see leaf parts. A single-part message yields itself as its
//! only part.

use chrono::{DateTime, FixedOffset};

use crate::address::Address;
use crate::content_type::ContentType;
use crate::date::parse_date;
use crate::encoding::decode_rfc2047;
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::part::{Entity, Part};

/// Top-level message header with typed, fallible accessors.
#[derive(Debug, Clone)]
pub struct MessageHeader {
    headers: Headers,
}

impl MessageHeader {
    /// Wraps parsed headers.
    #[must_use]
    pub const fn new(headers: Headers) -> Self {
        Self { headers }
    }

    /// Raw headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Parses the `Date` header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is missing or malformed.
    pub fn date(&self) -> Result<DateTime<FixedOffset>> {
        let value = self
            .headers
            .get("date")
            .ok_or_else(|| Error::MissingHeader("Date".to_string()))?;
        parse_date(value)
    }

    /// Parses an address-list header such as `From`, `To` or `Cc`.
    ///
    /// Every occurrence of the header is included. A missing header is an
    /// empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if any entry is not a valid mailbox.
    pub fn address_list(&self, name: &str) -> Result<Vec<Address>> {
        let mut addresses = Vec::new();
        for value in self.headers.get_all(name) {
            addresses.extend(Address::parse_list(value)?);
        }
        Ok(addresses)
    }

    /// Decodes the `Subject` header. A missing subject is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if an encoded word is malformed.
    pub fn subject(&self) -> Result<String> {
        self.headers
            .get("subject")
            .map_or_else(|| Ok(String::new()), decode_rfc2047)
    }
}

/// Reader over one message's structure.
///
/// Borrows the raw message; parts are sliced out of it, never copied until
/// read.
#[derive(Debug)]
pub struct MessageReader<'a> {
    header: MessageHeader,
    /// Pending entities, next one last.
    pending: Vec<RawEntity<'a>>,
}

impl<'a> MessageReader<'a> {
    /// Opens a reader over a raw message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is empty or its header block is
    /// malformed.
    pub fn open(raw: &'a [u8]) -> Result<Self> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::Parse("Empty message".to_string()));
        }

        let entity = RawEntity::parse(raw)?;
        let header = MessageHeader::new(entity.headers.clone());

        Ok(Self {
            header,
            pending: vec![entity],
        })
    }

    /// Top-level header.
    #[must_use]
    pub const fn header(&self) -> &MessageHeader {
        &self.header
    }

    /// Returns the next leaf part, or `None` once every part was visited.
    ///
    /// # Errors
    ///
    /// Returns an error if a multipart body or a part header is malformed.
    /// The failing entity is dropped; later calls continue with the rest.
    pub fn next_part(&mut self) -> Result<Option<Part<'a>>> {
        while let Some(entity) = self.pending.pop() {
            let content_type = entity.content_type()?;

            if content_type.is_multipart() {
                let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
                let children = split_multipart(entity.body, boundary)?;
                self.pending.extend(children.into_iter().rev());
                continue;
            }

            let leaf = Entity::new(entity.headers, content_type, entity.body);
            return Part::classify(leaf).map(Some);
        }
        Ok(None)
    }
}

#[derive(Debug)]
struct RawEntity<'a> {
    headers: Headers,
    body: &'a [u8],
}

impl<'a> RawEntity<'a> {
    /// Splits a header block from its body at the first empty line.
    fn parse(raw: &'a [u8]) -> Result<Self> {
        let (head, body) = split_header_body(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(head))?;
        Ok(Self { headers, body })
    }

    fn content_type(&self) -> Result<ContentType> {
        self.headers
            .get("content-type")
            .map_or_else(|| Ok(ContentType::text_plain()), ContentType::parse)
    }
}

fn split_header_body(raw: &[u8]) -> (&[u8], &[u8]) {
    // A part may start with the blank line when it has no headers.
    if let Some(body) = raw.strip_prefix(b"\r\n") {
        return (&raw[..0], body);
    }
    if let Some(body) = raw.strip_prefix(b"\n") {
        return (&raw[..0], body);
    }

    let mut pos = 0;
    while let Some(offset) = raw[pos..].iter().position(|&b| b == b'\n') {
        let next = pos + offset + 1;
        match raw.get(next..) {
            Some([b'\r', b'\n', ..]) => return (&raw[..next], &raw[next + 2..]),
            Some([b'\n', ..]) => return (&raw[..next], &raw[next + 1..]),
            _ => pos = next,
        }
    }
    (raw, &raw[raw.len()..])
}

/// Splits a multipart body on `--boundary` delimiter lines.
///
/// The preamble and epilogue are discarded. A missing close delimiter is
/// tolerated; the last part then runs to the end of the body.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<RawEntity<'a>>> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut part_start: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |i| pos + i + 1);
        let line = trim_line_end(&body[pos..line_end]);

        if let Some(rest) = line.strip_prefix(delimiter.as_bytes()) {
            let is_close = rest == b"--".as_slice();
            if rest.is_empty() || is_close {
                if let Some(start) = part_start.take() {
                    let end = content_end(body, start, pos);
                    parts.push(RawEntity::parse(&body[start..end])?);
                }
                if is_close {
                    return finish_parts(parts);
                }
                part_start = Some(line_end);
            }
        }
        pos = line_end;
    }

    if let Some(start) = part_start {
        parts.push(RawEntity::parse(&body[start..])?);
    }
    finish_parts(parts)
}

fn finish_parts(parts: Vec<RawEntity<'_>>) -> Result<Vec<RawEntity<'_>>> {
    if parts.is_empty() {
        return Err(Error::InvalidMultipart("No body parts found".to_string()));
    }
    Ok(parts)
}

/// The line break before a delimiter belongs to the delimiter.
fn content_end(body: &[u8], start: usize, delimiter_start: usize) -> usize {
    let mut end = delimiter_start;
    if end > start && body[end - 1] == b'\n' {
        end -= 1;
        if end > start && body[end - 1] == b'\r' {
            end -= 1;
        }
    }
    end
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\r' | b'\n' | b' ' | b'\t') {
        end -= 1;
    }
    &line[..end]
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

    const MULTIPART: &str = concat!(
        "Date: Wed, 01 Jan 2020 10:00:00 +0900\r\n",
        "From: \"Sender\" <sender@example.com>\r\n",
        "To: a@example.com, b@example.com\r\n",
        "Subject: =?utf-8?Q?Hi_there?=\r\n",
        "Content-Type: multipart/mixed; boundary=\"outer\"\r\n",
        "\r\n",
        "This is the preamble.\r\n",
        "--outer\r\n",
        "Content-Type: multipart/alternative; boundary=inner\r\n",
        "\r\n",
        "--inner\r\n",
        "Content-Type: text/plain; charset=utf-8\r\n",
        "\r\n",
        "Hello\r\n",
        "--inner\r\n",
        "Content-Type: text/html; charset=utf-8\r\n",
        "\r\n",
        "<p>Hello</p>\r\n",
        "--inner--\r\n",
        "--outer\r\n",
        "Content-Type: text/plain\r\n",
        "Content-Disposition: attachment; filename=\"a.txt\"\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "aGVsbG8=\r\n",
        "--outer--\r\n",
        "epilogue\r\n",
    );

    #[test]
    fn test_header_accessors() {
        let reader = MessageReader::open(MULTIPART.as_bytes()).unwrap();
        let header = reader.header();

        assert_eq!(header.subject().unwrap(), "Hi there");
        assert_eq!(header.date().unwrap().to_rfc3339(), "2020-01-01T10:00:00+09:00");

        let from = header.address_list("From").unwrap();
        assert_eq!(from[0].email, "sender@example.com");
        assert_eq!(from[0].name.as_deref(), Some("Sender"));

        let to = header.address_list("To").unwrap();
        assert_eq!(to.len(), 2);
        assert!(header.address_list("Cc").unwrap().is_empty());
    }

    #[test]
    fn test_walks_parts_depth_first() {
        let mut reader = MessageReader::open(MULTIPART.as_bytes()).unwrap();

        let Some(Part::Inline(text)) = reader.next_part().unwrap() else {
            panic!("expected text part");
        };
        assert_eq!(text.read_to_string().unwrap(), "Hello");

        let Some(Part::Inline(html)) = reader.next_part().unwrap() else {
            panic!("expected html part");
        };
        assert_eq!(html.read_to_string().unwrap(), "<p>Hello</p>");

        let Some(Part::Attachment(att)) = reader.next_part().unwrap() else {
            panic!("expected attachment");
        };
        assert_eq!(att.filename().unwrap(), "a.txt");
        assert_eq!(att.read_to_end().unwrap(), b"hello");

        assert!(reader.next_part().unwrap().is_none());
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_single_part_message() {
        let raw = b"Subject: plain\nFrom: x@example.com\n\nJust text\n";
        let mut reader = MessageReader::open(raw).unwrap();
        assert_eq!(reader.header().subject().unwrap(), "plain");

        let Some(Part::Inline(text)) = reader.next_part().unwrap() else {
            panic!("expected inline part");
        };
        assert_eq!(text.read_to_string().unwrap(), "Just text\n");
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_missing_date_and_subject() {
        let reader = MessageReader::open(b"From: x@example.com\r\n\r\nbody").unwrap();
        assert!(matches!(reader.header().date(), Err(Error::MissingHeader(_))));
        assert_eq!(reader.header().subject().unwrap(), "");
    }

    #[test]
    fn test_open_rejects_empty_and_garbage() {
        assert!(MessageReader::open(b"").is_err());
        assert!(MessageReader::open(b"\r\n  \r\n").is_err());
        assert!(MessageReader::open(b"garbage without colon\r\n\r\nbody").is_err());
    }

    #[test]
    fn test_multipart_without_boundary() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\nbody";
        let mut reader = MessageReader::open(raw).unwrap();
        assert!(matches!(reader.next_part(), Err(Error::MissingBoundary)));
    }

    #[test]
    fn test_multipart_without_parts() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\r\nno delimiters here";
        let mut reader = MessageReader::open(raw).unwrap();
        assert!(matches!(reader.next_part(), Err(Error::InvalidMultipart(_))));
    }

    #[test]
    fn test_multipart_missing_close_delimiter() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n--b\r\n\r\nonly part";
        let mut reader = MessageReader::open(raw).unwrap();
        let Some(Part::Inline(text)) = reader.next_part().unwrap() else {
            panic!("expected inline part");
        };
        assert_eq!(text.read_to_string().unwrap(), "only part");
    }

    #[test]
    fn test_split_header_body() {
        let (head, body) = split_header_body(b"A: 1\r\nB: 2\r\n\r\nbody");
        assert_eq!(head, b"A: 1\r\nB: 2\r\n");
        assert_eq!(body, b"body");

        let (head, body) = split_header_body(b"\r\nno headers");
        assert!(head.is_empty());
        assert_eq!(body, b"no headers");

        let (head, body) = split_header_body(b"A: 1");
        assert_eq!(head, b"A: 1");
        assert!(body.is_empty());
    }

    mod props {
        use crate::{MessageReader, Part};
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_input_never_panics(raw in proptest::collection::vec(any::<u8>(), 0..512)) {
                if let Ok(mut reader) = MessageReader::open(&raw) {
                    let _ = reader.header().subject();
                    let _ = reader.header().date();
                    // Every call either yields, errors or ends; the stack only shrinks.
                    for _ in 0..64 {
                        match reader.next_part() {
                            Ok(Some(Part::Inline(part))) => { let _ = part.read_to_string(); }
                            Ok(Some(Part::Attachment(part))) => { let _ = part.filename(); }
                            Ok(None) => break,
                            Err(_) => {}
                        }
                    }
                }
            }

            #[test]
            fn multipart_yields_every_part(bodies in proptest::collection::vec("[a-z ]{0,20}", 1..6)) {
                let mut raw = String::from("Content-Type: multipart/mixed; boundary=sep\r\n\r\n");
                for body in &bodies {
                    raw.push_str("--sep\r\nContent-Type: text/plain\r\n\r\n");
                    raw.push_str(body);
                    raw.push_str("\r\n");
                }
                raw.push_str("--sep--\r\n");

                let mut reader = MessageReader::open(raw.as_bytes()).unwrap();
                let mut seen = Vec::new();
                while let Some(part) = reader.next_part().unwrap() {
                    let Part::Inline(text) = part else {
                        panic!("expected inline part");
                    };
                    seen.push(text.read_to_string().unwrap());
                }
                prop_assert_eq!(seen, bodies);
            }
        }
    }
}
