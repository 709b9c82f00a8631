//! Leaf body parts yielded by [`MessageReader`](crate::MessageReader).

use std::fmt;

use crate::content_type::ContentType;
use crate::disposition::{ContentDisposition, DispositionKind};
use crate::encoding::{decode_base64, decode_charset, decode_quoted_printable, decode_rfc2047};
use crate::error::Result;
use crate::header::Headers;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }

    /// Decodes raw body bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid for this encoding.
    pub fn decode(self, body: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => decode_base64(&String::from_utf8_lossy(body)),
            Self::QuotedPrintable => decode_quoted_printable(body),
            Self::SevenBit | Self::EightBit | Self::Binary => Ok(body.to_vec()),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// A non-multipart entity: its headers and undecoded body.
#[derive(Debug, Clone)]
pub struct Entity<'a> {
    headers: Headers,
    content_type: ContentType,
    body: &'a [u8],
}

impl<'a> Entity<'a> {
    pub(crate) const fn new(headers: Headers, content_type: ContentType, body: &'a [u8]) -> Self {
        Self {
            headers,
            content_type,
            body,
        }
    }

    /// Part headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Content type; `text/plain` when the header is absent.
    #[must_use]
    pub const fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    /// Raw body bytes, still transfer-encoded.
    #[must_use]
    pub const fn raw_body(&self) -> &'a [u8] {
        self.body
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Reads the whole body, undoing the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is malformed for its encoding.
    pub fn read_to_end(&self) -> Result<Vec<u8>> {
        self.transfer_encoding().decode(self.body)
    }
}

/// Inline content (usually the message text).
#[derive(Debug, Clone)]
pub struct InlinePart<'a>(Entity<'a>);

impl<'a> InlinePart<'a> {
    /// Underlying entity.
    #[must_use]
    pub const fn entity(&self) -> &Entity<'a> {
        &self.0
    }

    /// Reads the body as text, converting from its declared charset.
    ///
    /// # Errors
    ///
    /// Returns an error if transfer decoding fails, the charset is unknown,
    /// or the bytes are malformed for the charset.
    pub fn read_to_string(&self) -> Result<String> {
        let bytes = self.0.read_to_end()?;
        match self.0.content_type.charset() {
            Some(charset) => decode_charset(&bytes, charset),
            None => String::from_utf8(bytes).map_err(Into::into),
        }
    }
}

/// Attachment content.
#[derive(Debug, Clone)]
pub struct AttachmentPart<'a>(Entity<'a>);

impl<'a> AttachmentPart<'a> {
    /// Underlying entity.
    #[must_use]
    pub const fn entity(&self) -> &Entity<'a> {
        &self.0
    }

    /// Returns the attachment filename.
    ///
    /// Taken from the `Content-Disposition` `filename` parameter, falling
    /// back to the `Content-Type` `name` parameter. Empty when neither is
    /// present.
    ///
    /// # Errors
    ///
    /// Returns an error if the disposition header or the encoded filename
    /// is malformed.
    pub fn filename(&self) -> Result<String> {
        let from_disposition = match self.0.headers.get("content-disposition") {
            Some(value) => ContentDisposition::parse(value)?
                .filename()
                .map(ToString::to_string),
            None => None,
        };

        from_disposition
            .or_else(|| self.0.content_type.name().map(ToString::to_string))
            .map_or_else(|| Ok(String::new()), |name| decode_rfc2047(&name))
    }

    /// Reads the whole attachment, undoing the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is malformed for its encoding.
    pub fn read_to_end(&self) -> Result<Vec<u8>> {
        self.0.read_to_end()
    }
}

/// One leaf part of a message.
#[derive(Debug, Clone)]
pub enum Part<'a> {
    /// Inline content.
    Inline(InlinePart<'a>),
    /// Attachment content.
    Attachment(AttachmentPart<'a>),
}

impl<'a> Part<'a> {
    /// Classifies an entity.
    ///
    /// Inline when the disposition says so, or when there is no
    /// `attachment` disposition and the type is `text/*`.
    pub(crate) fn classify(entity: Entity<'a>) -> Result<Self> {
        let disposition = entity
            .headers
            .get("content-disposition")
            .map(ContentDisposition::parse)
            .transpose()?
            .map(|d| d.kind);

        let inline = match disposition {
            Some(DispositionKind::Inline) => true,
            Some(DispositionKind::Attachment) => false,
            Some(DispositionKind::Other(_)) | None => entity.content_type.is_text(),
        };

        Ok(if inline {
            Self::Inline(InlinePart(entity))
        } else {
            Self::Attachment(AttachmentPart(entity))
        })
    }

    /// Underlying entity.
    #[must_use]
    pub const fn entity(&self) -> &Entity<'a> {
        match self {
            Self::Inline(part) => &part.0,
            Self::Attachment(part) => &part.0,
        }
    }
}
