//! `Content-Disposition` handling (RFC 2183).

use std::collections::HashMap;

use crate::content_type::parse_parameters;
use crate::error::{Error, Result};

/// Disposition type of a body part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispositionKind {
    /// Displayed as part of the message.
    Inline,
    /// Separate from the message body.
    Attachment,
    /// Any other token; treated like a missing disposition.
    Other(String),
}

/// Parsed `Content-Disposition` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition type.
    pub kind: DispositionKind,
    /// Parameters (filename, size, ...).
    pub parameters: HashMap<String, String>,
}

impl ContentDisposition {
    /// Parses a `Content-Disposition` value.
    ///
    /// # Errors
    ///
    /// Returns an error if the disposition type is empty or a parameter
    /// cannot be decoded.
    pub fn parse(s: &str) -> Result<Self> {
        let (kind, params) = s.split_once(';').unwrap_or((s, ""));
        let kind = kind.trim().to_lowercase();
        let kind = match kind.as_str() {
            "" => return Err(Error::InvalidHeader(format!("Empty disposition: {s}"))),
            "inline" => DispositionKind::Inline,
            "attachment" => DispositionKind::Attachment,
            _ => DispositionKind::Other(kind),
        };

        Ok(Self {
            kind,
            parameters: parse_parameters(params)?,
        })
    }

    /// Returns the filename parameter if present.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.parameters.get("filename").map(String::as_str)
    }
}
