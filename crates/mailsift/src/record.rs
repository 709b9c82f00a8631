//! Decoded mail records and their attachments.

use std::io;
use std::path::{Path, PathBuf};

use bytes::{Buf, Bytes};
use chrono::{DateTime, FixedOffset};

/// Longest filename `save_in` will write, in characters.
const MAX_FILENAME_LEN: usize = 150;

/// One decoded message.
///
/// Only the fields in the requested [`FieldSelection`](crate::FieldSelection)
/// are populated; the rest keep their empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailRecord {
    /// `Date` header, `None` if not requested.
    pub date: Option<DateTime<FixedOffset>>,
    /// Sender email addresses.
    pub from: Vec<String>,
    /// Recipient email addresses.
    pub to: Vec<String>,
    /// Carbon copy email addresses.
    pub cc: Vec<String>,
    /// Decoded subject.
    pub subject: String,
    /// Content of the first inline `text/*` part.
    pub text: String,
    /// Attachments in part order.
    pub attachments: Vec<Attachment>,
}

/// A fully buffered attachment.
///
/// The content is owned by the attachment, so it stays readable after the
/// pipeline that produced it has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    filename: String,
    content: Bytes,
}

impl Attachment {
    /// Creates an attachment from its filename and content.
    pub fn new(filename: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    /// Filename as sent, possibly empty.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Decoded content.
    #[must_use]
    pub const fn content(&self) -> &Bytes {
        &self.content
    }

    /// Consumes the attachment, returning its content.
    #[must_use]
    pub fn into_content(self) -> Bytes {
        self.content
    }

    /// Returns a fresh reader over the content.
    ///
    /// Each call starts from the first byte.
    #[must_use]
    pub fn reader(&self) -> bytes::buf::Reader<Bytes> {
        self.content.clone().reader()
    }

    /// Content length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Returns `true` if the content is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Writes the content into `dir` and returns the written path.
    ///
    /// The filename is sanitized so it cannot escape `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save_in(&self, dir: impl AsRef<Path>) -> io::Result<PathBuf> {
        let path = dir.as_ref().join(sanitize_filename(&self.filename));
        tokio::fs::write(&path, &self.content).await?;
        Ok(path)
    }
}

fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim_start_matches('.')
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | ' ' | '@') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_LEN)
        .collect();

    if sanitized.trim().is_empty() {
        "attachment".to_string()
    } else {
        sanitized
    }
}
