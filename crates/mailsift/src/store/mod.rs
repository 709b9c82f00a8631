//! The mail-store collaborator.
//!
//! The pipeline never speaks a wire protocol itself. It drives a
//! [`MailStore`], which selects a mailbox, searches it and streams message
//! bodies back. [`MemoryStore`] is an in-process implementation.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::criteria::DateWindow;
use crate::types::{SeqNum, SequenceSet};

/// Errors reported by a mail store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Mailbox does not exist.
    #[error("no such mailbox: {0}")]
    NoSuchMailbox(String),

    /// A command was issued before selecting a mailbox.
    #[error("no mailbox selected")]
    NoMailboxSelected,

    /// Server returned NO.
    #[error("server returned NO: {0}")]
    No(String),

    /// Server returned BAD.
    #[error("server returned BAD: {0}")]
    Bad(String),

    /// Connection lost or refused.
    #[error("connection error: {0}")]
    Connection(String),
}

/// State of a freshly selected mailbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Whether the mailbox was opened read-only.
    pub read_only: bool,
}

/// One fetched message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Sequence number in the selected mailbox.
    pub seq: SeqNum,
    /// Raw RFC 5322 bytes of the fetched section.
    pub body: Bytes,
}

impl RawMessage {
    /// Creates a raw message.
    pub fn new(seq: SeqNum, body: impl Into<Bytes>) -> Self {
        Self {
            seq,
            body: body.into(),
        }
    }
}

/// Body section to retrieve, e.g. `BODY.PEEK[]` or `BODY[TEXT]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodySection {
    /// Section specifier, `None` for the whole message.
    pub section: Option<String>,
    /// Leave the `\Seen` flag untouched.
    pub peek: bool,
}

impl Default for BodySection {
    fn default() -> Self {
        Self {
            section: None,
            peek: true,
        }
    }
}

impl std::fmt::Display for BodySection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = if self.peek { "BODY.PEEK" } else { "BODY" };
        write!(f, "{body}[{}]", self.section.as_deref().unwrap_or_default())
    }
}

/// Operations the pipeline needs from a mail store.
///
/// Implementations must be shareable across tasks; the pipeline holds them
/// as `Arc<dyn MailStore>`.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Opens `mailbox` for reading.
    async fn select_mailbox(
        &self,
        mailbox: &str,
        read_only: bool,
    ) -> Result<MailboxStatus, StoreError>;

    /// Returns the sequence numbers of messages inside `window`, ascending.
    async fn search(&self, window: &DateWindow) -> Result<Vec<SeqNum>, StoreError>;

    /// Sends the bodies of `ids` to `out`, in sequence order.
    ///
    /// `out` is closed when this returns, whether it succeeded or not. If
    /// the receiving side goes away the implementation stops and returns
    /// `Ok`.
    async fn fetch_bodies(
        &self,
        ids: &SequenceSet,
        section: &BodySection,
        out: mpsc::Sender<RawMessage>,
    ) -> Result<(), StoreError>;
}
