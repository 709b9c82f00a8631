//! In-process mail store.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use super::{BodySection, MailStore, MailboxStatus, RawMessage, StoreError};
use crate::criteria::DateWindow;
use crate::types::{SeqNum, SequenceSet};

#[derive(Debug, Clone)]
struct StoredMessage {
    internal_date: NaiveDate,
    raw: Bytes,
}

#[derive(Debug, Default)]
struct State {
    mailboxes: HashMap<String, Vec<StoredMessage>>,
    selected: Option<String>,
}

/// A [`MailStore`] backed by memory.
///
/// Messages carry an internal date used for searching. Sequence numbers
/// follow insertion order, starting at 1. The section passed to
/// [`fetch_bodies`](MailStore::fetch_bodies) is ignored; the whole message
/// is always returned.
///
/// ```
/// use chrono::NaiveDate;
/// use mailsift::MemoryStore;
///
/// let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
/// let store = MemoryStore::new()
///     .with_mailbox("Archive")
///     .with_message("Inbox", date, "Subject: Hi\r\n\r\nHello");
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an empty mailbox.
    #[must_use]
    pub fn with_mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.state
            .get_mut()
            .mailboxes
            .entry(mailbox.into())
            .or_default();
        self
    }

    /// Appends a message, creating the mailbox if needed.
    #[must_use]
    pub fn with_message(
        mut self,
        mailbox: impl Into<String>,
        internal_date: NaiveDate,
        raw: impl Into<Bytes>,
    ) -> Self {
        push(self.state.get_mut(), mailbox.into(), internal_date, raw.into());
        self
    }

    /// Appends a message to a shared store, creating the mailbox if needed.
    pub async fn append(
        &self,
        mailbox: impl Into<String>,
        internal_date: NaiveDate,
        raw: impl Into<Bytes>,
    ) -> SeqNum {
        let mut state = self.state.lock().await;
        push(&mut state, mailbox.into(), internal_date, raw.into())
    }
}

fn push(state: &mut State, mailbox: String, internal_date: NaiveDate, raw: Bytes) -> SeqNum {
    let messages = state.mailboxes.entry(mailbox).or_default();
    messages.push(StoredMessage { internal_date, raw });
    let count = u32::try_from(messages.len()).unwrap_or(u32::MAX);
    SeqNum::new(count).unwrap_or(SeqNum::MIN)
}

#[async_trait]
impl MailStore for MemoryStore {
    async fn select_mailbox(
        &self,
        mailbox: &str,
        read_only: bool,
    ) -> Result<MailboxStatus, StoreError> {
        let mut state = self.state.lock().await;
        let exists = state
            .mailboxes
            .get(mailbox)
            .map(Vec::len)
            .ok_or_else(|| StoreError::NoSuchMailbox(mailbox.to_string()))?;
        state.selected = Some(mailbox.to_string());

        Ok(MailboxStatus {
            exists: u32::try_from(exists).unwrap_or(u32::MAX),
            read_only,
        })
    }

    async fn search(&self, window: &DateWindow) -> Result<Vec<SeqNum>, StoreError> {
        let state = self.state.lock().await;
        let messages = selected(&state)?;

        Ok(messages
            .iter()
            .zip(1u32..)
            .filter(|(message, _)| window.contains(message.internal_date))
            .filter_map(|(_, n)| SeqNum::new(n))
            .collect())
    }

    async fn fetch_bodies(
        &self,
        ids: &SequenceSet,
        _section: &BodySection,
        out: mpsc::Sender<RawMessage>,
    ) -> Result<(), StoreError> {
        // Copy out under the lock; sending may wait on the consumer.
        let batch: Vec<RawMessage> = {
            let state = self.state.lock().await;
            let messages = selected(&state)?;
            ids.iter_numbers()
                .into_iter()
                .filter_map(|seq| {
                    let index = usize::try_from(seq.get() - 1).ok()?;
                    messages
                        .get(index)
                        .map(|message| RawMessage::new(seq, message.raw.clone()))
                })
                .collect()
        };

        for message in batch {
            if out.send(message).await.is_err() {
                debug!("Receiver dropped, stopping fetch");
                break;
            }
        }
        Ok(())
    }
}

fn selected(state: &State) -> Result<&[StoredMessage], StoreError> {
    let name = state
        .selected
        .as_deref()
        .ok_or(StoreError::NoMailboxSelected)?;
    state
        .mailboxes
        .get(name)
        .map(Vec::as_slice)
        .ok_or_else(|| StoreError::NoSuchMailbox(name.to_string()))
}
