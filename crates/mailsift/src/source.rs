//! First stage: select, search and stream raw message bodies.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::config::DEFAULT_CHANNEL_CAPACITY;
use crate::criteria::SearchCriteria;
use crate::error::{Error, Result};
use crate::store::{BodySection, MailStore};
use crate::stream::{FetchReport, MessageStream, StageStream, Worker};
use crate::types::SequenceSet;

/// Pulls matching messages out of a [`MailStore`].
#[derive(Clone)]
pub struct MessageSource {
    store: Arc<dyn MailStore>,
    section: BodySection,
    capacity: usize,
}

impl std::fmt::Debug for MessageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSource")
            .field("section", &self.section)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl MessageSource {
    /// Creates a source over `store`, fetching `BODY.PEEK[]`.
    #[must_use]
    pub fn new(store: Arc<dyn MailStore>) -> Self {
        Self {
            store,
            section: BodySection::default(),
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Sets the body section to fetch.
    #[must_use]
    pub fn body_section(mut self, section: BodySection) -> Self {
        self.section = section;
        self
    }

    /// Sets the output channel capacity (at least 1).
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Selects the mailbox read-only, searches it and starts streaming the
    /// matching bodies.
    ///
    /// Setup failures are returned here, before any stream exists. A
    /// failure during bulk retrieval is reported by
    /// [`StageStream::finish`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCriteria`], [`Error::MailboxSelect`] or
    /// [`Error::Search`].
    pub async fn fetch(
        &self,
        cancel: &CancelToken,
        criteria: &SearchCriteria,
    ) -> Result<MessageStream> {
        let window = criteria.validate()?;
        let mailbox = criteria.mailbox();

        if cancel.is_cancelled() {
            debug!(mailbox, "Cancelled before fetch");
            return Ok(StageStream::closed(FetchReport {
                cancelled: true,
                ..FetchReport::default()
            }));
        }

        let status = self
            .store
            .select_mailbox(mailbox, true)
            .await
            .map_err(|source| Error::MailboxSelect {
                mailbox: mailbox.to_string(),
                source,
            })?;
        info!(mailbox, exists = status.exists, "Selected mailbox");

        info!(%window, query = %window.imap_query(), "Searching");
        let ids = self.store.search(&window).await.map_err(Error::Search)?;
        info!(mailbox, matched = ids.len(), "Search complete");

        let report = FetchReport {
            matched: ids.len(),
            ..FetchReport::default()
        };
        let Some(set) = SequenceSet::from_numbers(&ids) else {
            return Ok(StageStream::closed(report));
        };

        let (tx, rx) = mpsc::channel(self.capacity);
        let store = Arc::clone(&self.store);
        let section = self.section.clone();
        let cancel = cancel.clone();

        let worker: Worker = tokio::spawn(async move {
            let consumer = tx.clone();
            debug!(ids = %set, %section, "Fetching bodies");
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("Fetch cancelled");
                    Ok(FetchReport { cancelled: true, ..report })
                }
                () = consumer.closed() => {
                    debug!("Message consumer went away");
                    Ok(report)
                }
                result = store.fetch_bodies(&set, &section, tx) => {
                    result.map(|()| report).map_err(Error::Fetch)
                }
            }
        });

        Ok(StageStream::new(rx, worker))
    }
}
