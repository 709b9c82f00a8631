//! The public entry point: wires the stages into a pipeline.

use std::sync::Arc;

use tracing::debug;

use crate::cancel::CancelToken;
use crate::config::FetchConfig;
use crate::criteria::SearchCriteria;
use crate::decoder::SelectiveDecoder;
use crate::error::Result;
use crate::projector::AttachmentProjector;
use crate::selection::{Field, FieldSelection};
use crate::source::MessageSource;
use crate::store::MailStore;
use crate::stream::{AttachmentStream, RecordStream};

/// Fetches and decodes mail from a [`MailStore`].
///
/// ```
/// use std::sync::Arc;
/// use chrono::NaiveDate;
/// use mailsift::{CancelToken, FieldSelection, MailFetcher, MemoryStore, SearchCriteria};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> mailsift::Result<()> {
/// let day = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
/// let store = MemoryStore::new().with_message("Inbox", day, "Subject: Hi\r\n\r\nHello");
/// let fetcher = MailFetcher::new(Arc::new(store));
///
/// let criteria = SearchCriteria::new("Inbox")
///     .since(day)
///     .before(day.succ_opt().unwrap());
/// let mut records = fetcher
///     .fetch_mail(&CancelToken::new(), &criteria, FieldSelection::new().subject().text())
///     .await?;
///
/// while let Some(record) = records.next().await {
///     assert_eq!(record.subject, "Hi");
///     assert_eq!(record.text, "Hello");
/// }
/// assert_eq!(records.finish().await?.decoded, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MailFetcher {
    store: Arc<dyn MailStore>,
    config: FetchConfig,
}

impl std::fmt::Debug for MailFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailFetcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MailFetcher {
    /// Creates a fetcher with the default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn MailStore>) -> Self {
        Self {
            store,
            config: FetchConfig::default(),
        }
    }

    /// Creates a fetcher with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration
    /// is invalid.
    pub fn with_config(store: Arc<dyn MailStore>, config: FetchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Streams records for messages matching `criteria`, decoding only the
    /// fields in `selection`.
    ///
    /// # Errors
    ///
    /// Returns setup failures: invalid criteria, mailbox selection or
    /// search. Later failures are reported by
    /// [`StageStream::finish`](crate::StageStream::finish).
    pub async fn fetch_mail(
        &self,
        cancel: &CancelToken,
        criteria: &SearchCriteria,
        selection: FieldSelection,
    ) -> Result<RecordStream> {
        debug!(mailbox = criteria.mailbox(), %selection, "Starting mail fetch");
        let messages = self.source().fetch(cancel, criteria).await?;

        Ok(SelectiveDecoder::new(selection)
            .error_limit(self.config.error_limit)
            .capacity(self.config.channel_capacity)
            .decode(cancel, messages))
    }

    /// Streams the attachments of messages matching `criteria`.
    ///
    /// Only attachment parts are decoded.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_mail`](Self::fetch_mail).
    pub async fn fetch_attachments(
        &self,
        cancel: &CancelToken,
        criteria: &SearchCriteria,
    ) -> Result<AttachmentStream> {
        let selection = FieldSelection::new().with(Field::Attachment);
        let records = self.fetch_mail(cancel, criteria, selection).await?;

        Ok(AttachmentProjector::new()
            .capacity(self.config.channel_capacity)
            .project(cancel, records))
    }

    fn source(&self) -> MessageSource {
        MessageSource::new(Arc::clone(&self.store))
            .body_section(self.config.body_section.clone())
            .capacity(self.config.channel_capacity)
    }
}
