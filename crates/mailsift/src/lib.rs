//! # mailsift
//!
//! Streaming fetch-and-decode pipeline for mail stores.
//!
//! A fetch runs as three concurrent stages joined by bounded channels:
//!
//! ```text
//! MailStore ──▶ MessageSource ──▶ SelectiveDecoder ──▶ AttachmentProjector
//!               (raw bodies)      (MailRecord)         (Attachment)
//! ```
//!
//! - [`MessageSource`] selects the mailbox read-only, searches the date
//!   window and streams the matching bodies.
//! - [`SelectiveDecoder`] decodes only the fields in a [`FieldSelection`],
//!   one message at a time, dropping messages that fail and aborting once
//!   the error budget is spent.
//! - [`AttachmentProjector`] flattens records into their attachments.
//!
//! One [`CancelToken`] reaches every stage. Each stage hands back a
//! [`StageStream`]; [`StageStream::finish`] waits for the whole pipeline
//! and returns a [`FetchReport`] or the error that ended it.
//!
//! [`MailFetcher`] wires the stages together:
//!
//! ```
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use mailsift::{CancelToken, MailFetcher, MemoryStore, SearchCriteria};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> mailsift::Result<()> {
//! let day = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
//! let raw = "Subject: Report\r\n\
//! Content-Type: multipart/mixed; boundary=\"x\"\r\n\
//! \r\n\
//! --x\r\n\
//! Content-Type: text/plain\r\n\
//! \r\n\
//! See attached.\r\n\
//! --x\r\n\
//! Content-Type: text/csv\r\n\
//! Content-Disposition: attachment; filename=\"q1.csv\"\r\n\
//! \r\n\
//! a,b\r\n\
//! --x--\r\n";
//!
//! let store = MemoryStore::new().with_message("Inbox", day, raw);
//! let fetcher = MailFetcher::new(Arc::new(store));
//! let criteria = SearchCriteria::new("Inbox").since(day).before(day.succ_opt().unwrap());
//!
//! let (attachments, report) = fetcher
//!     .fetch_attachments(&CancelToken::new(), &criteria)
//!     .await?
//!     .collect()
//!     .await;
//! assert_eq!(attachments[0].filename(), "q1.csv");
//! assert_eq!(report?.attachments, 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cancel;
mod config;
mod criteria;
mod decoder;
mod error;
mod fetcher;
mod projector;
mod record;
mod selection;
mod source;
pub mod store;
mod stream;
mod types;

pub use cancel::CancelToken;
pub use config::{
    ConnInfo, CriteriaSpec, DEFAULT_CHANNEL_CAPACITY, DEFAULT_DATE_LAYOUT, DEFAULT_ERROR_LIMIT,
    FetchConfig, Settings, WindowSpec,
};
pub use criteria::{CriteriaError, DateWindow, SearchCriteria};
pub use decoder::{SelectiveDecoder, decode_message};
pub use error::{DecodeError, Error, Result};
pub use fetcher::MailFetcher;
pub use projector::AttachmentProjector;
pub use record::{Attachment, MailRecord};
pub use selection::{Field, FieldSelection};
pub use source::MessageSource;
pub use store::{BodySection, MailStore, MailboxStatus, MemoryStore, RawMessage, StoreError};
pub use stream::{AttachmentStream, FetchReport, MessageStream, RecordStream, StageStream};
pub use types::{SeqNum, SequenceSet};
