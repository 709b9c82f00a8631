//! End-to-end tests for the fetch pipeline.
//!
//! Most tests run against `MemoryStore`. `ScriptedStore` covers store
//! failures and a fetch that never completes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use proptest::prelude::*;
use tokio::sync::mpsc;
use tokio::time::timeout;

use mailsift::{
    Attachment, BodySection, CancelToken, CriteriaError, DateWindow, Error, FetchConfig, Field,
    FieldSelection, MailFetcher, MailStore, MailboxStatus, MemoryStore, RawMessage,
    SearchCriteria, SeqNum, SequenceSet, StoreError, decode_message,
};
use mailsift_mime::encoding::encode_base64;

const DEADLINE: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, d).unwrap()
}

fn inbox_jan_1() -> SearchCriteria {
    SearchCriteria::new("Inbox").since(day(1)).before(day(2))
}

/// Builds a multipart message with one text part and the given attachments.
fn message(subject: &str, text: &str, attachments: &[(&str, &str)]) -> String {
    let mut raw = format!(
        "Date: Wed, 1 Jan 2020 10:00:00 +0000\r\n\
         From: Alice <alice@example.com>\r\n\
         To: bob@example.com\r\n\
         Cc: carol@example.com\r\n\
         Subject: {subject}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/mixed; boundary=\"frontier\"\r\n\
         \r\n\
         --frontier\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         {text}\r\n"
    );
    for (name, content) in attachments {
        raw.push_str(&format!(
            "--frontier\r\n\
             Content-Type: application/octet-stream\r\n\
             Content-Disposition: attachment; filename=\"{name}\"\r\n\
             Content-Transfer-Encoding: base64\r\n\
             \r\n\
             {}\r\n",
            encode_base64(content.as_bytes())
        ));
    }
    raw.push_str("--frontier--\r\n");
    raw
}

fn fetcher(store: MemoryStore, config: FetchConfig) -> MailFetcher {
    MailFetcher::with_config(Arc::new(store), config).unwrap()
}

/// What `ScriptedStore::fetch_bodies` does after sending its bodies.
#[derive(Debug, Clone, Copy)]
enum AfterFetch {
    Finish,
    Fail,
    Stall,
}

/// Sets a flag when dropped, proving a fetch future was released.
struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct ScriptedStore {
    bodies: Vec<String>,
    search_error: Option<StoreError>,
    after_fetch: AfterFetch,
    calls: AtomicUsize,
    released: Arc<AtomicBool>,
}

impl ScriptedStore {
    fn new(bodies: Vec<String>, after_fetch: AfterFetch) -> Self {
        Self {
            bodies,
            search_error: None,
            after_fetch,
            calls: AtomicUsize::new(0),
            released: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl MailStore for ScriptedStore {
    async fn select_mailbox(
        &self,
        _mailbox: &str,
        read_only: bool,
    ) -> Result<MailboxStatus, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(MailboxStatus {
            exists: u32::try_from(self.bodies.len()).unwrap(),
            read_only,
        })
    }

    async fn search(&self, _window: &DateWindow) -> Result<Vec<SeqNum>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.search_error {
            return Err(err.clone());
        }
        Ok((1..=u32::try_from(self.bodies.len()).unwrap())
            .filter_map(SeqNum::new)
            .collect())
    }

    async fn fetch_bodies(
        &self,
        ids: &SequenceSet,
        _section: &BodySection,
        out: mpsc::Sender<RawMessage>,
    ) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _guard = ReleaseGuard(Arc::clone(&self.released));

        for (seq, body) in ids.iter_numbers().into_iter().zip(&self.bodies) {
            if out.send(RawMessage::new(seq, body.clone())).await.is_err() {
                return Ok(());
            }
        }

        match self.after_fetch {
            AfterFetch::Finish => Ok(()),
            AfterFetch::Fail => Err(StoreError::Connection("connection reset".into())),
            AfterFetch::Stall => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[tokio::test]
async fn concrete_subject_and_attachment_scenario() {
    init_tracing();
    let store = MemoryStore::new()
        .with_message("Inbox", day(1), message("Hi", "Hello", &[("a.txt", "hello")]))
        .with_message("Inbox", day(2), message("Later", "Not today", &[]));
    let selection = FieldSelection::new().subject().attachment();

    let (records, report) = fetcher(store, FetchConfig::default())
        .fetch_mail(&CancelToken::new(), &inbox_jan_1(), selection)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.subject, "Hi");
    assert_eq!(record.text, "");
    assert!(record.date.is_none());
    assert!(record.from.is_empty());
    assert_eq!(record.attachments, vec![Attachment::new("a.txt", "hello")]);

    let report = report.unwrap();
    assert_eq!((report.matched, report.decoded, report.failed), (1, 1, 0));
    assert!(!report.cancelled);
}

#[tokio::test]
async fn zero_matches_is_an_empty_stream() {
    let store = MemoryStore::new().with_message("Inbox", day(5), message("x", "y", &[]));

    let (records, report) = fetcher(store, FetchConfig::default())
        .fetch_mail(&CancelToken::new(), &inbox_jan_1(), FieldSelection::all())
        .await
        .unwrap()
        .collect()
        .await;

    assert!(records.is_empty());
    assert_eq!(report.unwrap().matched, 0);
}

#[tokio::test]
async fn invalid_criteria_fails_before_io() {
    let store = Arc::new(ScriptedStore::new(vec![], AfterFetch::Finish));
    let fetcher = MailFetcher::new(Arc::clone(&store) as Arc<dyn MailStore>);
    let cancel = CancelToken::new();

    for (criteria, expected) in [
        (
            SearchCriteria::new("  ").since(day(1)).before(day(2)),
            CriteriaError::EmptyMailbox,
        ),
        (
            SearchCriteria::new("Inbox").before(day(2)),
            CriteriaError::MissingSince,
        ),
        (
            SearchCriteria::new("Inbox").since(day(1)),
            CriteriaError::MissingBefore,
        ),
    ] {
        let err = fetcher
            .fetch_mail(&cancel, &criteria, FieldSelection::all())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCriteria(e) if e == expected));
    }
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn mailbox_select_failure_is_immediate() {
    let store = MemoryStore::new().with_mailbox("Archive");
    let err = fetcher(store, FetchConfig::default())
        .fetch_attachments(&CancelToken::new(), &inbox_jan_1())
        .await
        .unwrap_err();

    match err {
        Error::MailboxSelect { mailbox, source } => {
            assert_eq!(mailbox, "Inbox");
            assert_eq!(source, StoreError::NoSuchMailbox("Inbox".into()));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn search_failure_is_immediate() {
    let mut store = ScriptedStore::new(vec![], AfterFetch::Finish);
    store.search_error = Some(StoreError::No("SEARCH not allowed".into()));

    let err = MailFetcher::new(Arc::new(store))
        .fetch_mail(&CancelToken::new(), &inbox_jan_1(), FieldSelection::all())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Search(StoreError::No(_))));
}

#[tokio::test]
async fn fetch_failure_is_reported_after_records() {
    let store = ScriptedStore::new(vec![message("first", "a", &[])], AfterFetch::Fail);

    let (records, report) = MailFetcher::new(Arc::new(store))
        .fetch_mail(&CancelToken::new(), &inbox_jan_1(), FieldSelection::new().subject())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].subject, "first");
    assert!(matches!(report, Err(Error::Fetch(StoreError::Connection(_)))));
}

#[tokio::test]
async fn records_preserve_fetch_order() {
    let mut store = MemoryStore::new();
    for i in 0..25 {
        store = store.with_message("Inbox", day(1), message(&format!("m{i}"), "body", &[]));
    }
    let config = FetchConfig::new().channel_capacity(1);

    let (records, report) = fetcher(store, config)
        .fetch_mail(&CancelToken::new(), &inbox_jan_1(), FieldSelection::new().subject())
        .await
        .unwrap()
        .collect()
        .await;

    let subjects: Vec<String> = records.into_iter().map(|r| r.subject).collect();
    let expected: Vec<String> = (0..25).map(|i| format!("m{i}")).collect();
    assert_eq!(subjects, expected);
    assert_eq!(report.unwrap().decoded, 25);
}

#[tokio::test]
async fn error_budget_aborts_the_stream() {
    init_tracing();
    let good = || message("ok", "fine", &[]);
    let store = MemoryStore::new()
        .with_message("Inbox", day(1), "")
        .with_message("Inbox", day(1), good())
        .with_message("Inbox", day(1), "Subject: no date\r\n\r\nbody")
        .with_message("Inbox", day(1), "Date: not a date\r\n\r\nbody")
        .with_message("Inbox", day(1), good())
        .with_message("Inbox", day(1), good());
    let config = FetchConfig::new().error_limit(3);

    let (records, report) = fetcher(store, config)
        .fetch_mail(&CancelToken::new(), &inbox_jan_1(), FieldSelection::new().date())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(records.len(), 1);
    assert!(records.len() < 6);
    assert!(matches!(
        report,
        Err(Error::ErrorBudgetExceeded {
            failed: 3,
            limit: 3
        })
    ));
}

#[tokio::test]
async fn failures_under_budget_are_skipped() {
    let store = MemoryStore::new()
        .with_message("Inbox", day(1), message("a", "x", &[]))
        .with_message("Inbox", day(1), "")
        .with_message("Inbox", day(1), message("b", "x", &[]));

    let (records, report) = fetcher(store, FetchConfig::new().error_limit(2))
        .fetch_mail(&CancelToken::new(), &inbox_jan_1(), FieldSelection::new().subject())
        .await
        .unwrap()
        .collect()
        .await;

    let subjects: Vec<&str> = records.iter().map(|r| r.subject.as_str()).collect();
    assert_eq!(subjects, vec!["a", "b"]);
    let report = report.unwrap();
    assert_eq!((report.decoded, report.failed), (2, 1));
}

#[tokio::test]
async fn attachments_flatten_in_record_order() {
    let store = MemoryStore::new()
        .with_message(
            "Inbox",
            day(1),
            message("two", "x", &[("1.txt", "one"), ("2.txt", "two")]),
        )
        .with_message("Inbox", day(1), message("none", "x", &[]))
        .with_message("Inbox", day(1), message("one", "x", &[("3.txt", "three")]));

    let (attachments, report) = fetcher(store, FetchConfig::new().channel_capacity(1))
        .fetch_attachments(&CancelToken::new(), &inbox_jan_1())
        .await
        .unwrap()
        .collect()
        .await;

    let names: Vec<&str> = attachments.iter().map(Attachment::filename).collect();
    assert_eq!(names, vec!["1.txt", "2.txt", "3.txt"]);
    assert_eq!(&attachments[2].content()[..], b"three");

    let report = report.unwrap();
    assert_eq!((report.decoded, report.attachments), (3, 3));
}

#[tokio::test]
async fn cancel_while_waiting_for_input_releases_fetch() {
    init_tracing();
    let store = Arc::new(ScriptedStore::new(
        vec![message("a", "x", &[]), message("b", "x", &[])],
        AfterFetch::Stall,
    ));
    let released = Arc::clone(&store.released);
    let cancel = CancelToken::new();

    let mut records = MailFetcher::new(store)
        .fetch_mail(&cancel, &inbox_jan_1(), FieldSelection::new().subject())
        .await
        .unwrap();

    assert_eq!(records.next().await.unwrap().subject, "a");
    assert_eq!(records.next().await.unwrap().subject, "b");
    assert!(!released.load(Ordering::SeqCst));

    cancel.cancel();
    let next = timeout(DEADLINE, records.next()).await.unwrap();
    assert!(next.is_none());

    let report = timeout(DEADLINE, records.finish()).await.unwrap().unwrap();
    assert!(report.cancelled);
    assert_eq!(report.decoded, 2);
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cancel_while_blocked_on_output() {
    let mut store = MemoryStore::new();
    for i in 0..20 {
        store = store.with_message("Inbox", day(1), message(&format!("m{i}"), "x", &[("f", "x")]));
    }
    let cancel = CancelToken::new();

    let mut attachments = fetcher(store, FetchConfig::new().channel_capacity(1))
        .fetch_attachments(&cancel, &inbox_jan_1())
        .await
        .unwrap();

    // Let every stage fill its buffer and block.
    tokio::task::yield_now().await;
    assert!(attachments.next().await.is_some());
    cancel.cancel();

    let mut rest = 0;
    while timeout(DEADLINE, attachments.next()).await.unwrap().is_some() {
        rest += 1;
    }
    assert!(rest <= 1);

    let report = timeout(DEADLINE, attachments.finish()).await.unwrap().unwrap();
    assert!(report.cancelled);
    assert!(report.attachments < 20);
}

#[tokio::test]
async fn dropping_the_consumer_stops_the_pipeline() {
    let store = Arc::new(ScriptedStore::new(
        (0..10).map(|i| message(&format!("m{i}"), "x", &[])).collect(),
        AfterFetch::Stall,
    ));
    let released = Arc::clone(&store.released);
    let config = FetchConfig::new().channel_capacity(1);

    let mut records = MailFetcher::with_config(store, config)
        .unwrap()
        .fetch_mail(&CancelToken::new(), &inbox_jan_1(), FieldSelection::new().subject())
        .await
        .unwrap();
    assert!(records.next().await.is_some());

    let report = timeout(DEADLINE, records.finish()).await.unwrap().unwrap();
    assert!(!report.cancelled);
    assert!(report.decoded < 10);
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cancelled_before_fetch_yields_nothing() {
    let store = Arc::new(ScriptedStore::new(vec![message("a", "x", &[])], AfterFetch::Finish));
    let cancel = CancelToken::new();
    cancel.cancel();

    let (records, report) = MailFetcher::new(Arc::clone(&store) as Arc<dyn MailStore>)
        .fetch_mail(&cancel, &inbox_jan_1(), FieldSelection::all())
        .await
        .unwrap()
        .collect()
        .await;

    assert!(records.is_empty());
    assert!(report.unwrap().cancelled);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

fn any_selection() -> impl Strategy<Value = FieldSelection> {
    proptest::sample::subsequence(Field::ALL.to_vec(), 0..=Field::ALL.len())
        .prop_map(FieldSelection::from_iter)
}

proptest! {
    #[test]
    fn decodes_exactly_the_selected_fields(selection in any_selection()) {
        let raw = message("Hi", "Hello", &[("a.txt", "hello")]);
        let record = decode_message(raw.as_bytes(), selection).unwrap();

        prop_assert_eq!(record.date.is_some(), selection.contains(Field::Date));
        prop_assert_eq!(!record.from.is_empty(), selection.contains(Field::From));
        prop_assert_eq!(!record.to.is_empty(), selection.contains(Field::To));
        prop_assert_eq!(!record.cc.is_empty(), selection.contains(Field::Cc));
        prop_assert_eq!(!record.subject.is_empty(), selection.contains(Field::Subject));
        prop_assert_eq!(!record.text.is_empty(), selection.contains(Field::Text));
        prop_assert_eq!(!record.attachments.is_empty(), selection.contains(Field::Attachment));
    }
}
