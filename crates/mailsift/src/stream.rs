//! Typed, closeable streams between pipeline stages.
//!
//! Each stage runs as its own task and hands items downstream through a
//! bounded channel. A [`StageStream`] pairs the receiving end with the
//! stage's task, so a consumer can read items and then learn how the
//! pipeline ended.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::Stream;

use crate::error::{Error, Result};
use crate::record::{Attachment, MailRecord};
use crate::store::RawMessage;

/// Raw messages produced by [`MessageSource`](crate::MessageSource).
pub type MessageStream = StageStream<RawMessage>;

/// Records produced by [`SelectiveDecoder`](crate::SelectiveDecoder).
pub type RecordStream = StageStream<MailRecord>;

/// Attachments produced by [`AttachmentProjector`](crate::AttachmentProjector).
pub type AttachmentStream = StageStream<Attachment>;

pub(crate) type Worker = JoinHandle<Result<FetchReport>>;

/// Summary of a finished pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Messages matched by the search.
    pub matched: usize,
    /// Messages decoded into records.
    pub decoded: usize,
    /// Messages dropped because they failed to decode.
    pub failed: usize,
    /// Attachments emitted by the projector.
    pub attachments: usize,
    /// Whether cancellation stopped the pipeline early.
    pub cancelled: bool,
}

/// Output of one pipeline stage.
///
/// Yields items until the stage closes its end. Dropping the stream (or
/// calling [`finish`](Self::finish)) tells the stage to stop.
#[derive(Debug)]
pub struct StageStream<T> {
    rx: mpsc::Receiver<T>,
    worker: Worker,
}

impl<T> StageStream<T> {
    pub(crate) const fn new(rx: mpsc::Receiver<T>, worker: Worker) -> Self {
        Self { rx, worker }
    }

    /// A stream that is already closed and reports `report`.
    pub(crate) fn closed(report: FetchReport) -> Self
    where
        T: Send + 'static,
    {
        let (_, rx) = mpsc::channel(1);
        Self::new(rx, tokio::spawn(async move { Ok(report) }))
    }

    pub(crate) fn into_parts(self) -> (mpsc::Receiver<T>, Worker) {
        (self.rx, self.worker)
    }

    /// Receives the next item, or `None` once the stage has closed.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Stops reading and waits for the pipeline to wind down.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the pipeline, if any.
    pub async fn finish(self) -> Result<FetchReport> {
        let (rx, worker) = self.into_parts();
        drop(rx);
        join(worker).await
    }

    /// Drains every item, then finishes.
    ///
    /// Items received before a failure are returned alongside it.
    pub async fn collect(mut self) -> (Vec<T>, Result<FetchReport>) {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item);
        }
        (items, self.finish().await)
    }
}

impl<T> Stream for StageStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// Waits for a stage task, turning a panic into [`Error::Worker`].
pub(crate) async fn join(worker: Worker) -> Result<FetchReport> {
    worker.await.map_err(|e| Error::Worker(e.to_string()))?
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn stage(items: Vec<u32>) -> StageStream<u32> {
        let (tx, rx) = mpsc::channel(1);
        let worker = tokio::spawn(async move {
            for item in items {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
            Ok(FetchReport {
                matched: 3,
                ..FetchReport::default()
            })
        });
        StageStream::new(rx, worker)
    }

    #[tokio::test]
    async fn test_collect_returns_items_and_report() {
        let (items, report) = stage(vec![1, 2, 3]).collect().await;
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(report.unwrap().matched, 3);
    }

    #[tokio::test]
    async fn test_stream_impl() {
        let items: Vec<u32> = StreamExt::collect(stage(vec![4, 5])).await;
        assert_eq!(items, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_finish_early_unblocks_worker() {
        let mut stream = stage((0..100).collect());
        assert_eq!(stream.next().await, Some(0));
        assert!(stream.finish().await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_stream() {
        let mut stream = StageStream::<u32>::closed(FetchReport::default());
        assert_eq!(stream.next().await, None);
        assert_eq!(stream.finish().await.unwrap(), FetchReport::default());
    }

    const fn always() -> bool {
        true
    }

    #[tokio::test]
    async fn test_worker_panic_is_reported() {
        let (_tx, rx) = mpsc::channel::<u32>(1);
        let worker: Worker = tokio::spawn(async {
            if always() {
                panic!("boom");
            }
            Ok(FetchReport::default())
        });
        let err = StageStream::new(rx, worker).finish().await.unwrap_err();
        assert!(matches!(err, Error::Worker(_)));
    }
}
