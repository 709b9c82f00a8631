//! Third stage: flatten records into their attachments.

use tokio::sync::mpsc;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::config::DEFAULT_CHANNEL_CAPACITY;
use crate::stream::{AttachmentStream, FetchReport, RecordStream, StageStream, Worker, join};

/// Emits every attachment of every record, in record order and then in
/// part order.
#[derive(Debug, Clone, Copy)]
pub struct AttachmentProjector {
    capacity: usize,
}

impl Default for AttachmentProjector {
    fn default() -> Self {
        Self::new()
    }
}

impl AttachmentProjector {
    /// Creates a projector with the default channel capacity.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Sets the output channel capacity (at least 1).
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Starts flattening `records`.
    #[must_use]
    pub fn project(&self, cancel: &CancelToken, records: RecordStream) -> AttachmentStream {
        let (tx, rx) = mpsc::channel(self.capacity);
        let (mut input, upstream) = records.into_parts();
        let cancel = cancel.clone();

        let worker: Worker = tokio::spawn(async move {
            let mut attachments = 0;
            let mut cancelled = false;

            'records: loop {
                let record = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    record = input.recv() => match record {
                        Some(record) => record,
                        None => break,
                    },
                };

                for attachment in record.attachments {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            cancelled = true;
                            break 'records;
                        }
                        sent = tx.send(attachment) => {
                            if sent.is_err() {
                                debug!("Attachment consumer went away");
                                break 'records;
                            }
                        }
                    }
                    attachments += 1;
                }
            }

            drop(tx);
            drop(input);
            let report = join(upstream).await?;
            debug!(attachments, cancelled, "Projection finished");
            Ok(FetchReport {
                attachments,
                cancelled: report.cancelled || cancelled,
                ..report
            })
        });

        StageStream::new(rx, worker)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::{Attachment, MailRecord};

    fn records(counts: &[usize]) -> RecordStream {
        let (tx, rx) = mpsc::channel(1);
        let counts = counts.to_vec();
        let worker: Worker = tokio::spawn(async move {
            for (r, &count) in counts.iter().enumerate() {
                let record = MailRecord {
                    attachments: (0..count)
                        .map(|a| Attachment::new(format!("{r}-{a}"), "x"))
                        .collect(),
                    ..MailRecord::default()
                };
                if tx.send(record).await.is_err() {
                    break;
                }
            }
            Ok(FetchReport {
                decoded: counts.len(),
                ..FetchReport::default()
            })
        });
        StageStream::new(rx, worker)
    }

    #[tokio::test]
    async fn test_flattens_in_order() {
        let stream = AttachmentProjector::new()
            .capacity(1)
            .project(&CancelToken::new(), records(&[2, 0, 1]));
        let (attachments, report) = stream.collect().await;

        let names: Vec<&str> = attachments.iter().map(Attachment::filename).collect();
        assert_eq!(names, vec!["0-0", "0-1", "2-0"]);
        let report = report.unwrap();
        assert_eq!(report.attachments, 3);
        assert_eq!(report.decoded, 3);
    }

    #[tokio::test]
    async fn test_cancel_stops_output() {
        let cancel = CancelToken::new();
        let mut stream = AttachmentProjector::new()
            .capacity(1)
            .project(&cancel, records(&[5, 5]));

        assert!(stream.next().await.is_some());
        cancel.cancel();

        // At most the one item already buffered may still arrive.
        let mut rest = 0;
        while stream.next().await.is_some() {
            rest += 1;
        }
        assert!(rest <= 1);
        assert!(stream.finish().await.unwrap().cancelled);
    }
}
