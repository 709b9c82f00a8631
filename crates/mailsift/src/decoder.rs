//! Second stage: decode the requested fields of each raw message.

use mailsift_mime::{MessageHeader, MessageReader, Part};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::cancel::CancelToken;
use crate::config::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_ERROR_LIMIT};
use crate::error::{DecodeError, Error};
use crate::record::{Attachment, MailRecord};
use crate::selection::{Field, FieldSelection};
use crate::stream::{FetchReport, MessageStream, RecordStream, StageStream, Worker, join};

/// Turns raw messages into [`MailRecord`]s, one at a time and in order.
///
/// A message that fails to decode is logged, counted and dropped. Once
/// `error_limit` messages have failed the stage stops and the stream ends
/// with [`Error::ErrorBudgetExceeded`].
#[derive(Debug, Clone, Copy)]
pub struct SelectiveDecoder {
    selection: FieldSelection,
    error_limit: usize,
    capacity: usize,
}

impl SelectiveDecoder {
    /// Creates a decoder for `selection` with the default error limit.
    #[must_use]
    pub const fn new(selection: FieldSelection) -> Self {
        Self {
            selection,
            error_limit: DEFAULT_ERROR_LIMIT,
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Sets how many failed messages abort the stage. Zero behaves as one.
    #[must_use]
    pub fn error_limit(mut self, limit: usize) -> Self {
        self.error_limit = limit.max(1);
        self
    }

    /// Sets the output channel capacity (at least 1).
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Fields this decoder extracts.
    #[must_use]
    pub const fn selection(&self) -> FieldSelection {
        self.selection
    }

    /// Starts decoding `messages`.
    ///
    /// The returned stream closes when the input is exhausted, when
    /// `cancel` fires, or when the error budget runs out.
    #[must_use]
    pub fn decode(&self, cancel: &CancelToken, messages: MessageStream) -> RecordStream {
        let (tx, rx) = mpsc::channel(self.capacity);
        let (mut input, upstream) = messages.into_parts();
        let Self {
            selection,
            error_limit: limit,
            ..
        } = *self;
        let cancel = cancel.clone();

        let worker: Worker = tokio::spawn(async move {
            let mut decoded = 0;
            let mut failed = 0;
            let mut cancelled = false;

            loop {
                let message = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    message = input.recv() => match message {
                        Some(message) => message,
                        None => break,
                    },
                };

                match decode_message(&message.body, selection) {
                    Ok(record) => {
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => {
                                cancelled = true;
                                break;
                            }
                            sent = tx.send(record) => {
                                if sent.is_err() {
                                    debug!("Record consumer went away");
                                    break;
                                }
                            }
                        }
                        decoded += 1;
                    }
                    Err(e) => {
                        failed += 1;
                        warn!(seq = %message.seq, error = %e, "Failed to decode message");
                        if failed >= limit {
                            error!(failed, limit, "Too many decode errors, aborting");
                            break;
                        }
                    }
                }
            }

            // Close our output first, then let upstream observe the drop.
            drop(tx);
            drop(input);
            let upstream = join(upstream).await;

            if failed >= limit {
                return Err(Error::ErrorBudgetExceeded { failed, limit });
            }
            if cancelled {
                debug!(decoded, "Decoding cancelled");
            }
            let report = upstream?;
            debug!(decoded, failed, "Decoding finished");
            Ok(FetchReport {
                decoded,
                failed,
                cancelled: report.cancelled || cancelled,
                ..report
            })
        });

        StageStream::new(rx, worker)
    }
}

/// Decodes the fields in `selection` from one raw message.
///
/// Fields outside the selection keep their empty value. The first failing
/// field aborts the whole message.
///
/// # Errors
///
/// Returns the first [`DecodeError`] encountered.
pub fn decode_message(raw: &[u8], selection: FieldSelection) -> Result<MailRecord, DecodeError> {
    let mut reader = MessageReader::open(raw).map_err(DecodeError::Open)?;
    let mut record = decode_header(reader.header(), selection)?;

    if !selection.wants_body_parts() {
        return Ok(record);
    }

    let mut text_seen = false;
    while let Some(part) = reader.next_part().map_err(DecodeError::Part)? {
        match part {
            Part::Inline(inline)
                if selection.contains(Field::Text)
                    && !text_seen
                    && inline.entity().content_type().is_text() =>
            {
                record.text = inline
                    .read_to_string()
                    .map_err(DecodeError::field(Field::Text))?;
                text_seen = true;
            }
            Part::Attachment(attachment) if selection.contains(Field::Attachment) => {
                let filename = attachment
                    .filename()
                    .map_err(DecodeError::field(Field::Attachment))?;
                let content = attachment
                    .read_to_end()
                    .map_err(DecodeError::field(Field::Attachment))?;
                record.attachments.push(Attachment::new(filename, content));
            }
            _ => {}
        }
    }

    Ok(record)
}

fn decode_header(
    header: &MessageHeader,
    selection: FieldSelection,
) -> Result<MailRecord, DecodeError> {
    let mut record = MailRecord::default();

    if selection.contains(Field::Date) {
        record.date = Some(header.date().map_err(DecodeError::field(Field::Date))?);
    }
    for (field, name, target) in [
        (Field::From, "From", &mut record.from),
        (Field::To, "To", &mut record.to),
        (Field::Cc, "Cc", &mut record.cc),
    ] {
        if selection.contains(field) {
            *target = header
                .address_list(name)
                .map_err(DecodeError::field(field))?
                .into_iter()
                .map(|address| address.email)
                .collect();
        }
    }
    if selection.contains(Field::Subject) {
        record.subject = header.subject().map_err(DecodeError::field(Field::Subject))?;
    }

    Ok(record)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MULTIPART: &str = "Date: Wed, 1 Jan 2020 10:00:00 +0000\r\n\
From: Alice <alice@example.com>\r\n\
To: bob@example.com, \"Carol\" <carol@example.com>\r\n\
Cc: dave@example.com\r\n\
Subject: =?utf-8?Q?caf=C3=A9?=\r\n\
Content-Type: multipart/mixed; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Hello\r\n\
--b1\r\n\
Content-Type: text/plain\r\n\
\r\n\
Second inline\r\n\
--b1\r\n\
Content-Type: application/octet-stream; name=\"b.bin\"\r\n\
Content-Disposition: attachment; filename=\"a.txt\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
aGVsbG8=\r\n\
--b1--\r\n";

    #[test]
    fn test_decode_all_fields() {
        let record = decode_message(MULTIPART.as_bytes(), FieldSelection::all()).unwrap();

        assert_eq!(record.date.unwrap().to_rfc3339(), "2020-01-01T10:00:00+00:00");
        assert_eq!(record.from, vec!["alice@example.com"]);
        assert_eq!(record.to, vec!["bob@example.com", "carol@example.com"]);
        assert_eq!(record.cc, vec!["dave@example.com"]);
        assert_eq!(record.subject, "café");
        assert_eq!(record.text.trim_end(), "Hello");
        assert_eq!(record.attachments, vec![Attachment::new("a.txt", "hello")]);
    }

    #[test]
    fn test_decode_only_selected_fields() {
        let selection = FieldSelection::new().subject().attachment();
        let record = decode_message(MULTIPART.as_bytes(), selection).unwrap();

        assert!(record.date.is_none());
        assert!(record.from.is_empty() && record.to.is_empty() && record.cc.is_empty());
        assert_eq!(record.subject, "café");
        assert!(record.text.is_empty());
        assert_eq!(record.attachments.len(), 1);
    }

    #[test]
    fn test_header_only_selection_skips_bad_body() {
        let raw = "Subject: Hi\r\n\
Content-Type: multipart/mixed; boundary=\"zz\"\r\n\
\r\n\
no parts here\r\n";
        let record = decode_message(raw.as_bytes(), FieldSelection::new().subject()).unwrap();
        assert_eq!(record.subject, "Hi");

        let err = decode_message(raw.as_bytes(), FieldSelection::new().text()).unwrap_err();
        assert!(matches!(err, DecodeError::Part(_)));
    }

    #[test]
    fn test_missing_date_is_field_error() {
        let raw = "Subject: Hi\r\n\r\nbody";
        let err = decode_message(raw.as_bytes(), FieldSelection::new().date()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Field {
                field: Field::Date,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_optional_headers_are_empty() {
        let raw = "Date: Wed, 1 Jan 2020 10:00:00 +0000\r\n\r\nbody";
        let record = decode_message(raw.as_bytes(), FieldSelection::all()).unwrap();
        assert!(record.from.is_empty());
        assert_eq!(record.subject, "");
        assert_eq!(record.text, "body");
        assert!(record.attachments.is_empty());
    }

    #[test]
    fn test_empty_message_fails_to_open() {
        let err = decode_message(b"", FieldSelection::all()).unwrap_err();
        assert!(matches!(err, DecodeError::Open(_)));
    }

    #[test]
    fn test_bad_address_is_field_error() {
        let raw = "From: not an address\r\n\r\nbody";
        let err = decode_message(raw.as_bytes(), FieldSelection::new().from_addr()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Field {
                field: Field::From,
                ..
            }
        ));
    }

    #[test]
    fn test_inline_image_is_not_text() {
        let raw = "Subject: Related\r\n\
Content-Type: multipart/related; boundary=\"rel\"\r\n\
\r\n\
--rel\r\n\
Content-Type: image/png\r\n\
Content-Disposition: inline\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
/w==\r\n\
--rel\r\n\
Content-Type: text/plain\r\n\
\r\n\
Hello\r\n\
--rel--\r\n";

        let record = decode_message(raw.as_bytes(), FieldSelection::new().text()).unwrap();
        assert_eq!(record.text, "Hello");

        let selection = FieldSelection::new().text().attachment();
        let record = decode_message(raw.as_bytes(), selection).unwrap();
        assert_eq!(record.text, "Hello");
        assert!(record.attachments.is_empty());
    }

    #[test]
    fn test_untyped_body_is_utf8() {
        let raw = "Subject: Hi\r\n\r\nHéllo\r\n";
        let record = decode_message(raw.as_bytes(), FieldSelection::new().text()).unwrap();
        assert_eq!(record.text, "Héllo\r\n");

        let typed = "Subject: Hi\r\nContent-Type: text/plain\r\n\r\nHéllo\r\n";
        let record = decode_message(typed.as_bytes(), FieldSelection::new().text()).unwrap();
        assert_eq!(record.text, "Héllo\r\n");
    }

    #[test]
    fn test_continued_attachment_filename() {
        let raw = "Subject: Invoice\r\n\
Content-Type: multipart/mixed; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment;\r\n \
filename*0*=utf-8''%E8%AB%8B%E6%B1%82;\r\n \
filename*1*=%E6%9B%B8.pdf\r\n\
\r\n\
%PDF\r\n\
--b--\r\n";

        let record = decode_message(raw.as_bytes(), FieldSelection::new().attachment()).unwrap();
        assert_eq!(record.attachments.len(), 1);
        assert_eq!(record.attachments[0].filename(), "請求書.pdf");
        assert_eq!(&record.attachments[0].content()[..], b"%PDF");
    }
}
