//! # mailsift-mime
//!
//! Structured MIME reader used by the mailsift decode pipeline.
//!
//! ## Features
//!
//! - **Header accessors**: `Date`, address lists and `Subject`, each fallible
//!   and decoded independently so callers only pay for what they ask for
//! - **Part iteration**: nested multiparts walked depth-first, yielding inline
//!   or attachment leaf parts
//! - **Decoding**: Base64, Quoted-Printable, RFC 2047 encoded words, RFC 2231
//!   parameters, and charsets through `encoding_rs`
//!
//! ## Quick Start
//!
//! ```
//! use mailsift_mime::{MessageReader, Part};
//!
//! let raw = b"Subject: Hi\r\nFrom: a@example.com\r\n\r\nHello";
//! let mut reader = MessageReader::open(raw)?;
//! assert_eq!(reader.header().subject()?, "Hi");
//!
//! while let Some(part) = reader.next_part()? {
//!     match part {
//!         Part::Inline(text) => assert_eq!(text.read_to_string()?, "Hello"),
//!         Part::Attachment(att) => println!("attachment {}", att.filename()?),
//!     }
//! }
//! # Ok::<(), mailsift_mime::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod content_type;
mod date;
mod disposition;
mod error;
mod header;
mod part;
mod reader;

pub mod encoding;

pub use address::Address;
pub use content_type::ContentType;
pub use date::parse_date;
pub use disposition::{ContentDisposition, DispositionKind};
pub use error::{Error, Result};
pub use header::Headers;
pub use part::{AttachmentPart, Entity, InlinePart, Part, TransferEncoding};
pub use reader::{MessageHeader, MessageReader};
