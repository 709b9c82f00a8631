//! `Date` header parsing (RFC 5322 section 3.3).

use chrono::{DateTime, FixedOffset};

use crate::error::{Error, Result};

/// Parses an RFC 5322 date-time such as `Wed, 1 Jan 2020 10:00:00 +0900`.
///
/// Trailing comments like `(UTC)` and folding whitespace are tolerated.
///
/// # Errors
///
/// Returns [`Error::InvalidDate`] if the value is not a valid date-time.
pub fn parse_date(value: &str) -> Result<DateTime<FixedOffset>> {
    let without_comment = value
        .find('(')
        .map_or(value, |idx| &value[..idx]);
    let normalized = without_comment.split_whitespace().collect::<Vec<_>>().join(" ");

    DateTime::parse_from_rfc2822(&normalized)
        .map_err(|e| Error::InvalidDate(format!("{value}: {e}")))
}
