//! Search criteria: which mailbox, which date window.

use chrono::NaiveDate;
use thiserror::Error;

/// Reasons a [`SearchCriteria`] is rejected before any I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CriteriaError {
    /// Mailbox name is empty or blank.
    #[error("mailbox name is required")]
    EmptyMailbox,
    /// Lower date bound is missing.
    #[error("`since` date is required")]
    MissingSince,
    /// Upper date bound is missing.
    #[error("`before` date is required")]
    MissingBefore,
}

/// Mailbox plus date window to search.
///
/// Built incrementally; only checked by [`validate`](Self::validate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    mailbox: String,
    since: Option<NaiveDate>,
    before: Option<NaiveDate>,
}

impl SearchCriteria {
    /// Starts criteria for `mailbox` with no date bounds.
    #[must_use]
    pub fn new(mailbox: impl Into<String>) -> Self {
        Self {
            mailbox: mailbox.into(),
            since: None,
            before: None,
        }
    }

    /// Sets the inclusive lower bound.
    #[must_use]
    pub const fn since(mut self, date: NaiveDate) -> Self {
        self.since = Some(date);
        self
    }

    /// Sets the exclusive upper bound.
    #[must_use]
    pub const fn before(mut self, date: NaiveDate) -> Self {
        self.before = Some(date);
        self
    }

    /// Mailbox name.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    /// Checks that the mailbox is named and both bounds are present.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<DateWindow, CriteriaError> {
        if self.mailbox.trim().is_empty() {
            return Err(CriteriaError::EmptyMailbox);
        }
        let since = self.since.ok_or(CriteriaError::MissingSince)?;
        let before = self.before.ok_or(CriteriaError::MissingBefore)?;
        Ok(DateWindow { since, before })
    }
}

/// A validated date window: `since <= date < before`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    /// Inclusive lower bound.
    pub since: NaiveDate,
    /// Exclusive upper bound.
    pub before: NaiveDate,
}

impl DateWindow {
    /// Returns `true` if `date` falls inside the window.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.since <= date && date < self.before
    }

    /// Renders the window as IMAP search keys, e.g.
    /// `SINCE 1-Jan-2020 BEFORE 2-Jan-2020`.
    #[must_use]
    pub fn imap_query(&self) -> String {
        format!(
            "SINCE {} BEFORE {}",
            self.since.format("%-d-%b-%Y"),
            self.before.format("%-d-%b-%Y")
        )
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} ~ {})", self.since, self.before)
    }
}
