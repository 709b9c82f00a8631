//! Pipeline configuration and JSON settings.

use std::fmt;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::criteria::SearchCriteria;
use crate::error::{Error, Result};
use crate::selection::FieldSelection;
use crate::store::BodySection;

/// Decode errors tolerated before the decoder aborts.
pub const DEFAULT_ERROR_LIMIT: usize = 10;

/// Items buffered between two stages.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Default `chrono` format for window dates.
pub const DEFAULT_DATE_LAYOUT: &str = "%Y-%m-%d";

/// Tuning for one fetch pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Decode errors tolerated before aborting.
    pub error_limit: usize,
    /// Channel capacity between stages.
    pub channel_capacity: usize,
    /// Body section requested from the store.
    pub body_section: BodySection,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            error_limit: DEFAULT_ERROR_LIMIT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            body_section: BodySection::default(),
        }
    }
}

impl FetchConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the error limit.
    #[must_use]
    pub const fn error_limit(mut self, limit: usize) -> Self {
        self.error_limit = limit;
        self
    }

    /// Sets the channel capacity.
    #[must_use]
    pub const fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Sets the body section.
    #[must_use]
    pub fn body_section(mut self, section: BodySection) -> Self {
        self.body_section = section;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the error limit or the channel capacity
    /// is zero.
    pub fn validate(&self) -> Result<()> {
        if self.error_limit == 0 {
            return Err(Error::Config("error_limit must be at least 1".into()));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config("channel_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Mail server connection details.
///
/// Carried for the mail-store client; the pipeline itself never connects.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnInfo {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
}

impl ConnInfo {
    /// Checks that every field is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first missing field.
    pub fn validate(&self) -> Result<()> {
        let missing = if self.host.trim().is_empty() {
            "host"
        } else if self.port == 0 {
            "port"
        } else if self.user.is_empty() {
            "user"
        } else if self.password.is_empty() {
            "password"
        } else {
            return Ok(());
        };
        Err(Error::Config(format!("connection {missing} is required")))
    }

    /// Returns `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Date window as written in settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    /// `chrono` format of `since` and `before`.
    #[serde(default = "default_layout")]
    pub layout: String,
    /// Inclusive lower bound; empty when unset.
    #[serde(default)]
    pub since: String,
    /// Exclusive upper bound; empty when unset.
    #[serde(default)]
    pub before: String,
}

fn default_layout() -> String {
    DEFAULT_DATE_LAYOUT.to_string()
}

impl WindowSpec {
    fn parse(&self, value: &str) -> Result<Option<NaiveDate>> {
        if value.trim().is_empty() {
            return Ok(None);
        }
        NaiveDate::parse_from_str(value.trim(), &self.layout)
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid date {value:?} for {:?}: {e}", self.layout)))
    }
}

/// Search criteria as written in settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaSpec {
    /// Mailbox to search.
    pub mailbox: String,
    /// Date window.
    pub window: WindowSpec,
}

impl CriteriaSpec {
    /// Parses the window dates into [`SearchCriteria`].
    ///
    /// Missing bounds are left unset; they are rejected when the criteria
    /// is validated by a fetch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a date does not match the layout.
    pub fn to_criteria(&self) -> Result<SearchCriteria> {
        let mut criteria = SearchCriteria::new(self.mailbox.clone());
        if let Some(since) = self.window.parse(&self.window.since)? {
            criteria = criteria.since(since);
        }
        if let Some(before) = self.window.parse(&self.window.before)? {
            criteria = criteria.before(before);
        }
        Ok(criteria)
    }
}

/// Everything needed to run a fetch, loaded from JSON.
///
/// ```
/// use mailsift::Settings;
///
/// let settings = Settings::from_json(r#"{
///     "connection": { "host": "imap.example.com", "port": 993, "user": "me", "password": "secret" },
///     "criteria": { "mailbox": "INBOX", "window": { "since": "2020-01-01", "before": "2020-01-02" } }
/// }"#).unwrap();
/// assert_eq!(settings.connection.address(), "imap.example.com:993");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Server connection.
    pub connection: ConnInfo,
    /// What to search for.
    pub criteria: CriteriaSpec,
    /// Fields to decode.
    #[serde(default = "FieldSelection::all")]
    pub fields: FieldSelection,
    /// Pipeline tuning.
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Settings {
    /// Reads and validates settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parses and validates settings from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid JSON or fails validation.
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(text)?;
        settings.connection.validate()?;
        settings.fetch.validate()?;
        Ok(settings)
    }

    /// Builds the search criteria.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a window date is malformed.
    pub fn search_criteria(&self) -> Result<SearchCriteria> {
        self.criteria.to_criteria()
    }
}
