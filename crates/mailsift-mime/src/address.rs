//! Address list parsing for `From`, `To`, `Cc` and friends.

use crate::encoding::decode_rfc2047;
use crate::error::{Error, Result};

/// Mailbox (optional display name + address).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Display name, RFC 2047 decoded.
    pub name: Option<String>,
    /// Bare `local@domain` address.
    pub email: String,
}

impl Address {
    /// Creates an address without a display name.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Parses a single mailbox such as `"Doe, J" <j@example.com>`.
    ///
    /// # Errors
    ///
    /// Returns an error if no valid address can be found.
    pub fn parse(s: &str) -> Result<Self> {
        let s = strip_comments(s);
        let s = s.trim();

        if let Some(open) = s.rfind('<') {
            let close = s[open..]
                .find('>')
                .map(|i| open + i)
                .ok_or_else(|| Error::InvalidAddress(format!("Unclosed angle bracket: {s}")))?;
            let email = s[open + 1..close].trim();
            validate(email)?;

            let display = unquote(s[..open].trim());
            let name = if display.is_empty() {
                None
            } else {
                Some(decode_rfc2047(&display)?)
            };
            return Ok(Self {
                name,
                email: email.to_string(),
            });
        }

        validate(s)?;
        Ok(Self::new(s))
    }

    /// Parses a comma-separated address list, flattening groups.
    ///
    /// Empty entries and empty groups (`undisclosed-recipients:;`) yield
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if any entry is not a valid mailbox.
    pub fn parse_list(s: &str) -> Result<Vec<Self>> {
        split_entries(s)
            .iter()
            .map(|entry| entry.trim())
            .filter(|entry| !entry.is_empty())
            .map(Self::parse)
            .collect()
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.email),
            None => write!(f, "{}", self.email),
        }
    }
}

fn validate(email: &str) -> Result<()> {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return Err(Error::InvalidAddress(format!("Address must contain @: {email}")));
    };
    if local.is_empty() || domain.is_empty() {
        return Err(Error::InvalidAddress(format!(
            "Local and domain parts cannot be empty: {email}"
        )));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(Error::InvalidAddress(format!("Whitespace in address: {email}")));
    }
    Ok(())
}

/// Splits on commas outside quotes and angle brackets, dropping group
/// names (`team:`) and group terminators (`;`).
fn split_entries(s: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            escaped = false;
            current.push(ch);
            continue;
        }
        match ch {
            '\\' if in_quotes => {
                escaped = true;
                current.push(ch);
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '<' if !in_quotes => {
                in_angle = true;
                current.push(ch);
            }
            '>' if !in_quotes => {
                in_angle = false;
                current.push(ch);
            }
            ':' if !in_quotes && !in_angle => current.clear(),
            ',' | ';' if !in_quotes && !in_angle => entries.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    entries.push(current);
    entries
}

fn strip_comments(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    let mut in_quotes = false;
    for ch in s.chars() {
        match ch {
            '"' if depth == 0 => {
                in_quotes = !in_quotes;
                out.push(ch);
            }
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes && depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

fn unquote(s: &str) -> String {
    s.strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .map_or_else(|| s.to_string(), |v| v.replace("\\\"", "\""))
}
