//! Message identifiers.
//!
//! Sequence numbers returned by a search and the compact sequence sets
//! handed back to the store for bulk retrieval.

use std::num::NonZeroU32;

/// Message sequence number.
///
/// Sequence numbers are assigned to messages in a mailbox starting from 1.
/// They are ephemeral and change when messages are expunged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNum(pub NonZeroU32);

impl SeqNum {
    /// The first sequence number of a mailbox.
    pub const MIN: Self = Self(NonZeroU32::MIN);

    /// Creates a new sequence number.
    ///
    /// Returns `None` if the value is 0.
    #[must_use]
    pub const fn new(n: u32) -> Option<Self> {
        match NonZeroU32::new(n) {
            Some(n) => Some(Self(n)),
            None => None,
        }
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for SeqNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequence set for specifying message ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceSet {
    /// Single sequence number.
    Single(SeqNum),
    /// Range of sequence numbers (inclusive).
    Range(SeqNum, SeqNum),
    /// Multiple sequence specifications.
    Set(Vec<Self>),
}

impl SequenceSet {
    /// Creates a sequence set from a single number.
    #[must_use]
    pub fn single(n: u32) -> Option<Self> {
        SeqNum::new(n).map(Self::Single)
    }

    /// Creates a range sequence set.
    #[must_use]
    pub fn range(start: u32, end: u32) -> Option<Self> {
        Some(Self::Range(SeqNum::new(start)?, SeqNum::new(end)?))
    }

    /// Builds the most compact set covering `numbers`.
    ///
    /// Input order and duplicates do not matter: `[7, 1, 2, 3, 3]` becomes
    /// `1:3,7`. Returns `None` for an empty input.
    #[must_use]
    pub fn from_numbers(numbers: &[SeqNum]) -> Option<Self> {
        let mut sorted = numbers.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut runs: Vec<Self> = Vec::new();
        let mut iter = sorted.into_iter();
        let first = iter.next()?;
        let (mut start, mut end) = (first, first);

        for n in iter {
            if end.get().checked_add(1) == Some(n.get()) {
                end = n;
            } else {
                runs.push(Self::run(start, end));
                start = n;
                end = n;
            }
        }
        runs.push(Self::run(start, end));

        Some(if runs.len() == 1 {
            runs.remove(0)
        } else {
            Self::Set(runs)
        })
    }

    fn run(start: SeqNum, end: SeqNum) -> Self {
        if start == end {
            Self::Single(start)
        } else {
            Self::Range(start, end)
        }
    }

    /// Returns `true` if `n` is covered by this set.
    #[must_use]
    pub fn contains(&self, n: SeqNum) -> bool {
        match self {
            Self::Single(s) => *s == n,
            Self::Range(start, end) => (*start..=*end).contains(&n),
            Self::Set(items) => items.iter().any(|item| item.contains(n)),
        }
    }

    /// Expands the set into individual numbers, in set order.
    #[must_use]
    pub fn iter_numbers(&self) -> Vec<SeqNum> {
        match self {
            Self::Single(n) => vec![*n],
            Self::Range(start, end) => (start.get()..=end.get()).filter_map(SeqNum::new).collect(),
            Self::Set(items) => items.iter().flat_map(Self::iter_numbers).collect(),
        }
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::Set(items) => {
                let s: Vec<_> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", s.join(","))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn seqs(ns: &[u32]) -> Vec<SeqNum> {
        ns.iter().map(|&n| SeqNum::new(n).unwrap()).collect()
    }

    #[test]
    fn seq_num_zero_is_none() {
        assert!(SeqNum::new(0).is_none());
        assert_eq!(SeqNum::new(5).unwrap().get(), 5);
    }

    #[test]
    fn single_and_range_display() {
        assert_eq!(SequenceSet::single(5).unwrap().to_string(), "5");
        assert_eq!(SequenceSet::range(1, 10).unwrap().to_string(), "1:10");
        assert!(SequenceSet::range(0, 10).is_none());
    }

    #[test]
    fn from_numbers_compacts_runs() {
        let set = SequenceSet::from_numbers(&seqs(&[7, 1, 2, 3, 3, 9, 10])).unwrap();
        assert_eq!(set.to_string(), "1:3,7,9:10");
    }

    #[test]
    fn from_numbers_single_run() {
        let set = SequenceSet::from_numbers(&seqs(&[4, 5, 6])).unwrap();
        assert_eq!(set, SequenceSet::range(4, 6).unwrap());
    }

    #[test]
    fn from_numbers_empty() {
        assert!(SequenceSet::from_numbers(&[]).is_none());
    }

    #[test]
    fn contains_and_iter() {
        let set = SequenceSet::from_numbers(&seqs(&[1, 2, 3, 7])).unwrap();
        assert!(set.contains(SeqNum::new(2).unwrap()));
        assert!(!set.contains(SeqNum::new(5).unwrap()));
        assert_eq!(set.iter_numbers(), seqs(&[1, 2, 3, 7]));
    }
}
