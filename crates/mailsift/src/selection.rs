//! Field selection: which parts of a message the caller wants decoded.

use serde::{Deserialize, Serialize};

/// A decodable mail field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    /// `Date` header.
    Date,
    /// `From` addresses.
    From,
    /// `To` addresses.
    To,
    /// `Cc` addresses.
    Cc,
    /// `Subject` header.
    Subject,
    /// Text of the first inline `text/*` part.
    Text,
    /// Attachment parts.
    Attachment,
}

impl Field {
    /// Every field, in canonical order.
    pub const ALL: [Self; 7] = [
        Self::Date,
        Self::From,
        Self::To,
        Self::Cc,
        Self::Subject,
        Self::Text,
        Self::Attachment,
    ];

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Date => "date",
            Self::From => "from",
            Self::To => "to",
            Self::Cc => "cc",
            Self::Subject => "subject",
            Self::Text => "text",
            Self::Attachment => "attachment",
        };
        f.write_str(name)
    }
}

/// A set of [`Field`]s, stored as a bitmask.
///
/// Adding a field twice is the same as adding it once. Serialized as a list
/// of field names.
///
/// ```
/// use mailsift::{Field, FieldSelection};
///
/// let selection = FieldSelection::new().subject().attachment().subject();
/// assert!(selection.contains(Field::Subject));
/// assert!(!selection.contains(Field::Text));
/// assert!(selection.wants_body_parts());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Field>", into = "Vec<Field>")]
pub struct FieldSelection(u8);

impl FieldSelection {
    /// An empty selection.
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// A selection holding every field.
    #[must_use]
    pub const fn all() -> Self {
        Self::new().with_all()
    }

    /// Adds `field`.
    #[must_use]
    pub const fn with(self, field: Field) -> Self {
        Self(self.0 | field.bit())
    }

    /// Adds every field, in canonical order.
    #[must_use]
    pub const fn with_all(self) -> Self {
        let mut selection = self;
        let mut i = 0;
        while i < Field::ALL.len() {
            selection = selection.with(Field::ALL[i]);
            i += 1;
        }
        selection
    }

    /// Adds `field` in place, returning `self` for chaining.
    pub fn insert(&mut self, field: Field) -> &mut Self {
        *self = self.with(field);
        self
    }

    /// Adds [`Field::Date`].
    #[must_use]
    pub const fn date(self) -> Self {
        self.with(Field::Date)
    }

    /// Adds [`Field::From`].
    #[must_use]
    pub const fn from_addr(self) -> Self {
        self.with(Field::From)
    }

    /// Adds [`Field::To`].
    #[must_use]
    pub const fn to(self) -> Self {
        self.with(Field::To)
    }

    /// Adds [`Field::Cc`].
    #[must_use]
    pub const fn cc(self) -> Self {
        self.with(Field::Cc)
    }

    /// Adds [`Field::Subject`].
    #[must_use]
    pub const fn subject(self) -> Self {
        self.with(Field::Subject)
    }

    /// Adds [`Field::Text`].
    #[must_use]
    pub const fn text(self) -> Self {
        self.with(Field::Text)
    }

    /// Adds [`Field::Attachment`].
    #[must_use]
    pub const fn attachment(self) -> Self {
        self.with(Field::Attachment)
    }

    /// Returns `true` if `field` is selected.
    #[must_use]
    pub const fn contains(self, field: Field) -> bool {
        self.0 & field.bit() != 0
    }

    /// Returns `true` if the body parts must be walked, i.e. text or
    /// attachments are selected.
    #[must_use]
    pub const fn wants_body_parts(self) -> bool {
        self.contains(Field::Text) || self.contains(Field::Attachment)
    }

    /// Returns `true` if nothing is selected.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of selected fields.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Selected fields, in canonical order.
    pub fn iter(self) -> impl Iterator<Item = Field> {
        Field::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl From<Vec<Field>> for FieldSelection {
    fn from(fields: Vec<Field>) -> Self {
        fields.into_iter().collect()
    }
}

impl From<FieldSelection> for Vec<Field> {
    fn from(selection: FieldSelection) -> Self {
        selection.iter().collect()
    }
}

impl FromIterator<Field> for FieldSelection {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), Self::with)
    }
}

impl std::fmt::Display for FieldSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.iter().map(|field| field.to_string()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_field() -> impl Strategy<Value = Field> {
        prop::sample::select(Field::ALL.to_vec())
    }

    #[test]
    fn empty_selection() {
        let selection = FieldSelection::new();
        assert!(selection.is_empty());
        assert!(!selection.wants_body_parts());
        assert_eq!(selection.len(), 0);
    }

    #[test]
    fn all_has_every_field_in_order() {
        let all = FieldSelection::all();
        assert_eq!(all.iter().collect::<Vec<_>>(), Field::ALL.to_vec());
        assert_eq!(all.len(), 7);
    }

    #[test]
    fn wants_body_parts_for_text_or_attachment() {
        assert!(FieldSelection::new().text().wants_body_parts());
        assert!(FieldSelection::new().attachment().wants_body_parts());
        assert!(!FieldSelection::new().date().from_addr().to().cc().subject().wants_body_parts());
    }

    #[test]
    fn insert_chains() {
        let mut selection = FieldSelection::new();
        selection.insert(Field::Cc).insert(Field::Cc).insert(Field::Date);
        assert_eq!(selection, FieldSelection::new().cc().date());
    }

    #[test]
    fn serde_as_names() {
        let selection = FieldSelection::new().subject().attachment();
        let json = serde_json::to_string(&selection).unwrap();
        assert_eq!(json, r#"["subject","attachment"]"#);

        let parsed: FieldSelection = serde_json::from_str(r#"["text","text","from"]"#).unwrap();
        assert_eq!(parsed, FieldSelection::new().from_addr().text());
    }

    #[test]
    fn display() {
        let selection = FieldSelection::new().attachment().date();
        assert_eq!(selection.to_string(), "{date, attachment}");
    }

    proptest! {
        #[test]
        fn with_all_is_idempotent(fields in prop::collection::vec(any_field(), 0..10)) {
            let base: FieldSelection = fields.into_iter().collect();
            prop_assert_eq!(base.with_all(), base.with_all().with_all());
            prop_assert_eq!(base.with_all(), FieldSelection::all());
        }

        #[test]
        fn order_and_duplicates_do_not_matter(fields in prop::collection::vec(any_field(), 0..10)) {
            let forward: FieldSelection = fields.iter().copied().collect();
            let backward: FieldSelection = fields.iter().rev().chain(fields.iter()).copied().collect();
            prop_assert_eq!(forward, backward);
            for field in Field::ALL {
                prop_assert_eq!(forward.contains(field), fields.contains(&field));
            }
        }
    }
}
