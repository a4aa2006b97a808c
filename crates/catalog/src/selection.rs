//! Selections, assignments and the canonical combination key.

use serde::{Deserialize, Serialize};

use storefront_core::{OptionId, OptionValueId, VariantId};

/// One `(option, value)` pair of a selection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionEntry {
    pub option_id: OptionId,
    pub option_value_id: OptionValueId,
}

impl SelectionEntry {
    pub fn new(option_id: OptionId, option_value_id: OptionValueId) -> Self {
        Self {
            option_id,
            option_value_id,
        }
    }
}

/// A set of `(option, value)` pairs, kept in the order the caller supplied.
///
/// Order matters when a selection is applied to a new variant (assignments are
/// written in that order) and never matters for matching, which always goes
/// through [`CombinationKey`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(Vec<SelectionEntry>);

impl Selection {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builder-style append.
    pub fn with(mut self, option_id: OptionId, option_value_id: OptionValueId) -> Self {
        self.push(option_id, option_value_id);
        self
    }

    pub fn push(&mut self, option_id: OptionId, option_value_id: OptionValueId) {
        self.0.push(SelectionEntry::new(option_id, option_value_id));
    }

    pub fn entries(&self) -> &[SelectionEntry] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &SelectionEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn combination_key(&self) -> CombinationKey {
        CombinationKey::from_pairs(self.0.iter().map(|e| (e.option_id, e.option_value_id)))
    }

    /// Same entries, ordered by option id.
    pub fn canonical(&self) -> Selection {
        let mut entries = self.0.clone();
        entries.sort_by_key(|e| (e.option_id, e.option_value_id));
        Selection(entries)
    }
}

impl FromIterator<SelectionEntry> for Selection {
    fn from_iter<T: IntoIterator<Item = SelectionEntry>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<(OptionId, OptionValueId)>> for Selection {
    fn from(pairs: Vec<(OptionId, OptionValueId)>) -> Self {
        pairs
            .into_iter()
            .map(|(o, v)| SelectionEntry::new(o, v))
            .collect()
    }
}

/// Canonical identity of a combination: `(option, value)` pairs ordered by
/// option id.
///
/// Two assignment sets match only when their keys are equal, so a subset or a
/// superset of a variant's selection never resolves to it, and neither does a
/// selection naming the right value under the wrong option.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombinationKey(Vec<(OptionId, OptionValueId)>);

impl CombinationKey {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (OptionId, OptionValueId)>) -> Self {
        let mut pairs: Vec<_> = pairs.into_iter().collect();
        pairs.sort();
        Self(pairs)
    }

    pub fn of_assignments<'a>(
        assignments: impl IntoIterator<Item = &'a VariantOptionAssignment>,
    ) -> Self {
        Self::from_pairs(
            assignments
                .into_iter()
                .map(|a| (a.option_id, a.option_value_id)),
        )
    }

    pub fn pairs(&self) -> &[(OptionId, OptionValueId)] {
        &self.0
    }

    pub fn values(&self) -> impl Iterator<Item = OptionValueId> + '_ {
        self.0.iter().map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compact text form used as a storage column: comma-separated value ids
    /// in option order. A value belongs to exactly one option, so the value
    /// ids alone identify the stored combination.
    ///
    /// The empty combination of a default variant encodes as `""`.
    pub fn encode(&self) -> String {
        self.values()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl core::fmt::Display for CombinationKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}]", self.encode())
    }
}

/// "This variant's selection for this option is this value."
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantOptionAssignment {
    pub variant_id: VariantId,
    pub option_id: OptionId,
    pub option_value_id: OptionValueId,
}

impl VariantOptionAssignment {
    pub fn new(variant_id: VariantId, entry: SelectionEntry) -> Self {
        Self {
            variant_id,
            option_id: entry.option_id,
            option_value_id: entry.option_value_id,
        }
    }

    pub fn entry(&self) -> SelectionEntry {
        SelectionEntry::new(self.option_id, self.option_value_id)
    }
}
