//! Identity encoder: opaque identifiers to dense embedding-table rows
//!
//! Identifiers are indexed in sorted order, so fitting the same set in any
//! order yields the same mapping. Rows are positional in the embedding
//! tables; the mapping is never changed after fitting.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::errors::{CoreError, Result};

/// On-disk form: the sorted class list
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncoderState {
    classes: Vec<String>,
}

/// Bijection between identifiers and `[0, len)`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "EncoderState", into = "EncoderState")]
pub struct IdentityEncoder {
    classes: Vec<String>,
    index: HashMap<String, usize>,
}

impl From<EncoderState> for IdentityEncoder {
    fn from(state: EncoderState) -> Self {
        Self::fit(state.classes)
    }
}

impl From<IdentityEncoder> for EncoderState {
    fn from(encoder: IdentityEncoder) -> Self {
        EncoderState {
            classes: encoder.classes,
        }
    }
}

impl IdentityEncoder {
    /// Build the mapping from a set of identifiers. Duplicates are collapsed.
    pub fn fit<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sorted: BTreeSet<String> = identifiers
            .into_iter()
            .map(|id| id.as_ref().to_string())
            .collect();
        let classes: Vec<String> = sorted.into_iter().collect();
        let index = classes
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        Self { classes, index }
    }

    /// Row index for `identifier`, or `UnknownIdentifier`.
    pub fn transform(&self, identifier: &str) -> Result<usize> {
        self.index
            .get(identifier)
            .copied()
            .ok_or_else(|| CoreError::UnknownIdentifier(identifier.to_string()))
    }

    pub fn inverse_transform(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.index.contains_key(identifier)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
