//! Recipient list normalization.
//!
//! Turns pasted or uploaded text into an ordered, case-insensitively unique
//! list of well-formed identifiers. Both input sources go through the same
//! function.

use std::collections::HashSet;

use soulmint_core::Identifier;

/// Ordered list of unique identifiers produced by one normalization pass.
///
/// No two entries compare equal ignoring case. Entries keep the casing and
/// position of their first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientSet {
    recipients: Vec<Identifier>,
}

impl RecipientSet {
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    pub fn as_slice(&self) -> &[Identifier] {
        &self.recipients
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Identifier> {
        self.recipients.iter()
    }

    pub fn into_vec(self) -> Vec<Identifier> {
        self.recipients
    }

    /// One identifier per line, as written back into a paste box.
    pub fn to_text(&self) -> String {
        self.recipients
            .iter()
            .map(Identifier::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<'a> IntoIterator for &'a RecipientSet {
    type Item = &'a Identifier;
    type IntoIter = std::slice::Iter<'a, Identifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.recipients.iter()
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, '\n' | '\r' | ',' | ';' | '\t' | ' ')
}

/// Parse free-form text into a [`RecipientSet`].
///
/// Malformed tokens are dropped silently. Never fails; an input with no
/// valid identifiers yields an empty set.
pub fn normalize(raw_text: &str) -> RecipientSet {
    let mut seen = HashSet::new();
    let mut recipients = Vec::new();
    let mut dropped = 0usize;

    for token in raw_text.split(is_separator).map(str::trim) {
        if token.is_empty() {
            continue;
        }
        match Identifier::parse(token) {
            Ok(id) => {
                if seen.insert(id.key()) {
                    recipients.push(id);
                }
            }
            Err(_) => dropped += 1,
        }
    }

    tracing::debug!(
        valid = recipients.len(),
        dropped,
        "normalized recipient list"
    );

    RecipientSet { recipients }
}
