//! Splitting a recipient set into bounded groups for sequential submission.

use serde::{Deserialize, Serialize};
use std::fmt;

use soulmint_core::Identifier;

use crate::normalize::RecipientSet;

/// Effective chunk size, always within `[MIN, MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub struct ChunkSize(usize);

impl ChunkSize {
    pub const MIN: usize = 1;
    pub const MAX: usize = 200;
    pub const DEFAULT: usize = 40;

    /// Clamp a numeric request. Zero counts as "unset" and falls back to
    /// the default rather than clamping up to one.
    pub fn new(requested: i64) -> Self {
        if requested == 0 {
            return Self::default();
        }
        Self(requested.clamp(Self::MIN as i64, Self::MAX as i64) as usize)
    }

    /// Parse user text. Anything that is not a finite non-zero number uses
    /// the default; fractions are truncated after clamping.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v != 0.0 => {
                let clamped = v.clamp(Self::MIN as f64, Self::MAX as f64);
                Self(clamped.trunc() as usize)
            }
            _ => Self::default(),
        }
    }

    pub fn from_option(requested: Option<i64>) -> Self {
        requested.map(Self::new).unwrap_or_default()
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl From<i64> for ChunkSize {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl From<ChunkSize> for i64 {
    fn from(value: ChunkSize) -> Self {
        value.0 as i64
    }
}

impl fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Contiguous, non-empty slice of a recipient set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based position among the batch's chunks.
    pub index: usize,
    pub recipients: Vec<Identifier>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

/// Split `set` into chunks of exactly `size`, the last holding the
/// remainder. Concatenating the result reproduces `set`.
pub fn chunk(set: &RecipientSet, size: ChunkSize) -> Vec<Chunk> {
    set.as_slice()
        .chunks(size.get())
        .enumerate()
        .map(|(i, part)| Chunk {
            index: i + 1,
            recipients: part.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    fn set_of(n: usize) -> RecipientSet {
        let text: Vec<String> = (0..n).map(|i| format!("0x{:040x}", i + 1)).collect();
        normalize(&text.join("\n"))
    }

    #[test]
    fn test_new_clamps() {
        assert_eq!(ChunkSize::new(-3).get(), 1);
        assert_eq!(ChunkSize::new(1).get(), 1);
        assert_eq!(ChunkSize::new(40).get(), 40);
        assert_eq!(ChunkSize::new(200).get(), 200);
        assert_eq!(ChunkSize::new(500).get(), 200);
        assert_eq!(ChunkSize::new(i64::MIN).get(), 1);
        assert_eq!(ChunkSize::new(i64::MAX).get(), 200);
    }

    #[test]
    fn test_zero_and_missing_use_default() {
        assert_eq!(ChunkSize::new(0).get(), 40);
        assert_eq!(ChunkSize::from_option(None).get(), 40);
        assert_eq!(ChunkSize::from_option(Some(7)).get(), 7);
    }

    #[test]
    fn test_parse() {
        assert_eq!(ChunkSize::parse("25").get(), 25);
        assert_eq!(ChunkSize::parse(" 500 ").get(), 200);
        assert_eq!(ChunkSize::parse("-10").get(), 1);
        assert_eq!(ChunkSize::parse("0").get(), 40);
        assert_eq!(ChunkSize::parse("").get(), 40);
        assert_eq!(ChunkSize::parse("abc").get(), 40);
        assert_eq!(ChunkSize::parse("NaN").get(), 40);
        assert_eq!(ChunkSize::parse("inf").get(), 40);
        assert_eq!(ChunkSize::parse("12.7").get(), 12);
        assert_eq!(ChunkSize::parse("0.5").get(), 1);
    }

    #[test]
    fn test_effective_size_always_in_range() {
        for raw in ["-1000", "-1", "0", "1", "199", "200", "201", "1e9", "x", ""] {
            let size = ChunkSize::parse(raw).get();
            assert!((ChunkSize::MIN..=ChunkSize::MAX).contains(&size), "{raw}");
        }
    }

    #[test]
    fn test_95_by_40() {
        let set = set_of(95);
        let chunks = chunk(&set, ChunkSize::new(40));
        let sizes: Vec<_> = chunks.iter().map(Chunk::len).collect();
        assert_eq!(sizes, vec![40, 40, 15]);
        let indices: Vec<_> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_concatenation_reproduces_set() {
        for n in [1usize, 2, 39, 40, 41, 80, 95, 201] {
            let set = set_of(n);
            for size in [1i64, 3, 40, 200] {
                let chunks = chunk(&set, ChunkSize::new(size));
                assert!(chunks.iter().all(|c| !c.is_empty()));
                assert!(chunks.iter().all(|c| c.len() <= size as usize));
                let flat: Vec<Identifier> =
                    chunks.into_iter().flat_map(|c| c.recipients).collect();
                assert_eq!(flat.as_slice(), set.as_slice(), "n={n} size={size}");
            }
        }
    }

    #[test]
    fn test_empty_set_yields_no_chunks() {
        assert!(chunk(&RecipientSet::default(), ChunkSize::default()).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let set = set_of(57);
        assert_eq!(
            chunk(&set, ChunkSize::new(10)),
            chunk(&set, ChunkSize::new(10))
        );
    }

    #[test]
    fn test_serde_clamps() {
        let size: ChunkSize = serde_json::from_str("999").unwrap();
        assert_eq!(size.get(), 200);
        assert_eq!(serde_json::to_string(&ChunkSize::new(12)).unwrap(), "12");
    }
}
