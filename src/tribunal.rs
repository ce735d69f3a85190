// =============================================================================
// tribunal.rs - CNJ NUMBER -> COURT CODE
// =============================================================================
//
// The CNJ unified process number looks like this when it's behaving:
//
//     NNNNNNN-DD.AAAA.J.TR.OOOO
//     sequence-check.year.segment.tribunal.origin
//
// It rarely behaves. It shows up with separators, without them, half
// stripped, embedded in a sentence, or with the origin glued to the tribunal.
// The decoder tries three strategies in a fixed order and the first one that
// produces a known "J.TR" pair wins. The order is part of the contract: a
// dotted identifier is always read by its dots before its digits are
// counted.
//
// Nothing here ever fails. Garbage in, `Unresolved` out.
// =============================================================================

use std::collections::HashMap;

use tracing::debug;

use crate::models::TribunalCode;

/// Width of the canonical all-digits encoding.
const CNJ_DIGITS: usize = 20;

/// Immutable "J.TR" -> tribunal code table.
///
/// Built once and injected into the decoder. Nobody mutates it after
/// construction, so it can be shared across concurrent runs behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct TribunalMap {
    entries: HashMap<String, String>,
}

impl TribunalMap {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// The Brazilian judiciary: state courts (segment 8), regional federal
    /// courts (segment 4) and regional labor courts (segment 5).
    pub fn brazil() -> Self {
        const STATES: [&str; 27] = [
            "AC", "AL", "AP", "AM", "BA", "CE", "DFT", "ES", "GO", "MA", "MT", "MS", "MG", "PA",
            "PB", "PR", "PE", "PI", "RJ", "RN", "RS", "RO", "RR", "SC", "SE", "SP", "TO",
        ];

        let mut entries = HashMap::new();
        for (idx, uf) in STATES.iter().enumerate() {
            entries.insert(format!("8.{:02}", idx + 1), format!("TJ-{}", uf));
        }
        for region in 1..=6 {
            entries.insert(format!("4.{:02}", region), format!("TRF-{}", region));
        }
        for region in 1..=24 {
            entries.insert(format!("5.{:02}", region), format!("TRT-{}", region));
        }
        Self { entries }
    }

    pub fn lookup(&self, segment: &str, tribunal: &str) -> Option<&str> {
        self.entries
            .get(&format!("{}.{}", segment, tribunal))
            .map(String::as_str)
    }
}

/// The identifier decoder. Holds its map, has no other state.
#[derive(Debug, Clone)]
pub struct IdentifierDecoder {
    map: TribunalMap,
}

impl IdentifierDecoder {
    pub fn new(map: TribunalMap) -> Self {
        Self { map }
    }

    /// Resolve a process number to a tribunal code.
    ///
    /// 1. dotted form: 3rd part is `J`, first two chars of the 4th are `TR`
    /// 2. exactly 20 digits after stripping: `[13..14]` is `J`, `[14..16]` is `TR`
    /// 3. the first `.D.DD` run anywhere in the string
    pub fn resolve(&self, identifier: &str) -> TribunalCode {
        let resolved = self
            .from_dotted(identifier)
            .or_else(|| self.from_digits(identifier))
            .or_else(|| self.from_embedded_pair(identifier));

        match resolved {
            Some(code) => TribunalCode::Resolved(code.to_string()),
            None => {
                debug!(identifier = identifier, "Tribunal could not be decoded");
                TribunalCode::Unresolved
            }
        }
    }

    fn from_dotted(&self, identifier: &str) -> Option<&str> {
        let parts: Vec<&str> = identifier.split('.').collect();
        if parts.len() < 4 {
            return None;
        }
        let segment = parts[2].trim();
        let tribunal = parts[3].trim().get(..2)?;
        self.map.lookup(segment, tribunal)
    }

    fn from_digits(&self, identifier: &str) -> Option<&str> {
        let digits: String = identifier.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() != CNJ_DIGITS {
            return None;
        }
        self.map.lookup(&digits[13..14], &digits[14..16])
    }

    fn from_embedded_pair(&self, identifier: &str) -> Option<&str> {
        let bytes = identifier.as_bytes();
        let start = bytes.windows(5).position(|w| {
            w[0] == b'.'
                && w[1].is_ascii_digit()
                && w[2] == b'.'
                && w[3].is_ascii_digit()
                && w[4].is_ascii_digit()
        })?;
        // All five bytes are ASCII, so these slices sit on char boundaries.
        self.map
            .lookup(&identifier[start + 1..start + 2], &identifier[start + 3..start + 5])
    }
}

impl Default for IdentifierDecoder {
    fn default() -> Self {
        Self::new(TribunalMap::brazil())
    }
}
