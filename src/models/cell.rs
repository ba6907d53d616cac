use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static CELL_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i-u)^[A-Z]+[0-9]+-[0-9]+$").unwrap());
static ZONE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i-u)^[A-Z]+").unwrap());

/// A storage location code such as `A1-01`, normalised to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellCode(String);

impl CellCode {
    /// Returns `None` unless the code has the `<ZONE><RACK>-<SLOT>` shape.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if CELL_CODE_RE.is_match(trimmed) {
            Some(Self(trimmed.to_ascii_uppercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn zone(&self) -> &str {
        ZONE_PREFIX_RE
            .find(&self.0)
            .map(|m| m.as_str())
            .unwrap_or("")
    }

    /// Rack and slot digits read as one number: `A1-05` is 105.
    pub fn numeric_suffix(&self) -> Option<u32> {
        numeric_suffix(&self.0)
    }

    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for CellCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Leading alphabetic prefix of any cell-like string, upper-cased.
pub fn zone_of(cell: &str) -> Option<String> {
    ZONE_PREFIX_RE
        .find(cell.trim())
        .map(|m| m.as_str().to_ascii_uppercase())
}

pub fn numeric_suffix(cell: &str) -> Option<u32> {
    let trimmed = cell.trim();
    let prefix_len = ZONE_PREFIX_RE.find(trimmed).map(|m| m.end()).unwrap_or(0);
    let digits: String = trimmed[prefix_len..]
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        let cell = CellCode::parse(" b2-05 ").unwrap();
        assert_eq!(cell.as_str(), "B2-05");
        assert_eq!(cell.zone(), "B");
        assert_eq!(cell.numeric_suffix(), Some(205));
    }

    #[test]
    fn rejects_product_codes() {
        assert!(CellCode::parse("999888").is_none());
        assert!(CellCode::parse("A1-").is_none());
        assert!(CellCode::parse("A1-01-02").is_none());
        assert!(CellCode::parse("1A-01").is_none());
    }

    #[test]
    fn cell_codes_are_ascii_only() {
        assert!(CellCode::parse("\u{17f}1-01").is_none());
        assert!(CellCode::parse("A\u{661}-\u{660}\u{661}").is_none());
        assert!(CellCode::parse("K1-01").is_some());
    }

    #[test]
    fn multi_letter_zones() {
        let cell = CellCode::parse("AB12-3").unwrap();
        assert_eq!(cell.zone(), "AB");
        assert_eq!(zone_of("ab12-3").as_deref(), Some("AB"));
        assert_eq!(zone_of("12-3"), None);
    }
}
