//! Postcode records and partition keys
//!
//! A [`Record`] is one reference-data row. Its `code` is normalized and
//! format-validated on construction, and `code_abbr` is derived from it, so
//! every `Record` in memory satisfies the schema.
//!
//! Partitions are keyed by the first letter of the code ([`PartitionKey`]),
//! a closed alphabet A-Z.

use crate::error::SchemaError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Accepted postcode shape, matched against the abbreviated (spaceless) form
///
/// Outward code: one or two letters, a digit, an optional letter or digit.
/// Inward code: a digit and two letters. `GIR0AA` is the one historical
/// exception still in the source data.
static ABBR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Z]{1,2}[0-9][A-Z0-9]?[0-9][A-Z]{2}|GIR0AA)$")
        .expect("postcode pattern is a valid regex")
});

/// Partition identifier: a single uppercase letter A-Z
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey(u8);

impl PartitionKey {
    /// Number of possible partitions
    pub const COUNT: usize = 26;

    /// Build a key from a letter, case-insensitively
    ///
    /// # Examples
    ///
    /// ```
    /// use postcode_pack::PartitionKey;
    ///
    /// let key = PartitionKey::from_char('b').unwrap();
    /// assert_eq!(key.as_char(), 'B');
    /// assert!(PartitionKey::from_char('7').is_err());
    /// ```
    pub fn from_char(c: char) -> Result<Self, SchemaError> {
        let upper = c.to_ascii_uppercase();
        if upper.is_ascii_uppercase() {
            Ok(PartitionKey(upper as u8))
        } else {
            Err(SchemaError::InvalidPartitionKey(c.to_string()))
        }
    }

    /// Partition key a code belongs to
    pub fn for_code(code: &str) -> Result<Self, SchemaError> {
        let first = code
            .trim_start()
            .chars()
            .next()
            .ok_or(SchemaError::EmptyCode)?;
        Self::from_char(first).map_err(|_| SchemaError::OutsideAlphabet(code.to_string()))
    }

    /// All keys in canonical (alphabetical) order
    pub fn all() -> impl Iterator<Item = PartitionKey> {
        (b'A'..=b'Z').map(PartitionKey)
    }

    pub fn as_char(self) -> char {
        self.0 as char
    }

    /// Zero-based position in the alphabet
    pub fn index(self) -> usize {
        (self.0 - b'A') as usize
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl std::str::FromStr for PartitionKey {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c),
            _ => Err(SchemaError::InvalidPartitionKey(s.to_string())),
        }
    }
}

impl Serialize for PartitionKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut buf = [0u8; 4];
        serializer.serialize_str(self.as_char().encode_utf8(&mut buf))
    }
}

impl<'de> Deserialize<'de> for PartitionKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        // Manifests are canonical: reject lowercase keys instead of folding them
        if s.len() != 1 || !s.as_bytes()[0].is_ascii_uppercase() {
            return Err(serde::de::Error::custom(format!(
                "partition key must be one uppercase letter, got {:?}",
                s
            )));
        }
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Normalize a raw postcode: trim and uppercase
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Abbreviated form of a postcode: all whitespace removed
///
/// # Examples
///
/// ```
/// assert_eq!(postcode_pack::abbreviate("b1  1aa"), "B11AA");
/// ```
pub fn abbreviate(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn validate_code(code: &str, abbr: &str) -> Result<(), SchemaError> {
    if code.is_empty() {
        return Err(SchemaError::EmptyCode);
    }

    PartitionKey::for_code(code)?;

    if let Some(bad) = code.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == ' ')) {
        return Err(SchemaError::InvalidCode {
            code: code.to_string(),
            reason: format!("unexpected character {:?}", bad),
        });
    }

    if !ABBR_PATTERN.is_match(abbr) {
        return Err(SchemaError::InvalidCode {
            code: code.to_string(),
            reason: "not a valid outward/inward postcode".to_string(),
        });
    }

    Ok(())
}

/// One postcode row
///
/// Fields are private so `code_abbr` always agrees with `code`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    code: String,
    easting: Option<u32>,
    northing: Option<u32>,
    region_code: String,
    code_abbr: String,
}

impl Record {
    /// Create a validated record
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if the code is empty, does not start with A-Z,
    /// or is not a well-formed postcode.
    ///
    /// # Examples
    ///
    /// ```
    /// use postcode_pack::Record;
    ///
    /// let record = Record::new("ab1 2cd", Some(394251), Some(806376), "S12000033").unwrap();
    /// assert_eq!(record.code(), "AB1 2CD");
    /// assert_eq!(record.code_abbr(), "AB12CD");
    /// assert_eq!(record.partition_key().as_char(), 'A');
    /// ```
    pub fn new(
        code: &str,
        easting: Option<u32>,
        northing: Option<u32>,
        region_code: impl Into<String>,
    ) -> Result<Self, SchemaError> {
        let code = normalize_code(code);
        let code_abbr = abbreviate(&code);
        validate_code(&code, &code_abbr)?;

        Ok(Record {
            code,
            easting,
            northing,
            region_code: region_code.into(),
            code_abbr,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn easting(&self) -> Option<u32> {
        self.easting
    }

    pub fn northing(&self) -> Option<u32> {
        self.northing
    }

    pub fn region_code(&self) -> &str {
        &self.region_code
    }

    pub fn code_abbr(&self) -> &str {
        &self.code_abbr
    }

    pub fn partition_key(&self) -> PartitionKey {
        // Validated in `new`
        PartitionKey(self.code.as_bytes()[0])
    }
}

/// Normalized row as produced by the upstream extraction step
///
/// Missing grid references or region codes are allowed; the source extract
/// carries postcodes without them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRow {
    pub code: String,
    #[serde(default)]
    pub easting: Option<u32>,
    #[serde(default)]
    pub northing: Option<u32>,
    #[serde(default)]
    pub region_code: Option<String>,
}

impl SourceRow {
    pub fn new(code: impl Into<String>, easting: u32, northing: u32, region_code: &str) -> Self {
        SourceRow {
            code: code.into(),
            easting: Some(easting),
            northing: Some(northing),
            region_code: Some(region_code.to_string()),
        }
    }

    /// Validate and convert into a [`Record`]
    pub fn into_record(self) -> Result<Record, SchemaError> {
        Record::new(
            &self.code,
            self.easting,
            self.northing,
            self.region_code.unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_key_from_char() {
        assert_eq!(PartitionKey::from_char('a').unwrap().as_char(), 'A');
        assert_eq!(PartitionKey::from_char('Z').unwrap().index(), 25);
        assert!(PartitionKey::from_char('1').is_err());
        assert!(PartitionKey::from_char('É').is_err());
    }

    #[test]
    fn test_partition_key_all_is_ordered() {
        let keys: String = PartitionKey::all().map(|k| k.as_char()).collect();
        assert_eq!(keys, "ABCDEFGHIJKLMNOPQRSTUVWXYZ");
    }

    #[test]
    fn test_partition_key_serde() {
        let key: PartitionKey = "M".parse().unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"M\"");
        assert_eq!(serde_json::from_str::<PartitionKey>(&json).unwrap(), key);

        assert!(serde_json::from_str::<PartitionKey>("\"m\"").is_err());
        assert!(serde_json::from_str::<PartitionKey>("\"MM\"").is_err());
    }

    #[test]
    fn test_valid_codes() {
        for code in ["AB1 2CD", "W1A 0AX", "EC1A 1BB", "B1  1AA", "GIR 0AA", "M11AE"] {
            assert!(Record::new(code, None, None, "").is_ok(), "{} should be valid", code);
        }
    }

    #[test]
    fn test_invalid_codes() {
        assert_eq!(Record::new("", None, None, ""), Err(SchemaError::EmptyCode));
        assert!(matches!(
            Record::new("1AB 2CD", None, None, ""),
            Err(SchemaError::OutsideAlphabet(_))
        ));
        assert!(matches!(
            Record::new("AB1-2CD", None, None, ""),
            Err(SchemaError::InvalidCode { .. })
        ));
        assert!(matches!(
            Record::new("ABCDEFG", None, None, ""),
            Err(SchemaError::InvalidCode { .. })
        ));
    }

    #[test]
    fn test_record_normalization() {
        let record = Record::new("  b1  1aa ", Some(1), Some(2), "E08000025").unwrap();
        assert_eq!(record.code(), "B1  1AA");
        assert_eq!(record.code_abbr(), "B11AA");
        assert_eq!(record.partition_key().as_char(), 'B');
        assert_eq!(record.easting(), Some(1));
        assert_eq!(record.region_code(), "E08000025");
    }

    #[test]
    fn test_source_row_defaults() {
        let row: SourceRow = serde_json::from_str(r#"{"code": "AB1 2CD"}"#).unwrap();
        let record = row.into_record().unwrap();
        assert_eq!(record.easting(), None);
        assert_eq!(record.region_code(), "");
    }
}
