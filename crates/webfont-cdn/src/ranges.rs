//! Unicode range expressions and the range catalog.

use std::{fmt, fs, path::Path, str::FromStr};

use log::warn;
use serde_json::{Map, Value};

use crate::{ConfigError, MalformedRangeError};

/// Largest valid Unicode code point.
const MAX_CODE_POINT: u32 = 0x10_ffff;

/// Inclusive range of Unicode code points. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnicodeRange {
    start: u32,
    end: u32,
}

impl UnicodeRange {
    /// Creates a range. Returns `None` if `start > end` or `end` is not a Unicode code point.
    pub fn new(start: u32, end: u32) -> Option<Self> {
        (start <= end && end <= MAX_CODE_POINT).then_some(Self { start, end })
    }

    /// Returns the first code point in the range.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Returns the last code point in the range (inclusive).
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Checks whether the range contains the specified char.
    pub fn contains(&self, ch: char) -> bool {
        (self.start..=self.end).contains(&u32::from(ch))
    }
}

impl fmt::Display for UnicodeRange {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(formatter, "U+{:X}", self.start)
        } else {
            write!(formatter, "U+{:X}-{:X}", self.start, self.end)
        }
    }
}

fn strip_marker(s: &str) -> &str {
    s.strip_prefix("U+")
        .or_else(|| s.strip_prefix("u+"))
        .unwrap_or(s)
}

fn parse_code_point(s: &str, token: &str) -> Result<u32, MalformedRangeError> {
    let err = |reason| MalformedRangeError {
        token: token.to_owned(),
        reason,
    };

    let s = s.trim();
    if s.is_empty() {
        return Err(err("missing value"));
    }
    // `from_str_radix` accepts a leading sign, which is not valid here
    if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(err("not a hexadecimal value"));
    }
    let value = u32::from_str_radix(s, 16).map_err(|_| err("value is too large"))?;
    if value > MAX_CODE_POINT {
        return Err(err("value exceeds U+10FFFF"));
    }
    Ok(value)
}

/// Parses a single token: either `start-end` or a single value, with an optional `U+` marker.
impl FromStr for UnicodeRange {
    type Err = MalformedRangeError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        let body = strip_marker(token);
        let (start, end) = if let Some((start, end)) = body.split_once('-') {
            (
                parse_code_point(start, token)?,
                parse_code_point(end, token)?,
            )
        } else {
            let code_point = parse_code_point(body, token)?;
            (code_point, code_point)
        };

        Self::new(start, end).ok_or_else(|| MalformedRangeError {
            token: token.to_owned(),
            reason: "range start exceeds its end",
        })
    }
}

/// Parses a Unicode range expression, such as `U+0-FF` or `U+3000-303F, U+FF00-FFEF`.
///
/// The expression consists of comma-separated tokens, each of which is either a `start-end`
/// hexadecimal pair or a single hexadecimal value. A `U+` marker is accepted before the expression
/// and before each token (the form used by CSS `unicode-range`). The returned ranges retain
/// the order of tokens; overlapping ranges are not merged.
///
/// # Errors
///
/// Returns an error if any token is empty, is not hexadecimal, exceeds U+10FFFF,
/// or has its start greater than its end.
pub fn parse_ranges(expr: &str) -> Result<Vec<UnicodeRange>, MalformedRangeError> {
    let body = strip_marker(expr.trim());
    body.split(',').map(UnicodeRange::from_str).collect()
}

/// Entry of a [`RangeCatalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeEntry {
    id: String,
    expr: String,
    ranges: Vec<UnicodeRange>,
}

impl RangeEntry {
    /// Creates an entry by parsing the provided expression.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression is malformed.
    pub fn new(id: impl Into<String>, expr: impl Into<String>) -> Result<Self, MalformedRangeError> {
        let expr = expr.into();
        let ranges = parse_ranges(&expr)?;
        Ok(Self {
            id: id.into(),
            expr,
            ranges,
        })
    }

    /// Returns the range identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the original textual expression. This is what is emitted in CSS `unicode-range`.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// Returns the parsed ranges. The returned slice is never empty.
    pub fn ranges(&self) -> &[UnicodeRange] {
        &self.ranges
    }
}

/// Ordered catalog of Unicode ranges, each of which produces (at most) one subset per font variant.
///
/// Declaration order is significant: ranges are processed and emitted in CSS in this order.
#[derive(Debug, Clone, Default)]
pub struct RangeCatalog {
    entries: Vec<RangeEntry>,
}

impl RangeCatalog {
    /// Creates a catalog from `(id, expr)` pairs. Malformed entries are logged and dropped.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries
            .into_iter()
            .filter_map(|(id, expr)| {
                let id = id.into();
                match RangeEntry::new(id.clone(), expr) {
                    Ok(entry) => Some(entry),
                    Err(err) => {
                        warn!("Dropping range `{id}` from the catalog: {err}");
                        None
                    }
                }
            })
            .collect();
        Self { entries }
    }

    /// Parses a catalog from a JSON object mapping range IDs to expressions.
    /// Entries with non-string values or malformed expressions are logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a JSON object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let map: Map<String, Value> = serde_json::from_str(json)?;
        let entries = map.into_iter().filter_map(|(id, value)| {
            if let Value::String(expr) = value {
                Some((id, expr))
            } else {
                warn!("Dropping range `{id}` from the catalog: expression is not a string");
                None
            }
        });
        Ok(Self::from_entries(entries))
    }

    /// Loads a catalog from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a JSON object.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Ok(Self::from_json(&json)?)
    }

    /// Returns catalog entries in declaration order.
    pub fn entries(&self) -> &[RangeEntry] {
        &self.entries
    }

    /// Looks up an entry by its ID.
    pub fn get(&self, id: &str) -> Option<&RangeEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::quickcheck;
    use test_casing::test_casing;

    use super::*;

    fn range(start: u32, end: u32) -> UnicodeRange {
        UnicodeRange::new(start, end).unwrap()
    }

    const VALID_EXPRESSIONS: [(&str, &[(u32, u32)]); 7] = [
        ("U+0-FF", &[(0, 0xff)]),
        ("U+4E00-9FFF", &[(0x4e00, 0x9fff)]),
        ("U+20000-2A6DF", &[(0x2_0000, 0x2_a6df)]),
        ("U+4E00", &[(0x4e00, 0x4e00)]),
        ("U+3000-303F, U+FF00-FFEF", &[(0x3000, 0x303f), (0xff00, 0xffef)]),
        ("U+0-7F,U+A0", &[(0, 0x7f), (0xa0, 0xa0)]),
        (" 20-7e , 100-17f ", &[(0x20, 0x7e), (0x100, 0x17f)]),
    ];

    #[test_casing(7, VALID_EXPRESSIONS)]
    fn parsing_valid_expression(expr: &str, expected: &[(u32, u32)]) {
        let ranges = parse_ranges(expr).unwrap();
        let expected: Vec<_> = expected.iter().map(|&(start, end)| range(start, end)).collect();
        assert_eq!(ranges, expected);
    }

    #[test_casing(8, [
        ("", "missing value"),
        ("U+", "missing value"),
        ("U+0-FF,", "missing value"),
        ("U+XYZ", "not a hexadecimal value"),
        ("U++20", "not a hexadecimal value"),
        ("U+9FFF-4E00", "range start exceeds its end"),
        ("U+110000", "value exceeds U+10FFFF"),
        ("U+1-2-3", "not a hexadecimal value"),
    ])]
    fn parsing_malformed_expression(expr: &str, expected_reason: &str) {
        let err = parse_ranges(expr).unwrap_err();
        assert_eq!(err.reason, expected_reason, "{err}");
    }

    #[test]
    fn overlapping_ranges_are_retained() {
        let ranges = parse_ranges("U+0-FF, U+80-17F").unwrap();
        assert_eq!(ranges, [range(0, 0xff), range(0x80, 0x17f)]);
    }

    #[test]
    fn displaying_range() {
        assert_eq!(range(0x4e00, 0x4e00).to_string(), "U+4E00");
        assert_eq!(range(0, 0x7f).to_string(), "U+0-7F");
    }

    quickcheck! {
        fn parsed_ranges_are_ordered(expr: String) -> bool {
            match parse_ranges(&expr) {
                Ok(ranges) => {
                    !ranges.is_empty() && ranges.iter().all(|range| range.start() <= range.end())
                }
                Err(_) => true,
            }
        }

        fn formatted_ranges_are_parsed_back(bounds: Vec<(u32, u32)>) -> bool {
            let ranges: Vec<_> = bounds
                .into_iter()
                .map(|(start, end)| {
                    let (start, end) = (start % (MAX_CODE_POINT + 1), end % (MAX_CODE_POINT + 1));
                    range(start.min(end), start.max(end))
                })
                .collect();
            if ranges.is_empty() {
                return true;
            }
            let expr: Vec<_> = ranges.iter().map(ToString::to_string).collect();
            parse_ranges(&expr.join(", ")).is_ok_and(|parsed| parsed == ranges)
        }

        fn inverted_ranges_are_rejected(start: u16, end: u16) -> bool {
            let expr = format!("U+{start:X}-{end:X}");
            parse_ranges(&expr).is_ok() == (start <= end)
        }
    }

    #[test]
    fn catalog_preserves_declaration_order() {
        let json = r#"{
            "latin-ext": "U+100-24F",
            "cjk": "U+4E00-9FFF",
            "basic-latin": "U+0-7F"
        }"#;
        let catalog = RangeCatalog::from_json(json).unwrap();
        let ids: Vec<_> = catalog.entries().iter().map(RangeEntry::id).collect();
        assert_eq!(ids, ["latin-ext", "cjk", "basic-latin"]);
        assert_eq!(catalog.get("cjk").unwrap().expr(), "U+4E00-9FFF");
    }

    #[test]
    fn catalog_drops_malformed_entries() {
        let json = r#"{
            "ok": "U+0-7F",
            "inverted": "U+9FFF-4E00",
            "garbage": "U+XYZ",
            "not-a-string": 42,
            "also-ok": "U+80-FF"
        }"#;
        let catalog = RangeCatalog::from_json(json).unwrap();
        let ids: Vec<_> = catalog.entries().iter().map(RangeEntry::id).collect();
        assert_eq!(ids, ["ok", "also-ok"]);
    }

    #[test]
    fn catalog_must_be_object() {
        RangeCatalog::from_json(r#"["U+0-7F"]"#).unwrap_err();
    }
}
