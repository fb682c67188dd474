//! Building WOFF2 subsets for Unicode ranges.

use std::{env, sync::Arc};

use font_subset::{Font, FontSubset, ParseError};
use log::warn;

use crate::{GlyphInventory, SubsetBuildCause, SubsetBuildError, UnicodeRange};

/// Font parsed once per variant and shared by all its ranges. A parsing error is reported
/// by every range that needs glyphs from the font.
pub type ParsedFont<'a> = Result<Font<'a>, Arc<ParseError>>;

/// Environment variable pinning the timestamp recorded in built fonts, as seconds since
/// the Unix epoch. See <https://reproducible-builds.org/specs/source-date-epoch/>.
pub const SOURCE_DATE_EPOCH_VAR: &str = "SOURCE_DATE_EPOCH";

/// Outcome of [`SubsetBuilder::build()`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubsetOutcome {
    /// The font has no glyphs in the requested ranges. This is a normal condition, not an error.
    Skipped,
    /// WOFF2-encoded subset.
    Encoded(Vec<u8>),
}

/// Subset successfully built and written for a catalog range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltSubset {
    /// ID of the catalog range.
    pub range_id: String,
    /// Name of the subset file relative to the font output directory.
    pub filename: String,
    /// Size of the subset file in bytes.
    pub byte_size: u64,
    /// Textual Unicode range expression from the catalog.
    pub unicode_range: String,
}

/// Per-range result of processing a font variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubsetResult {
    /// No subset was produced for the range: the font has no glyphs in it,
    /// or the subset could not be built.
    Skipped {
        /// ID of the catalog range.
        range_id: String,
    },
    /// Subset was built.
    Built(BuiltSubset),
}

impl SubsetResult {
    /// Returns the ID of the catalog range this result relates to.
    pub fn range_id(&self) -> &str {
        match self {
            Self::Skipped { range_id } => range_id,
            Self::Built(subset) => &subset.range_id,
        }
    }

    /// Returns the built subset, if any.
    pub fn as_built(&self) -> Option<&BuiltSubset> {
        match self {
            Self::Built(subset) => Some(subset),
            Self::Skipped { .. } => None,
        }
    }
}

/// Builds WOFF2 subsets of a font for Unicode ranges.
#[derive(Debug, Clone, Copy)]
pub struct SubsetBuilder {
    modified: i64,
}

impl SubsetBuilder {
    /// Creates a builder recording the specified modification timestamp (seconds since
    /// the Unix epoch) in all built fonts.
    pub fn new(modified: i64) -> Self {
        Self { modified }
    }

    /// Creates a builder with the timestamp from the [`SOURCE_DATE_EPOCH_VAR`] environment variable,
    /// or the current time if the variable is not set.
    ///
    /// Unless the timestamp is pinned, fonts built in different runs differ in the `head` table.
    pub fn from_env() -> Self {
        let modified = match env::var(SOURCE_DATE_EPOCH_VAR) {
            Ok(value) => value.trim().parse().unwrap_or_else(|err| {
                warn!("Ignoring invalid {SOURCE_DATE_EPOCH_VAR} value `{value}`: {err}");
                chrono::Utc::now().timestamp()
            }),
            Err(_) => chrono::Utc::now().timestamp(),
        };
        Self::new(modified)
    }

    /// Returns the modification timestamp recorded in built fonts.
    pub fn modified(&self) -> i64 {
        self.modified
    }

    /// Parses font data for [`Self::build()`].
    pub fn parse_font(font_bytes: &[u8]) -> ParsedFont<'_> {
        Font::new(font_bytes).map_err(Arc::new)
    }

    /// Builds a subset of `font` containing glyphs for `inventory` chars in any of `ranges`.
    ///
    /// Returns [`SubsetOutcome::Skipped`] if there are no such chars; in this case, the font
    /// is not touched, so a font that failed parsing is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the font cannot be subsetted (e.g., it is corrupted
    /// or uses unsupported outlines). The error relates to `range_id` only.
    pub fn build(
        &self,
        font: &ParsedFont<'_>,
        range_id: &str,
        ranges: &[UnicodeRange],
        inventory: &GlyphInventory,
    ) -> Result<SubsetOutcome, SubsetBuildError> {
        let wanted = inventory.intersect(ranges);
        if wanted.is_empty() {
            return Ok(SubsetOutcome::Skipped);
        }

        let build_error = |cause: SubsetBuildCause| SubsetBuildError {
            range_id: range_id.to_owned(),
            cause,
        };
        let font = font
            .as_ref()
            .map_err(|err| build_error(SubsetBuildCause::Parse(Arc::clone(err))))?;
        let subset = FontSubset::new(font, &wanted).map_err(|err| build_error(err.into()))?;
        let encoded = subset
            .with_modified_timestamp(self.modified)
            .to_woff2()
            .map_err(|err| build_error(err.into()))?;
        Ok(SubsetOutcome::Encoded(encoded))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use font_subset::{testing::TestFontBuilder, ParseErrorKind};

    use super::*;
    use crate::parse_ranges;

    const TIMESTAMP: i64 = 1_700_000_000;

    fn build(font_bytes: &[u8], expr: &str) -> Result<SubsetOutcome, SubsetBuildError> {
        let inventory = GlyphInventory::inspect(font_bytes).unwrap();
        let font = SubsetBuilder::parse_font(font_bytes);
        let ranges = parse_ranges(expr).unwrap();
        SubsetBuilder::new(TIMESTAMP).build(&font, "test", &ranges, &inventory)
    }

    fn encoded(outcome: SubsetOutcome) -> Vec<u8> {
        match outcome {
            SubsetOutcome::Encoded(woff2) => woff2,
            SubsetOutcome::Skipped => panic!("subset was skipped"),
        }
    }

    #[test]
    fn empty_intersection_is_skipped() {
        let font = TestFontBuilder::new().with_chars(' '..='~').build();
        let outcome = build(&font, "U+4E00-9FFF").unwrap();
        assert_eq!(outcome, SubsetOutcome::Skipped);
    }

    #[test]
    fn building_subset() {
        let font = TestFontBuilder::new().with_chars(' '..='~').build();
        let woff2 = encoded(build(&font, "U+41-5A").unwrap());
        assert_eq!(&woff2[..4], b"wOF2");
        assert_eq!(woff2[4..8], 0x_0001_0000_u32.to_be_bytes());
        let declared_len = u32::from_be_bytes(woff2[8..12].try_into().unwrap());
        assert_eq!(declared_len as usize, woff2.len());
    }

    #[test]
    fn subsets_are_reproducible_with_pinned_timestamp() {
        let font = TestFontBuilder::new().with_chars('A'..='Z').build();
        let first = build(&font, "U+0-7F").unwrap();
        let second = build(&font, "U+0-7F").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unsupported_outlines_fail_single_range() {
        let font = TestFontBuilder::new()
            .with_chars('A'..='Z')
            .with_cff_outlines()
            .build();
        let err = build(&font, "U+0-7F").unwrap_err();
        assert_eq!(err.range_id, "test");
        let SubsetBuildCause::Parse(cause) = &err.cause else {
            panic!("unexpected cause: {err}");
        };
        assert!(matches!(cause.kind(), ParseErrorKind::UnsupportedOutlines), "{err}");

        // The inventory still works, so ranges outside the font are skipped without an error.
        assert_eq!(build(&font, "U+4E00-9FFF").unwrap(), SubsetOutcome::Skipped);
    }

    #[test]
    fn font_is_parsed_once_for_all_ranges() {
        let font_bytes = TestFontBuilder::new().with_chars(' '..='~').build();
        let inventory = GlyphInventory::inspect(&font_bytes).unwrap();
        let font = SubsetBuilder::parse_font(&font_bytes);
        let builder = SubsetBuilder::new(TIMESTAMP);

        let upper = parse_ranges("U+41-5A").unwrap();
        let lower = parse_ranges("U+61-7A").unwrap();
        let upper_subset = encoded(builder.build(&font, "upper", &upper, &inventory).unwrap());
        let lower_subset = encoded(builder.build(&font, "lower", &lower, &inventory).unwrap());
        assert_ne!(upper_subset, lower_subset);
        assert_eq!(encoded(build(&font_bytes, "U+41-5A").unwrap()), upper_subset);
    }

    #[test]
    fn parse_error_is_shared_by_ranges() {
        let font_bytes = TestFontBuilder::new()
            .with_chars('A'..='Z')
            .with_cff_outlines()
            .build();
        let inventory = GlyphInventory::inspect(&font_bytes).unwrap();
        let font = SubsetBuilder::parse_font(&font_bytes);
        let builder = SubsetBuilder::new(TIMESTAMP);

        let causes: Vec<_> = ["U+41-4D", "U+4E-5A"]
            .into_iter()
            .map(|expr| {
                let ranges = parse_ranges(expr).unwrap();
                let err = builder.build(&font, expr, &ranges, &inventory).unwrap_err();
                assert_eq!(err.range_id, expr);
                match err.cause {
                    SubsetBuildCause::Parse(cause) => cause,
                    other => panic!("unexpected cause: {other}"),
                }
            })
            .collect();
        assert!(Arc::ptr_eq(&causes[0], &causes[1]));
    }

    #[test]
    fn building_subset_with_many_scattered_chars() {
        // Every other CJK ideograph, so that each char starts a separate `cmap` segment
        let chars: BTreeSet<char> = (0..9_000)
            .map(|i| char::from_u32(0x4e00 + 2 * i).unwrap())
            .collect();
        let font = TestFontBuilder::new()
            .with_chars(['A'])
            .with_aliased_chars(chars.iter().copied(), 1)
            .build();
        let woff2 = encoded(build(&font, "U+4E00-9FFF").unwrap());
        assert_eq!(&woff2[..4], b"wOF2");
    }
}
