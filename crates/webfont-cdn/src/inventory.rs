//! Glyph inventory of a font binary.

use std::collections::BTreeSet;

use font_subset::{covered_chars, ParseError};

use crate::UnicodeRange;

/// Set of chars a font binary has glyphs for. Computed once per font binary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlyphInventory {
    chars: BTreeSet<char>,
}

impl GlyphInventory {
    /// Inspects the font binary. A font without a supported Unicode `cmap` subtable produces
    /// an empty inventory; callers should treat it as "nothing to subset".
    ///
    /// # Errors
    ///
    /// Returns an error if the binary is not a parseable OpenType font.
    pub fn inspect(font_bytes: &[u8]) -> Result<Self, ParseError> {
        covered_chars(font_bytes).map(|chars| Self { chars })
    }

    /// Returns the number of covered chars.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Checks whether the inventory is empty.
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Checks whether the specified char is covered.
    pub fn contains(&self, ch: char) -> bool {
        self.chars.contains(&ch)
    }

    /// Returns covered chars falling into any of the specified ranges.
    pub fn intersect(&self, ranges: &[UnicodeRange]) -> BTreeSet<char> {
        let mut wanted = BTreeSet::new();
        for range in ranges {
            let (Some(start), Some(end)) = (char::from_u32(range.start()), char::from_u32(range.end()))
            else {
                // Ranges touching surrogates; fall back to filtering
                wanted.extend(self.chars.iter().copied().filter(|&ch| range.contains(ch)));
                continue;
            };
            wanted.extend(self.chars.range(start..=end).copied());
        }
        wanted
    }
}

impl FromIterator<char> for GlyphInventory {
    fn from_iter<I: IntoIterator<Item = char>>(iter: I) -> Self {
        Self {
            chars: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use font_subset::testing::TestFontBuilder;

    use super::*;

    #[test]
    fn inspecting_font() {
        let font = TestFontBuilder::new().with_chars('A'..='Z').build();
        let inventory = GlyphInventory::inspect(&font).unwrap();
        assert_eq!(inventory.len(), 26);
        assert!(inventory.contains('Q'));
        assert!(!inventory.contains('a'));
    }

    #[test]
    fn inspecting_non_font() {
        GlyphInventory::inspect(b"PK\x03\x04 definitely not a font").unwrap_err();
    }

    #[test]
    fn intersecting_with_ranges() {
        let inventory: GlyphInventory = ['A', 'z', 'é', '中'].into_iter().collect();
        let ranges = [
            UnicodeRange::new(0, 0x7f).unwrap(),
            UnicodeRange::new(0x4e00, 0x9fff).unwrap(),
        ];
        let wanted = inventory.intersect(&ranges);
        assert_eq!(wanted, BTreeSet::from(['A', 'z', '中']));

        let cjk_ext_b = [UnicodeRange::new(0x2_0000, 0x2_a6df).unwrap()];
        assert!(inventory.intersect(&cjk_ext_b).is_empty());
    }

    #[test]
    fn intersecting_with_surrogate_ranges() {
        let inventory: GlyphInventory = ['\u{d7ff}', '\u{e000}', '\u{e001}'].into_iter().collect();
        let ranges = [UnicodeRange::new(0xd800, 0xe000).unwrap()];
        assert_eq!(inventory.intersect(&ranges), BTreeSet::from(['\u{e000}']));
    }
}
