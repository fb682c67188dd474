use std::collections::{BTreeMap, BTreeSet};

use crate::{
    font::{gsub, Font, GlyphWithMetrics, DROPPED_GLYPH},
    MapError, ParseError, TableTag,
};

/// Seconds between the OpenType epoch (1904-01-01) and the Unix epoch.
const OPENTYPE_EPOCH_OFFSET: i64 = 2_082_844_800;

/// Subset of a [`Font`] produced by removing glyphs unreachable from a set of chars.
///
/// Glyph IDs are retained: removed glyphs keep their slots with empty outlines and zero metrics.
/// Glyph-indexed tables therefore never need renumbering; data for removed glyphs is pruned
/// from them when the subset is serialized.
///
/// A subset borrows the font, so a font parsed once can produce any number of subsets.
#[derive(Debug)]
pub struct FontSubset<'a> {
    pub(crate) font: &'a Font<'a>,
    /// Unicode mapping for the retained chars, ordered by char.
    pub(crate) char_map: Vec<(char, u16)>,
    /// Entries of the symbol `cmap` subtable, ordered by code.
    pub(crate) symbol_map: Vec<(char, u16)>,
    pub(crate) glyphs: BTreeMap<u16, GlyphWithMetrics<'a>>,
    /// `head.modified` value (seconds since 1904-01-01); `None` keeps the original value.
    pub(crate) modified: Option<i64>,
}

impl<'a> FontSubset<'a> {
    /// Creates a subset containing glyphs for the specified chars. Chars not covered
    /// by the font are ignored.
    ///
    /// Besides glyphs directly mapped from `chars`, the subset retains the missing glyph (#0),
    /// glyphs reachable via `GSUB` substitutions, and components of composite glyphs.
    ///
    /// # Errors
    ///
    /// Returns an error if the font data is malformed.
    pub fn new(font: &'a Font<'a>, chars: &BTreeSet<char>) -> Result<Self, ParseError> {
        let mut char_map = vec![];
        for &ch in chars {
            let glyph_idx = match font.map_char(ch) {
                Ok(idx) => idx,
                // The font only has a BMP `cmap` subtable
                Err(MapError::CharTooLarge) => continue,
                Err(err) => return Err(err.into()),
            };
            if glyph_idx != 0 && glyph_idx < font.glyph_count {
                char_map.push((ch, glyph_idx));
            }
        }
        let symbol_map: Vec<_> = font
            .char_maps
            .symbol_entries()
            .filter(|&(code, glyph_idx)| {
                glyph_idx < font.glyph_count && Self::is_symbol_code_retained(code, chars)
            })
            .filter_map(|(code, glyph_idx)| Some((char::from_u32(code.into())?, glyph_idx)))
            .collect();

        // The 0th glyph must always be present
        let mut retained = BTreeSet::from([0]);
        retained.extend(char_map.iter().map(|&(_, idx)| idx));
        retained.extend(symbol_map.iter().map(|&(_, idx)| idx));
        if let Some(gsub) = font.passthrough_table(TableTag::GSUB) {
            gsub::close_over(gsub, &mut retained)?;
        }

        let mut this = Self {
            font,
            char_map,
            symbol_map,
            glyphs: BTreeMap::new(),
            modified: None,
        };
        for glyph_idx in retained {
            this.ensure_glyph(glyph_idx)?;
        }
        Ok(this)
    }

    /// Symbol fonts map chars either directly or in the `0xf000..=0xf0ff` private use block.
    fn is_symbol_code_retained(code: u16, chars: &BTreeSet<char>) -> bool {
        let direct = char::from_u32(code.into()).is_some_and(|ch| chars.contains(&ch));
        let aliased = code & 0xff00 == 0xf000 && chars.contains(&char::from(code as u8));
        direct || aliased
    }

    fn ensure_glyph(&mut self, glyph_idx: u16) -> Result<(), ParseError> {
        if self.glyphs.contains_key(&glyph_idx) {
            return Ok(());
        }

        let glyph = self.font.glyph(glyph_idx)?;
        let components: Vec<_> = glyph.inner.component_indices().collect();
        self.glyphs.insert(glyph_idx, glyph);
        for component_idx in components {
            self.ensure_glyph(component_idx)?;
        }
        Ok(())
    }

    /// Sets the modification timestamp recorded in the `head` table, as seconds since
    /// the Unix epoch. By default, the timestamp of the original font is retained.
    #[must_use]
    pub fn with_modified_timestamp(mut self, unix_secs: i64) -> Self {
        self.modified = Some(unix_secs + OPENTYPE_EPOCH_OFFSET);
        self
    }

    /// Returns the number of retained glyphs, including the missing glyph.
    pub fn retained_glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// Checks whether the glyph with the specified ID is retained in this subset.
    pub fn contains_glyph(&self, glyph_idx: u16) -> bool {
        self.glyphs.contains_key(&glyph_idx)
    }

    /// Returns chars mapped by this subset.
    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.char_map.iter().map(|&(ch, _)| ch)
    }

    /// Iterates over all glyph slots of the font, substituting dropped glyphs.
    pub(crate) fn glyph_slots(&self) -> impl Iterator<Item = &GlyphWithMetrics<'a>> + '_ {
        (0..self.font.glyph_count).map(|idx| {
            self.glyphs.get(&idx).unwrap_or(&DROPPED_GLYPH)
        })
    }
}

impl<'a> Font<'a> {
    pub(crate) fn passthrough_table(&self, tag: TableTag) -> Option<&'a [u8]> {
        self.passthrough
            .iter()
            .find_map(|&(table_tag, bytes)| (table_tag == tag).then_some(bytes))
    }
}
