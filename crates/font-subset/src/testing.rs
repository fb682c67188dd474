//! Synthetic TrueType fonts for tests.
//!
//! Fonts are assembled from scratch, so tests don't depend on font files. Each non-empty glyph
//! is a rectangle; glyph #`i` spans `50..=450 + 10 * i` horizontally and `0..=700` vertically,
//! so that bounding boxes differ between glyphs.

#![allow(clippy::cast_sign_loss)] // coordinates are written as raw bytes

use std::collections::BTreeMap;

use crate::{
    font::CharMaps,
    write::{write_u16, write_u32, FontWriter},
    TableTag, WriteError,
};

const ADVANCE: u16 = 600;
const X_MIN: i16 = 50;
const Y_MAX: i16 = 700;

#[derive(Debug, Clone)]
enum TestGlyph {
    Rectangle,
    Composite(Vec<u16>),
}

/// Builder of synthetic TrueType fonts.
///
/// Glyph IDs are assigned sequentially in the order glyphs are added; glyph #0 is always
/// the missing glyph (`.notdef`).
#[derive(Debug, Clone)]
pub struct TestFontBuilder {
    glyphs: Vec<TestGlyph>,
    chars: BTreeMap<char, u16>,
    symbol_codes: BTreeMap<u16, u16>,
    ligatures: Vec<(Vec<u16>, u16)>,
    single_substitutions: Vec<(u16, u16)>,
    kerning_pairs: Vec<(u16, u16, i16)>,
    glyph_names: bool,
    cff_outlines: bool,
}

impl Default for TestFontBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFontBuilder {
    /// Creates a builder for a font with only the missing glyph.
    pub fn new() -> Self {
        Self {
            glyphs: vec![TestGlyph::Rectangle],
            chars: BTreeMap::new(),
            symbol_codes: BTreeMap::new(),
            ligatures: vec![],
            single_substitutions: vec![],
            kerning_pairs: vec![],
            glyph_names: false,
            cff_outlines: false,
        }
    }

    fn push_glyph(&mut self, glyph: TestGlyph) -> u16 {
        let idx = u16::try_from(self.glyphs.len()).expect("too many glyphs");
        self.glyphs.push(glyph);
        idx
    }

    /// Returns the ID that the next added glyph will get.
    pub fn next_glyph_id(&self) -> u16 {
        u16::try_from(self.glyphs.len()).expect("too many glyphs")
    }

    /// Adds a separate glyph for each of the chars.
    #[must_use]
    pub fn with_chars(mut self, chars: impl IntoIterator<Item = char>) -> Self {
        for ch in chars {
            let idx = self.push_glyph(TestGlyph::Rectangle);
            self.chars.insert(ch, idx);
        }
        self
    }

    /// Adds a glyph not mapped from any char (e.g., a ligature or a component).
    #[must_use]
    pub fn with_unmapped_glyph(mut self) -> Self {
        self.push_glyph(TestGlyph::Rectangle);
        self
    }

    /// Maps each of the chars to an existing glyph without adding glyphs.
    #[must_use]
    pub fn with_aliased_chars(mut self, chars: impl IntoIterator<Item = char>, glyph: u16) -> Self {
        assert!(glyph < self.next_glyph_id(), "glyph #{glyph} does not exist");
        self.chars.extend(chars.into_iter().map(|ch| (ch, glyph)));
        self
    }

    /// Adds a composite glyph for `ch` referencing the specified glyphs.
    #[must_use]
    pub fn with_composite_char(mut self, ch: char, components: &[u16]) -> Self {
        assert!(!components.is_empty(), "composite glyph needs components");
        let idx = self.push_glyph(TestGlyph::Composite(components.to_vec()));
        self.chars.insert(ch, idx);
        self
    }

    /// Adds a glyph mapped from `code` in the Windows symbol `cmap` subtable.
    #[must_use]
    pub fn with_symbol_code(mut self, code: u16) -> Self {
        let idx = self.push_glyph(TestGlyph::Rectangle);
        self.symbol_codes.insert(code, idx);
        self
    }

    /// Adds a `GSUB` ligature substituting `components` with `ligature`.
    #[must_use]
    pub fn with_ligature(mut self, components: &[u16], ligature: u16) -> Self {
        assert!(components.len() >= 2, "ligature needs at least 2 components");
        self.ligatures.push((components.to_vec(), ligature));
        self
    }

    /// Adds a single `GSUB` substitution of `from` with `to`.
    #[must_use]
    pub fn with_single_substitution(mut self, from: u16, to: u16) -> Self {
        self.single_substitutions.push((from, to));
        self
    }

    /// Adds a kerning pair adjusting the advance of `left` by `value` if it's followed by `right`.
    /// The pair is recorded both in `GPOS` and in the legacy `kern` table.
    #[must_use]
    pub fn with_kerning_pair(mut self, left: u16, right: u16, value: i16) -> Self {
        self.kerning_pairs.push((left, right, value));
        self
    }

    /// Names glyphs in a version 2.0 `post` table. Glyph #`i` is named `g{i}`, except for
    /// the missing glyph, which gets the standard `.notdef` name.
    #[must_use]
    pub fn with_glyph_names(mut self) -> Self {
        self.glyph_names = true;
        self
    }

    /// Replaces TrueType outlines with a (fake) `CFF ` table.
    #[must_use]
    pub fn with_cff_outlines(mut self) -> Self {
        self.cff_outlines = true;
        self
    }

    fn glyph_bbox(&self, idx: usize) -> [i16; 4] {
        match &self.glyphs[idx] {
            TestGlyph::Rectangle => {
                let x_max = 450 + 10 * i16::try_from(idx).expect("too many glyphs");
                [X_MIN, 0, x_max, Y_MAX]
            }
            TestGlyph::Composite(components) => components
                .iter()
                .map(|&component| self.glyph_bbox(component.into()))
                .reduce(|[x_min, y_min, x_max, y_max], [x0, y0, x1, y1]| {
                    [x_min.min(x0), y_min.min(y0), x_max.max(x1), y_max.max(y1)]
                })
                .unwrap_or_default(),
        }
    }

    fn font_bbox(&self) -> [i16; 4] {
        (0..self.glyphs.len())
            .map(|idx| self.glyph_bbox(idx))
            .reduce(|[x_min, y_min, x_max, y_max], [x0, y0, x1, y1]| {
                [x_min.min(x0), y_min.min(y0), x_max.max(x1), y_max.max(y1)]
            })
            .unwrap_or_default()
    }

    /// Builds the font in the OpenType format.
    ///
    /// # Panics
    ///
    /// Panics if the font exceeds the size limits of the format.
    pub fn build(&self) -> Vec<u8> {
        self.write().expect("test font exceeds size limits")
    }

    fn write(&self) -> Result<Vec<u8>, WriteError> {
        let mut writer = FontWriter::default();
        writer.write_table(TableTag::CMAP, |buffer| self.write_cmap(buffer))??;
        writer.write_table(TableTag::HEAD, |buffer| self.write_head(buffer))?;
        writer.write_table(TableTag::HHEA, |buffer| self.write_hhea(buffer))?;
        writer.write_table(TableTag::HMTX, |buffer| {
            for idx in 0..self.glyphs.len() {
                write_u16(buffer, ADVANCE);
                write_u16(buffer, self.glyph_bbox(idx)[0] as u16);
            }
        })?;
        writer.write_table(TableTag::MAXP, |buffer| self.write_maxp(buffer))?;
        writer.write_table(TableTag::NAME, Self::write_name)?;
        writer.write_table(TableTag::OS2, |buffer| self.write_os2(buffer))?;
        writer.write_table(TableTag::POST, |buffer| self.write_post(buffer))?;

        if self.cff_outlines {
            writer.write_raw_table(TableTag::CFF, &[1, 0, 4, 4])?;
        } else {
            let mut glyf = vec![];
            let mut locations = vec![0_u16];
            for idx in 0..self.glyphs.len() {
                self.write_glyph(idx, &mut glyf);
                locations.push(u16::try_from(glyf.len() / 2).expect("glyf is too large"));
            }
            writer.write_raw_table(TableTag::GLYF, &glyf)?;
            writer.write_table(TableTag::LOCA, |buffer| {
                for loc in locations {
                    write_u16(buffer, loc);
                }
            })?;
        }

        if !self.ligatures.is_empty() || !self.single_substitutions.is_empty() {
            writer.write_table(TableTag::GSUB, |buffer| self.write_gsub(buffer))?;
        }
        if !self.kerning_pairs.is_empty() {
            writer.write_table(TableTag::GPOS, |buffer| self.write_gpos(buffer))?;
            writer.write_table(TableTag::KERN, |buffer| self.write_kern(buffer))?;
        }
        writer.into_opentype()
    }

    fn write_cmap(&self, buffer: &mut Vec<u8>) -> Result<(), WriteError> {
        let unicode_map: Vec<_> = self.chars.iter().map(|(&ch, &idx)| (ch, idx)).collect();
        let symbol_map: Vec<_> = self
            .symbol_codes
            .iter()
            .map(|(&code, &idx)| {
                let ch = char::from_u32(code.into()).expect("symbol code is a surrogate");
                (ch, idx)
            })
            .collect();
        CharMaps::from_maps(&unicode_map, &symbol_map).write(buffer)
    }

    fn write_head(&self, buffer: &mut Vec<u8>) {
        write_u32(buffer, 0x_0001_0000); // version
        write_u32(buffer, 0x_0001_0000); // fontRevision
        write_u32(buffer, 0); // checksumAdjustment
        write_u32(buffer, 0x_5f0f_3cf5); // magicNumber
        write_u16(buffer, 0x000b); // flags
        write_u16(buffer, 1_000); // unitsPerEm
        buffer.extend_from_slice(&[0; 16]); // created, modified
        for coord in self.font_bbox() {
            buffer.extend_from_slice(&coord.to_be_bytes());
        }
        write_u16(buffer, 0); // macStyle
        write_u16(buffer, 8); // lowestRecPPEM
        write_u16(buffer, 2); // fontDirectionHint
        write_u16(buffer, 0); // indexToLocFormat: short
        write_u16(buffer, 0); // glyphDataFormat
    }

    fn write_hhea(&self, buffer: &mut Vec<u8>) {
        write_u32(buffer, 0x_0001_0000); // version
        write_u16(buffer, 800); // ascender
        buffer.extend_from_slice(&(-200_i16).to_be_bytes()); // descender
        write_u16(buffer, 0); // lineGap
        write_u16(buffer, ADVANCE); // advanceWidthMax
        write_u16(buffer, X_MIN as u16); // minLeftSideBearing
        write_u16(buffer, 0); // minRightSideBearing
        write_u16(buffer, self.font_bbox()[2] as u16); // xMaxExtent
        write_u16(buffer, 1); // caretSlopeRise
        write_u16(buffer, 0); // caretSlopeRun
        write_u16(buffer, 0); // caretOffset
        buffer.extend_from_slice(&[0; 8]); // reserved
        write_u16(buffer, 0); // metricDataFormat
        write_u16(buffer, self.next_glyph_id()); // numberOfHMetrics
    }

    fn write_maxp(&self, buffer: &mut Vec<u8>) {
        write_u32(buffer, 0x_0001_0000); // version
        write_u16(buffer, self.next_glyph_id()); // numGlyphs
        write_u16(buffer, 4); // maxPoints
        write_u16(buffer, 1); // maxContours
        write_u16(buffer, 16); // maxCompositePoints
        write_u16(buffer, 4); // maxCompositeContours
        write_u16(buffer, 2); // maxZones
        buffer.extend_from_slice(&[0; 12]); // maxTwilightPoints .. maxSizeOfInstructions
        write_u16(buffer, 4); // maxComponentElements
        write_u16(buffer, 1); // maxComponentDepth
    }

    fn write_name(buffer: &mut Vec<u8>) {
        let family: Vec<u8> = "Test".encode_utf16().flat_map(u16::to_be_bytes).collect();
        write_u16(buffer, 0); // format
        write_u16(buffer, 1); // count
        write_u16(buffer, 18); // storageOffset
        write_u16(buffer, 3); // platformID: Windows
        write_u16(buffer, 1); // encodingID: Unicode BMP
        write_u16(buffer, 0x0409); // languageID: en-US
        write_u16(buffer, 1); // nameID: family
        write_u16(buffer, u16::try_from(family.len()).expect("name is too long"));
        write_u16(buffer, 0); // stringOffset
        buffer.extend_from_slice(&family);
    }

    fn write_os2(&self, buffer: &mut Vec<u8>) {
        let start = buffer.len();
        buffer.resize(start + 96, 0);
        let os2 = &mut buffer[start..];
        os2[0..2].copy_from_slice(&4_u16.to_be_bytes()); // version
        os2[2..4].copy_from_slice(&ADVANCE.to_be_bytes()); // xAvgCharWidth
        os2[4..6].copy_from_slice(&400_u16.to_be_bytes()); // usWeightClass
        os2[6..8].copy_from_slice(&5_u16.to_be_bytes()); // usWidthClass

        let codes = self
            .chars
            .keys()
            .map(|&ch| u16::try_from(u32::from(ch)).unwrap_or(u16::MAX))
            .chain(self.symbol_codes.keys().copied());
        let first = codes.clone().min().unwrap_or(u16::MAX);
        let last = codes.max().unwrap_or(0);
        os2[64..66].copy_from_slice(&first.to_be_bytes()); // usFirstCharIndex
        os2[66..68].copy_from_slice(&last.to_be_bytes()); // usLastCharIndex
    }

    fn write_post(&self, buffer: &mut Vec<u8>) {
        if !self.glyph_names {
            write_u32(buffer, 0x_0003_0000); // version 3: no glyph names
            buffer.extend_from_slice(&[0; 28]);
            return;
        }

        write_u32(buffer, 0x_0002_0000);
        buffer.extend_from_slice(&[0; 28]);
        write_u16(buffer, self.next_glyph_id()); // numGlyphs
        write_u16(buffer, 0); // `.notdef`
        for idx in 1..self.next_glyph_id() {
            write_u16(buffer, 257 + idx); // custom names start from 258
        }
        for idx in 1..self.next_glyph_id() {
            let name = format!("g{idx}");
            buffer.push(u8::try_from(name.len()).expect("name is too long"));
            buffer.extend_from_slice(name.as_bytes());
        }
    }

    fn write_glyph(&self, idx: usize, buffer: &mut Vec<u8>) {
        const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
        const ARGS_ARE_XY_VALUES: u16 = 0x0002;
        const MORE_COMPONENTS: u16 = 0x0020;

        let bbox = self.glyph_bbox(idx);
        match &self.glyphs[idx] {
            TestGlyph::Rectangle => {
                let [x_min, y_min, x_max, y_max] = bbox;
                write_u16(buffer, 1); // numberOfContours
                for coord in bbox {
                    write_u16(buffer, coord as u16);
                }
                write_u16(buffer, 3); // endPtsOfContours[0]
                write_u16(buffer, 0); // instructionLength
                buffer.extend_from_slice(&[0x01; 4]); // on-curve points with 16-bit deltas
                for dx in [x_min, 0, x_max - x_min, 0] {
                    write_u16(buffer, dx as u16);
                }
                for dy in [y_min, y_max - y_min, 0, y_min - y_max] {
                    write_u16(buffer, dy as u16);
                }
            }
            TestGlyph::Composite(components) => {
                write_u16(buffer, u16::MAX); // numberOfContours = -1
                for coord in bbox {
                    write_u16(buffer, coord as u16);
                }
                for (i, &component) in components.iter().enumerate() {
                    let mut flags = ARG_1_AND_2_ARE_WORDS | ARGS_ARE_XY_VALUES;
                    if i + 1 < components.len() {
                        flags |= MORE_COMPONENTS;
                    }
                    write_u16(buffer, flags);
                    write_u16(buffer, component);
                    write_u32(buffer, 0); // zero x and y offsets
                }
            }
        }
    }

    /// Writes `GSUB` with a separate lookup for each substitution.
    fn write_gsub(&self, buffer: &mut Vec<u8>) {
        let mut lookups = vec![];
        for &(from, to) in &self.single_substitutions {
            // Single substitution format 2
            let mut subtable = vec![];
            write_u16(&mut subtable, 2); // format
            write_u16(&mut subtable, 8); // coverageOffset
            write_u16(&mut subtable, 1); // glyphCount
            write_u16(&mut subtable, to);
            Self::write_coverage(from, &mut subtable);
            lookups.push((1, subtable));
        }
        for (components, ligature) in &self.ligatures {
            let mut subtable = vec![];
            write_u16(&mut subtable, 1); // format
            write_u16(&mut subtable, 8); // coverageOffset
            write_u16(&mut subtable, 1); // ligatureSetCount
            write_u16(&mut subtable, 14); // ligatureSetOffsets[0]
            Self::write_coverage(components[0], &mut subtable);
            write_u16(&mut subtable, 1); // ligatureCount
            write_u16(&mut subtable, 4); // ligatureOffsets[0]
            write_u16(&mut subtable, *ligature);
            write_u16(
                &mut subtable,
                u16::try_from(components.len()).expect("too many components"),
            );
            for &component in &components[1..] {
                write_u16(&mut subtable, component);
            }
            lookups.push((4, subtable));
        }
        Self::write_layout_table(*b"liga", &lookups, buffer);
    }

    /// Writes `GPOS` with a separate pair adjustment lookup for each kerning pair.
    fn write_gpos(&self, buffer: &mut Vec<u8>) {
        const X_ADVANCE: u16 = 0x0004;

        let mut lookups = vec![];
        for &(left, right, value) in &self.kerning_pairs {
            // Pair adjustment format 1
            let mut subtable = vec![];
            write_u16(&mut subtable, 1); // format
            write_u16(&mut subtable, 18); // coverageOffset
            write_u16(&mut subtable, X_ADVANCE); // valueFormat1
            write_u16(&mut subtable, 0); // valueFormat2
            write_u16(&mut subtable, 1); // pairSetCount
            write_u16(&mut subtable, 12); // pairSetOffsets[0]
            write_u16(&mut subtable, 1); // pairValueCount
            write_u16(&mut subtable, right);
            subtable.extend_from_slice(&value.to_be_bytes());
            Self::write_coverage(left, &mut subtable);
            lookups.push((2, subtable));
        }
        Self::write_layout_table(*b"kern", &lookups, buffer);
    }

    /// Writes a `GSUB` or `GPOS` table with the default script enabling a single feature
    /// that references all lookups. Each lookup has a single subtable.
    fn write_layout_table(feature: [u8; 4], lookups: &[(u16, Vec<u8>)], buffer: &mut Vec<u8>) {
        const SCRIPT_LIST_OFFSET: u16 = 10;
        const FEATURE_LIST_OFFSET: u16 = 30;

        let lookup_count = u16::try_from(lookups.len()).expect("too many lookups");
        write_u16(buffer, 1); // majorVersion
        write_u16(buffer, 0); // minorVersion
        write_u16(buffer, SCRIPT_LIST_OFFSET);
        write_u16(buffer, FEATURE_LIST_OFFSET);
        write_u16(buffer, FEATURE_LIST_OFFSET + 12 + 2 * lookup_count); // lookupListOffset

        write_u16(buffer, 1); // scriptCount
        buffer.extend_from_slice(b"DFLT");
        write_u16(buffer, 8); // scriptOffset
        write_u16(buffer, 4); // defaultLangSysOffset
        write_u16(buffer, 0); // langSysCount
        write_u16(buffer, 0); // lookupOrderOffset
        write_u16(buffer, u16::MAX); // requiredFeatureIndex: none
        write_u16(buffer, 1); // featureIndexCount
        write_u16(buffer, 0); // featureIndices[0]

        write_u16(buffer, 1); // featureCount
        buffer.extend_from_slice(&feature);
        write_u16(buffer, 8); // featureOffset
        write_u16(buffer, 0); // featureParamsOffset
        write_u16(buffer, lookup_count);
        for idx in 0..lookup_count {
            write_u16(buffer, idx);
        }

        write_u16(buffer, lookup_count);
        let mut offset = 2 + 2 * lookup_count;
        for (_, subtable) in lookups {
            write_u16(buffer, offset);
            offset += 8 + u16::try_from(subtable.len()).expect("subtable is too large");
        }
        for (lookup_type, subtable) in lookups {
            write_u16(buffer, *lookup_type);
            write_u16(buffer, 0); // lookupFlag
            write_u16(buffer, 1); // subTableCount
            write_u16(buffer, 8); // subtableOffsets[0]
            buffer.extend_from_slice(subtable);
        }
    }

    /// Writes a version 0 `kern` table with a single format 0 subtable.
    fn write_kern(&self, buffer: &mut Vec<u8>) {
        let mut pairs = self.kerning_pairs.clone();
        pairs.sort_unstable_by_key(|&(left, right, _)| (left, right));
        let pair_count = u16::try_from(pairs.len()).expect("too many kerning pairs");

        write_u16(buffer, 0); // version
        write_u16(buffer, 1); // nTables
        write_u16(buffer, 0); // subtable version
        write_u16(buffer, 14 + 6 * pair_count); // length
        write_u16(buffer, 1); // coverage: horizontal, format 0
        write_u16(buffer, pair_count);
        let entry_selector = pair_count.checked_ilog2().unwrap_or(0);
        let search_range = 6_u16 << entry_selector;
        write_u16(buffer, search_range);
        write_u16(buffer, u16::try_from(entry_selector).expect("cannot overflow"));
        write_u16(buffer, (6 * pair_count).saturating_sub(search_range)); // rangeShift
        for (left, right, value) in pairs {
            write_u16(buffer, left);
            write_u16(buffer, right);
            buffer.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn write_coverage(glyph: u16, buffer: &mut Vec<u8>) {
        write_u16(buffer, 1); // format
        write_u16(buffer, 1); // glyphCount
        write_u16(buffer, glyph);
    }
}
