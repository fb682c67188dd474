use std::{collections::BTreeSet, ops};

use allsorts::{
    binary::read::ReadScope,
    font::MatchingPresentation,
    font_data::{DynamicFontTableProvider, FontData},
    gsub::Features,
    layout::{PosLookup, SubstLookup},
    post::PostTable,
    tag,
};
use test_casing::{test_casing, Product};

use crate::{
    covered_chars,
    font::{gsub, Glyph},
    testing::TestFontBuilder,
    Font, FontSubset, ParseErrorKind, TableTag,
};

/// Glyph IDs in the test fonts. Printable ASCII chars are mapped to `1..=95`.
fn ascii_glyph(ch: char) -> u16 {
    u16::try_from(u32::from(ch) - 0x1f).unwrap()
}

const FI_LIGATURE: u16 = 96;
const ALTERNATE_A: u16 = 97;
const RING_ABOVE: u16 = 98;
const A_WITH_RING: u16 = 99;
const SYMBOL_A: u16 = 100;

#[derive(Debug, Clone, Copy)]
pub(crate) enum TestFont {
    /// Latin font with a char outside the BMP (forcing a format 12 `cmap` subtable).
    Latin,
    /// BMP font with `GSUB` substitutions, kerning pairs, glyph names, a composite glyph
    /// and a symbol `cmap` subtable.
    Layout,
}

impl TestFont {
    pub(crate) fn bytes(self) -> Vec<u8> {
        let builder = TestFontBuilder::new().with_chars(' '..='~');
        match self {
            Self::Latin => builder.with_chars(['é', '€', '😀']).build(),
            Self::Layout => builder
                .with_unmapped_glyph() // fi ligature
                .with_unmapped_glyph() // alternate form of `a`
                .with_unmapped_glyph() // ring above
                .with_composite_char('Å', &[ascii_glyph('A'), RING_ABOVE])
                .with_symbol_code(0xf041)
                .with_ligature(&[ascii_glyph('f'), ascii_glyph('i')], FI_LIGATURE)
                .with_single_substitution(ascii_glyph('a'), ALTERNATE_A)
                .with_kerning_pair(ascii_glyph('A'), ascii_glyph('V'), -80)
                .with_kerning_pair(ascii_glyph('T'), ascii_glyph('o'), -60)
                .with_glyph_names()
                .build(),
        }
    }
}

pub(crate) const FONTS: [TestFont; 2] = [TestFont::Latin, TestFont::Layout];

#[derive(Debug, Clone)]
pub(crate) enum TestCharSubset {
    Range(ops::RangeInclusive<char>),
    Str(&'static str),
}

impl TestCharSubset {
    pub(crate) fn into_set(self) -> BTreeSet<char> {
        match self {
            Self::Range(range) => range.collect(),
            Self::Str(s) => s.chars().collect(),
        }
    }
}

pub(crate) const SUBSET_CHARS: [TestCharSubset; 5] = [
    TestCharSubset::Range(' '..='~'),
    TestCharSubset::Range('a'..='z'),
    TestCharSubset::Range('0'..='9'),
    TestCharSubset::Str("Hello world!"),
    TestCharSubset::Str("A"),
];

fn subset(font: TestFont, chars: impl IntoIterator<Item = char>) -> Vec<u8> {
    let font_bytes = font.bytes();
    let font = Font::new(&font_bytes).unwrap();
    let chars: BTreeSet<char> = chars.into_iter().collect();
    FontSubset::new(&font, &chars)
        .unwrap()
        .to_truetype()
        .unwrap()
}

fn retained_glyphs(font_bytes: &[u8]) -> BTreeSet<u16> {
    let font = Font::new(font_bytes).unwrap();
    (0..font.glyph_count())
        .filter(|&idx| !matches!(font.glyph(idx).unwrap().inner, Glyph::Empty))
        .collect()
}

#[test]
fn reading_font() {
    let font_bytes = TestFont::Latin.bytes();
    let font = Font::new(&font_bytes).unwrap();

    let font_file = ReadScope::new(&font_bytes).read::<FontData>().unwrap();
    let font_provider = font_file.table_provider(0).unwrap();
    let mut reference_font = allsorts::Font::new(font_provider).unwrap();

    let test_str = "Hello, world! Café for 5€ 😀 ├└█▒";
    for ch in test_str.chars() {
        let id = font.map_char(ch).unwrap();
        let (expected_idx, _) =
            reference_font.lookup_glyph_index(ch, MatchingPresentation::NotRequired, None);
        assert_eq!(id, expected_idx, "{ch:?}");
    }
}

#[test]
fn covered_chars_are_read_from_cmap() {
    let font_bytes = TestFont::Latin.bytes();
    let chars = covered_chars(&font_bytes).unwrap();
    let mut expected: BTreeSet<char> = (' '..='~').collect();
    expected.extend(['é', '€', '😀']);
    assert_eq!(chars, expected);
    assert_eq!(Font::new(&font_bytes).unwrap().chars(), expected);
}

#[test]
fn cff_fonts_are_rejected_but_can_be_inventoried() {
    let font_bytes = TestFontBuilder::new()
        .with_chars('A'..='Z')
        .with_cff_outlines()
        .build();
    let err = Font::new(&font_bytes).unwrap_err();
    assert!(
        matches!(err.kind(), ParseErrorKind::UnsupportedOutlines),
        "{err}"
    );

    let chars = covered_chars(&font_bytes).unwrap();
    assert_eq!(chars, ('A'..='Z').collect::<BTreeSet<_>>());
}

#[test]
fn non_font_data_is_rejected() {
    let err = Font::new(b"PK\x03\x04 definitely not a font").unwrap_err();
    assert!(
        matches!(err.kind(), ParseErrorKind::UnexpectedFontVersion),
        "{err}"
    );
    covered_chars(b"").unwrap_err();
}

#[test_casing(10, Product((FONTS, SUBSET_CHARS)))]
fn subsetting_font(font: TestFont, chars: TestCharSubset) {
    let font_bytes = font.bytes();
    let chars = chars.into_set();
    let font = Font::new(&font_bytes).unwrap();
    let subset = FontSubset::new(&font, &chars).unwrap();

    let ttf = subset.to_truetype().unwrap();
    assert_valid_font(&ttf, true, chars.iter().copied());
    let woff2 = subset.to_woff2().unwrap();
    assert_valid_font(&woff2, false, chars.iter().copied());
}

fn assert_valid_font(raw: &[u8], is_ttf: bool, expected_chars: impl Iterator<Item = char>) {
    if is_ttf {
        Font::new(raw).unwrap();
        assert_eq!(Font::checksum(raw), Font::SFNT_CHECKSUM);
    } else {
        assert_eq!(&raw[..4], b"wOF2");
        assert_eq!(raw.len() % 4, 0);
    }

    let font_file = ReadScope::new(raw).read::<FontData>().unwrap();
    let font_provider = font_file.table_provider(0).unwrap();
    let mut font = allsorts::Font::new(font_provider).unwrap();
    for ch in expected_chars {
        let (glyph_id, _) = font.lookup_glyph_index(ch, MatchingPresentation::NotRequired, None);
        assert_ne!(glyph_id, 0, "{ch:?}");
    }
}

#[test]
fn glyph_ids_are_retained() {
    let font_bytes = TestFont::Layout.bytes();
    let original = Font::new(&font_bytes).unwrap();
    let ttf = subset(TestFont::Layout, "xyz".chars());

    let font = Font::new(&ttf).unwrap();
    assert_eq!(font.glyph_count(), original.glyph_count());
    for ch in "xyz".chars() {
        assert_eq!(font.map_char(ch).unwrap(), ascii_glyph(ch));
    }
    assert_eq!(font.map_char('a').unwrap(), 0);
    assert_eq!(font.chars(), BTreeSet::from(['x', 'y', 'z']));

    let retained = retained_glyphs(&ttf);
    let expected = [0, ascii_glyph('x'), ascii_glyph('y'), ascii_glyph('z')];
    assert_eq!(retained, BTreeSet::from(expected));
    let dropped = font.glyph(ascii_glyph('a')).unwrap();
    assert_eq!((dropped.advance, dropped.lsb), (0, 0));
}

#[test]
fn ligatures_are_retained_only_with_all_components() {
    let font_bytes = TestFont::Layout.bytes();
    let font = Font::new(&font_bytes).unwrap();
    let subset = FontSubset::new(&font, &['f', 'i'].into()).unwrap();
    assert!(subset.contains_glyph(FI_LIGATURE));
    assert!(retained_glyphs(&subset.to_truetype().unwrap()).contains(&FI_LIGATURE));

    let subset = FontSubset::new(&font, &['f'].into()).unwrap();
    assert!(!subset.contains_glyph(FI_LIGATURE));
}

#[test]
fn single_substitutions_are_followed() {
    let font_bytes = TestFont::Layout.bytes();
    let font = Font::new(&font_bytes).unwrap();
    let subset = FontSubset::new(&font, &['a'].into()).unwrap();
    assert!(subset.contains_glyph(ALTERNATE_A));
    assert_eq!(subset.retained_glyph_count(), 3);
}

#[test]
fn composite_glyph_components_are_retained() {
    let ttf = subset(TestFont::Layout, ['Å']);
    let retained = retained_glyphs(&ttf);
    let expected = [0, ascii_glyph('A'), RING_ABOVE, A_WITH_RING];
    assert_eq!(retained, BTreeSet::from(expected));

    let font = Font::new(&ttf).unwrap();
    let glyph = font.glyph(A_WITH_RING).unwrap();
    let components: Vec<_> = glyph.inner.component_indices().collect();
    assert_eq!(components, [ascii_glyph('A'), RING_ABOVE]);
}

#[test]
fn symbol_cmap_is_subset() {
    let ttf = subset(TestFont::Layout, ['A']);
    let font = Font::new(&ttf).unwrap();
    let entries: Vec<_> = font.char_maps.symbol_entries().collect();
    assert_eq!(entries, [(0xf041, SYMBOL_A)]);
    assert!(retained_glyphs(&ttf).contains(&SYMBOL_A));

    let ttf = subset(TestFont::Layout, ['B']);
    let font = Font::new(&ttf).unwrap();
    assert!(font.char_maps.symbol.is_none());
    assert!(!retained_glyphs(&ttf).contains(&SYMBOL_A));
}

#[test]
fn subsetting_many_scattered_chars() {
    // Each char forms a separate `cmap` segment, which overflows a format 4 subtable.
    let chars: BTreeSet<char> = (0..9_000)
        .map(|i| char::from_u32(0x4e00 + 2 * i).unwrap())
        .collect();
    let font_bytes = TestFontBuilder::new()
        .with_chars(['A'])
        .with_aliased_chars(chars.iter().copied(), 1)
        .build();
    let font = Font::new(&font_bytes).unwrap();
    let covered = covered_chars(&font_bytes).unwrap();
    assert_eq!(covered.len(), 9_001);

    let subset = FontSubset::new(&font, &chars).unwrap();
    let ttf = subset.to_truetype().unwrap();
    let font = Font::new(&ttf).unwrap();
    assert_eq!(font.chars(), chars);
    assert_eq!(font.map_char('\u{4e02}').unwrap(), 1);
    assert_eq!(font.map_char('\u{4e01}').unwrap(), 0);

    let woff2 = subset.to_woff2().unwrap();
    assert_valid_font(&woff2, false, chars.iter().copied().step_by(100));
}

#[test]
fn chars_outside_bmp_are_ignored_for_bmp_fonts() {
    let ttf = subset(TestFont::Layout, ['A', '😀']);
    let font = Font::new(&ttf).unwrap();
    assert_eq!(font.chars(), BTreeSet::from(['A']));
}

fn head_table(ttf: &[u8]) -> Vec<u8> {
    Font::new(ttf).unwrap().head.to_vec()
}

#[test]
fn head_bounding_box_is_recomputed() {
    let ttf = subset(TestFont::Latin, ['A']);
    let head = head_table(&ttf);
    let bbox: Vec<_> = head[Font::HEAD_BBOX_OFFSET..Font::HEAD_BBOX_OFFSET + 8]
        .chunks(2)
        .map(|chunk| i16::from_be_bytes([chunk[0], chunk[1]]))
        .collect();
    // Glyph #`i` spans `50..=450 + 10 * i` horizontally
    let x_max = 450 + 10 * i16::try_from(ascii_glyph('A')).unwrap();
    assert_eq!(bbox, [50, 0, x_max, 700]);
}

#[test]
fn modified_timestamp_can_be_pinned() {
    let font_bytes = TestFont::Latin.bytes();
    let font = Font::new(&font_bytes).unwrap();
    let chars = ('a'..='z').collect();
    let subset = FontSubset::new(&font, &chars)
        .unwrap()
        .with_modified_timestamp(1_700_000_000);

    let ttf = subset.to_truetype().unwrap();
    let head = head_table(&ttf);
    let modified = &head[Font::HEAD_MODIFIED_OFFSET..Font::HEAD_MODIFIED_OFFSET + 8];
    assert_eq!(modified, (1_700_000_000_i64 + 2_082_844_800).to_be_bytes());

    assert_eq!(ttf, subset.to_truetype().unwrap());
    assert_eq!(subset.to_woff2().unwrap(), subset.to_woff2().unwrap());
}

#[test]
fn os2_char_range_is_updated() {
    let ttf = subset(TestFont::Latin, 'a'..='c');
    let font = Font::new(&ttf).unwrap();
    let first = u16::from_be_bytes([font.os2[64], font.os2[65]]);
    let last = u16::from_be_bytes([font.os2[66], font.os2[67]]);
    assert_eq!((first, last), (0x61, 0x63));
}

fn allsorts_font(raw: &[u8]) -> allsorts::Font<DynamicFontTableProvider<'_>> {
    let font_file = ReadScope::new(raw).read::<FontData<'_>>().unwrap();
    allsorts::Font::new(font_file.table_provider(0).unwrap()).unwrap()
}

/// Returns the number of subtables in each `GSUB` lookup.
fn gsub_subtable_counts(raw: &[u8]) -> Vec<usize> {
    let mut font = allsorts_font(raw);
    let cache = font.gsub_cache().unwrap().unwrap();
    let lookups = cache.layout_table.opt_lookup_list.as_ref().unwrap();
    (0..2)
        .map(|idx| match &lookups.lookup_cache_gsub(&cache, idx).unwrap().lookup_subtables {
            SubstLookup::SingleSubst(subtables) => subtables.len(),
            SubstLookup::LigatureSubst(subtables) => subtables.len(),
            _ => unreachable!(),
        })
        .collect()
}

/// Returns the number of subtables in each `GPOS` lookup.
fn gpos_subtable_counts(raw: &[u8]) -> Vec<usize> {
    let mut font = allsorts_font(raw);
    let cache = font.gpos_cache().unwrap().unwrap();
    let lookups = cache.layout_table.opt_lookup_list.as_ref().unwrap();
    (0..2)
        .map(|idx| match &lookups.lookup_cache_gpos(&cache, idx).unwrap().lookup_subtables {
            PosLookup::PairPos(subtables) => subtables.len(),
            _ => unreachable!(),
        })
        .collect()
}

/// Shapes `text` with kerning enabled and returns the kerning of each glyph.
fn kerning(raw: &[u8], text: &str) -> Vec<i16> {
    let mut font = allsorts_font(raw);
    let glyphs = font.map_glyphs(text, tag::LATN, MatchingPresentation::NotRequired);
    let infos = font
        .shape(glyphs, tag::LATN, None, &Features::default(), None, true)
        .unwrap();
    infos.iter().map(|info| info.kerning).collect()
}

#[test]
fn layout_tables_shrink_with_dropped_glyphs() {
    let font_bytes = TestFont::Layout.bytes();
    let original = Font::new(&font_bytes).unwrap();
    assert_eq!(gsub_subtable_counts(&font_bytes), [1, 1]);
    assert_eq!(gpos_subtable_counts(&font_bytes), [1, 1]);

    let ttf = subset(TestFont::Layout, ['f', 'i']);
    let font = Font::new(&ttf).unwrap();
    for tag in [TableTag::GSUB, TableTag::GPOS] {
        let pruned = font.passthrough_table(tag).unwrap();
        let original = original.passthrough_table(tag).unwrap();
        assert!(pruned.len() < original.len(), "{tag}");
    }
    // The substitution of `a` is dropped; the `fi` ligature is retained.
    assert_eq!(gsub_subtable_counts(&ttf), [0, 1]);
    assert_eq!(gpos_subtable_counts(&ttf), [0, 0]);

    let gsub = font.passthrough_table(TableTag::GSUB).unwrap();
    let mut glyphs = BTreeSet::from([ascii_glyph('f'), ascii_glyph('i')]);
    gsub::close_over(gsub, &mut glyphs).unwrap();
    assert!(glyphs.contains(&FI_LIGATURE));
}

#[test]
fn kerning_is_retained_for_retained_glyphs() {
    let font_bytes = TestFont::Layout.bytes();
    assert_eq!(kerning(&font_bytes, "AV"), [-80, 0]);
    assert_eq!(kerning(&font_bytes, "To"), [-60, 0]);

    let ttf = subset(TestFont::Layout, "AVo".chars());
    assert_eq!(gpos_subtable_counts(&ttf), [1, 0]);
    assert_eq!(kerning(&ttf, "AV"), [-80, 0]);
    assert_eq!(kerning(&ttf, "To"), [0, 0]);

    // Legacy `kern` table only retains the `AV` pair.
    let font = Font::new(&ttf).unwrap();
    let kern = font.passthrough_table(TableTag::KERN).unwrap();
    let pair_count = u16::from_be_bytes([kern[10], kern[11]]);
    assert_eq!(pair_count, 1);
    let mut expected_pair = vec![];
    expected_pair.extend_from_slice(&ascii_glyph('A').to_be_bytes());
    expected_pair.extend_from_slice(&ascii_glyph('V').to_be_bytes());
    expected_pair.extend_from_slice(&(-80_i16).to_be_bytes());
    assert_eq!(kern[18..], expected_pair);
}

#[test]
fn glyph_names_are_pruned() {
    let font_bytes = TestFont::Layout.bytes();
    let ttf = subset(TestFont::Layout, "AV".chars());
    let original_post = Font::new(&font_bytes).unwrap().post;
    let post = Font::new(&ttf).unwrap().post;
    assert!(post.len() < original_post.len());

    let post = ReadScope::new(post).read::<PostTable<'_>>().unwrap();
    let name = |ch| post.glyph_name(ascii_glyph(ch)).unwrap();
    assert_eq!(name('A'), Some("g34"));
    assert_eq!(name('V'), Some("g55"));
    assert_eq!(name('B'), Some(".notdef"));
    assert_eq!(post.glyph_name(0).unwrap(), Some(".notdef"));
}
