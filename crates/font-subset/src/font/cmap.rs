//! Character maps (the `cmap` table).
//!
//! Only subtables mapping single chars are used: segment mapping to delta values (format 4)
//! and segmented coverage (format 12). The best Unicode subtable maps chars for subsetting;
//! the Windows symbol subtable, if present, is carried over to subsets.

use std::collections::BTreeSet;

use super::Cursor;
use crate::{
    errors::{MapError, ParseErrorKind},
    ParseError,
};

/// Segment of a format 4 subtable.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SegmentWithDelta {
    pub(crate) start_code: u16,
    pub(crate) end_code: u16,
    pub(crate) id_delta: u16,
    pub(crate) id_range_offset: u16,
}

impl SegmentWithDelta {
    fn codes(&self) -> impl Iterator<Item = u16> {
        self.start_code..=self.end_code
    }
}

/// Finds the first item whose range end is `>= code`, and checks that the range contains `code`.
fn find_range<T, C: Ord + Copy>(
    items: &[T],
    code: C,
    bounds: impl Fn(&T) -> (C, C),
) -> Option<usize> {
    let idx = items.partition_point(|item| bounds(item).1 < code);
    let (start, _) = bounds(items.get(idx)?);
    (start <= code).then_some(idx)
}

/// Segment mapping to delta values (format 4) subtable.
#[derive(Debug, Clone)]
pub(crate) struct SegmentDeltas<'a> {
    pub(crate) segments: Vec<SegmentWithDelta>,
    /// Data following `idRangeOffset`s; indexed by non-zero range offsets.
    pub(crate) glyph_id_array: &'a [u8],
}

impl<'a> SegmentDeltas<'a> {
    pub(crate) const FORMAT: u16 = 4;
    const HEADER_LEN: usize = 14;

    fn parse(subtable: Cursor<'a>) -> Result<Self, ParseError> {
        let declared_len = usize::from(subtable.u16_at(2)?);
        if declared_len < Self::HEADER_LEN {
            return Err(subtable.err(ParseErrorKind::UnexpectedTableLen {
                expected: Self::HEADER_LEN,
                actual: declared_len,
            }));
        }
        // Some fonts declare a length exceeding the table; clamp to the available data.
        let mut cursor = subtable.range(0..declared_len.min(subtable.bytes.len()))?;
        cursor.skip(6)?; // format, length, language

        let segment_count = usize::from(cursor.read_u16()? / 2);
        cursor.skip(6)?; // searchRange, entrySelector, rangeShift
        let array_len = 2 * segment_count;
        let end_codes = cursor.split_at(array_len)?;
        cursor.skip(2)?; // reservedPad
        let start_codes = cursor.split_at(array_len)?;
        let id_deltas = cursor.split_at(array_len)?;
        let id_range_offsets = cursor.split_at(array_len)?;

        let segments = (0..segment_count)
            .map(|i| {
                Ok(SegmentWithDelta {
                    start_code: start_codes.u16_at(2 * i)?,
                    end_code: end_codes.u16_at(2 * i)?,
                    id_delta: id_deltas.u16_at(2 * i)?,
                    id_range_offset: id_range_offsets.u16_at(2 * i)?,
                })
            })
            .collect::<Result<_, ParseError>>()?;
        Ok(Self {
            segments,
            glyph_id_array: cursor.bytes,
        })
    }

    fn map_char(&self, ch: char) -> Result<u16, MapError> {
        let code = u16::try_from(u32::from(ch)).map_err(|_| MapError::CharTooLarge)?;
        match find_range(&self.segments, code, |segment| (segment.start_code, segment.end_code)) {
            Some(idx) => self.map_in_segment(idx, code),
            None => Ok(0),
        }
    }

    fn map_in_segment(&self, segment_idx: usize, code: u16) -> Result<u16, MapError> {
        let segment = &self.segments[segment_idx];
        if segment.id_range_offset == 0 {
            return Ok(segment.id_delta.wrapping_add(code));
        }

        // The range offset is relative to the segment's own `idRangeOffset` entry; translate it
        // to an offset in `glyph_id_array`, which starts right after the last entry.
        let entry_offset = usize::from(segment.id_range_offset)
            + 2 * usize::from(code - segment.start_code);
        let array_offset = entry_offset
            .checked_sub(2 * (self.segments.len() - segment_idx))
            .ok_or(MapError::InvalidOffset)?;
        let glyph_id = self
            .glyph_id_array
            .get(array_offset..array_offset + 2)
            .map(|bytes| u16::from_be_bytes([bytes[0], bytes[1]]))
            .ok_or(MapError::InvalidOffset)?;
        Ok(if glyph_id == 0 {
            0
        } else {
            segment.id_delta.wrapping_add(glyph_id)
        })
    }

    /// Iterates over all `(code, glyph)` pairs with a non-missing glyph.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.segments
            .iter()
            .enumerate()
            // The final 0xffff segment is a required terminator rather than a mapping.
            .filter(|(_, segment)| segment.start_code != u16::MAX)
            .flat_map(move |(idx, segment)| {
                segment.codes().filter_map(move |code| {
                    let glyph_idx = self.map_in_segment(idx, code).ok()?;
                    (glyph_idx != 0).then_some((code, glyph_idx))
                })
            })
    }
}

/// Group of a format 12 subtable mapping consecutive chars to consecutive glyphs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SequentialMapGroup {
    pub(crate) start_char_code: u32,
    pub(crate) end_char_code: u32,
    pub(crate) start_glyph_id: u32,
}

impl SequentialMapGroup {
    /// Maps a code from this group without checking group bounds.
    pub(crate) fn map_unchecked(&self, ch: char) -> u32 {
        u32::from(ch) - self.start_char_code + self.start_glyph_id
    }

    fn glyph(&self, code: u32) -> u16 {
        (code - self.start_char_code)
            .checked_add(self.start_glyph_id)
            .and_then(|glyph_id| u16::try_from(glyph_id).ok())
            .unwrap_or(0)
    }
}

/// Segmented coverage (format 12) subtable.
#[derive(Debug, Default, Clone)]
pub(crate) struct SegmentedCoverage {
    pub(crate) groups: Vec<SequentialMapGroup>,
}

impl SegmentedCoverage {
    pub(crate) const FORMAT: u16 = 12;
    const HEADER_LEN: usize = 16;
    const GROUP_LEN: usize = 12;

    fn parse(subtable: Cursor<'_>) -> Result<Self, ParseError> {
        let mut cursor = subtable;
        cursor.skip(4)?; // format, reserved
        let declared_len = cursor.read_u32()? as usize;
        cursor.skip(4)?; // language
        let group_count = cursor.read_u32()? as usize;

        let expected_len = group_count
            .checked_mul(Self::GROUP_LEN)
            .and_then(|len| len.checked_add(Self::HEADER_LEN))
            .ok_or_else(|| subtable.err(ParseErrorKind::UnexpectedEof))?;
        if declared_len < expected_len {
            return Err(subtable.err(ParseErrorKind::UnexpectedTableLen {
                expected: expected_len,
                actual: declared_len,
            }));
        }

        let groups = (0..group_count)
            .map(|_| {
                Ok(SequentialMapGroup {
                    start_char_code: cursor.read_u32()?,
                    end_char_code: cursor.read_u32()?,
                    start_glyph_id: cursor.read_u32()?,
                })
            })
            .collect::<Result<_, ParseError>>()?;
        Ok(Self { groups })
    }

    fn map_char(&self, ch: char) -> u16 {
        let code = u32::from(ch);
        find_range(&self.groups, code, |group| {
            (group.start_char_code, group.end_char_code)
        })
        .map_or(0, |idx| self.groups[idx].glyph(code))
    }

    fn entries(&self) -> impl Iterator<Item = (char, u16)> + '_ {
        self.groups.iter().flat_map(|group| {
            let end = group.end_char_code.min(u32::from(char::MAX));
            (group.start_char_code..=end).filter_map(move |code| {
                let glyph_idx = group.glyph(code);
                (glyph_idx != 0).then_some((char::from_u32(code)?, glyph_idx))
            })
        })
    }
}

/// Unicode subtable of the `cmap` table.
#[derive(Debug, Clone)]
pub(crate) enum CmapTable<'a> {
    Deltas(SegmentDeltas<'a>),
    Coverage(SegmentedCoverage),
}

impl CmapTable<'_> {
    pub(crate) const UNICODE_PLATFORM: u16 = 0;
    pub(crate) const WINDOWS_PLATFORM: u16 = 3;
    pub(crate) const WINDOWS_SYMBOL_ENCODING: u16 = 0;

    pub(super) fn map_char(&self, ch: char) -> Result<u16, MapError> {
        match self {
            Self::Deltas(deltas) => deltas.map_char(ch),
            Self::Coverage(coverage) => Ok(coverage.map_char(ch)),
        }
    }

    fn entries(&self) -> Box<dyn Iterator<Item = (char, u16)> + '_> {
        match self {
            Self::Deltas(deltas) => Box::new(deltas.entries().filter_map(|(code, glyph_idx)| {
                Some((char::from_u32(code.into())?, glyph_idx))
            })),
            Self::Coverage(coverage) => Box::new(coverage.entries()),
        }
    }
}

/// Encoding record from the `cmap` header.
#[derive(Debug, Clone, Copy)]
struct EncodingRecord {
    platform_id: u16,
    encoding_id: u16,
    offset: usize,
}

impl EncodingRecord {
    /// Preference of this record for mapping Unicode chars; lower is better.
    /// Returns `None` for non-Unicode encodings (incl. variation sequences, 0/5).
    fn unicode_rank(self) -> Option<u8> {
        Some(match (self.platform_id, self.encoding_id) {
            (CmapTable::WINDOWS_PLATFORM, 10) => 0,
            (CmapTable::UNICODE_PLATFORM, 4 | 6) => 1,
            (CmapTable::WINDOWS_PLATFORM, 1) => 2,
            (CmapTable::UNICODE_PLATFORM, 3) => 3,
            (CmapTable::UNICODE_PLATFORM, 0..=2) => 4,
            _ => return None,
        })
    }

    fn is_symbol(self) -> bool {
        self.platform_id == CmapTable::WINDOWS_PLATFORM
            && self.encoding_id == CmapTable::WINDOWS_SYMBOL_ENCODING
    }
}

/// Character maps of a font relevant for subsetting.
#[derive(Debug, Clone, Default)]
pub(crate) struct CharMaps<'a> {
    /// Best Unicode subtable: format 12 is preferred to format 4; then, the platform / encoding
    /// is ranked as 3/10, 0/4, 3/1, 0/3.
    pub(crate) unicode: Option<CmapTable<'a>>,
    /// Windows symbol subtable (platform 3, encoding 0) in format 4.
    pub(crate) symbol: Option<SegmentDeltas<'a>>,
}

impl<'a> CharMaps<'a> {
    pub(crate) fn parse(table: Cursor<'a>) -> Result<Self, ParseError> {
        let mut cursor = table;
        cursor.read_u16_checked(|version| match version {
            0 => Ok(()),
            _ => Err(ParseErrorKind::UnexpectedTableVersion(version.into())),
        })?;
        let record_count = cursor.read_u16()?;
        let records = (0..record_count)
            .map(|_| {
                Ok(EncodingRecord {
                    platform_id: cursor.read_u16()?,
                    encoding_id: cursor.read_u16()?,
                    offset: cursor.read_u32()? as usize,
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        let mut unicode_candidates = vec![];
        let mut symbol = None;
        for record in records {
            let subtable = table.at(record.offset)?;
            let format = subtable.u16_at(0)?;
            if let Some(rank) = record.unicode_rank() {
                if format == SegmentDeltas::FORMAT || format == SegmentedCoverage::FORMAT {
                    let is_legacy = format != SegmentedCoverage::FORMAT;
                    unicode_candidates.push((is_legacy, rank, subtable));
                }
            } else if record.is_symbol() && format == SegmentDeltas::FORMAT && symbol.is_none() {
                symbol = Some(SegmentDeltas::parse(subtable)?);
            }
        }

        // The sort is stable, so equally ranked subtables keep the header order.
        unicode_candidates.sort_by_key(|&(is_legacy, rank, _)| (is_legacy, rank));
        let unicode = match unicode_candidates.first() {
            None => None,
            Some(&(true, _, subtable)) => {
                Some(CmapTable::Deltas(SegmentDeltas::parse(subtable)?))
            }
            Some(&(false, _, subtable)) => {
                Some(CmapTable::Coverage(SegmentedCoverage::parse(subtable)?))
            }
        };
        Ok(Self { unicode, symbol })
    }

    /// Returns chars mapped to existing non-missing glyphs by the Unicode subtable.
    pub(crate) fn covered_chars(&self, glyph_count: u16) -> BTreeSet<char> {
        let Some(cmap) = &self.unicode else {
            return BTreeSet::new();
        };
        cmap.entries()
            .filter_map(|(ch, glyph_idx)| (glyph_idx < glyph_count).then_some(ch))
            .collect()
    }

    /// Returns `(code, glyph)` entries of the symbol subtable.
    pub(crate) fn symbol_entries(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.symbol.iter().flat_map(SegmentDeltas::entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deltas(
        segments: &[(u16, u16, u16, u16)],
        glyph_id_array: &'static [u8],
    ) -> SegmentDeltas<'static> {
        let segments = segments
            .iter()
            .map(|&(start_code, end_code, id_delta, id_range_offset)| SegmentWithDelta {
                start_code,
                end_code,
                id_delta,
                id_range_offset,
            })
            .collect();
        SegmentDeltas {
            segments,
            glyph_id_array,
        }
    }

    #[test]
    fn mapping_with_deltas() {
        let delta = 0_u16.wrapping_sub(0x40);
        let table = deltas(&[(0x41, 0x43, delta, 0), (0xffff, 0xffff, 1, 0)], &[]);
        assert_eq!(table.map_char('A'), Ok(1));
        assert_eq!(table.map_char('C'), Ok(3));
        assert_eq!(table.map_char('D'), Ok(0));
        assert_eq!(table.map_char('@'), Ok(0));
        assert_eq!(table.map_char('😀'), Err(MapError::CharTooLarge));
        let entries: Vec<_> = table.entries().collect();
        assert_eq!(entries, [(0x41, 1), (0x42, 2), (0x43, 3)]);
    }

    #[test]
    fn mapping_with_glyph_id_array() {
        // The first segment's offset points right past the `idRangeOffset` array (2 segments).
        let table = deltas(&[(0x61, 0x62, 0, 4), (0xffff, 0xffff, 1, 0)], &[0, 7, 0, 0]);
        assert_eq!(table.map_char('a'), Ok(7));
        assert_eq!(table.map_char('b'), Ok(0));
        let entries: Vec<_> = table.entries().collect();
        assert_eq!(entries, [(0x61, 7)]);

        let broken = deltas(&[(0x61, 0x62, 0, 2), (0xffff, 0xffff, 1, 0)], &[]);
        assert_eq!(broken.map_char('a'), Err(MapError::InvalidOffset));
    }

    #[test]
    fn mapping_with_coverage() {
        let table = SegmentedCoverage {
            groups: vec![
                SequentialMapGroup {
                    start_char_code: 0x41,
                    end_char_code: 0x5a,
                    start_glyph_id: 1,
                },
                SequentialMapGroup {
                    start_char_code: 0x1f600,
                    end_char_code: 0x1f601,
                    start_glyph_id: 100,
                },
            ],
        };
        assert_eq!(table.map_char('A'), 1);
        assert_eq!(table.map_char('Z'), 26);
        assert_eq!(table.map_char('a'), 0);
        assert_eq!(table.map_char('😁'), 101);
        assert_eq!(table.entries().count(), 28);
    }

    #[test]
    fn unicode_encodings_are_ranked() {
        let record = |platform_id, encoding_id| EncodingRecord {
            platform_id,
            encoding_id,
            offset: 0,
        };
        let ranks: Vec<_> = [(3, 10), (0, 4), (3, 1), (0, 3), (0, 5), (3, 0), (1, 0)]
            .into_iter()
            .map(|(platform, encoding)| record(platform, encoding).unicode_rank())
            .collect();
        assert_eq!(ranks, [Some(0), Some(1), Some(2), Some(3), None, None, None]);
        assert!(record(3, 0).is_symbol());
    }
}
