//! Serialization of the `cmap` table.

use super::{search_params, write_u16, write_u32};
use crate::{
    font::{
        CharMaps, CmapTable, SegmentDeltas, SegmentWithDelta, SegmentedCoverage,
        SequentialMapGroup,
    },
    TableTag, WriteError,
};

const OVERFLOW: WriteError = WriteError::TableOverflow(TableTag::CMAP);

/// Groups a char map sorted by chars into runs of consecutive chars mapped to consecutive glyphs.
fn group_runs(map: &[(char, u16)]) -> SegmentedCoverage {
    let mut groups: Vec<SequentialMapGroup> = vec![];
    for &(ch, glyph_idx) in map {
        let code = u32::from(ch);
        if let Some(group) = groups.last_mut() {
            if code == group.end_char_code + 1 && u32::from(glyph_idx) == group.map_unchecked(ch) {
                group.end_char_code = code;
                continue;
            }
        }
        groups.push(SequentialMapGroup {
            start_char_code: code,
            end_char_code: code,
            start_glyph_id: glyph_idx.into(),
        });
    }
    SegmentedCoverage { groups }
}

impl SegmentDeltas<'static> {
    /// Encodes groups as delta segments. All chars in `coverage` must be in the BMP.
    #[allow(clippy::cast_possible_truncation)]
    fn from_groups(coverage: &SegmentedCoverage) -> Self {
        let mut segments: Vec<_> = coverage
            .groups
            .iter()
            .map(|group| {
                let start_code = group.start_char_code as u16;
                SegmentWithDelta {
                    start_code,
                    end_code: group.end_char_code as u16,
                    id_delta: (group.start_glyph_id as u16).wrapping_sub(start_code),
                    id_range_offset: 0,
                }
            })
            .collect();
        // Mandatory final segment; the delta maps 0xffff to the missing glyph.
        segments.push(SegmentWithDelta {
            start_code: u16::MAX,
            end_code: u16::MAX,
            id_delta: 1,
            id_range_offset: 0,
        });
        Self {
            segments,
            glyph_id_array: &[],
        }
    }
}

impl SegmentDeltas<'_> {
    /// Length of the encoded subtable. Must fit into `u16`.
    fn encoded_len(segment_count: usize, glyph_id_array_len: usize) -> usize {
        16 + 8 * segment_count + glyph_id_array_len
    }

    fn write(&self, buffer: &mut Vec<u8>) -> Result<(), WriteError> {
        let len = Self::encoded_len(self.segments.len(), self.glyph_id_array.len());
        let len = u16::try_from(len).map_err(|_| OVERFLOW)?;
        // `len` bounds the segment count by 8_190, so doubling it cannot overflow.
        let segment_count = u16::try_from(self.segments.len()).map_err(|_| OVERFLOW)?;

        write_u16(buffer, Self::FORMAT);
        write_u16(buffer, len);
        write_u16(buffer, 0); // language
        write_u16(buffer, 2 * segment_count);
        for param in search_params(segment_count, 2) {
            write_u16(buffer, param);
        }

        let columns: [fn(&SegmentWithDelta) -> u16; 4] = [
            |segment| segment.end_code,
            |segment| segment.start_code,
            |segment| segment.id_delta,
            |segment| segment.id_range_offset,
        ];
        for (i, column) in columns.into_iter().enumerate() {
            if i == 1 {
                write_u16(buffer, 0); // reservedPad
            }
            for segment in &self.segments {
                write_u16(buffer, column(segment));
            }
        }
        buffer.extend_from_slice(self.glyph_id_array);
        Ok(())
    }
}

impl SegmentedCoverage {
    fn write(&self, buffer: &mut Vec<u8>) -> Result<(), WriteError> {
        let group_count = u32::try_from(self.groups.len()).map_err(|_| OVERFLOW)?;
        let len = group_count
            .checked_mul(12)
            .and_then(|len| len.checked_add(16))
            .ok_or(OVERFLOW)?;
        write_u16(buffer, Self::FORMAT);
        write_u16(buffer, 0); // reserved
        write_u32(buffer, len);
        write_u32(buffer, 0); // language
        write_u32(buffer, group_count);
        for group in &self.groups {
            write_u32(buffer, group.start_char_code);
            write_u32(buffer, group.end_char_code);
            write_u32(buffer, group.start_glyph_id);
        }
        Ok(())
    }
}

impl CmapTable<'_> {
    /// Encoding IDs for the Unicode and Windows platforms appropriate for this subtable.
    fn encodings(&self) -> [u16; 2] {
        match self {
            Self::Deltas(_) => [3, 1],
            Self::Coverage(_) => [4, 10],
        }
    }

    fn write(&self, buffer: &mut Vec<u8>) -> Result<(), WriteError> {
        match self {
            Self::Deltas(deltas) => deltas.write(buffer),
            Self::Coverage(coverage) => coverage.write(buffer),
        }
    }
}

impl CharMaps<'static> {
    /// Creates char maps for a subset. The Unicode subtable uses format 4 if all chars are
    /// in the BMP and the segments fit into the 16-bit subtable length, and format 12 otherwise.
    /// The symbol subtable is created only for a non-empty `symbol_map`.
    pub(crate) fn from_maps(char_map: &[(char, u16)], symbol_map: &[(char, u16)]) -> Self {
        let coverage = group_runs(char_map);
        let in_bmp = char_map
            .last()
            .is_none_or(|&(ch, _)| u32::from(ch) < u32::from(u16::MAX));
        // +1 for the final 0xffff segment
        let format4_len = SegmentDeltas::encoded_len(coverage.groups.len() + 1, 0);
        let unicode = if in_bmp && format4_len <= usize::from(u16::MAX) {
            CmapTable::Deltas(SegmentDeltas::from_groups(&coverage))
        } else {
            CmapTable::Coverage(coverage)
        };
        let symbol =
            (!symbol_map.is_empty()).then(|| SegmentDeltas::from_groups(&group_runs(symbol_map)));
        Self {
            unicode: Some(unicode),
            symbol,
        }
    }
}

impl CharMaps<'_> {
    /// Writes the `cmap` table. The Unicode subtable is shared by the Unicode
    /// and Windows platforms.
    #[allow(clippy::cast_possible_truncation)] // record count
    pub(crate) fn write(&self, buffer: &mut Vec<u8>) -> Result<(), WriteError> {
        let mut subtables = vec![];
        // `(platform, encoding, subtable index)`
        let mut records = vec![];
        if let Some(unicode) = &self.unicode {
            let [unicode_encoding, windows_encoding] = unicode.encodings();
            records.push((CmapTable::UNICODE_PLATFORM, unicode_encoding, subtables.len()));
            records.push((CmapTable::WINDOWS_PLATFORM, windows_encoding, subtables.len()));
            let mut data = vec![];
            unicode.write(&mut data)?;
            subtables.push(data);
        }
        if let Some(symbol) = &self.symbol {
            let encoding = CmapTable::WINDOWS_SYMBOL_ENCODING;
            records.push((CmapTable::WINDOWS_PLATFORM, encoding, subtables.len()));
            let mut data = vec![];
            symbol.write(&mut data)?;
            subtables.push(data);
        }
        // Encoding records must be sorted by platform, then by encoding.
        records.sort_unstable_by_key(|&(platform, encoding, _)| (platform, encoding));

        let mut offsets = Vec::with_capacity(subtables.len());
        let mut offset = 4 + 8 * records.len();
        for data in &subtables {
            offsets.push(u32::try_from(offset).map_err(|_| OVERFLOW)?);
            offset += data.len();
        }

        write_u16(buffer, 0); // version
        write_u16(buffer, records.len() as u16);
        for (platform, encoding, subtable_idx) in records {
            write_u16(buffer, platform);
            write_u16(buffer, encoding);
            write_u32(buffer, offsets[subtable_idx]);
        }
        for data in subtables {
            buffer.extend_from_slice(&data);
        }
        Ok(())
    }
}
