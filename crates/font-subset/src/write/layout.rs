//! Pruning of `GSUB` and `GPOS` tables.
//!
//! Lookup subtables that cannot apply to any retained glyph are removed from their lookups.
//! Lookups themselves are retained (possibly with no subtables), so lookup indices in features
//! and in contextual lookups stay valid. The table is then compacted: only data reachable
//! from the remaining structures is copied, and all offsets are rebased.
//!
//! Removing bytes never increases the distance between a table and the data it references,
//! so rebased offsets always fit into their original fields.

use std::{collections::BTreeSet, ops};

use super::write_u16;
use crate::{
    errors::ParseErrorKind,
    font::{Cursor, TableTag},
    ParseError,
};

/// Lookup types with the same structure in `GSUB` and `GPOS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LookupTypes {
    context: u16,
    chained_context: u16,
    extension: u16,
}

impl LookupTypes {
    const GSUB: Self = Self {
        context: 5,
        chained_context: 6,
        extension: 7,
    };
    const GPOS: Self = Self {
        context: 7,
        chained_context: 8,
        extension: 9,
    };
}

/// Flag enabling `markFilteringSet` in a lookup table.
const USE_MARK_FILTERING_SET: u16 = 0x0010;

fn value_record_len(value_format: u16) -> usize {
    2 * (0..8).filter(|bit| value_format & (1 << bit) != 0).count()
}

fn has_devices(value_format: u16) -> bool {
    value_format & 0xf0 != 0
}

/// Offset field in the table, with positions relative to the table start.
#[derive(Debug, Clone, Copy)]
struct OffsetField {
    pos: usize,
    /// Field width in bytes: 2 or 4.
    width: usize,
    base: usize,
    target: usize,
}

#[derive(Debug)]
struct Compactor<'a> {
    table: Cursor<'a>,
    types: LookupTypes,
    retained: &'a BTreeSet<u16>,
    /// Copy of the table with lookup subtable arrays rewritten in place.
    output: Vec<u8>,
    live: Vec<ops::Range<usize>>,
    offsets: Vec<OffsetField>,
}

impl Compactor<'_> {
    fn u16_at(&self, pos: usize) -> Result<u16, ParseError> {
        self.table.u16_at(pos)
    }

    fn u32_at(&self, pos: usize) -> Result<usize, ParseError> {
        let value = self.table.at(pos)?.read_u32()?;
        usize::try_from(value).map_err(|_| self.table.err(ParseErrorKind::OffsetOutOfBounds(pos)))
    }

    fn count_at(&self, pos: usize) -> Result<usize, ParseError> {
        self.u16_at(pos).map(usize::from)
    }

    fn mark(&mut self, start: usize, len: usize) -> Result<(), ParseError> {
        self.table.range(start..start + len)?;
        self.live.push(start..start + len);
        Ok(())
    }

    /// Resolves an `Offset16` field without recording it. Null offsets resolve to `None`.
    fn resolve16(&self, base: usize, pos: usize) -> Result<Option<usize>, ParseError> {
        let value = usize::from(self.u16_at(pos)?);
        if value == 0 {
            return Ok(None);
        }
        self.table.at(base + value)?;
        Ok(Some(base + value))
    }

    fn offset16(&mut self, base: usize, pos: usize) -> Result<Option<usize>, ParseError> {
        let target = self.resolve16(base, pos)?;
        if let Some(target) = target {
            self.offsets.push(OffsetField {
                pos,
                width: 2,
                base,
                target,
            });
        }
        Ok(target)
    }

    fn offset32(&mut self, base: usize, pos: usize) -> Result<Option<usize>, ParseError> {
        let value = self.u32_at(pos)?;
        if value == 0 {
            return Ok(None);
        }
        let target = base + value;
        self.table.at(target)?;
        self.offsets.push(OffsetField {
            pos,
            width: 4,
            base,
            target,
        });
        Ok(Some(target))
    }

    fn header(&mut self) -> Result<(), ParseError> {
        let major_version = self.u16_at(0)?;
        if major_version != 1 {
            return Err(self
                .table
                .err(ParseErrorKind::UnexpectedTableVersion(major_version.into())));
        }
        // Version 1.1 adds a `featureVariationsOffset`.
        let has_variations = self.u16_at(2)? >= 1;
        self.mark(0, if has_variations { 14 } else { 10 })?;

        if let Some(script_list) = self.offset16(0, 4)? {
            self.script_list(script_list)?;
        }
        if let Some(feature_list) = self.offset16(0, 6)? {
            self.feature_list(feature_list)?;
        }
        if let Some(lookup_list) = self.offset16(0, 8)? {
            self.lookup_list(lookup_list)?;
        }
        if has_variations {
            if let Some(variations) = self.offset32(0, 10)? {
                self.feature_variations(variations)?;
            }
        }
        Ok(())
    }

    fn script_list(&mut self, at: usize) -> Result<(), ParseError> {
        let count = self.count_at(at)?;
        self.mark(at, 2 + 6 * count)?;
        for i in 0..count {
            if let Some(script) = self.offset16(at, at + 6 + 6 * i)? {
                self.script(script)?;
            }
        }
        Ok(())
    }

    fn script(&mut self, at: usize) -> Result<(), ParseError> {
        let count = self.count_at(at + 2)?;
        self.mark(at, 4 + 6 * count)?;
        let lang_sys_fields = (0..count).map(|i| at + 8 + 6 * i);
        for pos in [at].into_iter().chain(lang_sys_fields) {
            if let Some(lang_sys) = self.offset16(at, pos)? {
                let feature_count = self.count_at(lang_sys + 4)?;
                self.mark(lang_sys, 6 + 2 * feature_count)?;
            }
        }
        Ok(())
    }

    fn feature_list(&mut self, at: usize) -> Result<(), ParseError> {
        let count = self.count_at(at)?;
        self.mark(at, 2 + 6 * count)?;
        for i in 0..count {
            let record = at + 2 + 6 * i;
            let tag = self.table.at(record)?.read_byte_array::<4>()?;
            if let Some(feature) = self.offset16(at, record + 4)? {
                self.feature(feature, Some(tag))?;
            }
        }
        Ok(())
    }

    /// Marks a feature table. Feature parameters can only be sized if the feature tag is known.
    fn feature(&mut self, at: usize, tag: Option<[u8; 4]>) -> Result<(), ParseError> {
        let lookup_count = self.count_at(at + 2)?;
        self.mark(at, 4 + 2 * lookup_count)?;
        let Some(params) = self.offset16(at, at)? else {
            return Ok(());
        };
        let params_len = match tag {
            Some(tag) if tag == *b"size" => 10,
            Some([b's', b's', ..]) => 4,
            Some([b'c', b'v', ..]) => 14 + 3 * self.count_at(params + 12)?,
            _ => return Err(self.table.err(ParseErrorKind::UnexpectedTableFormat(0))),
        };
        self.mark(params, params_len)
    }

    fn feature_variations(&mut self, at: usize) -> Result<(), ParseError> {
        let count = self.u32_at(at + 4)?;
        self.mark(at, 8 + 8 * count)?;
        for i in 0..count {
            let record = at + 8 + 8 * i;
            if let Some(condition_set) = self.offset32(at, record)? {
                let condition_count = self.count_at(condition_set)?;
                self.mark(condition_set, 2 + 4 * condition_count)?;
                for j in 0..condition_count {
                    if let Some(condition) = self.offset32(condition_set, condition_set + 2 + 4 * j)? {
                        self.condition(condition)?;
                    }
                }
            }
            if let Some(substitution) = self.offset32(at, record + 4)? {
                let substitution_count = self.count_at(substitution + 4)?;
                self.mark(substitution, 6 + 6 * substitution_count)?;
                for j in 0..substitution_count {
                    let field = substitution + 8 + 6 * j;
                    if let Some(feature) = self.offset32(substitution, field)? {
                        self.feature(feature, None)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn condition(&mut self, at: usize) -> Result<(), ParseError> {
        match self.u16_at(at)? {
            1 => self.mark(at, 8), // axis range
            format => Err(self.table.err(ParseErrorKind::UnexpectedTableFormat(format))),
        }
    }

    fn lookup_list(&mut self, at: usize) -> Result<(), ParseError> {
        let count = self.count_at(at)?;
        self.mark(at, 2 + 2 * count)?;
        let mut visited = BTreeSet::new();
        for i in 0..count {
            if let Some(lookup) = self.offset16(at, at + 2 + 2 * i)? {
                if visited.insert(lookup) {
                    self.lookup(lookup)?;
                }
            }
        }
        Ok(())
    }

    /// Rewrites the subtable offset array of a lookup in place, retaining only applicable
    /// subtables, and marks the retained subtables.
    fn lookup(&mut self, at: usize) -> Result<(), ParseError> {
        let lookup_type = self.u16_at(at)?;
        let flags = self.u16_at(at + 2)?;
        let count = self.count_at(at + 4)?;

        let mut kept = vec![];
        for i in 0..count {
            let Some(subtable) = self.resolve16(at, at + 6 + 2 * i)? else {
                continue;
            };
            if self.applies(lookup_type, subtable)? {
                kept.push(subtable);
            }
        }

        let mut rewritten = vec![];
        // Cannot truncate: bounded by the original count
        #[allow(clippy::cast_possible_truncation)]
        write_u16(&mut rewritten, kept.len() as u16);
        for &subtable in &kept {
            self.offsets.push(OffsetField {
                pos: at + 4 + rewritten.len(),
                width: 2,
                base: at,
                target: subtable,
            });
            // The actual value is set during compaction.
            write_u16(&mut rewritten, 0);
        }
        if flags & USE_MARK_FILTERING_SET != 0 {
            write_u16(&mut rewritten, self.u16_at(at + 6 + 2 * count)?);
        }
        self.output[at + 4..at + 4 + rewritten.len()].copy_from_slice(&rewritten);
        self.mark(at, 4 + rewritten.len())?;

        for subtable in kept {
            self.subtable(lookup_type, subtable)?;
        }
        Ok(())
    }

    /// Checks whether a subtable can apply to retained glyphs. This is the case if its coverage
    /// tables (all of them for contextual and mark attachment subtables) contain a retained glyph.
    fn applies(&self, lookup_type: u16, at: usize) -> Result<bool, ParseError> {
        let (lookup_type, at) = if lookup_type == self.types.extension {
            let offset = self.u32_at(at + 4)?;
            (self.u16_at(at + 2)?, at + offset)
        } else {
            (lookup_type, at)
        };
        let format = self.u16_at(at)?;

        let mut coverage_fields = vec![];
        let contextual = lookup_type == self.types.context;
        let chained = lookup_type == self.types.chained_context;
        if contextual && format == 3 {
            let glyph_count = self.count_at(at + 2)?;
            coverage_fields.extend((0..glyph_count).map(|i| at + 6 + 2 * i));
        } else if chained && format == 3 {
            let mut pos = at + 2;
            for _ in 0..3 {
                let count = self.count_at(pos)?;
                coverage_fields.extend((0..count).map(|i| pos + 2 + 2 * i));
                pos += 2 + 2 * count;
            }
        } else {
            coverage_fields.push(at + 2);
            // Mark-to-base, mark-to-ligature and mark-to-mark attachment have two coverages.
            let is_mark_attachment = self.types == LookupTypes::GPOS && (4..=6).contains(&lookup_type);
            if is_mark_attachment {
                coverage_fields.push(at + 4);
            }
        }

        for field in coverage_fields {
            let Some(coverage) = self.resolve16(at, field)? else {
                return Ok(false);
            };
            if !self.covers_retained(coverage)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn covers_retained(&self, at: usize) -> Result<bool, ParseError> {
        let format = self.u16_at(at)?;
        let count = self.count_at(at + 2)?;
        match format {
            1 => {
                for i in 0..count {
                    if self.retained.contains(&self.u16_at(at + 4 + 2 * i)?) {
                        return Ok(true);
                    }
                }
            }
            2 => {
                for i in 0..count {
                    let start = self.u16_at(at + 4 + 6 * i)?;
                    let end = self.u16_at(at + 6 + 6 * i)?;
                    if start <= end && self.retained.range(start..=end).next().is_some() {
                        return Ok(true);
                    }
                }
            }
            _ => return Err(self.table.err(ParseErrorKind::UnexpectedTableFormat(format))),
        }
        Ok(false)
    }

    fn coverage(&mut self, base: usize, field: usize) -> Result<(), ParseError> {
        let Some(at) = self.offset16(base, field)? else {
            return Ok(());
        };
        let format = self.u16_at(at)?;
        let count = self.count_at(at + 2)?;
        match format {
            1 => self.mark(at, 4 + 2 * count),
            2 => self.mark(at, 4 + 6 * count),
            _ => Err(self.table.err(ParseErrorKind::UnexpectedTableFormat(format))),
        }
    }

    fn class_def(&mut self, base: usize, field: usize) -> Result<(), ParseError> {
        let Some(at) = self.offset16(base, field)? else {
            return Ok(());
        };
        match self.u16_at(at)? {
            1 => {
                let count = self.count_at(at + 4)?;
                self.mark(at, 6 + 2 * count)
            }
            2 => {
                let count = self.count_at(at + 2)?;
                self.mark(at, 4 + 6 * count)
            }
            format => Err(self.table.err(ParseErrorKind::UnexpectedTableFormat(format))),
        }
    }

    /// Marks a device or variation index table.
    fn device(&mut self, base: usize, field: usize) -> Result<(), ParseError> {
        let Some(at) = self.offset16(base, field)? else {
            return Ok(());
        };
        let start_size = self.u16_at(at)?;
        let end_size = self.u16_at(at + 2)?;
        let len = match self.u16_at(at + 4)? {
            // 2, 4 or 8 bits per delta
            format @ 1..=3 => {
                let deltas_per_word = 16 >> format;
                let count = usize::from(end_size.saturating_sub(start_size)) + 1;
                6 + 2 * count.div_ceil(deltas_per_word)
            }
            _ => 6,
        };
        self.mark(at, len)
    }

    /// Follows device offsets in a value record. The record itself is marked by its parent.
    fn value_record(&mut self, base: usize, at: usize, value_format: u16) -> Result<(), ParseError> {
        if !has_devices(value_format) {
            return Ok(());
        }
        let mut pos = at;
        for bit in 0..8 {
            if value_format & (1 << bit) == 0 {
                continue;
            }
            if bit >= 4 {
                self.device(base, pos)?;
            }
            pos += 2;
        }
        Ok(())
    }

    fn anchor(&mut self, base: usize, field: usize) -> Result<(), ParseError> {
        let Some(at) = self.offset16(base, field)? else {
            return Ok(());
        };
        match self.u16_at(at)? {
            1 => self.mark(at, 6),
            2 => self.mark(at, 8),
            3 => {
                self.mark(at, 10)?;
                self.device(at, at + 6)?;
                self.device(at, at + 8)
            }
            format => Err(self.table.err(ParseErrorKind::UnexpectedTableFormat(format))),
        }
    }

    fn subtable(&mut self, lookup_type: u16, at: usize) -> Result<(), ParseError> {
        if lookup_type == self.types.extension {
            self.mark(at, 8)?;
            let inner_type = self.u16_at(at + 2)?;
            if inner_type == self.types.extension {
                return Err(self.table.err(ParseErrorKind::UnexpectedTableFormat(inner_type)));
            }
            return match self.offset32(at, at + 4)? {
                Some(inner) => self.subtable(inner_type, inner),
                None => Err(self.table.err(ParseErrorKind::OffsetOutOfBounds(at))),
            };
        }

        if lookup_type == self.types.context {
            return self.context(at);
        } else if lookup_type == self.types.chained_context {
            return self.chained_context(at);
        }
        let format = self.u16_at(at)?;
        if self.types == LookupTypes::GSUB {
            self.substitution(lookup_type, format, at)
        } else {
            self.positioning(lookup_type, format, at)
        }
    }

    fn substitution(&mut self, lookup_type: u16, format: u16, at: usize) -> Result<(), ParseError> {
        match (lookup_type, format) {
            (1, 1) => self.mark(at, 6)?,
            (1, 2) => {
                let count = self.count_at(at + 4)?;
                self.mark(at, 6 + 2 * count)?;
            }
            // Multiple and alternate substitutions: arrays of glyph sequences
            (2 | 3, 1) => {
                let count = self.count_at(at + 4)?;
                self.mark(at, 6 + 2 * count)?;
                for i in 0..count {
                    if let Some(sequence) = self.offset16(at, at + 6 + 2 * i)? {
                        let glyph_count = self.count_at(sequence)?;
                        self.mark(sequence, 2 + 2 * glyph_count)?;
                    }
                }
            }
            (4, 1) => {
                let count = self.count_at(at + 4)?;
                self.mark(at, 6 + 2 * count)?;
                for i in 0..count {
                    if let Some(set) = self.offset16(at, at + 6 + 2 * i)? {
                        self.ligature_set(set)?;
                    }
                }
            }
            (8, 1) => {
                let mut pos = at + 4;
                let mut coverage_fields = vec![at + 2];
                for _ in 0..2 {
                    let count = self.count_at(pos)?;
                    coverage_fields.extend((0..count).map(|i| pos + 2 + 2 * i));
                    pos += 2 + 2 * count;
                }
                let glyph_count = self.count_at(pos)?;
                self.mark(at, pos + 2 + 2 * glyph_count - at)?;
                for field in coverage_fields {
                    self.coverage(at, field)?;
                }
                return Ok(());
            }
            _ => return Err(self.table.err(ParseErrorKind::UnexpectedTableFormat(format))),
        }
        self.coverage(at, at + 2)
    }

    fn ligature_set(&mut self, at: usize) -> Result<(), ParseError> {
        let count = self.count_at(at)?;
        self.mark(at, 2 + 2 * count)?;
        for i in 0..count {
            if let Some(ligature) = self.offset16(at, at + 2 + 2 * i)? {
                let component_count = self.count_at(ligature + 2)?;
                self.mark(ligature, 4 + 2 * component_count.saturating_sub(1))?;
            }
        }
        Ok(())
    }

    fn positioning(&mut self, lookup_type: u16, format: u16, at: usize) -> Result<(), ParseError> {
        match (lookup_type, format) {
            (1, 1) => {
                let value_format = self.u16_at(at + 4)?;
                self.mark(at, 6 + value_record_len(value_format))?;
                self.value_record(at, at + 6, value_format)?;
            }
            (1, 2) => {
                let value_format = self.u16_at(at + 4)?;
                let record_len = value_record_len(value_format);
                let count = self.count_at(at + 6)?;
                self.mark(at, 8 + count * record_len)?;
                for i in 0..count {
                    self.value_record(at, at + 8 + i * record_len, value_format)?;
                }
            }
            (2, 1) => {
                let formats = [self.u16_at(at + 4)?, self.u16_at(at + 6)?];
                let count = self.count_at(at + 8)?;
                self.mark(at, 10 + 2 * count)?;
                for i in 0..count {
                    if let Some(pair_set) = self.offset16(at, at + 10 + 2 * i)? {
                        self.pair_set(pair_set, formats)?;
                    }
                }
            }
            (2, 2) => {
                let [format1, format2] = [self.u16_at(at + 4)?, self.u16_at(at + 6)?];
                let len1 = value_record_len(format1);
                let record_len = len1 + value_record_len(format2);
                let class_count = self.count_at(at + 12)? * self.count_at(at + 14)?;
                self.mark(at, 16 + class_count * record_len)?;
                self.class_def(at, at + 8)?;
                self.class_def(at, at + 10)?;
                if has_devices(format1 | format2) {
                    for i in 0..class_count {
                        let record = at + 16 + i * record_len;
                        self.value_record(at, record, format1)?;
                        self.value_record(at, record + len1, format2)?;
                    }
                }
            }
            (3, 1) => {
                let count = self.count_at(at + 4)?;
                self.mark(at, 6 + 4 * count)?;
                for i in 0..count {
                    self.anchor(at, at + 6 + 4 * i)?; // entry
                    self.anchor(at, at + 8 + 4 * i)?; // exit
                }
            }
            // Mark-to-base and mark-to-mark attachment
            (4 | 6, 1) => {
                let class_count = self.count_at(at + 6)?;
                self.mark(at, 12)?;
                self.coverage(at, at + 4)?;
                self.mark_array(at, at + 8)?;
                if let Some(base_array) = self.offset16(at, at + 10)? {
                    self.anchor_matrix(base_array, class_count)?;
                }
            }
            (5, 1) => {
                let class_count = self.count_at(at + 6)?;
                self.mark(at, 12)?;
                self.coverage(at, at + 4)?;
                self.mark_array(at, at + 8)?;
                if let Some(ligature_array) = self.offset16(at, at + 10)? {
                    let count = self.count_at(ligature_array)?;
                    self.mark(ligature_array, 2 + 2 * count)?;
                    for i in 0..count {
                        let field = ligature_array + 2 + 2 * i;
                        if let Some(attach) = self.offset16(ligature_array, field)? {
                            self.anchor_matrix(attach, class_count)?;
                        }
                    }
                }
            }
            _ => return Err(self.table.err(ParseErrorKind::UnexpectedTableFormat(format))),
        }
        self.coverage(at, at + 2)
    }

    fn pair_set(&mut self, at: usize, [format1, format2]: [u16; 2]) -> Result<(), ParseError> {
        let len1 = value_record_len(format1);
        let record_len = 2 + len1 + value_record_len(format2);
        let count = self.count_at(at)?;
        self.mark(at, 2 + count * record_len)?;
        if has_devices(format1 | format2) {
            // Device offsets in pair value records are relative to the pair set.
            for i in 0..count {
                let record = at + 2 + i * record_len;
                self.value_record(at, record + 2, format1)?;
                self.value_record(at, record + 2 + len1, format2)?;
            }
        }
        Ok(())
    }

    fn mark_array(&mut self, base: usize, field: usize) -> Result<(), ParseError> {
        let Some(at) = self.offset16(base, field)? else {
            return Ok(());
        };
        let count = self.count_at(at)?;
        self.mark(at, 2 + 4 * count)?;
        for i in 0..count {
            self.anchor(at, at + 4 + 4 * i)?;
        }
        Ok(())
    }

    /// Marks a base array, a mark-2 array or a ligature attach table: rows of anchor offsets,
    /// one per mark class.
    fn anchor_matrix(&mut self, at: usize, class_count: usize) -> Result<(), ParseError> {
        let anchor_count = self.count_at(at)? * class_count;
        self.mark(at, 2 + 2 * anchor_count)?;
        for i in 0..anchor_count {
            self.anchor(at, at + 2 + 2 * i)?;
        }
        Ok(())
    }

    fn context(&mut self, at: usize) -> Result<(), ParseError> {
        match self.u16_at(at)? {
            1 => {
                let count = self.count_at(at + 4)?;
                self.mark(at, 6 + 2 * count)?;
                self.coverage(at, at + 2)?;
                self.rule_sets(at, (0..count).map(|i| at + 6 + 2 * i), false)
            }
            2 => {
                let count = self.count_at(at + 6)?;
                self.mark(at, 8 + 2 * count)?;
                self.coverage(at, at + 2)?;
                self.class_def(at, at + 4)?;
                self.rule_sets(at, (0..count).map(|i| at + 8 + 2 * i), false)
            }
            3 => {
                let glyph_count = self.count_at(at + 2)?;
                let lookup_count = self.count_at(at + 4)?;
                self.mark(at, 6 + 2 * glyph_count + 4 * lookup_count)?;
                for i in 0..glyph_count {
                    self.coverage(at, at + 6 + 2 * i)?;
                }
                Ok(())
            }
            format => Err(self.table.err(ParseErrorKind::UnexpectedTableFormat(format))),
        }
    }

    fn chained_context(&mut self, at: usize) -> Result<(), ParseError> {
        match self.u16_at(at)? {
            1 => {
                let count = self.count_at(at + 4)?;
                self.mark(at, 6 + 2 * count)?;
                self.coverage(at, at + 2)?;
                self.rule_sets(at, (0..count).map(|i| at + 6 + 2 * i), true)
            }
            2 => {
                let count = self.count_at(at + 10)?;
                self.mark(at, 12 + 2 * count)?;
                self.coverage(at, at + 2)?;
                for field in [at + 4, at + 6, at + 8] {
                    self.class_def(at, field)?;
                }
                self.rule_sets(at, (0..count).map(|i| at + 12 + 2 * i), true)
            }
            3 => {
                let mut pos = at + 2;
                let mut coverage_fields = vec![];
                for _ in 0..3 {
                    let count = self.count_at(pos)?;
                    coverage_fields.extend((0..count).map(|i| pos + 2 + 2 * i));
                    pos += 2 + 2 * count;
                }
                let lookup_count = self.count_at(pos)?;
                self.mark(at, pos + 2 + 4 * lookup_count - at)?;
                for field in coverage_fields {
                    self.coverage(at, field)?;
                }
                Ok(())
            }
            format => Err(self.table.err(ParseErrorKind::UnexpectedTableFormat(format))),
        }
    }

    /// Marks rule sets of a contextual subtable; unused rule sets have null offsets.
    fn rule_sets(
        &mut self,
        base: usize,
        fields: impl Iterator<Item = usize>,
        chained: bool,
    ) -> Result<(), ParseError> {
        for field in fields {
            let Some(set) = self.offset16(base, field)? else {
                continue;
            };
            let count = self.count_at(set)?;
            self.mark(set, 2 + 2 * count)?;
            for i in 0..count {
                let Some(rule) = self.offset16(set, set + 2 + 2 * i)? else {
                    continue;
                };
                let len = if chained {
                    self.chained_rule_len(rule)?
                } else {
                    let glyph_count = self.count_at(rule)?;
                    let lookup_count = self.count_at(rule + 2)?;
                    4 + 2 * glyph_count.saturating_sub(1) + 4 * lookup_count
                };
                self.mark(rule, len)?;
            }
        }
        Ok(())
    }

    fn chained_rule_len(&self, at: usize) -> Result<usize, ParseError> {
        let backtrack_count = self.count_at(at)?;
        let mut pos = at + 2 + 2 * backtrack_count;
        // The first input glyph is matched by the coverage or class.
        let input_count = self.count_at(pos)?;
        pos += 2 + 2 * input_count.saturating_sub(1);
        let lookahead_count = self.count_at(pos)?;
        pos += 2 + 2 * lookahead_count;
        let lookup_count = self.count_at(pos)?;
        Ok(pos + 2 + 4 * lookup_count - at)
    }

    /// Copies live data and rebases recorded offsets.
    fn finish(mut self) -> Result<Vec<u8>, ParseError> {
        self.live.sort_unstable_by_key(|range| range.start);
        let mut merged: Vec<ops::Range<usize>> = vec![];
        for range in self.live {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }

        let mut compacted = Vec::with_capacity(merged.iter().map(ops::Range::len).sum());
        let mut new_starts = Vec::with_capacity(merged.len());
        for range in &merged {
            new_starts.push(compacted.len());
            compacted.extend_from_slice(&self.output[range.clone()]);
        }
        let relocate = |pos: usize| {
            let idx = merged.partition_point(|range| range.start <= pos).checked_sub(1)?;
            let range = &merged[idx];
            (pos < range.end).then(|| new_starts[idx] + pos - range.start)
        };

        for field in &self.offsets {
            let relocated = (
                relocate(field.pos),
                relocate(field.base),
                relocate(field.target),
            );
            let (Some(pos), Some(base), Some(target)) = relocated else {
                return Err(self.table.err(ParseErrorKind::OffsetOutOfBounds(field.target)));
            };
            let value = target
                .checked_sub(base)
                .ok_or_else(|| self.table.err(ParseErrorKind::OffsetOutOfBounds(field.target)))?;
            let out_of_bounds = || self.table.err(ParseErrorKind::OffsetOutOfBounds(value));
            if field.width == 2 {
                let value = u16::try_from(value).map_err(|_| out_of_bounds())?;
                compacted[pos..pos + 2].copy_from_slice(&value.to_be_bytes());
            } else {
                let value = u32::try_from(value).map_err(|_| out_of_bounds())?;
                compacted[pos..pos + 4].copy_from_slice(&value.to_be_bytes());
            }
        }
        Ok(compacted)
    }
}

/// Prunes a `GSUB` or `GPOS` table to the retained glyphs.
///
/// # Errors
///
/// Returns an error if the table is malformed or uses unsupported structures (e.g., feature
/// parameters of an unknown feature). The table should be copied as-is in this case.
pub(super) fn prune_layout_table(
    table: &[u8],
    tag: TableTag,
    retained: &BTreeSet<u16>,
) -> Result<Vec<u8>, ParseError> {
    let types = if tag == TableTag::GSUB {
        LookupTypes::GSUB
    } else {
        LookupTypes::GPOS
    };
    let mut compactor = Compactor {
        table: Cursor::for_table(table, tag),
        types,
        retained,
        output: table.to_vec(),
        live: vec![],
        offsets: vec![],
    };
    compactor.header()?;
    compactor.finish()
}
