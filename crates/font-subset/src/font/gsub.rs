//! Glyph closure over the `GSUB` table.
//!
//! Lookups are applied regardless of the script, feature or context they are reachable from,
//! which over-approximates the set of glyphs a shaper can produce. Contextual lookups
//! (types 5 and 6) only reference other lookups, so they contribute nothing on their own.

use std::collections::BTreeSet;

use super::{Cursor, TableTag};
use crate::{errors::ParseErrorKind, ParseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupType {
    Single,
    Multiple,
    Alternate,
    Ligature,
    ReverseChainingSingle,
}

impl LookupType {
    const EXTENSION: u16 = 7;

    fn new(raw: u16) -> Option<Self> {
        Some(match raw {
            1 => Self::Single,
            2 => Self::Multiple,
            3 => Self::Alternate,
            4 => Self::Ligature,
            8 => Self::ReverseChainingSingle,
            _ => return None,
        })
    }
}

/// Coverage table listing glyphs in the coverage index order.
fn coverage(cursor: Cursor<'_>) -> Result<Vec<u16>, ParseError> {
    let mut cursor = cursor;
    let format = cursor.read_u16()?;
    match format {
        1 => {
            let count = cursor.read_u16()?;
            (0..count).map(|_| cursor.read_u16()).collect()
        }
        2 => {
            let range_count = cursor.read_u16()?;
            let mut glyphs = vec![];
            for _ in 0..range_count {
                let start = cursor.read_u16()?;
                let end = cursor.read_u16()?;
                cursor.skip(2)?; // startCoverageIndex
                glyphs.extend(start..=end);
            }
            Ok(glyphs)
        }
        _ => Err(cursor.err(ParseErrorKind::UnexpectedTableFormat(format))),
    }
}

#[derive(Debug, Clone, Copy)]
struct Subtable<'a> {
    lookup_type: LookupType,
    cursor: Cursor<'a>,
}

impl Subtable<'_> {
    /// Appends glyphs produced by this subtable from `glyphs` to `output`.
    fn apply(&self, glyphs: &BTreeSet<u16>, output: &mut Vec<u16>) -> Result<(), ParseError> {
        let mut header = self.cursor;
        let format = header.read_u16()?;
        let coverage_offset = usize::from(header.read_u16()?);
        let covered = coverage(self.cursor.at(coverage_offset)?)?;
        let covered = covered
            .into_iter()
            .enumerate()
            .filter(|(_, glyph)| glyphs.contains(glyph));

        match (self.lookup_type, format) {
            (LookupType::Single, 1) => {
                let delta = header.read_u16()?;
                output.extend(covered.map(|(_, glyph)| glyph.wrapping_add(delta)));
            }
            (LookupType::Single, 2) => {
                let substitutes = header;
                for (idx, _) in covered {
                    output.push(substitutes.u16_at(2 + 2 * idx)?);
                }
            }
            (LookupType::Multiple | LookupType::Alternate, 1) => {
                let offsets = header;
                for (idx, _) in covered {
                    let sequence_offset = usize::from(offsets.u16_at(2 + 2 * idx)?);
                    let mut sequence = self.cursor.at(sequence_offset)?;
                    let glyph_count = sequence.read_u16()?;
                    for _ in 0..glyph_count {
                        output.push(sequence.read_u16()?);
                    }
                }
            }
            (LookupType::Ligature, 1) => {
                let offsets = header;
                for (idx, _) in covered {
                    let set_offset = usize::from(offsets.u16_at(2 + 2 * idx)?);
                    let ligature_set = self.cursor.at(set_offset)?;
                    Self::apply_ligature_set(ligature_set, glyphs, output)?;
                }
            }
            (LookupType::ReverseChainingSingle, 1) => {
                let backtrack_count = usize::from(header.read_u16()?);
                header.skip(2 * backtrack_count)?;
                let lookahead_count = usize::from(header.read_u16()?);
                header.skip(2 * lookahead_count)?;
                let substitutes = header;
                for (idx, _) in covered {
                    output.push(substitutes.u16_at(2 + 2 * idx)?);
                }
            }
            _ => return Err(self.cursor.err(ParseErrorKind::UnexpectedTableFormat(format))),
        }
        Ok(())
    }

    fn apply_ligature_set(
        ligature_set: Cursor<'_>,
        glyphs: &BTreeSet<u16>,
        output: &mut Vec<u16>,
    ) -> Result<(), ParseError> {
        let mut offsets = ligature_set;
        let ligature_count = offsets.read_u16()?;
        for _ in 0..ligature_count {
            let mut ligature = ligature_set.at(usize::from(offsets.read_u16()?))?;
            let ligature_glyph = ligature.read_u16()?;
            let component_count = ligature.read_u16()?;
            // The first component is the covered glyph
            let mut has_all_components = true;
            for _ in 1..component_count {
                has_all_components &= glyphs.contains(&ligature.read_u16()?);
            }
            if has_all_components {
                output.push(ligature_glyph);
            }
        }
        Ok(())
    }
}

fn subtables(gsub: Cursor<'_>) -> Result<Vec<Subtable<'_>>, ParseError> {
    let mut header = gsub;
    header.read_u16_checked(|major_version| {
        if major_version == 1 {
            Ok(())
        } else {
            Err(ParseErrorKind::UnexpectedTableVersion(major_version.into()))
        }
    })?;
    header.skip(6)?; // minorVersion, scriptListOffset, featureListOffset
    let lookup_list = gsub.at(usize::from(header.read_u16()?))?;

    let mut lookup_offsets = lookup_list;
    let lookup_count = lookup_offsets.read_u16()?;
    let mut subtables = vec![];
    for _ in 0..lookup_count {
        let lookup = lookup_list.at(usize::from(lookup_offsets.read_u16()?))?;
        let mut lookup_header = lookup;
        let raw_type = lookup_header.read_u16()?;
        lookup_header.skip(2)?; // lookupFlag
        let subtable_count = lookup_header.read_u16()?;

        for _ in 0..subtable_count {
            let subtable = lookup.at(usize::from(lookup_header.read_u16()?))?;
            let (raw_type, subtable) = if raw_type == LookupType::EXTENSION {
                let mut extension = subtable;
                extension.skip(2)?; // format
                let extension_type = extension.read_u16()?;
                let offset = extension.read_u32()? as usize;
                (extension_type, subtable.at(offset)?)
            } else {
                (raw_type, subtable)
            };

            if let Some(lookup_type) = LookupType::new(raw_type) {
                subtables.push(Subtable {
                    lookup_type,
                    cursor: subtable,
                });
            }
        }
    }
    Ok(subtables)
}

/// Extends `glyphs` with all glyphs reachable from them via substitutions, until a fixed point.
pub(crate) fn close_over(gsub: &[u8], glyphs: &mut BTreeSet<u16>) -> Result<(), ParseError> {
    let subtables = subtables(Cursor::for_table(gsub, TableTag::GSUB))?;
    let mut produced = vec![];
    loop {
        for subtable in &subtables {
            subtable.apply(glyphs, &mut produced)?;
        }
        let prev_len = glyphs.len();
        glyphs.extend(produced.drain(..));
        if glyphs.len() == prev_len {
            return Ok(());
        }
    }
}
