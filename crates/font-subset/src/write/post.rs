//! Pruning of glyph names in the `post` table.

use std::collections::{BTreeMap, BTreeSet};

use super::write_u16;
use crate::{
    errors::ParseErrorKind,
    font::{Cursor, TableTag},
    ParseError,
};

const VERSION_2: u32 = 0x_0002_0000;
const HEADER_LEN: usize = 32;
/// Number of standard Macintosh glyph names; greater name indices refer to custom names.
const STANDARD_NAME_COUNT: u16 = 258;

/// Removes names of dropped glyphs from a version 2.0 `post` table. Dropped glyphs are mapped
/// to `.notdef`, and custom names no longer referenced are removed. Tables of other versions
/// don't contain glyph-specific data and are returned unchanged.
pub(super) fn prune_post_table(
    table: &[u8],
    retained: &BTreeSet<u16>,
) -> Result<Vec<u8>, ParseError> {
    let mut cursor = Cursor::for_table(table, TableTag::POST);
    if cursor.read_u32()? != VERSION_2 {
        return Ok(table.to_vec());
    }
    cursor = cursor.at(HEADER_LEN - 4)?;
    let glyph_count = cursor.read_u16()?;
    let mut name_indices = Vec::with_capacity(usize::from(glyph_count));
    for _ in 0..glyph_count {
        name_indices.push(cursor.read_u16()?);
    }
    let mut names = vec![];
    while !cursor.bytes.is_empty() {
        let len = cursor.read_byte_array::<1>()?[0];
        names.push(cursor.split_at(len.into())?.bytes);
    }

    let mut custom_indices = BTreeMap::new();
    for (glyph_idx, name_idx) in (0..glyph_count).zip(&mut name_indices) {
        if !retained.contains(&glyph_idx) {
            *name_idx = 0;
        } else if *name_idx >= STANDARD_NAME_COUNT {
            custom_indices.insert(*name_idx - STANDARD_NAME_COUNT, 0);
        }
    }

    let mut name_data = vec![];
    for (new_idx, (&old_idx, mapped_idx)) in (0_u16..).zip(&mut custom_indices) {
        let name = names
            .get(usize::from(old_idx))
            .ok_or_else(|| cursor.err(ParseErrorKind::OffsetOutOfBounds(old_idx.into())))?;
        *mapped_idx = STANDARD_NAME_COUNT + new_idx;
        // Cannot truncate: the length was read from a single byte
        #[allow(clippy::cast_possible_truncation)]
        name_data.push(name.len() as u8);
        name_data.extend_from_slice(name);
    }

    let mut pruned = table[..HEADER_LEN].to_vec();
    write_u16(&mut pruned, glyph_count);
    for name_idx in name_indices {
        let name_idx = if name_idx >= STANDARD_NAME_COUNT {
            let custom_idx = name_idx - STANDARD_NAME_COUNT;
            custom_indices.get(&custom_idx).copied().unwrap_or(0)
        } else {
            name_idx
        };
        write_u16(&mut pruned, name_idx);
    }
    pruned.extend_from_slice(&name_data);
    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use allsorts::{binary::read::ReadScope, post::PostTable};

    use super::*;

    fn post_table(name_indices: &[u16], names: &[&str]) -> Vec<u8> {
        let mut table = VERSION_2.to_be_bytes().to_vec();
        table.resize(HEADER_LEN, 0);
        write_u16(&mut table, name_indices.len() as u16);
        for &idx in name_indices {
            write_u16(&mut table, idx);
        }
        for name in names {
            table.push(name.len() as u8);
            table.extend_from_slice(name.as_bytes());
        }
        table
    }

    #[test]
    fn names_of_dropped_glyphs_are_removed() {
        // `.notdef`, `A` (standard name #36), then 3 custom names
        let table = post_table(&[0, 36, 258, 259, 260], &["f_i", "uni4E00", "uni4E01"]);
        let retained = BTreeSet::from([0, 1, 2, 4]);
        let pruned = prune_post_table(&table, &retained).unwrap();
        assert_eq!(pruned, post_table(&[0, 36, 258, 0, 259], &["f_i", "uni4E01"]));

        let post = ReadScope::new(&pruned).read::<PostTable<'_>>().unwrap();
        assert_eq!(post.glyph_name(1).unwrap(), Some("A"));
        assert_eq!(post.glyph_name(3).unwrap(), Some(".notdef"));
        assert_eq!(post.glyph_name(4).unwrap(), Some("uni4E01"));
    }

    #[test]
    fn other_versions_are_copied() {
        let mut table = 0x_0003_0000_u32.to_be_bytes().to_vec();
        table.resize(HEADER_LEN, 0);
        let pruned = prune_post_table(&table, &BTreeSet::from([0])).unwrap();
        assert_eq!(pruned, table);
    }

    #[test]
    fn missing_custom_name_is_an_error() {
        let table = post_table(&[0, 258, 259], &["a.alt"]);
        prune_post_table(&table, &BTreeSet::from([0, 2])).unwrap_err();
    }
}
