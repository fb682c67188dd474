//! Pruning of the legacy `kern` table.

use std::collections::BTreeSet;

use super::{search_params, write_u16};
use crate::{
    errors::ParseErrorKind,
    font::{Cursor, TableTag},
    ParseError,
};

/// Length of a kerning pair: left and right glyphs and the kerning value.
const PAIR_LEN: u16 = 6;

/// Drops kerning pairs involving removed glyphs from format 0 subtables of a Windows-style
/// (version 0) `kern` table. Subtables in other formats are copied as-is. Apple-style tables
/// (version 1.0) are returned unchanged.
pub(super) fn prune_kern_table(
    table: &[u8],
    retained: &BTreeSet<u16>,
) -> Result<Vec<u8>, ParseError> {
    let mut cursor = Cursor::for_table(table, TableTag::KERN);
    let version = cursor.read_u16()?;
    if version != 0 {
        return Ok(table.to_vec());
    }
    let table_count = cursor.read_u16()?;

    let mut pruned = table[..4].to_vec();
    for _ in 0..table_count {
        let subtable_version = cursor.u16_at(0)?;
        let declared_len = usize::from(cursor.u16_at(2)?);
        let coverage = cursor.u16_at(4)?;
        if coverage >> 8 != 0 {
            // Not format 0
            pruned.extend_from_slice(cursor.split_at(declared_len)?.bytes);
            continue;
        }

        let pair_count = usize::from(cursor.u16_at(6)?);
        // The stored length wraps for large subtables, so it's computed from the pair count.
        let mut subtable = cursor.split_at(14 + usize::from(PAIR_LEN) * pair_count)?;
        subtable.skip(14)?;
        let mut pairs = vec![];
        for _ in 0..pair_count {
            let pair = subtable.read_byte_array::<6>()?;
            let left = u16::from_be_bytes([pair[0], pair[1]]);
            let right = u16::from_be_bytes([pair[2], pair[3]]);
            if retained.contains(&left) && retained.contains(&right) {
                pairs.extend_from_slice(&pair);
            }
        }

        // Binary search params are only defined if the pairs fit into 64 kB.
        let pairs_len = u16::try_from(pairs.len())
            .map_err(|_| cursor.err(ParseErrorKind::UnexpectedTableFormat(0)))?;
        let pair_count = pairs_len / PAIR_LEN;
        write_u16(&mut pruned, subtable_version);
        write_u16(&mut pruned, pairs_len.wrapping_add(14));
        write_u16(&mut pruned, coverage);
        write_u16(&mut pruned, pair_count);
        for param in search_params(pair_count, PAIR_LEN) {
            write_u16(&mut pruned, param);
        }
        pruned.extend_from_slice(&pairs);
    }
    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kern_table(pairs: &[(u16, u16, i16)]) -> Vec<u8> {
        let mut table = vec![0, 0, 0, 1];
        write_u16(&mut table, 0);
        write_u16(&mut table, 14 + PAIR_LEN * pairs.len() as u16);
        write_u16(&mut table, 1); // horizontal, format 0
        write_u16(&mut table, pairs.len() as u16);
        for param in search_params(pairs.len() as u16, PAIR_LEN) {
            write_u16(&mut table, param);
        }
        for &(left, right, value) in pairs {
            write_u16(&mut table, left);
            write_u16(&mut table, right);
            table.extend_from_slice(&value.to_be_bytes());
        }
        table
    }

    #[test]
    fn pairs_with_dropped_glyphs_are_removed() {
        let table = kern_table(&[(1, 2, -80), (1, 3, -40), (3, 2, 20), (4, 5, 10)]);
        let retained = BTreeSet::from([0, 1, 2, 4]);
        let pruned = prune_kern_table(&table, &retained).unwrap();
        assert_eq!(pruned, kern_table(&[(1, 2, -80)]));

        let pruned = prune_kern_table(&table, &BTreeSet::from([0])).unwrap();
        assert_eq!(pruned, kern_table(&[]));
        assert_eq!(pruned.len(), 4 + 14);
    }

    #[test]
    fn other_formats_are_copied() {
        let mut table = vec![0, 0, 0, 1];
        write_u16(&mut table, 0);
        write_u16(&mut table, 10);
        write_u16(&mut table, 0x0201); // format 2
        table.extend_from_slice(&[1, 2, 3, 4]);
        let pruned = prune_kern_table(&table, &BTreeSet::from([0])).unwrap();
        assert_eq!(pruned, table);

        let apple_table = [0, 1, 0, 0, 0, 0, 0, 0];
        let pruned = prune_kern_table(&apple_table, &BTreeSet::from([0])).unwrap();
        assert_eq!(pruned, apple_table);
    }

    #[test]
    fn truncated_table_is_an_error() {
        let table = kern_table(&[(1, 2, -80), (1, 3, -40)]);
        let err = prune_kern_table(&table[..table.len() - 3], &BTreeSet::from([1, 2])).unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::RangeOutOfBounds { .. }), "{err:?}");
    }
}
