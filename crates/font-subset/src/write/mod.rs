//! Serialization of [`FontSubset`]s as TrueType and WOFF2 fonts.

use std::{borrow::Cow, collections::BTreeSet};

pub(crate) use self::container::FontWriter;
use crate::{
    font::{CharMaps, GlyphWithMetrics, HheaTable, LocaFormat},
    Font, FontSubset, TableTag, WriteError,
};

mod brotli;
mod cmap;
mod container;
mod kern;
mod layout;
mod post;

pub(crate) fn write_u16(buffer: &mut Vec<u8>, value: u16) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

/// Returns `searchRange`, `entrySelector` and `rangeShift` for binary search over `count` items
/// each taking `item_len` bytes.
#[allow(clippy::cast_possible_truncation)] // log2 of a `u16` is less than 16
fn search_params(count: u16, item_len: u16) -> [u16; 3] {
    let entry_selector = count.checked_ilog2().unwrap_or(0) as u16;
    let search_range = item_len << entry_selector;
    [search_range, entry_selector, (count * item_len).saturating_sub(search_range)]
}

/// Serializes outlines, returning the `glyf` and `loca` tables.
fn encode_glyphs(
    slots: &[&GlyphWithMetrics<'_>],
) -> Result<(Vec<u8>, Vec<u8>, LocaFormat), WriteError> {
    let mut glyf = vec![];
    let mut offsets = Vec::with_capacity(slots.len() + 1);
    offsets.push(0);
    for slot in slots {
        glyf.extend_from_slice(slot.inner.raw());
        offsets.push(glyf.len());
    }

    let mut loca = vec![];
    // The short format stores halved offsets.
    let short_offsets: Option<Vec<u16>> = offsets
        .iter()
        .map(|&offset| {
            let half = u16::try_from(offset / 2).ok()?;
            (offset % 2 == 0).then_some(half)
        })
        .collect();
    let format = if let Some(short_offsets) = short_offsets {
        for offset in short_offsets {
            write_u16(&mut loca, offset);
        }
        LocaFormat::Short
    } else {
        for offset in offsets {
            let offset =
                u32::try_from(offset).map_err(|_| WriteError::TableOverflow(TableTag::GLYF))?;
            write_u32(&mut loca, offset);
        }
        LocaFormat::Long
    };
    Ok((glyf, loca, format))
}

/// Serializes the `hmtx` table, returning it together with `numberOfHMetrics`. The trailing run
/// of glyphs sharing the advance is encoded with left side bearings only.
fn encode_metrics(slots: &[&GlyphWithMetrics<'_>]) -> Result<(Vec<u8>, u16), WriteError> {
    let last_advance = slots.last().map(|slot| slot.advance);
    let shared_advances = slots
        .iter()
        .rev()
        .skip(1)
        .take_while(|slot| Some(slot.advance) == last_advance)
        .count();
    let metrics_count = slots.len() - shared_advances;

    let mut hmtx = Vec::with_capacity(4 * metrics_count + 2 * shared_advances);
    for (i, slot) in slots.iter().enumerate() {
        if i < metrics_count {
            write_u16(&mut hmtx, slot.advance);
        }
        write_u16(&mut hmtx, slot.lsb);
    }
    let metrics_count =
        u16::try_from(metrics_count).map_err(|_| WriteError::TableOverflow(TableTag::HMTX))?;
    Ok((hmtx, metrics_count))
}

impl HheaTable<'_> {
    fn encode(&self, number_of_h_metrics: u16) -> Vec<u8> {
        let mut hhea = self.raw[..Self::EXPECTED_LEN - 2].to_vec();
        write_u16(&mut hhea, number_of_h_metrics);
        hhea
    }
}

/// Removes data for dropped glyphs from a glyph-indexed table. Other tables, and tables
/// that cannot be pruned (e.g., because they use unsupported formats), are copied as-is.
fn prune_table<'a>(tag: TableTag, table: &'a [u8], retained: &BTreeSet<u16>) -> Cow<'a, [u8]> {
    let pruned = match tag {
        TableTag::GSUB | TableTag::GPOS => layout::prune_layout_table(table, tag, retained),
        TableTag::KERN => kern::prune_kern_table(table, retained),
        TableTag::POST => post::prune_post_table(table, retained),
        _ => return Cow::Borrowed(table),
    };
    pruned.map_or(Cow::Borrowed(table), Cow::Owned)
}

fn put_bytes(table: &mut [u8], offset: usize, bytes: &[u8]) {
    table[offset..offset + bytes.len()].copy_from_slice(bytes);
}

impl FontSubset<'_> {
    /// Serializes this subset as a TrueType font.
    ///
    /// # Errors
    ///
    /// Returns an error if a table or the font exceeds the size limits of its format.
    pub fn to_truetype(&self) -> Result<Vec<u8>, WriteError> {
        self.to_writer()?.into_opentype()
    }

    /// Serializes this subset as a WOFF2 font. Tables are not transformed, and the output
    /// is fully determined by the subset (incl. the modification timestamp).
    ///
    /// # Errors
    ///
    /// Returns an error if a table or the font exceeds the size limits of its format.
    pub fn to_woff2(&self) -> Result<Vec<u8>, WriteError> {
        self.to_writer()?.into_woff2()
    }

    pub(crate) fn to_writer(&self) -> Result<FontWriter, WriteError> {
        let slots: Vec<_> = self.glyph_slots().collect();
        let (glyf, loca, loca_format) = encode_glyphs(&slots)?;
        let (hmtx, number_of_h_metrics) = encode_metrics(&slots)?;
        let mut cmap = vec![];
        CharMaps::from_maps(&self.char_map, &self.symbol_map).write(&mut cmap)?;

        let font = self.font;
        let retained: BTreeSet<u16> = self.glyphs.keys().copied().collect();
        let mut tables: Vec<(TableTag, Cow<'_, [u8]>)> = vec![
            (TableTag::CMAP, cmap.into()),
            (TableTag::GLYF, glyf.into()),
            (TableTag::HEAD, self.head_table(loca_format, &slots).into()),
            (TableTag::HHEA, font.hhea.encode(number_of_h_metrics).into()),
            (TableTag::HMTX, hmtx.into()),
            (TableTag::LOCA, loca.into()),
            (TableTag::MAXP, font.maxp.into()),
            (TableTag::NAME, font.name.into()),
            (TableTag::OS2, self.os2_table()),
            (TableTag::POST, prune_table(TableTag::POST, font.post, &retained)),
        ];
        let hinting = [
            (TableTag::CVT, font.cvt),
            (TableTag::FPGM, font.fpgm),
            (TableTag::PREP, font.prep),
        ];
        tables.extend(
            hinting
                .into_iter()
                .filter_map(|(tag, data)| Some((tag, Cow::Borrowed(data?)))),
        );
        tables.extend(
            font.passthrough
                .iter()
                .map(|&(tag, data)| (tag, prune_table(tag, data, &retained))),
        );

        // `loca` is placed right after `glyf`; other tables are ordered by tag.
        tables.sort_unstable_by_key(|&(tag, _)| {
            if tag == TableTag::LOCA {
                (TableTag::GLYF, true)
            } else {
                (tag, false)
            }
        });

        let mut writer = FontWriter::default();
        for (tag, data) in &tables {
            writer.write_raw_table(*tag, data)?;
        }
        Ok(writer)
    }

    /// Copies `head` updating the bounding box, `indexToLocFormat` and, if pinned,
    /// the modification timestamp. `checksumAdjustment` is zeroed until the font is finalized.
    fn head_table(&self, loca_format: LocaFormat, slots: &[&GlyphWithMetrics<'_>]) -> Vec<u8> {
        let mut head = self.font.head.to_vec();
        put_bytes(&mut head, Font::HEAD_CHECKSUM_OFFSET, &[0; 4]);
        if let Some(modified) = self.modified {
            put_bytes(&mut head, Font::HEAD_MODIFIED_OFFSET, &modified.to_be_bytes());
        }

        let bbox = slots
            .iter()
            .filter_map(|slot| slot.inner.bounding_box())
            .reduce(|[x_min, y_min, x_max, y_max], [x0, y0, x1, y1]| {
                [x_min.min(x0), y_min.min(y0), x_max.max(x1), y_max.max(y1)]
            })
            .unwrap_or_default();
        for (i, coord) in bbox.into_iter().enumerate() {
            put_bytes(&mut head, Font::HEAD_BBOX_OFFSET + 2 * i, &coord.to_be_bytes());
        }

        let raw_format = match loca_format {
            LocaFormat::Short => 0_u16,
            LocaFormat::Long => 1,
        };
        put_bytes(&mut head, Font::HEAD_LOCA_FORMAT_OFFSET, &raw_format.to_be_bytes());
        head
    }

    /// Sets `usFirstCharIndex` and `usLastCharIndex` in `OS/2` to the range of mapped chars.
    fn os2_table(&self) -> Cow<'_, [u8]> {
        const FIRST_CHAR_OFFSET: usize = 64;
        const LAST_CHAR_OFFSET: usize = 66;

        let os2 = self.font.os2;
        let codes = self
            .char_map
            .iter()
            .chain(&self.symbol_map)
            .map(|&(ch, _)| u16::try_from(u32::from(ch)).unwrap_or(u16::MAX));
        let Some((first, last)) = codes.fold(None, |range, code| match range {
            None => Some((code, code)),
            Some((first, last)) => Some((code.min(first), code.max(last))),
        }) else {
            return Cow::Borrowed(os2);
        };
        if os2.len() < LAST_CHAR_OFFSET + 2 {
            return Cow::Borrowed(os2);
        }

        let mut patched = os2.to_vec();
        put_bytes(&mut patched, FIRST_CHAR_OFFSET, &first.to_be_bytes());
        put_bytes(&mut patched, LAST_CHAR_OFFSET, &last.to_be_bytes());
        Cow::Owned(patched)
    }
}
