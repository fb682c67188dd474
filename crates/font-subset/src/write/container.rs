//! Sfnt and WOFF2 containers.

use std::iter;

use super::{search_params, write_u16, write_u32};
use crate::{Font, TableTag, WriteError};

fn pad_to_4(buffer: &mut Vec<u8>) {
    let padding = (4 - buffer.len() % 4) % 4;
    buffer.extend(iter::repeat_n(0_u8, padding));
}

fn base128_len(value: u32) -> usize {
    let bits = (u32::BITS - value.leading_zeros()) as usize;
    bits.div_ceil(7).max(1)
}

/// Writes a `UIntBase128` value: 7-bit groups starting from the most significant one,
/// with the high bit set on all bytes except for the last one.
#[allow(clippy::cast_possible_truncation)] // groups are masked
fn write_base128(buffer: &mut Vec<u8>, value: u32) {
    for i in (0..base128_len(value)).rev() {
        let group = ((value >> (7 * i)) & 0x7f) as u8;
        buffer.push(if i == 0 { group } else { group | 0x80 });
    }
}

/// Tags encoded in WOFF2 table directory flags by their index.
const WOFF2_KNOWN_TAGS: [[u8; 4]; 63] = [
    *b"cmap", *b"head", *b"hhea", *b"hmtx", *b"maxp", *b"name", *b"OS/2", *b"post", *b"cvt ",
    *b"fpgm", *b"glyf", *b"loca", *b"prep", *b"CFF ", *b"VORG", *b"EBDT", *b"EBLC", *b"gasp",
    *b"hdmx", *b"kern", *b"LTSH", *b"PCLT", *b"VDMX", *b"vhea", *b"vmtx", *b"BASE", *b"GDEF",
    *b"GPOS", *b"GSUB", *b"EBSC", *b"JSTF", *b"MATH", *b"CBDT", *b"CBLC", *b"COLR", *b"CPAL",
    *b"SVG ", *b"sbix", *b"acnt", *b"avar", *b"bdat", *b"bloc", *b"bsln", *b"cvar", *b"fdsc",
    *b"feat", *b"fmtx", *b"fvar", *b"gvar", *b"hsty", *b"just", *b"lcar", *b"mort", *b"morx",
    *b"opbd", *b"prop", *b"trak", *b"Zapf", *b"Silf", *b"Glat", *b"Gloc", *b"Feat", *b"Sill",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct TableRecord {
    pub(super) tag: TableTag,
    pub(super) checksum: u32,
    /// Offset of the table data; relative to the data start until the font is finalized.
    /// Always 4-byte aligned.
    pub(super) offset: u32,
    /// Unpadded table length.
    pub(super) length: u32,
}

impl TableRecord {
    const SFNT_LEN: u16 = 16;

    fn write_sfnt_entry(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.tag.0);
        write_u32(buffer, self.checksum);
        write_u32(buffer, self.offset);
        write_u32(buffer, self.length);
    }

    /// Checksum of the sfnt directory entry for this table.
    fn entry_checksum(&self) -> u32 {
        [u32::from_be_bytes(self.tag.0), self.checksum, self.offset, self.length]
            .into_iter()
            .fold(0, u32::wrapping_add)
    }

    fn write_woff2_entry(&self, buffer: &mut Vec<u8>) {
        const CUSTOM_TAG: u8 = 63;
        // Transform version 3 is the null transform for `glyf` and `loca`; for other tables,
        // the null transform is version 0.
        const NULL_TRANSFORM_V3: u8 = 3 << 6;

        let known_idx = WOFF2_KNOWN_TAGS
            .iter()
            .position(|tag| *tag == self.tag.0)
            .and_then(|idx| u8::try_from(idx).ok());
        match known_idx {
            Some(idx) if self.tag == TableTag::GLYF || self.tag == TableTag::LOCA => {
                buffer.push(idx | NULL_TRANSFORM_V3);
            }
            Some(idx) => buffer.push(idx),
            None => {
                buffer.push(CUSTOM_TAG);
                buffer.extend_from_slice(&self.tag.0);
            }
        }
        write_base128(buffer, self.length);
    }
}

/// Collection of serialized tables that can be packaged as an OpenType or WOFF2 font.
#[derive(Debug, Clone, Default)]
pub(crate) struct FontWriter {
    /// Records in the order tables were written.
    pub(super) tables: Vec<TableRecord>,
    /// Table data with each table padded to a 4-byte boundary.
    pub(super) table_data: Vec<u8>,
}

impl FontWriter {
    const SFNT_HEADER_LEN: usize = 12;
    const WOFF2_HEADER_LEN: usize = 48;

    pub(crate) fn write_table<T>(
        &mut self,
        tag: TableTag,
        write: impl FnOnce(&mut Vec<u8>) -> T,
    ) -> Result<T, WriteError> {
        let offset = self.table_data.len();
        let output = write(&mut self.table_data);
        let length = self.table_data.len() - offset;
        pad_to_4(&mut self.table_data);

        self.tables.push(TableRecord {
            tag,
            checksum: Font::checksum(&self.table_data[offset..]),
            offset: u32::try_from(offset).map_err(|_| WriteError::FontOverflow)?,
            length: u32::try_from(length).map_err(|_| WriteError::TableOverflow(tag))?,
        });
        Ok(output)
    }

    pub(crate) fn write_raw_table(&mut self, tag: TableTag, data: &[u8]) -> Result<(), WriteError> {
        self.write_table(tag, |buffer| buffer.extend_from_slice(data))
    }

    fn table_count(&self) -> Result<u16, WriteError> {
        u16::try_from(self.tables.len()).map_err(|_| WriteError::FontOverflow)
    }

    fn sfnt_header(&self) -> Result<Vec<u8>, WriteError> {
        let table_count = self.table_count()?;
        let mut header = Vec::with_capacity(Self::SFNT_HEADER_LEN);
        write_u32(&mut header, Font::SFNT_VERSION);
        write_u16(&mut header, table_count);
        for param in search_params(table_count, TableRecord::SFNT_LEN) {
            write_u16(&mut header, param);
        }
        Ok(header)
    }

    /// Offset of the table data in the sfnt font.
    fn data_offset(&self) -> usize {
        Self::SFNT_HEADER_LEN + self.tables.len() * usize::from(TableRecord::SFNT_LEN)
    }

    /// Makes table offsets absolute and sets `checksumAdjustment` in the `head` table
    /// (if there is one).
    fn finalize(&mut self) -> Result<(), WriteError> {
        let data_offset = self.data_offset();
        let shift = u32::try_from(data_offset).map_err(|_| WriteError::FontOverflow)?;
        for record in &mut self.tables {
            record.offset = record
                .offset
                .checked_add(shift)
                .ok_or(WriteError::FontOverflow)?;
        }

        let font_checksum = self.tables.iter().fold(
            Font::checksum(&self.sfnt_header()?),
            |acc, record| {
                acc.wrapping_add(record.entry_checksum())
                    .wrapping_add(record.checksum)
            },
        );
        let adjustment = Font::SFNT_CHECKSUM.wrapping_sub(font_checksum);

        let head = self
            .tables
            .iter()
            .find(|record| record.tag == TableTag::HEAD);
        if let Some(head) = head {
            let pos = head.offset as usize - data_offset + Font::HEAD_CHECKSUM_OFFSET;
            self.table_data[pos..pos + 4].copy_from_slice(&adjustment.to_be_bytes());
        }
        Ok(())
    }

    pub(crate) fn into_opentype(mut self) -> Result<Vec<u8>, WriteError> {
        self.finalize()?;
        let mut buffer = self.sfnt_header()?;
        // Table data stays in the written order; only the directory is sorted.
        self.tables.sort_unstable_by_key(|record| record.tag);
        for record in &self.tables {
            record.write_sfnt_entry(&mut buffer);
        }
        buffer.extend_from_slice(&self.table_data);
        Ok(buffer)
    }

    pub(crate) fn into_woff2(mut self) -> Result<Vec<u8>, WriteError> {
        const SIGNATURE: u32 = 0x_774f_4632; // `wOF2`

        self.finalize()?;
        let compressed = self.compress_data()?;
        let mut directory = vec![];
        for record in &self.tables {
            record.write_woff2_entry(&mut directory);
        }
        let file_len = (Self::WOFF2_HEADER_LEN + directory.len() + compressed.len())
            .next_multiple_of(4);
        let sfnt_len = self.data_offset() + self.table_data.len();
        let to_u32 = |len: usize| u32::try_from(len).map_err(|_| WriteError::FontOverflow);

        let mut buffer = Vec::with_capacity(file_len);
        write_u32(&mut buffer, SIGNATURE);
        write_u32(&mut buffer, Font::SFNT_VERSION);
        write_u32(&mut buffer, to_u32(file_len)?);
        write_u16(&mut buffer, self.table_count()?);
        write_u16(&mut buffer, 0); // reserved
        write_u32(&mut buffer, to_u32(sfnt_len)?);
        write_u32(&mut buffer, to_u32(compressed.len())?);
        write_u16(&mut buffer, 0); // majorVersion
        write_u16(&mut buffer, 0); // minorVersion
        // No metadata or private blocks: their offsets and lengths are zero.
        for _ in 0..5 {
            write_u32(&mut buffer, 0);
        }
        debug_assert_eq!(buffer.len(), Self::WOFF2_HEADER_LEN);

        buffer.extend_from_slice(&directory);
        buffer.extend_from_slice(&compressed);
        pad_to_4(&mut buffer);
        debug_assert_eq!(buffer.len(), file_len);
        Ok(buffer)
    }
}
