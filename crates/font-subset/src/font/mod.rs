//! OpenType parsing logic.

use core::{fmt, ops};
use std::collections::BTreeSet;

pub(crate) use self::{
    cmap::{
        CharMaps, CmapTable, SegmentDeltas, SegmentWithDelta, SegmentedCoverage,
        SequentialMapGroup,
    },
    glyph::{BoundingBox, Glyph, GlyphWithMetrics, DROPPED_GLYPH},
};
use crate::errors::{MapError, ParseError, ParseErrorKind};

mod cmap;
mod glyph;
pub(crate) mod gsub;

/// Read-only view into font data that tracks the position for error reporting.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor<'a> {
    pub(crate) bytes: &'a [u8],
    offset: usize,
    table: Option<TableTag>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            table: None,
        }
    }

    pub(crate) fn for_table(bytes: &'a [u8], table: TableTag) -> Self {
        Self {
            bytes,
            offset: 0,
            table: Some(table),
        }
    }

    pub(crate) fn err(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            kind,
            offset: self.offset,
            table: self.table,
        }
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), ParseError> {
        if self.bytes.len() < n {
            Err(self.err(ParseErrorKind::UnexpectedEof))
        } else {
            self.bytes = &self.bytes[n..];
            self.offset += n;
            Ok(())
        }
    }

    /// Returns a cursor starting at the specified offset relative to this cursor.
    pub(crate) fn at(&self, offset: usize) -> Result<Self, ParseError> {
        if offset > self.bytes.len() {
            return Err(self.err(ParseErrorKind::OffsetOutOfBounds(offset)));
        }
        let mut cursor = *self;
        cursor.bytes = &self.bytes[offset..];
        cursor.offset += offset;
        Ok(cursor)
    }

    pub(crate) fn range(&self, range: ops::Range<usize>) -> Result<Self, ParseError> {
        let Some(bytes) = self.bytes.get(range.clone()) else {
            return Err(self.err(ParseErrorKind::RangeOutOfBounds {
                range,
                len: self.bytes.len(),
            }));
        };
        Ok(Self {
            bytes,
            offset: self.offset + range.start,
            table: self.table,
        })
    }

    /// Splits off the first `len` bytes and advances this cursor past them.
    pub(crate) fn split_at(&mut self, len: usize) -> Result<Self, ParseError> {
        let head = self.range(0..len)?;
        self.skip(len)?;
        Ok(head)
    }

    pub(crate) fn read_byte_array<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let head = self.split_at(N)?;
        // `unwrap()` is safe: `head` has exactly `N` bytes
        Ok(head.bytes.try_into().unwrap())
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, ParseError> {
        self.read_byte_array().map(u16::from_be_bytes)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, ParseError> {
        self.read_byte_array().map(u32::from_be_bytes)
    }

    pub(crate) fn read_u16_checked<T>(
        &mut self,
        check: impl FnOnce(u16) -> Result<T, ParseErrorKind>,
    ) -> Result<T, ParseError> {
        let start = *self;
        let value = self.read_u16()?;
        check(value).map_err(|kind| start.err(kind))
    }

    pub(crate) fn read_u32_checked<T>(
        &mut self,
        check: impl FnOnce(u32) -> Result<T, ParseErrorKind>,
    ) -> Result<T, ParseError> {
        let start = *self;
        let value = self.read_u32()?;
        check(value).map_err(|kind| start.err(kind))
    }

    /// Reads a big-endian `u16` at the specified offset without advancing the cursor.
    pub(crate) fn u16_at(&self, offset: usize) -> Result<u16, ParseError> {
        self.at(offset)?.read_u16()
    }
}

/// OpenType table tag, such as `cmap` or `glyf`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableTag(pub [u8; 4]);

impl fmt::Debug for TableTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "TableTag({self})")
    }
}

impl fmt::Display for TableTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(formatter, "{}", char::from(byte))?;
            } else {
                write!(formatter, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

#[allow(missing_docs)] // self-explanatory
impl TableTag {
    pub const CMAP: Self = Self(*b"cmap");
    pub const HEAD: Self = Self(*b"head");
    pub const HHEA: Self = Self(*b"hhea");
    pub const HMTX: Self = Self(*b"hmtx");
    pub const MAXP: Self = Self(*b"maxp");
    pub const NAME: Self = Self(*b"name");
    pub const OS2: Self = Self(*b"OS/2");
    pub const POST: Self = Self(*b"post");
    pub const LOCA: Self = Self(*b"loca");
    pub const GLYF: Self = Self(*b"glyf");
    pub const CVT: Self = Self(*b"cvt ");
    pub const FPGM: Self = Self(*b"fpgm");
    pub const PREP: Self = Self(*b"prep");
    pub const CFF: Self = Self(*b"CFF ");
    pub const CFF2: Self = Self(*b"CFF2");
    pub const GSUB: Self = Self(*b"GSUB");
    pub const GPOS: Self = Self(*b"GPOS");
    pub const GDEF: Self = Self(*b"GDEF");
    pub const BASE: Self = Self(*b"BASE");
    pub const JSTF: Self = Self(*b"JSTF");
    pub const MATH: Self = Self(*b"MATH");
    pub const KERN: Self = Self(*b"kern");
    pub const GASP: Self = Self(*b"gasp");
    pub const VHEA: Self = Self(*b"vhea");
    pub const VMTX: Self = Self(*b"vmtx");
}

/// Tables carried over to subsets. All of them index glyphs by ID (or not at all),
/// so they remain valid as long as glyph IDs are retained. `GSUB`, `GPOS` and `kern`
/// are pruned to retained glyphs when writing a subset; other tables are copied as-is.
pub(crate) const PASSTHROUGH_TABLES: [TableTag; 10] = [
    TableTag::GSUB,
    TableTag::GPOS,
    TableTag::GDEF,
    TableTag::BASE,
    TableTag::JSTF,
    TableTag::MATH,
    TableTag::KERN,
    TableTag::GASP,
    TableTag::VHEA,
    TableTag::VMTX,
];

/// Table directory of an sfnt font.
#[derive(Debug, Clone)]
pub(crate) struct TableDirectory<'a> {
    records: Vec<(TableTag, &'a [u8])>,
}

impl<'a> TableDirectory<'a> {
    const TRUE_VERSION: u32 = 0x_7472_7565; // 'true'
    const CFF_VERSION: u32 = 0x_4f54_544f; // 'OTTO'

    pub(crate) fn parse(bytes: &'a [u8]) -> Result<Self, ParseError> {
        let mut cursor = Cursor::new(bytes);
        cursor.read_u32_checked(|version| {
            if matches!(
                version,
                Font::SFNT_VERSION | Self::TRUE_VERSION | Self::CFF_VERSION
            ) {
                Ok(())
            } else {
                Err(ParseErrorKind::UnexpectedFontVersion)
            }
        })?;
        let table_count = cursor.read_u16()?;
        cursor.skip(6)?; // searchRange, entrySelector, rangeShift

        let records = (0..table_count).map(|_| {
            let tag = TableTag(cursor.read_byte_array()?);
            cursor.skip(4)?; // checksum
            let offset = cursor.read_u32()? as usize;
            let len = cursor.read_u32()? as usize;
            let table = Cursor::new(bytes).range(offset..offset + len)?;
            Ok((tag, table.bytes))
        });
        Ok(Self {
            records: records.collect::<Result<_, ParseError>>()?,
        })
    }

    pub(crate) fn get(&self, tag: TableTag) -> Option<&'a [u8]> {
        self.records
            .iter()
            .find_map(|&(record_tag, bytes)| (record_tag == tag).then_some(bytes))
    }

    fn require(&self, tag: TableTag) -> Result<&'a [u8], ParseError> {
        self.get(tag).ok_or_else(|| ParseError::missing_table(tag))
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct HheaTable<'a> {
    pub(crate) raw: &'a [u8],
    pub(crate) number_of_h_metrics: u16,
}

impl<'a> HheaTable<'a> {
    pub(crate) const EXPECTED_LEN: usize = 36; // 18 words

    fn parse(bytes: &'a [u8]) -> Result<Self, ParseError> {
        if bytes.len() != Self::EXPECTED_LEN {
            return Err(ParseError::in_table(
                ParseErrorKind::UnexpectedTableLen {
                    expected: Self::EXPECTED_LEN,
                    actual: bytes.len(),
                },
                TableTag::HHEA,
            ));
        }
        let number_of_h_metrics =
            u16::from_be_bytes([bytes[Self::EXPECTED_LEN - 2], bytes[Self::EXPECTED_LEN - 1]]);
        Ok(Self {
            raw: bytes,
            number_of_h_metrics,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct HmtxTable<'a> {
    raw: Cursor<'a>,
    number_of_h_metrics: u16,
}

impl HmtxTable<'_> {
    fn advance_and_lsb(&self, glyph_idx: u16) -> Result<(u16, u16), ParseError> {
        if self.number_of_h_metrics == 0 {
            return Err(self.raw.err(ParseErrorKind::UnexpectedEof));
        }
        let (advance, lsb);
        if glyph_idx < self.number_of_h_metrics {
            let mut cursor = self.raw.at(usize::from(glyph_idx) * 4)?;
            advance = cursor.read_u16()?;
            lsb = cursor.read_u16()?;
        } else {
            let advance_offset = usize::from(self.number_of_h_metrics - 1) * 4;
            advance = self.raw.u16_at(advance_offset)?;

            let lsb_offset = usize::from(self.number_of_h_metrics) * 4
                + usize::from(glyph_idx - self.number_of_h_metrics) * 2;
            lsb = self.raw.u16_at(lsb_offset)?;
        }
        Ok((advance, lsb))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocaFormat {
    Short,
    Long,
}

impl LocaFormat {
    const fn bytes_per_offset(self) -> usize {
        match self {
            Self::Short => 2,
            Self::Long => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct LocaTable<'a> {
    format: LocaFormat,
    cursor: Cursor<'a>,
}

impl<'a> LocaTable<'a> {
    fn new(format: LocaFormat, glyph_count: u16, bytes: &'a [u8]) -> Result<Self, ParseError> {
        let expected_len = format.bytes_per_offset() * (usize::from(glyph_count) + 1);
        // Some fonts have trailing padding in `loca`, so only check the lower bound.
        if bytes.len() < expected_len {
            return Err(ParseError::in_table(
                ParseErrorKind::UnexpectedTableLen {
                    expected: expected_len,
                    actual: bytes.len(),
                },
                TableTag::LOCA,
            ));
        }
        Ok(Self {
            format,
            cursor: Cursor::for_table(bytes, TableTag::LOCA),
        })
    }

    fn glyph_range(&self, glyph_idx: u16) -> Result<ops::Range<usize>, ParseError> {
        let glyph_idx = usize::from(glyph_idx);
        Ok(match self.format {
            LocaFormat::Short => {
                let mut cursor = self.cursor.at(glyph_idx * 2)?;
                let start_offset = usize::from(cursor.read_u16()?) * 2;
                let end_offset = usize::from(cursor.read_u16()?) * 2;
                start_offset..end_offset
            }
            LocaFormat::Long => {
                let mut cursor = self.cursor.at(glyph_idx * 4)?;
                let start_offset = cursor.read_u32()? as usize;
                let end_offset = cursor.read_u32()? as usize;
                start_offset..end_offset
            }
        })
    }
}

/// OpenType font with TrueType outlines.
#[derive(Debug, Clone)]
pub struct Font<'a> {
    pub(crate) char_maps: CharMaps<'a>,
    pub(crate) head: &'a [u8],
    pub(crate) hhea: HheaTable<'a>,
    pub(crate) hmtx: HmtxTable<'a>,
    pub(crate) maxp: &'a [u8],
    pub(crate) name: &'a [u8],
    pub(crate) os2: &'a [u8],
    pub(crate) post: &'a [u8],
    pub(crate) loca: LocaTable<'a>,
    pub(crate) glyf: &'a [u8],
    pub(crate) cvt: Option<&'a [u8]>,
    pub(crate) fpgm: Option<&'a [u8]>,
    pub(crate) prep: Option<&'a [u8]>,
    pub(crate) glyph_count: u16,
    /// Glyph-indexed tables carried over to subsets.
    pub(crate) passthrough: Vec<(TableTag, &'a [u8])>,
}

impl<'a> Font<'a> {
    pub(crate) const SFNT_VERSION: u32 = 0x_0001_0000;
    pub(crate) const SFNT_CHECKSUM: u32 = 0x_b1b0_afba;
    pub(crate) const HEAD_CHECKSUM_OFFSET: usize = 8;
    pub(crate) const HEAD_MODIFIED_OFFSET: usize = 28;
    pub(crate) const HEAD_BBOX_OFFSET: usize = 36;
    pub(crate) const HEAD_LOCA_FORMAT_OFFSET: usize = 50;
    pub(crate) const HEAD_LEN: usize = 54;

    /// Parses a font from the provided bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the font data is malformed, misses required tables, or uses
    /// outlines other than TrueType `glyf`.
    pub fn new(bytes: &'a [u8]) -> Result<Self, ParseError> {
        let directory = TableDirectory::parse(bytes)?;
        if directory.get(TableTag::GLYF).is_none()
            && (directory.get(TableTag::CFF).is_some() || directory.get(TableTag::CFF2).is_some())
        {
            return Err(ParseError {
                kind: ParseErrorKind::UnsupportedOutlines,
                offset: 0,
                table: None,
            });
        }

        let char_maps = match directory.get(TableTag::CMAP) {
            Some(cmap) => CharMaps::parse(Cursor::for_table(cmap, TableTag::CMAP))?,
            None => CharMaps::default(),
        };
        let head = directory.require(TableTag::HEAD)?;
        let loca_format = Self::parse_loca_format(head)?;
        let maxp = directory.require(TableTag::MAXP)?;
        let glyph_count = Self::parse_glyph_count(maxp)?;
        let loca = LocaTable::new(loca_format, glyph_count, directory.require(TableTag::LOCA)?)?;
        let hhea = HheaTable::parse(directory.require(TableTag::HHEA)?)?;
        let hmtx = HmtxTable {
            raw: Cursor::for_table(directory.require(TableTag::HMTX)?, TableTag::HMTX),
            number_of_h_metrics: hhea.number_of_h_metrics,
        };
        let passthrough = PASSTHROUGH_TABLES
            .iter()
            .filter_map(|&tag| Some((tag, directory.get(tag)?)))
            .collect();

        Ok(Self {
            char_maps,
            head,
            hhea,
            hmtx,
            maxp,
            name: directory.require(TableTag::NAME)?,
            os2: directory.require(TableTag::OS2)?,
            post: directory.require(TableTag::POST)?,
            loca,
            glyf: directory.require(TableTag::GLYF)?,
            cvt: directory.get(TableTag::CVT),
            fpgm: directory.get(TableTag::FPGM),
            prep: directory.get(TableTag::PREP),
            glyph_count,
            passthrough,
        })
    }

    fn parse_loca_format(head_bytes: &[u8]) -> Result<LocaFormat, ParseError> {
        let mut cursor = Cursor::for_table(head_bytes, TableTag::HEAD);
        cursor.read_u32_checked(|version| {
            if version == 0x_0001_0000 {
                Ok(())
            } else {
                Err(ParseErrorKind::UnexpectedTableVersion(version))
            }
        })?;
        if head_bytes.len() < Self::HEAD_LEN {
            return Err(cursor.err(ParseErrorKind::UnexpectedTableLen {
                expected: Self::HEAD_LEN,
                actual: head_bytes.len(),
            }));
        }
        cursor.skip(Self::HEAD_LOCA_FORMAT_OFFSET - 4)?;
        // ^ fontRevision, checksumAdjustment, magicNumber, flags, unitsPerEm, created, modified,
        // bounding box, macStyle, lowestRecPPEM, fontDirectionHint

        cursor.read_u16_checked(|raw_format| match raw_format {
            0 => Ok(LocaFormat::Short),
            1 => Ok(LocaFormat::Long),
            _ => Err(ParseErrorKind::UnexpectedTableFormat(raw_format)),
        })
    }

    fn parse_glyph_count(maxp_bytes: &[u8]) -> Result<u16, ParseError> {
        let mut cursor = Cursor::for_table(maxp_bytes, TableTag::MAXP);
        cursor.read_u32_checked(|version| {
            if version == 0x_0000_5000 || version == 0x_0001_0000 {
                Ok(())
            } else {
                Err(ParseErrorKind::UnexpectedTableVersion(version))
            }
        })?;
        cursor.read_u16()
    }

    /// Returns the number of glyphs in this font.
    pub fn glyph_count(&self) -> u16 {
        self.glyph_count
    }

    /// Maps a char to the glyph index using the best Unicode `cmap` subtable.
    /// Returns 0 (the missing glyph) if the char is not mapped or the font has no usable `cmap`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `cmap` subtable is malformed.
    pub fn map_char(&self, ch: char) -> Result<u16, MapError> {
        match &self.char_maps.unicode {
            Some(cmap) => cmap.map_char(ch),
            None => Ok(0),
        }
    }

    /// Returns all chars mapped to a non-missing glyph by the best Unicode `cmap` subtable.
    pub fn chars(&self) -> BTreeSet<char> {
        self.char_maps.covered_chars(self.glyph_count)
    }

    pub(crate) fn glyph(&self, glyph_idx: u16) -> Result<GlyphWithMetrics<'a>, ParseError> {
        if glyph_idx >= self.glyph_count {
            return Err(ParseError::in_table(
                ParseErrorKind::GlyphOutOfBounds(glyph_idx),
                TableTag::GLYF,
            ));
        }
        let range = self.loca.glyph_range(glyph_idx)?;
        let raw = Cursor::for_table(self.glyf, TableTag::GLYF).range(range)?;
        let inner = Glyph::new(raw)?;
        let (advance, lsb) = self.hmtx.advance_and_lsb(glyph_idx)?;
        Ok(GlyphWithMetrics {
            inner,
            advance,
            lsb,
        })
    }

    /// Computes an OpenType checksum of the provided data, which is assumed to be padded
    /// to a 4-byte boundary.
    pub(crate) fn checksum(data: &[u8]) -> u32 {
        data.chunks(4).fold(0_u32, |acc, chunk| {
            let mut word = [0_u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            acc.wrapping_add(u32::from_be_bytes(word))
        })
    }
}

/// Returns all chars that the font maps to a glyph via its best Unicode `cmap` subtable.
///
/// Unlike [`Font::new()`], this only requires the table directory and the `cmap` table
/// to be well-formed, so it works for fonts with any outline format. If the font has no
/// `cmap` table or no supported Unicode subtable, an empty set is returned.
///
/// # Errors
///
/// Returns an error if the font data is not an sfnt font or the `cmap` table is malformed.
pub fn covered_chars(bytes: &[u8]) -> Result<BTreeSet<char>, ParseError> {
    let directory = TableDirectory::parse(bytes)?;
    let Some(cmap) = directory.get(TableTag::CMAP) else {
        return Ok(BTreeSet::new());
    };
    let char_maps = CharMaps::parse(Cursor::for_table(cmap, TableTag::CMAP))?;
    let glyph_count = match directory.get(TableTag::MAXP) {
        Some(maxp) => Font::parse_glyph_count(maxp)?,
        None => u16::MAX,
    };
    Ok(char_maps.covered_chars(glyph_count))
}
