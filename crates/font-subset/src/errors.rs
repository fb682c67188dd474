//! Font parsing and serialization errors.

use std::{fmt, ops};

use crate::TableTag;

/// Error mapping a char to a glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum MapError {
    /// Char is outside the domain of the selected `cmap` subtable (e.g., above `U+FFFF`
    /// for a format 4 subtable).
    #[error("char is outside the domain of the `cmap` subtable")]
    CharTooLarge,
    /// Glyph ID array offset in a format 4 subtable points outside the subtable.
    #[error("glyph ID array offset points outside the `cmap` subtable")]
    InvalidOffset,
}

/// Kind of a font [`ParseError`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ParseErrorKind {
    /// Font data ends prematurely.
    #[error("font data ends prematurely")]
    UnexpectedEof,
    /// Font data is not a single TrueType / OpenType font (e.g., it's a font collection
    /// or a WOFF file).
    #[error("data is not an sfnt font")]
    UnexpectedFontVersion,
    /// Table required for subsetting (e.g., `head`) is missing.
    #[error("required table is missing")]
    MissingTable,
    /// Outlines are not stored in the `glyf` table (e.g., the font has CFF outlines).
    #[error("outlines are not TrueType; only `glyf` outlines can be subsetted")]
    UnsupportedOutlines,
    /// Offset read from the font data points outside the data.
    #[error("offset {0} points outside the data")]
    OffsetOutOfBounds(usize),
    /// Range read from the font data lies outside the data.
    #[error("range {range:?} lies outside the data of length {len}")]
    RangeOutOfBounds {
        /// Range read from the data.
        range: ops::Range<usize>,
        /// Length of the data.
        len: usize,
    },
    /// Table version is not supported.
    #[error("unsupported table version {0:#x}")]
    UnexpectedTableVersion(u32),
    /// Table has an unexpected length.
    #[error("table has length {actual}, expected {expected}")]
    UnexpectedTableLen {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
    /// Table or subtable format is not supported (e.g., for a `cmap` subtable or `loca`).
    #[error("unsupported table format {0}")]
    UnexpectedTableFormat(u16),
    /// Glyph index exceeds the number of glyphs in the font.
    #[error("glyph #{0} does not exist")]
    GlyphOutOfBounds(u16),
    /// Char cannot be mapped to a glyph.
    #[error(transparent)]
    Map(#[from] MapError),
}

/// Error parsing an OpenType [`Font`](crate::Font). Besides the [kind](Self::kind()), the error
/// records the table and the offset in it where the error occurred, if known.
#[derive(Debug)]
pub struct ParseError {
    pub(crate) kind: ParseErrorKind,
    pub(crate) offset: usize,
    pub(crate) table: Option<TableTag>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.table, self.offset) {
            (Some(table), 0) => write!(formatter, "table `{table}`: "),
            (Some(table), offset) => write!(formatter, "table `{table}` at {offset}: "),
            (None, 0) => Ok(()),
            (None, offset) => write!(formatter, "at {offset}: "),
        }?;
        write!(formatter, "{}", self.kind)
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ParseErrorKind::Map(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MapError> for ParseError {
    fn from(err: MapError) -> Self {
        Self::in_table(err.into(), TableTag::CMAP)
    }
}

impl ParseError {
    pub(crate) fn in_table(kind: ParseErrorKind, tag: TableTag) -> Self {
        Self {
            kind,
            offset: 0,
            table: Some(tag),
        }
    }

    pub(crate) fn missing_table(tag: TableTag) -> Self {
        Self::in_table(ParseErrorKind::MissingTable, tag)
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }

    /// Returns the table this error relates to, if any.
    pub fn table(&self) -> Option<TableTag> {
        self.table
    }

    /// Returns the offset in the table (or in the font data if there is no table) where
    /// this error occurred.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Error serializing a [`FontSubset`](crate::FontSubset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum WriteError {
    /// Table does not fit into the limits of its format, e.g. a `loca` offset
    /// exceeds 32 bits.
    #[error("table `{0}` exceeds the size limits of its format")]
    TableOverflow(TableTag),
    /// Font exceeds the size limits of the sfnt or WOFF2 container.
    #[error("font exceeds the size limits of the container")]
    FontOverflow,
    /// Brotli encoder failed.
    #[error("Brotli compression failed")]
    Compression,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ParseError {
            kind: ParseErrorKind::UnexpectedEof,
            offset: 12,
            table: Some(TableTag::HEAD),
        };
        assert_eq!(err.to_string(), "table `head` at 12: font data ends prematurely");

        let err = ParseError::from(MapError::CharTooLarge);
        assert_eq!(
            err.to_string(),
            "table `cmap`: char is outside the domain of the `cmap` subtable"
        );
        assert!(std::error::Error::source(&err).is_some());

        let err = ParseError {
            kind: ParseErrorKind::UnexpectedFontVersion,
            offset: 0,
            table: None,
        };
        assert_eq!(err.to_string(), "data is not an sfnt font");

        let err = WriteError::TableOverflow(TableTag::CMAP);
        assert_eq!(
            err.to_string(),
            "table `cmap` exceeds the size limits of its format"
        );
    }
}
