//! Glyphs from the `glyf` table.
//!
//! Glyph IDs are retained in subsets, so glyph data is never rewritten. Parsing only extracts
//! what the subsetter needs: the bounding box and the components of composite glyphs.

use super::Cursor;
use crate::ParseError;

/// Glyph bounding box: `[x_min, y_min, x_max, y_max]`.
pub(crate) type BoundingBox = [i16; 4];

/// Glyph from the `glyf` table.
#[derive(Debug, Clone)]
pub(crate) enum Glyph<'a> {
    Empty,
    Simple(&'a [u8]),
    Composite {
        raw: &'a [u8],
        /// Glyph indices of the components in the declaration order.
        components: Vec<u16>,
    },
}

impl<'a> Glyph<'a> {
    const HEADER_LEN: usize = 10;

    pub(super) fn new(raw: Cursor<'a>) -> Result<Self, ParseError> {
        if raw.bytes.is_empty() {
            return Ok(Self::Empty);
        }

        let mut cursor = raw;
        let number_of_contours = cursor.read_u16()?;
        cursor.skip(8)?; // bounding box
        if number_of_contours <= i16::MAX as u16 {
            return Ok(Self::Simple(raw.bytes));
        }

        let mut components = vec![];
        loop {
            let flags = ComponentFlags(cursor.read_u16()?);
            components.push(cursor.read_u16()?);
            cursor.skip(flags.args_len() + flags.transform_len())?;
            if !flags.has_more_components() {
                break;
            }
        }
        Ok(Self::Composite {
            raw: raw.bytes,
            components,
        })
    }

    /// Returns raw glyph data.
    pub(crate) fn raw(&self) -> &'a [u8] {
        match self {
            Self::Empty => &[],
            Self::Simple(raw) | Self::Composite { raw, .. } => raw,
        }
    }

    /// Returns the bounding box recorded in the glyph header, or `None` for empty glyphs.
    pub(crate) fn bounding_box(&self) -> Option<BoundingBox> {
        let header = self.raw().get(2..Self::HEADER_LEN)?;
        let coord = |i: usize| i16::from_be_bytes([header[2 * i], header[2 * i + 1]]);
        Some([coord(0), coord(1), coord(2), coord(3)])
    }

    /// Iterates over glyph indices of the components of a composite glyph.
    pub(crate) fn component_indices(&self) -> impl Iterator<Item = u16> + '_ {
        let components: &[u16] = match self {
            Self::Composite { components, .. } => components,
            _ => &[],
        };
        components.iter().copied()
    }
}

/// Flags of a composite glyph component.
#[derive(Debug, Clone, Copy)]
struct ComponentFlags(u16);

impl ComponentFlags {
    const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
    const WE_HAVE_A_SCALE: u16 = 0x0008;
    const MORE_COMPONENTS: u16 = 0x0020;
    const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
    const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

    fn has(self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    fn args_len(self) -> usize {
        if self.has(Self::ARG_1_AND_2_ARE_WORDS) {
            4
        } else {
            2
        }
    }

    fn transform_len(self) -> usize {
        if self.has(Self::WE_HAVE_A_SCALE) {
            2
        } else if self.has(Self::WE_HAVE_AN_X_AND_Y_SCALE) {
            4
        } else if self.has(Self::WE_HAVE_A_TWO_BY_TWO) {
            8
        } else {
            0
        }
    }

    fn has_more_components(self) -> bool {
        self.has(Self::MORE_COMPONENTS)
    }
}

/// [`Glyph`] together with metrics read from the `hmtx` table.
#[derive(Debug, Clone)]
pub(crate) struct GlyphWithMetrics<'a> {
    pub(crate) inner: Glyph<'a>,
    pub(crate) advance: u16,
    pub(crate) lsb: u16,
}

/// Placeholder for a glyph dropped from a subset; its slot is retained to keep glyph IDs.
pub(crate) static DROPPED_GLYPH: GlyphWithMetrics<'static> = GlyphWithMetrics {
    inner: Glyph::Empty,
    advance: 0,
    lsb: 0,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn composite_glyph() -> Vec<u8> {
        let mut bytes = vec![];
        bytes.extend_from_slice(&u16::MAX.to_be_bytes()); // numberOfContours = -1
        for coord in [-10_i16, 0, 500, 700] {
            bytes.extend_from_slice(&coord.to_be_bytes());
        }
        // Component with word args and a 2x2 transform
        bytes.extend_from_slice(&0x00a1_u16.to_be_bytes());
        bytes.extend_from_slice(&3_u16.to_be_bytes());
        bytes.extend_from_slice(&[0; 4 + 8]);
        // Last component with byte args
        bytes.extend_from_slice(&0x0000_u16.to_be_bytes());
        bytes.extend_from_slice(&7_u16.to_be_bytes());
        bytes.extend_from_slice(&[0; 2]);
        bytes
    }

    #[test]
    fn parsing_composite_glyph() {
        let bytes = composite_glyph();
        let glyph = Glyph::new(Cursor::new(&bytes)).unwrap();
        assert_eq!(glyph.component_indices().collect::<Vec<_>>(), [3, 7]);
        assert_eq!(glyph.bounding_box(), Some([-10, 0, 500, 700]));
        assert_eq!(glyph.raw(), bytes.as_slice());
    }

    #[test]
    fn truncated_composite_glyph_is_an_error() {
        let bytes = composite_glyph();
        Glyph::new(Cursor::new(&bytes[..bytes.len() - 1])).unwrap_err();
    }

    #[test]
    fn empty_glyph() {
        let glyph = Glyph::new(Cursor::new(&[])).unwrap();
        assert!(matches!(glyph, Glyph::Empty));
        assert_eq!(glyph.bounding_box(), None);
        assert_eq!(glyph.component_indices().count(), 0);
    }
}
