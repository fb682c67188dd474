//! OpenType font subsetting for web fonts.
//!
//! The subsetter keeps glyphs reachable from a set of chars (directly via `cmap`, through `GSUB`
//! substitutions, or as composite glyph components) and serializes the result as a TrueType
//! font or a WOFF2 web font. Glyph IDs are retained, so glyph-indexed tables never need
//! renumbering; `GSUB` / `GPOS` subtables, kerning pairs and glyph names that only concern
//! dropped glyphs are removed from them.
//!
//! # Examples
//!
//! ```no_run
//! use font_subset::{Font, FontSubset};
//! # use std::collections::BTreeSet;
//!
//! let font_bytes = std::fs::read("NotoSans-Regular.ttf")?;
//! let font = Font::new(&font_bytes)?;
//! let chars: BTreeSet<char> = (' '..='~').collect();
//! let woff2 = FontSubset::new(&font, &chars)?.to_woff2()?;
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```

#![doc(html_root_url = "https://docs.rs/font-subset/0.1.0")]

mod errors;
mod font;
mod subset;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
#[cfg(test)]
mod tests;
mod write;

pub use crate::{
    errors::{MapError, ParseError, ParseErrorKind, WriteError},
    font::{covered_chars, Font, TableTag},
    subset::FontSubset,
};
