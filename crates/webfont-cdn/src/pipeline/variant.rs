//! Processing a single font variant.

use std::{fs, path::PathBuf};

use log::{debug, error, info, warn};

use super::Pipeline;
use crate::{
    css::{emit_css, Stylesheets},
    BuiltSubset, GlyphInventory, SubsetBuilder, SubsetOutcome, SubsetResult, VariantConfig,
    VariantError,
};

/// Aggregate statistics for a processed font variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VariantStats {
    /// Number of ranges in the catalog.
    pub total_ranges: usize,
    /// Number of built subsets.
    pub created_subsets: usize,
    /// Number of ranges without a subset: ranges without glyphs in the font, and failed ranges.
    pub skipped_ranges: usize,
    /// Total size of built subsets in bytes.
    pub total_size: u64,
}

/// Output of processing a font variant.
#[derive(Debug, Clone)]
pub struct VariantOutput {
    /// Aggregate statistics.
    pub stats: VariantStats,
    /// Per-range results in the catalog order.
    pub results: Vec<SubsetResult>,
    /// Generated stylesheets.
    pub css: Stylesheets,
    /// Path to the pretty-printed stylesheet.
    pub css_path: PathBuf,
    /// Path to the minified stylesheet.
    pub min_css_path: PathBuf,
}

impl VariantOutput {
    /// Iterates over built subsets in the catalog order.
    pub fn built_subsets(&self) -> impl Iterator<Item = &BuiltSubset> + '_ {
        self.results.iter().filter_map(SubsetResult::as_built)
    }
}

impl Pipeline {
    /// Builds subsets of `font_bytes` for every catalog range, and writes them together with
    /// the variant stylesheets to the font output directory.
    ///
    /// Ranges are processed in the catalog order. A failure to build or write a subset
    /// is logged and counted as a skipped range; it never aborts the variant.
    ///
    /// # Errors
    ///
    /// Returns an error if the font binary cannot be inspected, or stylesheets cannot be written.
    pub fn process_variant(
        &self,
        font_name: &str,
        variant: &VariantConfig,
        font_bytes: &[u8],
    ) -> Result<VariantOutput, VariantError> {
        let variant_name = variant.variant();
        info!(
            "Processing {font_name}-{variant_name} (weight: {})",
            variant.weight()
        );

        let inventory = GlyphInventory::inspect(font_bytes).map_err(VariantError::Inventory)?;
        if inventory.is_empty() {
            warn!("{font_name}-{variant_name}: font has no usable character map; all ranges are skipped");
        } else {
            debug!("{font_name}-{variant_name}: font covers {} chars", inventory.len());
        }
        let font = SubsetBuilder::parse_font(font_bytes);
        if let Err(err) = &font {
            warn!("{font_name}-{variant_name}: font cannot be subsetted: {err}");
        }

        let font_dir = self.font_dir(font_name);
        fs::create_dir_all(&font_dir).map_err(|source| VariantError::Io {
            path: font_dir.clone(),
            source,
        })?;

        let mut stats = VariantStats {
            total_ranges: self.catalog.len(),
            ..VariantStats::default()
        };
        let mut results = Vec::with_capacity(self.catalog.len());
        for entry in self.catalog.entries() {
            let range_id = entry.id();
            let outcome = self
                .builder
                .build(&font, range_id, entry.ranges(), &inventory);
            let encoded = match outcome {
                Ok(SubsetOutcome::Encoded(encoded)) => encoded,
                Ok(SubsetOutcome::Skipped) => {
                    debug!("{font_name}-{variant_name}: skipped range `{range_id}`, no matching chars");
                    stats.skipped_ranges += 1;
                    results.push(SubsetResult::Skipped {
                        range_id: range_id.to_owned(),
                    });
                    continue;
                }
                Err(err) => {
                    error!("{font_name}-{variant_name}: {err}");
                    stats.skipped_ranges += 1;
                    results.push(SubsetResult::Skipped {
                        range_id: range_id.to_owned(),
                    });
                    continue;
                }
            };

            let filename = self.namer.filename(font_name, variant_name, range_id);
            let path = font_dir.join(&filename);
            if let Err(err) = fs::write(&path, &encoded) {
                error!(
                    "{font_name}-{variant_name}: failed writing subset for range `{range_id}` to {}: {err}",
                    path.display()
                );
                stats.skipped_ranges += 1;
                results.push(SubsetResult::Skipped {
                    range_id: range_id.to_owned(),
                });
                continue;
            }

            let byte_size = encoded.len() as u64;
            info!("{font_name}-{variant_name}: built range `{range_id}`: {filename} ({byte_size} bytes)");
            stats.created_subsets += 1;
            stats.total_size += byte_size;
            results.push(SubsetResult::Built(BuiltSubset {
                range_id: range_id.to_owned(),
                filename,
                byte_size,
                unicode_range: entry.expr().to_owned(),
            }));
        }

        let built: Vec<_> = results
            .iter()
            .filter_map(SubsetResult::as_built)
            .cloned()
            .collect();
        let css = emit_css(font_name, variant.weight(), &built);
        let css_path = font_dir.join(format!("{font_name}-{variant_name}.css"));
        let min_css_path = font_dir.join(format!("{font_name}-{variant_name}.min.css"));
        for (path, contents) in [(&css_path, &css.pretty), (&min_css_path, &css.minified)] {
            fs::write(path, contents).map_err(|source| VariantError::Io {
                path: path.clone(),
                source,
            })?;
        }

        info!(
            "Finished {font_name}-{variant_name}: {} subsets created, {} ranges skipped, {} bytes total",
            stats.created_subsets, stats.skipped_ranges, stats.total_size
        );
        Ok(VariantOutput {
            stats,
            results,
            css,
            css_path,
            min_css_path,
        })
    }
}
