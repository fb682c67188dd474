//! Processing a font update: resolving variant sources and processing each variant.

use std::{fs, path::PathBuf};

use log::{error, info, warn};

use super::{Pipeline, VariantOutput};
use crate::{
    fetch::has_font_extension, FontConfig, FontError, FontWorkspace, UpdateInfo, VariantConfig,
    VariantError,
};

/// Outcome of processing a single variant of a font.
#[derive(Debug)]
pub struct VariantOutcome {
    /// Variant name.
    pub variant: String,
    /// Processing result.
    pub result: Result<VariantOutput, VariantError>,
}

/// Report on processing a font update.
#[derive(Debug)]
pub struct FontReport {
    /// Font name.
    pub font: String,
    /// Processed version.
    pub version: String,
    /// Per-variant outcomes in the configuration order.
    pub variants: Vec<VariantOutcome>,
    /// Number of assets downloaded while processing the font.
    pub download_count: usize,
    /// Number of fonts extracted from archives while processing the font.
    pub extraction_count: usize,
}

impl FontReport {
    /// Checks whether all variants were processed successfully.
    pub fn is_success(&self) -> bool {
        self.variants.iter().all(|outcome| outcome.result.is_ok())
    }

    /// Iterates over failed variants.
    pub fn failed_variants(&self) -> impl Iterator<Item = (&str, &VariantError)> + '_ {
        self.variants.iter().filter_map(|outcome| {
            let err = outcome.result.as_ref().err()?;
            Some((outcome.variant.as_str(), err))
        })
    }
}

impl Pipeline {
    /// Processes all configured variants of the font from the update.
    ///
    /// Each variant's source asset is the first release asset matching the variant asset pattern.
    /// Assets are downloaded once per URL; archives are extracted once per font pattern.
    /// Errors resolving or processing a variant are recorded in the report and do not affect
    /// other variants.
    ///
    /// # Errors
    ///
    /// Returns an error if the font is not configured, or its workspace cannot be created.
    pub fn process_update(&self, update: &UpdateInfo) -> Result<FontReport, FontError> {
        let font = self
            .config
            .font(&update.name)
            .ok_or_else(|| FontError::ConfigMissing(update.name.clone()))?;
        info!("Processing font {} ({})", font.name(), update.version);

        let mut workspace = FontWorkspace::new().map_err(FontError::Workspace)?;
        let variants = font
            .variants()
            .iter()
            .map(|variant| {
                let result = self
                    .resolve_font_file(font, variant, update, &mut workspace)
                    .and_then(|path| {
                        let font_bytes = fs::read(&path)
                            .map_err(|source| VariantError::Io { path, source })?;
                        self.process_variant(font.name(), variant, &font_bytes)
                    });
                if let Err(err) = &result {
                    warn!("Skipped {}-{}: {err}", font.name(), variant.variant());
                }
                VariantOutcome {
                    variant: variant.variant().to_owned(),
                    result,
                }
            })
            .collect();

        let report = FontReport {
            font: font.name().to_owned(),
            version: update.version.clone(),
            variants,
            download_count: workspace.downloads().download_count(),
            extraction_count: workspace.extractions().extraction_count(),
        };
        if !report.is_success() {
            let failed: Vec<_> = report.failed_variants().map(|(name, _)| name).collect();
            error!("Font {} has failed variants: {failed:?}", report.font);
        }
        Ok(report)
    }

    fn resolve_font_file(
        &self,
        font: &FontConfig,
        variant: &VariantConfig,
        update: &UpdateInfo,
        workspace: &mut FontWorkspace,
    ) -> Result<PathBuf, VariantError> {
        let asset = update
            .find_asset(variant.asset_pattern())
            .ok_or_else(|| VariantError::AssetNotFound {
                pattern: variant.asset_pattern().to_string(),
            })?;
        let path = workspace
            .download(self.downloader.as_ref(), asset)
            .map_err(VariantError::Download)?;

        if asset.name.to_ascii_lowercase().ends_with(".zip") {
            let pattern = variant.font_pattern();
            let extracted = workspace
                .extract(self.extractor.as_ref(), &path, pattern)
                .map_err(VariantError::Extraction)?;
            let extracted = extracted.ok_or_else(|| VariantError::ExtractionNotFound {
                archive: asset.name.clone(),
                pattern: pattern.to_string(),
            })?;
            info!(
                "{}-{}: using `{}` from {}",
                font.name(),
                variant.variant(),
                extracted.display(),
                asset.name
            );
            Ok(extracted)
        } else if has_font_extension(&asset.name) {
            Ok(path)
        } else {
            Err(VariantError::UnsupportedAsset {
                asset: asset.name.clone(),
            })
        }
    }
}
