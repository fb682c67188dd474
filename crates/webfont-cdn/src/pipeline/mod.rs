//! Orchestration of subset builds for font variants, font updates and fleets of fonts.

use std::path::{Path, PathBuf};

use crate::{
    ArchiveExtractor, Downloader, FleetConfig, HttpDownloader, Namer, RangeCatalog, SubsetBuilder,
    ZipExtractor,
};

mod fleet;
mod update;
mod variant;

pub use self::{
    fleet::{FleetReport, FontOutcome},
    update::{FontReport, VariantOutcome},
    variant::{VariantOutput, VariantStats},
};

/// Subset-build pipeline.
///
/// The pipeline is immutable once created. The range catalog and the font configuration are shared
/// by all workers; per-font state (temporary files and caches) lives in a [`FontWorkspace`]
/// created for each processed font.
///
/// [`FontWorkspace`]: crate::FontWorkspace
#[derive(Debug)]
pub struct Pipeline {
    config: FleetConfig,
    catalog: RangeCatalog,
    output_dir: PathBuf,
    namer: Namer,
    builder: SubsetBuilder,
    downloader: Box<dyn Downloader>,
    extractor: Box<dyn ArchiveExtractor>,
}

impl Pipeline {
    /// Creates a pipeline writing output to `output_dir`. By default, the pipeline downloads assets
    /// over HTTPS, extracts fonts from ZIP archives and takes the font timestamp from
    /// the environment (see [`SubsetBuilder::from_env()`]).
    pub fn new(config: FleetConfig, catalog: RangeCatalog, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            catalog,
            output_dir: output_dir.into(),
            namer: Namer::default(),
            builder: SubsetBuilder::from_env(),
            downloader: Box::new(HttpDownloader::default()),
            extractor: Box::new(ZipExtractor),
        }
    }

    /// Sets the subset namer.
    #[must_use]
    pub fn with_namer(mut self, namer: Namer) -> Self {
        self.namer = namer;
        self
    }

    /// Sets the subset builder.
    #[must_use]
    pub fn with_builder(mut self, builder: SubsetBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Sets the asset downloader.
    #[must_use]
    pub fn with_downloader(mut self, downloader: impl Downloader + 'static) -> Self {
        self.downloader = Box::new(downloader);
        self
    }

    /// Sets the archive extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: impl ArchiveExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// Returns the font configuration.
    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Returns the range catalog.
    pub fn catalog(&self) -> &RangeCatalog {
        &self.catalog
    }

    /// Returns the output directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Returns the output directory for the specified font.
    pub fn font_dir(&self, font_name: &str) -> PathBuf {
        self.output_dir.join(font_name)
    }
}
