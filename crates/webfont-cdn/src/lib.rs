//! Pipeline building CDN-ready web font subsets from upstream font releases.
//!
//! For every configured font variant, the pipeline builds a WOFF2 subset per named Unicode range
//! from the [`RangeCatalog`], names subsets deterministically with a [`Namer`], and emits
//! a stylesheet with an `@font-face` rule per built subset. Browsers then download only
//! the subsets covering the chars present on a page.
//!
//! The pipeline is split into layers:
//!
//! - [`parse_ranges()`], [`GlyphInventory`], [`SubsetBuilder`], [`Namer`] and [`emit_css()`]
//!   implement building blocks for a single font binary.
//! - [`Pipeline::process_variant()`] builds all subsets and stylesheets for a font variant.
//! - [`Pipeline::process_update()`] resolves variant binaries from release assets (downloading
//!   and extracting them at most once per font) and processes each variant.
//! - [`Pipeline::process_fleet()`] processes multiple font updates with a bounded worker pool.
//!
//! Release discovery ([`check_updates()`]), the [`VersionLedger`] of processed versions
//! and the [`FontIndex`] of built files complete the pipeline.
//!
//! # Examples
//!
//! ```no_run
//! use webfont_cdn::{FleetConfig, Pipeline, RangeCatalog, VersionLedger, load_updates};
//! # use std::path::Path;
//!
//! let config = FleetConfig::load(Path::new("config/fonts.json"))?;
//! let catalog = RangeCatalog::load(Path::new("config/unicode-ranges.json"))?;
//! let updates = load_updates(Path::new("updates.json"))?;
//!
//! let pipeline = Pipeline::new(config, catalog, "fonts");
//! let report = pipeline.process_fleet(&updates, 2);
//! let mut ledger = VersionLedger::load(Path::new("versions.json"))?;
//! report.update_ledger(&mut ledger);
//! ledger.save(Path::new("versions.json"))?;
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```

#![doc(html_root_url = "https://docs.rs/webfont-cdn/0.1.0")]

mod config;
mod css;
mod errors;
mod fetch;
mod index;
mod inventory;
mod ledger;
mod naming;
mod pipeline;
mod ranges;
mod release;
mod subset;
mod workspace;

pub use crate::{
    config::{FleetConfig, FontConfig, VariantConfig},
    css::{emit_css, Stylesheets},
    errors::{
        ConfigError, FetchError, FontError, LedgerError, MalformedRangeError, SubsetBuildCause,
        SubsetBuildError, VariantError,
    },
    fetch::{ArchiveExtractor, Downloader, HttpDownloader, ZipExtractor, MAX_DOWNLOAD_SIZE},
    index::{build_index, FontIndex, FontIndexEntry, SubsetIndexEntry, VariantIndexEntry},
    inventory::GlyphInventory,
    ledger::{LedgerEntry, VersionLedger},
    naming::Namer,
    pipeline::{
        FleetReport, FontOutcome, FontReport, Pipeline, VariantOutcome, VariantOutput,
        VariantStats,
    },
    ranges::{parse_ranges, RangeCatalog, RangeEntry, UnicodeRange},
    release::{
        check_updates, load_updates, save_updates, write_github_output, Asset, GitHubReleases,
        Release, ReleaseFeed, UpdateInfo,
    },
    subset::{
        BuiltSubset, ParsedFont, SubsetBuilder, SubsetOutcome, SubsetResult, SOURCE_DATE_EPOCH_VAR,
    },
    workspace::{DownloadCache, ExtractionCache, FontWorkspace},
};
