//! Scoped per-font workspace: a temporary directory plus download / extraction caches.

use std::{
    collections::HashMap,
    ffi::OsStr,
    io,
    path::{Path, PathBuf},
};

use log::{debug, info};
use regex::Regex;
use tempfile::TempDir;

use crate::{ArchiveExtractor, Asset, Downloader, FetchError};

/// Maps source URLs to downloaded files.
#[derive(Debug, Default)]
pub struct DownloadCache {
    entries: HashMap<String, PathBuf>,
    download_count: usize,
}

impl DownloadCache {
    /// Returns the local path for the asset, downloading it into `dir` if necessary.
    ///
    /// The cache is keyed by the download URL, so variants referencing the same asset
    /// download it once. If the destination file already exists, it is reused as well.
    ///
    /// # Errors
    ///
    /// Propagates download errors. Failed downloads are not cached.
    pub fn get_or_download(
        &mut self,
        downloader: &dyn Downloader,
        asset: &Asset,
        dir: &Path,
    ) -> Result<PathBuf, FetchError> {
        let url = &asset.browser_download_url;
        if let Some(path) = self.entries.get(url) {
            debug!("Using cached download of {url}: {}", path.display());
            return Ok(path.clone());
        }

        let file_name = Path::new(&asset.name)
            .file_name()
            .unwrap_or(OsStr::new("asset"));
        let dest = dir.join(file_name);
        if dest.is_file() {
            info!("File `{}` already exists, skipping download", asset.name);
        } else {
            info!("Downloading asset `{}` from {url}", asset.name);
            downloader.download(url, &dest)?;
            self.download_count += 1;
        }
        self.entries.insert(url.clone(), dest.clone());
        Ok(dest)
    }

    /// Returns the number of downloads performed via this cache.
    pub fn download_count(&self) -> usize {
        self.download_count
    }
}

/// Maps `(archive, pattern)` pairs to files extracted from archives.
#[derive(Debug, Default)]
pub struct ExtractionCache {
    entries: HashMap<(PathBuf, String), PathBuf>,
    extraction_count: usize,
}

impl ExtractionCache {
    /// Returns the path to the font file matching `pattern` in `archive`, extracting it
    /// into `dir` if necessary. Returns `Ok(None)` if there is no matching file.
    ///
    /// # Errors
    ///
    /// Propagates extraction errors. Negative and failed lookups are not cached.
    pub fn get_or_extract(
        &mut self,
        extractor: &dyn ArchiveExtractor,
        archive: &Path,
        pattern: &Regex,
        dir: &Path,
    ) -> Result<Option<PathBuf>, FetchError> {
        let key = (archive.to_owned(), pattern.as_str().to_owned());
        if let Some(path) = self.entries.get(&key) {
            if path.is_file() {
                debug!("Using cached extraction for `{}` from {}", key.1, archive.display());
                return Ok(Some(path.clone()));
            }
        }

        let extracted = extractor.extract(archive, dir, pattern)?;
        self.extraction_count += 1;
        if let Some(path) = &extracted {
            info!(
                "Extracted `{}` from archive {}",
                path.display(),
                archive.display()
            );
            self.entries.insert(key, path.clone());
        }
        Ok(extracted)
    }

    /// Returns the number of extractions performed via this cache.
    pub fn extraction_count(&self) -> usize {
        self.extraction_count
    }
}

/// Temporary directory and caches scoped to processing a single font update.
///
/// The workspace is owned by one task and never shared, so the caches need no locking.
/// The directory is removed when the workspace is dropped.
#[derive(Debug)]
pub struct FontWorkspace {
    dir: TempDir,
    downloads: DownloadCache,
    extractions: ExtractionCache,
}

impl FontWorkspace {
    /// Creates a workspace in the system temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the temporary directory cannot be created.
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("webfont-cdn-").tempdir()?;
        Ok(Self {
            dir,
            downloads: DownloadCache::default(),
            extractions: ExtractionCache::default(),
        })
    }

    /// Returns the path to the workspace directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Downloads an asset into the workspace, reusing earlier downloads of the same URL.
    ///
    /// # Errors
    ///
    /// Propagates download errors.
    pub fn download(
        &mut self,
        downloader: &dyn Downloader,
        asset: &Asset,
    ) -> Result<PathBuf, FetchError> {
        self.downloads
            .get_or_download(downloader, asset, self.dir.path())
    }

    /// Extracts a font from an archive in the workspace, reusing earlier extractions
    /// with the same pattern.
    ///
    /// # Errors
    ///
    /// Propagates extraction errors.
    pub fn extract(
        &mut self,
        extractor: &dyn ArchiveExtractor,
        archive: &Path,
        pattern: &Regex,
    ) -> Result<Option<PathBuf>, FetchError> {
        let archive_name = archive.file_name().unwrap_or(OsStr::new("archive"));
        let mut dest_dir = self.dir.path().join("extracted");
        dest_dir.push(archive_name);
        self.extractions
            .get_or_extract(extractor, archive, pattern, &dest_dir)
    }

    /// Returns the download cache.
    pub fn downloads(&self) -> &DownloadCache {
        &self.downloads
    }

    /// Returns the extraction cache.
    pub fn extractions(&self) -> &ExtractionCache {
        &self.extractions
    }
}
