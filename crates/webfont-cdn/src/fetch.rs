//! Downloading release assets and extracting fonts from archives.

use std::{
    fmt,
    fs::{self, File},
    io::{self, BufReader, Write as _},
    path::{Path, PathBuf},
    time::Duration,
};

use log::debug;
use regex::Regex;
use tempfile::NamedTempFile;
use ureq::{
    tls::{RootCerts, TlsConfig, TlsProvider},
    Agent,
};
use zip::ZipArchive;

use crate::FetchError;

/// Global timeout for HTTP operations. Archives for CJK fonts may weigh hundreds of megabytes.
const HTTP_TIMEOUT: Duration = Duration::from_secs(600);
/// Value of the `User-Agent` header sent with all requests.
pub(crate) const USER_AGENT: &str = concat!("webfont-cdn/", env!("CARGO_PKG_VERSION"));
/// Maximum response body size for API responses (10 MB).
pub(crate) const MAX_API_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;
/// Maximum response body size for asset downloads (1 GB).
pub const MAX_DOWNLOAD_SIZE: u64 = 1024 * 1024 * 1024;

/// Creates an HTTP agent configured with native TLS and a global timeout.
pub(crate) fn http_agent() -> Agent {
    let tls_config = TlsConfig::builder()
        .provider(TlsProvider::NativeTls)
        .root_certs(RootCerts::PlatformVerifier)
        .build();

    Agent::config_builder()
        .tls_config(tls_config)
        .timeout_global(Some(HTTP_TIMEOUT))
        .build()
        .into()
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> FetchError + '_ {
    move |source| FetchError::Io {
        path: path.to_owned(),
        source,
    }
}

/// Downloads files by URL.
pub trait Downloader: fmt::Debug + Send + Sync {
    /// Downloads `url` to the `dest` file, replacing it if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the download fails. The error is recoverable: it only affects
    /// the font variant that requested the download.
    fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// [`Downloader`] using HTTPS.
#[derive(Clone)]
pub struct HttpDownloader {
    agent: Agent,
}

impl fmt::Debug for HttpDownloader {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("HttpDownloader").finish_non_exhaustive()
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self {
            agent: http_agent(),
        }
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let http_error = |err| FetchError::Http {
            url: url.to_owned(),
            source: Box::new(err),
        };

        debug!("Downloading {url} to {}", dest.display());
        let bytes = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(http_error)?
            .into_body()
            .with_config()
            .limit(MAX_DOWNLOAD_SIZE)
            .read_to_vec()
            .map_err(http_error)?;

        // Write to a temporary file first, so that an interrupted write never leaves a partial file
        // at `dest` (which would be reused by later downloads).
        let dir = dest.parent().unwrap_or(Path::new("."));
        let mut file = NamedTempFile::new_in(dir).map_err(io_error(dest))?;
        file.write_all(&bytes).map_err(io_error(dest))?;
        file.persist(dest).map_err(|err| io_error(dest)(err.error))?;
        debug!("Downloaded {} bytes from {url}", bytes.len());
        Ok(())
    }
}

/// Checks whether the file name has a font extension (`.ttf` or `.otf`), ignoring case.
pub(crate) fn has_font_extension(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.ends_with(".ttf") || name.ends_with(".otf")
}

/// Extracts font files from archives.
pub trait ArchiveExtractor: fmt::Debug + Send + Sync {
    /// Extracts the first `.ttf` / `.otf` entry whose path contains a match of `pattern`
    /// into `dest_dir`, and returns the path to the extracted file. Returns `Ok(None)`
    /// if there is no such entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be read or the entry cannot be written.
    fn extract(
        &self,
        archive: &Path,
        dest_dir: &Path,
        pattern: &Regex,
    ) -> Result<Option<PathBuf>, FetchError>;
}

/// [`ArchiveExtractor`] for ZIP archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn extract(
        &self,
        archive_path: &Path,
        dest_dir: &Path,
        pattern: &Regex,
    ) -> Result<Option<PathBuf>, FetchError> {
        let archive_error = |source| FetchError::Archive {
            path: archive_path.to_owned(),
            source,
        };

        let reader = File::open(archive_path).map_err(io_error(archive_path))?;
        let mut archive = ZipArchive::new(BufReader::new(reader)).map_err(archive_error)?;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(archive_error)?;
            if entry.is_dir() || !pattern.is_match(entry.name()) || !has_font_extension(entry.name()) {
                continue;
            }
            // Skip entries escaping the destination directory
            let Some(relative_path) = entry.enclosed_name() else {
                continue;
            };

            let out_path = dest_dir.join(relative_path);
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(io_error(parent))?;
            }
            let mut out_file = File::create(&out_path).map_err(io_error(&out_path))?;
            io::copy(&mut entry, &mut out_file).map_err(io_error(&out_path))?;
            debug!(
                "Extracted `{}` from {} to {}",
                entry.name(),
                archive_path.display(),
                out_path.display()
            );
            return Ok(Some(out_path));
        }
        Ok(None)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use zip::{write::SimpleFileOptions, ZipWriter};

    use super::*;

    /// Creates a ZIP archive with the specified entries.
    pub(crate) fn create_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    fn font_pattern(pattern: &str) -> Regex {
        regex::RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .unwrap()
    }

    #[test]
    fn extracting_first_matching_font() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("fonts.zip");
        create_zip(
            &archive,
            &[
                ("README.md", b"Inter font family".to_vec()),
                ("Inter/", vec![]),
                ("Inter/Inter-Regular.woff2", b"woff2".to_vec()),
                ("Inter/Inter-Regular.TTF", b"regular".to_vec()),
                ("Inter/Inter-Bold.ttf", b"bold".to_vec()),
            ],
        );

        let dest = dir.path().join("out");
        let path = ZipExtractor
            .extract(&archive, &dest, &font_pattern("inter-regular"))
            .unwrap()
            .unwrap();
        assert_eq!(path, dest.join("Inter/Inter-Regular.TTF"));
        assert_eq!(fs::read(&path).unwrap(), b"regular");

        let path = ZipExtractor
            .extract(&archive, &dest, &font_pattern(".*Inter.*"))
            .unwrap()
            .unwrap();
        assert_eq!(path, dest.join("Inter/Inter-Regular.TTF"));

        let missing = ZipExtractor
            .extract(&archive, &dest, &font_pattern("Italic"))
            .unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn extracting_from_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("fonts.zip");
        fs::write(&archive, b"definitely not a ZIP archive").unwrap();

        let err = ZipExtractor
            .extract(&archive, dir.path(), &font_pattern(".*"))
            .unwrap_err();
        assert!(matches!(err, FetchError::Archive { .. }), "{err}");
    }

    #[test]
    fn font_extensions() {
        assert!(has_font_extension("a/Inter-Regular.ttf"));
        assert!(has_font_extension("Inter-Regular.OTF"));
        assert!(!has_font_extension("Inter-Regular.woff2"));
        assert!(!has_font_extension("Inter.zip"));
    }
}
