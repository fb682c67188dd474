//! Error types used in the pipeline.
//!
//! Errors are contained at the smallest unit that can fail independently: a range
//! ([`SubsetBuildError`]), a variant ([`VariantError`]) or a whole font ([`FontError`]).

use std::{io, path::PathBuf, sync::Arc};

use font_subset::{ParseError, WriteError};

/// Error parsing a Unicode range expression such as `U+4E00-9FFF, U+3000`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed Unicode range token {token:?}: {reason}")]
pub struct MalformedRangeError {
    /// Offending token (trimmed), or the entire expression if it's empty.
    pub token: String,
    /// Human-readable reason.
    pub reason: &'static str,
}

/// Error building a subset for a single catalog range. Only this range is skipped.
#[derive(Debug, thiserror::Error)]
#[error("failed building subset for range `{range_id}`: {cause}")]
pub struct SubsetBuildError {
    /// ID of the range in the catalog.
    pub range_id: String,
    /// Error reported by the subsetting engine.
    #[source]
    pub cause: SubsetBuildCause,
}

/// Cause of a [`SubsetBuildError`].
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum SubsetBuildCause {
    /// Font data is structurally invalid or unsupported. The error is shared by all ranges
    /// of a variant if the font cannot be parsed at all.
    #[error(transparent)]
    Parse(Arc<ParseError>),
    /// Subset cannot be serialized.
    #[error(transparent)]
    Write(#[from] WriteError),
}

impl From<ParseError> for SubsetBuildCause {
    fn from(err: ParseError) -> Self {
        Self::Parse(Arc::new(err))
    }
}

/// Error fetching data over the network or from an archive.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP request failed (DNS, connection, TLS, or a non-2xx response).
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        /// Requested URL.
        url: String,
        /// Underlying error.
        #[source]
        source: Box<ureq::Error>,
    },
    /// Response body could not be parsed.
    #[error("failed parsing response from {url}: {source}")]
    Json {
        /// Requested URL.
        url: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// Archive is corrupt or uses an unsupported format.
    #[error("failed reading archive {path}: {source}")]
    Archive {
        /// Path to the archive.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: zip::result::ZipError,
    },
    /// I/O error.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path to the file being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// Error processing a single font variant. Other variants of the same font are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum VariantError {
    /// No release asset matches the configured asset pattern.
    #[error("no release asset matches pattern `{pattern}`")]
    AssetNotFound {
        /// Asset pattern.
        pattern: String,
    },
    /// No archive entry matches the font pattern.
    #[error("no .ttf / .otf entry in `{archive}` matches pattern `{pattern}`")]
    ExtractionNotFound {
        /// Archive name.
        archive: String,
        /// Font file pattern.
        pattern: String,
    },
    /// Asset is neither an archive nor a font file.
    #[error("unsupported asset format: `{asset}`")]
    UnsupportedAsset {
        /// Asset name.
        asset: String,
    },
    /// Downloading the asset failed.
    #[error("download failed: {0}")]
    Download(#[source] FetchError),
    /// Extracting the font from the archive failed.
    #[error("extraction failed: {0}")]
    Extraction(#[source] FetchError),
    /// Font binary cannot be inspected.
    #[error("cannot read glyph inventory: {0}")]
    Inventory(#[source] ParseError),
    /// I/O error reading the font or writing output.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// Error processing a whole font update.
#[derive(Debug, thiserror::Error)]
pub enum FontError {
    /// The font is not present in the font configuration.
    #[error("font `{0}` is missing from the font configuration")]
    ConfigMissing(String),
    /// Failed creating a temporary workspace for the font.
    #[error("failed creating font workspace: {0}")]
    Workspace(#[source] io::Error),
    /// Processing panicked.
    #[error("processing panicked: {0}")]
    Panicked(String),
}

/// Error loading configuration files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed reading the file.
    #[error("failed reading {path}: {source}")]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Contents are not valid JSON, or miss required keys.
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
    /// A pattern in the font configuration is not a valid regex.
    #[error("invalid pattern for font `{font}`, variant `{variant}`: {source}")]
    Pattern {
        /// Font name.
        font: String,
        /// Variant name.
        variant: String,
        /// Underlying error.
        #[source]
        source: regex::Error,
    },
    /// Font configuration contains semantically invalid data.
    #[error("invalid configuration for font `{font}`: {message}")]
    Invalid {
        /// Font name.
        font: String,
        /// Error message.
        message: String,
    },
}

/// Error reading or writing the version ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// I/O error.
    #[error("I/O error on ledger {path}: {source}")]
    Io {
        /// Path to the ledger.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Ledger is not valid JSON.
    #[error("malformed ledger {path}: {source}")]
    Json {
        /// Path to the ledger.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}
